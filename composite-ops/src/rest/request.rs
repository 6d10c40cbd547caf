//! Description of a state-changing REST call.

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::Method;
use std::collections::BTreeMap;

use super::{RestError, RestResult};

/// Characters left as-is inside a path segment (RFC 3986 unreserved).
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// A mutating call such as start, stop, restore, update or delete.
///
/// `path_template` uses `{name}` placeholders filled from `path_params`.
#[derive(Debug, Clone, PartialEq)]
pub struct MutatingRequest {
    pub method: Method,
    pub path_template: String,
    pub path_params: BTreeMap<String, String>,
    pub query: Vec<(String, String)>,
    pub body: Option<serde_json::Value>,
    /// Idempotency token; one is generated when absent.
    pub retry_token: Option<String>,
    /// Entity tag precondition for optimistic concurrency.
    pub if_match: Option<String>,
}

impl MutatingRequest {
    pub fn new(method: Method, path_template: impl Into<String>) -> Self {
        Self {
            method,
            path_template: path_template.into(),
            path_params: BTreeMap::new(),
            query: Vec::new(),
            body: None,
            retry_token: None,
            if_match: None,
        }
    }

    pub fn path_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.path_params.insert(name.into(), value.into());
        self
    }

    pub fn query_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    pub fn body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn retry_token(mut self, token: impl Into<String>) -> Self {
        self.retry_token = Some(token.into());
        self
    }

    pub fn if_match(mut self, etag: impl Into<String>) -> Self {
        self.if_match = Some(etag.into());
        self
    }

    /// Path with every placeholder substituted and percent-encoded.
    pub fn path(&self) -> RestResult<String> {
        expand_path(&self.path_template, &self.path_params)
    }
}

/// Substitute `{name}` placeholders in `template`.
pub(crate) fn expand_path(
    template: &str,
    params: &BTreeMap<String, String>,
) -> RestResult<String> {
    let mut path = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        path.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let close = after
            .find('}')
            .ok_or_else(|| RestError::MissingPathParam(after.to_string()))?;
        let name = &after[..close];
        let value = params
            .get(name)
            .ok_or_else(|| RestError::MissingPathParam(name.to_string()))?;
        path.extend(utf8_percent_encode(value, PATH_SEGMENT));
        rest = &after[close + 1..];
    }
    path.push_str(rest);
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_path_substitutes_and_encodes() {
        let request = MutatingRequest::new(
            Method::POST,
            "/20200407/deployments/{deploymentId}/actions/start",
        )
        .path_param("deploymentId", "ocid1.deployment.oc1..aaaa");
        assert_eq!(
            request.path().expect("path should expand"),
            "/20200407/deployments/ocid1.deployment.oc1..aaaa/actions/start"
        );

        let params = BTreeMap::from([("name".to_string(), "a b/c".to_string())]);
        assert_eq!(
            expand_path("/things/{name}", &params).expect("path should expand"),
            "/things/a%20b%2Fc"
        );
    }

    #[test]
    fn test_expand_path_reports_missing_param() {
        let err = MutatingRequest::new(Method::DELETE, "/20200407/deployments/{deploymentId}")
            .path()
            .expect_err("parameter is missing");
        assert!(matches!(err, RestError::MissingPathParam(name) if name == "deploymentId"));
    }

    #[test]
    fn test_template_without_placeholders() {
        assert_eq!(
            expand_path("/20200407/deployments", &BTreeMap::new()).expect("plain path"),
            "/20200407/deployments"
        );
    }
}
