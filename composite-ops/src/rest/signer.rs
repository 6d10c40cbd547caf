//! Request signing hook.
//!
//! Authentication is an external concern. Callers with a real signing scheme
//! implement [`RequestSigner`]; the two implementations here cover
//! unauthenticated endpoints and static bearer/API-key headers.

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use std::fmt;

use super::{RestError, RestResult};

/// Mutates a fully built request just before it is sent.
///
/// Called once per attempt, so signatures over dates stay fresh on retries.
pub trait RequestSigner: Send + Sync + fmt::Debug {
    fn sign(&self, request: &mut reqwest::Request) -> RestResult<()>;
}

/// Leaves requests untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSigner;

impl RequestSigner for NoopSigner {
    fn sign(&self, _request: &mut reqwest::Request) -> RestResult<()> {
        Ok(())
    }
}

/// Adds a fixed set of headers to every request.
#[derive(Clone, Default)]
pub struct StaticHeaderSigner {
    headers: HeaderMap,
}

impl StaticHeaderSigner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a header, validating name and value.
    pub fn with_header(mut self, name: &str, value: &str) -> RestResult<Self> {
        let header_name =
            HeaderName::from_bytes(name.as_bytes()).map_err(|e| RestError::InvalidHeader {
                name: name.to_string(),
                reason: e.to_string(),
            })?;
        let mut header_value =
            HeaderValue::from_str(value).map_err(|e| RestError::InvalidHeader {
                name: name.to_string(),
                reason: e.to_string(),
            })?;
        header_value.set_sensitive(true);
        self.headers.insert(header_name, header_value);
        Ok(self)
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }
}

impl RequestSigner for StaticHeaderSigner {
    fn sign(&self, request: &mut reqwest::Request) -> RestResult<()> {
        for (name, value) in &self.headers {
            request.headers_mut().insert(name.clone(), value.clone());
        }
        Ok(())
    }
}

// Header values may carry credentials.
impl fmt::Debug for StaticHeaderSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.headers.keys().map(HeaderName::as_str).collect();
        f.debug_struct("StaticHeaderSigner")
            .field("headers", &names)
            .finish()
    }
}
