//! Response returned by the agent.

use crate::error::{AgentError, Result};
use bytes::Bytes;
use http::{HeaderMap, StatusCode, Version};
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Full};

/// Readable response body stream.
pub type ResponseBody = UnsyncBoxBody<Bytes, AgentError>;

/// A response whose headers have been received.
///
/// The body is still streaming from the peer; the underlying connection is
/// only released back to its pool once the body has been read to the end.
pub struct Response {
    status: StatusCode,
    version: Version,
    headers: HeaderMap,
    body: ResponseBody,
}

impl Response {
    pub fn new(status: StatusCode, version: Version, headers: HeaderMap, body: ResponseBody) -> Self {
        Self {
            status,
            version,
            headers,
            body,
        }
    }

    /// A complete in-memory response. Useful for test pools.
    pub fn from_bytes(status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self::new(
            status,
            Version::HTTP_11,
            HeaderMap::new(),
            Full::new(body.into()).map_err(|never| match never {}).boxed_unsync(),
        )
    }

    /// Convert a hyper response, mapping body read failures to protocol errors.
    pub(crate) fn from_hyper(response: hyper::Response<hyper::body::Incoming>) -> Self {
        let (parts, body) = response.into_parts();
        let body = body
            .map_err(|e| AgentError::Protocol(format!("Failed reading response body: {}", e)))
            .boxed_unsync();
        Self::new(parts.status, parts.version, parts.headers, body)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// Take the body stream.
    pub fn into_body(self) -> ResponseBody {
        self.body
    }

    /// Read the whole body.
    ///
    /// # Errors
    ///
    /// [`AgentError::Protocol`] if the peer breaks off mid-body.
    pub async fn bytes(self) -> Result<Bytes> {
        Ok(self.body.collect().await?.to_bytes())
    }
}

impl std::fmt::Debug for Response {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Response")
            .field("status", &self.status)
            .field("version", &self.version)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_from_bytes() {
        let resp = Response::from_bytes(StatusCode::OK, &b"{}"[..]);
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.version(), Version::HTTP_11);
        assert!(resp.headers().is_empty());
        assert_eq!(&resp.bytes().await.unwrap()[..], b"{}");
    }

    #[test]
    fn test_debug_omits_body() {
        let resp = Response::from_bytes(StatusCode::NOT_FOUND, "secret");
        let debug = format!("{resp:?}");
        assert!(debug.contains("404"));
        assert!(!debug.contains("secret"));
    }
}
