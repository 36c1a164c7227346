//! Incoming HTTP request type.

use std::collections::HashMap;
use std::net::SocketAddr;

use bytes::Bytes;
use http::{HeaderMap, Method, Uri};

use crate::body::Body;
use crate::error::Error;

/// An incoming HTTP request.
///
/// The body is left unread. Call [`Request::bytes`] to drain it into memory,
/// and [`Request::set_body`] to hand a fresh body to the next handler.
pub struct Request {
    head: http::request::Parts,
    body: Body,
    params: HashMap<String, String>,
    remote_addr: Option<SocketAddr>,
}

impl Request {
    pub(crate) fn new(
        req: hyper::Request<hyper::body::Incoming>,
        params: HashMap<String, String>,
        remote_addr: SocketAddr,
    ) -> Self {
        let (head, body) = req.into_parts();
        Self { head, body: Body::new(body), params, remote_addr: Some(remote_addr) }
    }

    pub fn method(&self) -> &Method { &self.head.method }
    pub fn uri(&self) -> &Uri { &self.head.uri }
    pub fn path(&self) -> &str { self.head.uri.path() }
    pub fn headers(&self) -> &HeaderMap { &self.head.headers }

    /// Address of the peer that opened the connection, when served over TCP.
    pub fn remote_addr(&self) -> Option<SocketAddr> { self.remote_addr }

    /// Case-insensitive header lookup. Returns the first value that is valid
    /// visible ASCII.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.head.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Returns a named path parameter.
    ///
    /// For a route `/users/{id}`, `req.param("id")` on `/users/42` returns `Some("42")`.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// Drain the body into memory.
    ///
    /// The request is left with an empty body afterwards.
    pub async fn bytes(&mut self) -> Result<Bytes, Error> {
        std::mem::take(&mut self.body).collect().await.map_err(Error::Body)
    }

    /// Replace the body.
    pub fn set_body(&mut self, body: impl Into<Body>) {
        self.body = body.into();
    }
}

/// Builds a request that did not come off a socket, e.g. in tests or when
/// one handler synthesises a request for another.
impl From<http::Request<Body>> for Request {
    fn from(req: http::Request<Body>) -> Self {
        let (head, body) = req.into_parts();
        Self { head, body, params: HashMap::new(), remote_addr: None }
    }
}

impl std::fmt::Debug for Request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Request")
            .field("method", &self.head.method)
            .field("uri", &self.head.uri)
            .field("headers", &self.head.headers)
            .field("remote_addr", &self.remote_addr)
            .finish_non_exhaustive()
    }
}
