//! Request body type.
//!
//! A [`Body`] is a stream of byte chunks that has not been read yet. The
//! server hands handlers the connection's body as-is; nothing is buffered
//! until somebody asks for it with [`Body::collect`] or
//! [`Request::bytes`](crate::Request::bytes).
//!
//! A body built from bytes that are already in memory is just a view over a
//! reference-counted [`Bytes`] buffer. Cloning the buffer into a new body is
//! an atomic increment, and dropping the body releases no handle other than
//! that reference.

use bytes::Bytes;
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Empty, Full};
use hyper::body::Body as HttpBody;

/// Boxed error produced while streaming a body.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// A type-erased HTTP body.
pub struct Body(UnsyncBoxBody<Bytes, BoxError>);

impl Body {
    /// Wrap any `http_body` implementation, including hyper's `Incoming`.
    pub fn new<B>(body: B) -> Self
    where
        B: HttpBody<Data = Bytes> + Send + 'static,
        B::Error: Into<BoxError>,
    {
        Self(body.map_err(Into::into).boxed_unsync())
    }

    /// A body with no bytes.
    pub fn empty() -> Self {
        Self::new(Empty::<Bytes>::new())
    }

    /// Read every remaining chunk into one contiguous buffer.
    pub async fn collect(self) -> Result<Bytes, BoxError> {
        let collected = BodyExt::collect(self.0).await?;
        Ok(collected.to_bytes())
    }
}

impl Default for Body {
    fn default() -> Self { Self::empty() }
}

impl From<Bytes> for Body {
    fn from(bytes: Bytes) -> Self {
        Self::new(Full::new(bytes))
    }
}

impl From<Vec<u8>> for Body {
    fn from(bytes: Vec<u8>) -> Self { Self::from(Bytes::from(bytes)) }
}

impl From<String> for Body {
    fn from(s: String) -> Self { Self::from(Bytes::from(s)) }
}

impl From<&'static str> for Body {
    fn from(s: &'static str) -> Self { Self::from(Bytes::from_static(s.as_bytes())) }
}

impl std::fmt::Debug for Body {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Body")
    }
}
