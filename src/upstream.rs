//! Reverse-proxy handler.
//!
//! [`Upstream`] is the end of the chain in the bundled binary: it replays the
//! request against a backend and relays whatever comes back. Method, path,
//! query, headers and body go through; headers that only describe one hop
//! (`host`, framing, connection management) are dropped in both directions
//! and recomputed by the client and the server.

use std::sync::Arc;
use std::time::Duration;

use http::header::{
    CONNECTION, CONTENT_LENGTH, HOST, HeaderMap, HeaderName, TE, TRAILER, TRANSFER_ENCODING,
    UPGRADE,
};
use http::StatusCode;
use tracing::error;
use url::Url;

use crate::error::Error;
use crate::handler::Handler;
use crate::request::Request;
use crate::response::Response;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

const HOP_HEADERS: [HeaderName; 8] = [
    CONNECTION,
    CONTENT_LENGTH,
    HOST,
    HeaderName::from_static("keep-alive"),
    TE,
    TRAILER,
    TRANSFER_ENCODING,
    UPGRADE,
];

/// Forwards requests to a backend base URL.
#[derive(Clone, Debug)]
pub struct Upstream {
    client: reqwest::Client,
    base: Url,
}

impl Upstream {
    pub fn new(base: &str) -> Result<Self, Error> {
        let base = Url::parse(base)
            .map_err(|e| Error::config(format!("upstream `{base}`: {e}")))?;
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        Ok(Self { client, base })
    }

    pub fn into_handler(self) -> impl Handler {
        let this = Arc::new(self);
        move |req: Request| {
            let this = Arc::clone(&this);
            async move { this.forward(req).await }
        }
    }

    /// Replays `req` against the backend. Any transport failure is a `502`.
    pub async fn forward(&self, mut req: Request) -> Response {
        let target = match self.target(&req) {
            Ok(url) => url,
            Err(e) => {
                error!(url = %req.uri(), "error creating upstream url: {e}");
                return Response::status(StatusCode::BAD_GATEWAY);
            }
        };

        let body = match req.bytes().await {
            Ok(body) => body,
            Err(e) => {
                error!(url = %req.uri(), "error reading body: {e}");
                return Response::status(StatusCode::BAD_REQUEST);
            }
        };

        let method = req.method().clone();
        let headers = end_to_end(req.headers());

        let sent = self
            .client
            .request(method, target)
            .headers(headers)
            .body(body)
            .send()
            .await;

        let resp = match sent {
            Ok(resp) => resp,
            Err(e) => {
                error!(url = %req.uri(), "error performing request to upstream: {e}");
                return Response::status(StatusCode::BAD_GATEWAY);
            }
        };

        let status = resp.status();
        let headers = end_to_end(resp.headers());
        match resp.bytes().await {
            Ok(body) => Response::builder().status(status).headers(headers).bytes(body),
            Err(e) => {
                error!(url = %req.uri(), "error reading upstream response: {e}");
                Response::status(StatusCode::BAD_GATEWAY)
            }
        }
    }

    fn target(&self, req: &Request) -> Result<Url, url::ParseError> {
        let path_and_query = req
            .uri()
            .path_and_query()
            .map_or("/", |pq| pq.as_str());
        self.base.join(path_and_query)
    }
}

fn end_to_end(headers: &HeaderMap) -> HeaderMap {
    let mut out = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        if !HOP_HEADERS.contains(name) {
            out.append(name.clone(), value.clone());
        }
    }
    out
}
