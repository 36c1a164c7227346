//! Simulated-device provisioning gate.
//!
//! [`SimulatedDevice`] sits in front of a device-link route. For every
//! request it:
//!
//! 1. reads the whole body and decodes the device-link operation,
//! 2. asks the IoT hub to create a simulated device for it,
//! 3. on a 2xx from the hub, hands the request, with its original body,
//!    to the next handler.
//!
//! Any failure along the way ends the request with a plain `404 Not Found`.
//! The reason only shows up in the logs.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::header::{CONTENT_LENGTH, HOST, HeaderMap, HeaderName, HeaderValue, TRAILER, TRANSFER_ENCODING};
use http::StatusCode;
use tracing::{error, field, info, warn};
use url::Url;

use crate::body::BoxError;
use crate::config::Config;
use crate::device::{CreateSimulatedDeviceRequest, CreateThingRequest};
use crate::error::Error;
use crate::handler::{Handler, Next};
use crate::request::Request;
use crate::response::Response;

/// Path appended to the configured hub URL.
pub const PROVISION_PATH: &str = "/simulator/simulated/device";

/// Header carrying the configured subscription key.
pub const SUBSCRIPTION_KEY_HEADER: HeaderName = HeaderName::from_static("x-subscription-key");

/// Bound on the whole hub call: connect, send, and read the response.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Inbound headers that describe the inbound message framing rather than the
/// request. The client sets its own for the new body.
const FRAMING_HEADERS: [HeaderName; 4] = [HOST, CONTENT_LENGTH, TRANSFER_ENCODING, TRAILER];

/// Why a request was turned away.
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error("error reading body: {0}")]
    ReadBody(#[source] BoxError),

    #[error("error decoding body: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("error creating url: {0}")]
    Url(#[source] url::ParseError),

    #[error("error encoding create simulated device request: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("error performing request to iothub: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("iot hub status code error: {0}")]
    Status(StatusCode),

    #[error("error reading iot hub response: {0}")]
    ReadResponse(#[source] reqwest::Error),
}

/// Middleware that provisions a simulated device before forwarding.
///
/// Cheap to share: the HTTP client pools connections internally and the
/// configuration is immutable.
#[derive(Clone, Debug)]
pub struct SimulatedDevice {
    next: Next,
    client: reqwest::Client,
    iot_hub_url: String,
    subscription_key: HeaderValue,
}

impl SimulatedDevice {
    /// Wraps `next`. Performs no I/O.
    ///
    /// Fails only if the subscription key cannot be sent as a header value
    /// or the HTTP client cannot be initialised.
    pub fn new(next: impl Handler, config: Config) -> Result<Self, Error> {
        let mut subscription_key = HeaderValue::from_str(&config.subscription_key)
            .map_err(|_| Error::config("SubscriptionKey is not a valid header value"))?;
        subscription_key.set_sensitive(true);

        Ok(Self {
            next: Next::new(next),
            client: build_client(DEFAULT_TIMEOUT)?,
            iot_hub_url: config.iot_hub_url,
            subscription_key,
        })
    }

    /// Replaces the bound on the hub call.
    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self, Error> {
        self.client = build_client(timeout)?;
        Ok(self)
    }

    /// Exposes the middleware as a handler for the router or another middleware.
    pub fn into_handler(self) -> impl Handler {
        let this = Arc::new(self);
        move |req: Request| {
            let this = Arc::clone(&this);
            async move { this.handle(req).await }
        }
    }

    /// Runs the provisioning call and, if the hub accepts it, the next handler.
    pub async fn handle(&self, mut req: Request) -> Response {
        let peer = req.remote_addr();
        let url = req.uri().to_string();

        match self.provision(&mut req, peer, &url).await {
            Ok(original) => {
                req.set_body(original);
                self.next.run(req).await
            }
            Err(e) => {
                let (client_ip, client_port) = client_fields(peer);
                error!(client_ip, client_port, url = url.as_str(), "{e}");
                Response::not_found()
            }
        }
    }

    /// Everything up to the forward. Returns the body exactly as it arrived.
    async fn provision(
        &self,
        req: &mut Request,
        peer: Option<SocketAddr>,
        url: &str,
    ) -> Result<Bytes, LinkError> {
        let body = req.bytes().await.map_err(read_body_error)?;

        let link: CreateThingRequest = serde_json::from_slice(&body).map_err(LinkError::Decode)?;
        let op = link.device_link_operation;

        let (client_ip, client_port) = client_fields(peer);
        warn!(client_ip, client_port, url, "found deviceId={}", op.hardware_id);

        let target = Url::parse(&format!("{}{PROVISION_PATH}", self.iot_hub_url))
            .map_err(LinkError::Url)?;

        let payload = serde_json::to_vec(&CreateSimulatedDeviceRequest::from(op))
            .map_err(LinkError::Encode)?;

        let headers = outbound_headers(req.headers(), &self.subscription_key);

        let resp = self
            .client
            .post(target)
            .headers(headers)
            .body(payload)
            .send()
            .await
            .map_err(LinkError::Transport)?;

        let status = resp.status();
        if !is_success(status) {
            return Err(LinkError::Status(status));
        }

        let created = resp.bytes().await.map_err(LinkError::ReadResponse)?;
        info!(
            client_ip,
            client_port,
            url,
            "iot hub device created: {}",
            String::from_utf8_lossy(&created)
        );

        Ok(body)
    }
}

fn read_body_error(e: Error) -> LinkError {
    match e {
        Error::Body(cause) => LinkError::ReadBody(cause),
        other => LinkError::ReadBody(Box::new(other)),
    }
}

fn build_client(timeout: Duration) -> Result<reqwest::Client, Error> {
    Ok(reqwest::Client::builder().timeout(timeout).build()?)
}

/// `200 <= status < 300`. 1xx and 3xx count as failures.
fn is_success(status: StatusCode) -> bool {
    (200..300).contains(&status.as_u16())
}

/// Every inbound header value, in order, minus framing headers, with the
/// subscription key forced to the configured value.
fn outbound_headers(inbound: &HeaderMap, subscription_key: &HeaderValue) -> HeaderMap {
    let mut headers = HeaderMap::with_capacity(inbound.len() + 1);
    for (name, value) in inbound {
        if !FRAMING_HEADERS.contains(name) {
            headers.append(name.clone(), value.clone());
        }
    }
    headers.insert(SUBSCRIPTION_KEY_HEADER, subscription_key.clone());
    headers
}

fn client_fields(
    peer: Option<SocketAddr>,
) -> (Option<field::DisplayValue<std::net::IpAddr>>, Option<u16>) {
    (peer.map(|a| field::display(a.ip())), peer.map(|a| a.port()))
}
