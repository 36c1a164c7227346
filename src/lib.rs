//! # simlink
//!
//! Reverse-proxy middleware that provisions a simulated IoT device before
//! letting a device-link request through.
//!
//! ## The contract
//!
//! A caller posts a device-link operation:
//!
//! ```text
//! { "deviceLinkOperation": { "identifier": "dev-123", "product": "TRACKER" } }
//! ```
//!
//! [`SimulatedDevice`](middleware::simulated::SimulatedDevice) turns it into
//! a simulated-device creation call against the IoT hub:
//!
//! ```text
//! POST <IotHubUrl>/simulator/simulated/device
//! X-Subscription-Key: <SubscriptionKey>
//!
//! { "hardwareId": "dev-123", "productId": "TRACKER", "simulatorType": "MANUAL" }
//! ```
//!
//! If the hub answers 2xx, the original request, body byte-for-byte as it
//! arrived, goes on to the next handler. Anything else is a `404`.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use http::Method;
//! use simlink::middleware::simulated::SimulatedDevice;
//! use simlink::{Config, Request, Response, Router, Server};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), simlink::Error> {
//!     simlink::logging::init("info")?;
//!
//!     let gate = SimulatedDevice::new(
//!         link_device,
//!         Config::new("https://hub.example.com", "subscription-key"),
//!     )?;
//!
//!     let app = Router::new().on(Method::POST, "/v1/devices/link", gate.into_handler());
//!
//!     Server::bind("0.0.0.0:8080".parse().unwrap()).serve(app).await
//! }
//!
//! async fn link_device(mut req: Request) -> Response {
//!     // Same bytes the caller sent.
//!     let body = req.bytes().await.unwrap_or_default();
//!     Response::json(body)
//! }
//! ```

mod body;
mod error;
mod handler;
mod request;
mod response;
mod router;
mod server;

pub mod config;
pub mod device;
pub mod health;
pub mod logging;
pub mod middleware;
pub mod upstream;

pub use body::{Body, BoxError};
pub use config::Config;
pub use error::Error;
pub use handler::{Handler, Next};
pub use request::Request;
pub use response::{IntoResponse, Response, ResponseBuilder};
pub use router::Router;
pub use server::Server;
