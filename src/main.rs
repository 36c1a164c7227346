//! `simlink` gateway binary.
//!
//! Mounts the simulated-device middleware on one `POST` route in front of a
//! backend, plus the health probes.
//!
//! Run with:
//!   simlink --config simlink.toml
//!
//! Try:
//!   curl -X POST http://localhost:8080/v1/devices/link \
//!        -H 'content-type: application/json' \
//!        -d '{"deviceLinkOperation":{"identifier":"dev-123","product":"TRACKER"}}'

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use http::Method;
use tracing::info;

use simlink::config::ServiceConfig;
use simlink::middleware::simulated::SimulatedDevice;
use simlink::upstream::Upstream;
use simlink::{Error, Router, Server, health};

#[derive(Debug, Parser)]
#[command(name = "simlink", version, about = "Provision simulated IoT devices in front of a backend")]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "simlink.toml")]
    config: PathBuf,

    /// Overrides `listen` from the configuration file.
    #[arg(short, long)]
    listen: Option<SocketAddr>,
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    let args = Args::parse();
    let mut config = ServiceConfig::from_file(&args.config)?;
    if let Some(listen) = args.listen {
        config.listen = listen;
    }

    simlink::logging::init(&config.log_level)?;

    let upstream = Upstream::new(&config.upstream)?;
    let gate = SimulatedDevice::new(upstream.into_handler(), config.middleware.clone())?
        .with_timeout(config.timeout())?;

    info!(
        route = config.route.as_str(),
        upstream = config.upstream.as_str(),
        iot_hub = config.middleware.iot_hub_url.as_str(),
        "simulated-device middleware mounted"
    );

    let app = Router::new()
        .on(Method::POST, &config.route, gate.into_handler())
        .on(Method::GET, "/healthz", health::liveness)
        .on(Method::GET, "/readyz", health::readiness);

    Server::bind(config.listen).serve(app).await
}
