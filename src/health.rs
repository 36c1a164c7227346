//! Health-check handlers.
//!
//! | Probe | Path | Question |
//! |---|---|---|
//! | **Liveness** | `/healthz` | Is the process alive? |
//! | **Readiness** | `/readyz` | Can it take device-link traffic? |
//!
//! Readiness does not call the IoT hub. A hub outage shows up as 404s on the
//! link route, not as the gateway being pulled from rotation.

use crate::{Request, Response};

/// Always `200 OK`, body `"ok"`.
pub async fn liveness(_req: Request) -> Response {
    Response::text("ok")
}

/// Always `200 OK`, body `"ready"`.
pub async fn readiness(_req: Request) -> Response {
    Response::text("ready")
}
