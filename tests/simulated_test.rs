//! Integration tests for the simulated-device middleware.
//!
//! The IoT hub is a wiremock server; the next handler echoes the body it
//! receives and counts how often it ran.

use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::Bytes;
use http::StatusCode;
use hyper::body::Frame;
use serde_json::json;
use simlink::middleware::simulated::{PROVISION_PATH, SimulatedDevice};
use simlink::{Body, Config, Handler, Request, Response};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

mod common;

use common::LogCapture;

const KEY: &str = "configured-key";
const LINK: &str = r#"{"deviceLinkOperation":{"identifier":"dev-123","product":"TRACKER"}}"#;

fn echo(hits: Arc<AtomicUsize>) -> impl Handler {
    move |mut req: Request| {
        let hits = Arc::clone(&hits);
        async move {
            hits.fetch_add(1, Ordering::SeqCst);
            match req.bytes().await {
                Ok(body) => Response::builder().bytes(body),
                Err(_) => Response::status(StatusCode::INTERNAL_SERVER_ERROR),
            }
        }
    }
}

fn gate(hub_url: &str) -> (SimulatedDevice, Arc<AtomicUsize>) {
    let hits = Arc::new(AtomicUsize::new(0));
    let gate = SimulatedDevice::new(echo(Arc::clone(&hits)), Config::new(hub_url, KEY))
        .expect("middleware should build");
    (gate, hits)
}

fn link_request(body: impl Into<Body>) -> Request {
    Request::from(
        http::Request::builder()
            .method("POST")
            .uri("/v1/devices/link")
            .header("content-type", "application/json")
            .body(body.into())
            .unwrap(),
    )
}

async fn hub_answering(status: u16) -> MockServer {
    let hub = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(PROVISION_PATH))
        .respond_with(ResponseTemplate::new(status).set_body_string(r#"{"id":"sim-1"}"#))
        .mount(&hub)
        .await;
    hub
}

fn assert_not_found(res: &Response) {
    assert_eq!(res.status_code(), StatusCode::NOT_FOUND);
    assert_eq!(res.body().as_ref(), b"404 page not found\n");
}

#[tokio::test]
async fn forwards_the_original_bytes_after_provisioning() {
    let hub = hub_answering(201).await;
    let (gate, hits) = gate(&hub.uri());

    // Whitespace and an extra field make any re-encoding visible.
    let original = "{ \"deviceLinkOperation\" : {\"identifier\":\"dev-123\", \"product\":\"TRACKER\"},\n  \"note\": \"from app\" }";
    let res = gate.handle(link_request(original)).await;

    assert_eq!(res.status_code(), StatusCode::OK);
    assert_eq!(res.body().as_ref(), original.as_bytes());
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn sends_the_hub_shaped_body_with_the_subscription_key() {
    let hub = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(PROVISION_PATH))
        .and(header("x-subscription-key", KEY))
        .and(body_json(json!({
            "hardwareId": "dev-123",
            "productId": "TRACKER",
            "simulatorType": "MANUAL"
        })))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&hub)
        .await;
    let (gate, hits) = gate(&hub.uri());

    let res = gate.handle(link_request(LINK)).await;

    assert_eq!(res.status_code(), StatusCode::OK);
    assert_eq!(hits.load(Ordering::SeqCst), 1);
    hub.verify().await;
}

#[tokio::test]
async fn configured_key_wins_and_other_headers_are_copied() {
    let hub = hub_answering(200).await;
    let (gate, _) = gate(&hub.uri());

    let req = Request::from(
        http::Request::builder()
            .method("POST")
            .uri("/v1/devices/link")
            .header("X-Subscription-Key", "caller-key")
            .header("x-trace", "a")
            .header("x-trace", "b")
            .header("authorization", "Bearer token")
            .body(Body::from(LINK))
            .unwrap(),
    );
    let res = gate.handle(req).await;
    assert_eq!(res.status_code(), StatusCode::OK);

    let received = hub.received_requests().await.expect("recording is on");
    assert_eq!(received.len(), 1);
    let headers = &received[0].headers;

    let keys: Vec<_> = headers
        .get_all("x-subscription-key")
        .iter()
        .map(|v| v.to_str().unwrap())
        .collect();
    assert_eq!(keys, [KEY]);

    let traces: Vec<_> = headers.get_all("x-trace").iter().map(|v| v.to_str().unwrap()).collect();
    assert_eq!(traces, ["a", "b"]);
    assert_eq!(headers.get("authorization").unwrap(), "Bearer token");
}

#[tokio::test]
async fn only_2xx_from_the_hub_lets_the_request_through() {
    for status in [200, 201, 299] {
        let hub = hub_answering(status).await;
        let (gate, hits) = gate(&hub.uri());

        let res = gate.handle(link_request(LINK)).await;

        assert_eq!(res.status_code(), StatusCode::OK, "hub answered {status}");
        assert_eq!(hits.load(Ordering::SeqCst), 1, "hub answered {status}");
    }

    for status in [300, 302, 400, 404, 500, 503] {
        let hub = hub_answering(status).await;
        let (gate, hits) = gate(&hub.uri());

        let res = gate.handle(link_request(LINK)).await;

        assert_not_found(&res);
        assert_eq!(hits.load(Ordering::SeqCst), 0, "hub answered {status}");
    }
}

#[tokio::test]
async fn undecodable_payloads_never_reach_the_hub() {
    let hub = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&hub)
        .await;
    let (gate, hits) = gate(&hub.uri());

    for body in [
        "",
        "not json",
        r#""not json""#,
        "{}",
        r#"{"deviceLinkOperation":{}}"#,
        r#"{"deviceLinkOperation":{"identifier":"dev-123","product":"PHONE"}}"#,
        // Field names are matched exactly and nothing may follow the envelope.
        r#"{"DeviceLinkOperation":{"Identifier":"dev-123","Product":"TRACKER"}}"#,
        r#"{"deviceLinkOperation":{"identifier":"dev-123","product":"TRACKER"}} {"x":1}"#,
    ] {
        let res = gate.handle(link_request(body)).await;
        assert_not_found(&res);
    }

    assert_eq!(hits.load(Ordering::SeqCst), 0);
    hub.verify().await;
}

struct BrokenBody;

impl hyper::body::Body for BrokenBody {
    type Data = Bytes;
    type Error = io::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Bytes>, io::Error>>> {
        Poll::Ready(Some(Err(io::Error::new(io::ErrorKind::ConnectionReset, "peer went away"))))
    }
}

#[tokio::test]
async fn unreadable_body_is_not_found() {
    let hub = hub_answering(201).await;
    let (gate, hits) = gate(&hub.uri());

    let res = gate.handle(link_request(Body::new(BrokenBody))).await;

    assert_not_found(&res);
    assert_eq!(hits.load(Ordering::SeqCst), 0);
}

/// Reads one request off `stream`: the head, then `content-length` bytes.
async fn read_request(stream: &mut TcpStream) {
    let mut buf = Vec::new();
    let mut chunk = [0_u8; 1024];
    loop {
        let n = stream.read(&mut chunk).await.unwrap();
        if n == 0 {
            return;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            let head = String::from_utf8_lossy(&buf[..end]).to_ascii_lowercase();
            let len = head
                .lines()
                .find_map(|line| line.strip_prefix("content-length:"))
                .and_then(|v| v.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if buf.len() >= end + 4 + len {
                return;
            }
        }
    }
}

/// A hub that promises 100 bytes of body, sends five, and hangs up.
async fn truncating_hub() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        read_request(&mut stream).await;
        stream
            .write_all(b"HTTP/1.1 201 Created\r\nContent-Length: 100\r\n\r\nshort")
            .await
            .unwrap();
        stream.shutdown().await.unwrap();
    });
    format!("http://{addr}")
}

#[tokio::test]
async fn truncated_hub_response_is_not_found() {
    let logs = LogCapture::start();
    let (gate, hits) = gate(&truncating_hub().await);

    let res = gate.handle(link_request(LINK)).await;

    assert_not_found(&res);
    assert_eq!(hits.load(Ordering::SeqCst), 0);

    let failure = logs.find("error reading iot hub response: ");
    assert_eq!(failure["level"], "error");
    assert_eq!(failure["url"], "/v1/devices/link");
}

#[tokio::test]
async fn unusable_hub_url_is_not_found() {
    let (gate, hits) = gate("not a url");

    let res = gate.handle(link_request(LINK)).await;

    assert_not_found(&res);
    assert_eq!(hits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn refused_connection_is_not_found() {
    // Nothing listens on the discard port in the test environment.
    let (gate, hits) = gate("http://127.0.0.1:9");

    let res = gate.handle(link_request(LINK)).await;

    assert_not_found(&res);
    assert_eq!(hits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn slow_hub_times_out_as_not_found() {
    let hub = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(201).set_delay(Duration::from_secs(5)))
        .mount(&hub)
        .await;
    let (gate, hits) = gate(&hub.uri());
    let gate = gate.with_timeout(Duration::from_millis(200)).unwrap();

    let res = tokio::time::timeout(Duration::from_secs(3), gate.handle(link_request(LINK)))
        .await
        .expect("hub call should be cut off by the client timeout");

    assert_not_found(&res);
    assert_eq!(hits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn a_failed_request_does_not_affect_the_next_one() {
    let hub = hub_answering(201).await;
    let (gate, hits) = gate(&hub.uri());

    assert_not_found(&gate.handle(link_request("not json")).await);
    let res = gate.handle(link_request(LINK)).await;

    assert_eq!(res.status_code(), StatusCode::OK);
    assert_eq!(res.body().as_ref(), LINK.as_bytes());
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_requests_keep_their_own_bodies() {
    let hub = hub_answering(201).await;
    let (gate, hits) = gate(&hub.uri());
    let gate = Arc::new(gate);

    let mut tasks = tokio::task::JoinSet::new();
    for i in 0..32 {
        let gate = Arc::clone(&gate);
        tasks.spawn(async move {
            let body = format!(
                r#"{{"deviceLinkOperation":{{"identifier":"dev-{i}","product":"TRACKER"}},"seq":{i}}}"#
            );
            let res = gate.handle(link_request(body.clone())).await;
            (body, res)
        });
    }

    while let Some(joined) = tasks.join_next().await {
        let (sent, res) = joined.unwrap();
        assert_eq!(res.status_code(), StatusCode::OK);
        assert_eq!(res.body().as_ref(), sent.as_bytes());
    }
    assert_eq!(hits.load(Ordering::SeqCst), 32);
}

#[tokio::test]
async fn logs_the_device_and_the_hub_reply() {
    let hub = hub_answering(201).await;
    let (gate, _) = gate(&hub.uri());
    let logs = LogCapture::start();

    let res = gate.handle(link_request(LINK)).await;
    assert_eq!(res.status_code(), StatusCode::OK);

    let found = logs.find("found deviceId=");
    assert_eq!(found["level"], "warn");
    assert_eq!(found["msg"], "found deviceId=dev-123");
    assert_eq!(found["url"], "/v1/devices/link");
    // Built in-process, so there is no peer to report.
    assert!(found.get("network").is_none());

    let created = logs.find("iot hub device created: ");
    assert_eq!(created["level"], "info");
    assert_eq!(created["msg"], r#"iot hub device created: {"id":"sim-1"}"#);
    assert_eq!(created["url"], "/v1/devices/link");

    assert!(logs.records().iter().all(|r| r["level"] != "error"));
}

#[tokio::test]
async fn failures_are_logged_at_error_with_the_url() {
    let hub = hub_answering(500).await;
    let (gate, _) = gate(&hub.uri());
    let logs = LogCapture::start();

    assert_not_found(&gate.handle(link_request(LINK)).await);
    assert_not_found(&gate.handle(link_request(Body::new(BrokenBody))).await);

    let status = logs.find("iot hub status code error: ");
    assert_eq!(status["level"], "error");
    assert_eq!(status["msg"], "iot hub status code error: 500 Internal Server Error");
    assert_eq!(status["url"], "/v1/devices/link");

    let unreadable = logs.find("error reading body: ");
    assert_eq!(unreadable["level"], "error");
    assert_eq!(unreadable["msg"], "error reading body: peer went away");
    assert_eq!(unreadable["url"], "/v1/devices/link");
}
