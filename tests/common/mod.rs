//! Helpers shared by the integration tests.

use std::io;
use std::sync::{Arc, Mutex};

use serde_json::Value;
use simlink::logging::LogRecordFormat;
use tracing::Level;
use tracing::subscriber::DefaultGuard;

#[derive(Clone, Default)]
struct Buffer(Arc<Mutex<Vec<u8>>>);

impl io::Write for Buffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> { Ok(()) }
}

/// Collects the log lines written on this thread while it is alive.
///
/// Use from a current-thread runtime so spawned tasks log here too.
pub struct LogCapture {
    buf: Buffer,
    _guard: DefaultGuard,
}

impl LogCapture {
    pub fn start() -> Self {
        let buf = Buffer::default();
        let writer = buf.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .event_format(LogRecordFormat)
            .with_max_level(Level::INFO)
            .finish();
        let guard = tracing::subscriber::set_default(subscriber);
        Self { buf, _guard: guard }
    }

    pub fn records(&self) -> Vec<Value> {
        let out = String::from_utf8(self.buf.0.lock().unwrap().clone()).unwrap();
        out.lines().map(|line| serde_json::from_str(line).unwrap()).collect()
    }

    /// The first record whose message starts with `prefix`.
    pub fn find(&self, prefix: &str) -> Value {
        self.records()
            .into_iter()
            .find(|r| r["msg"].as_str().is_some_and(|m| m.starts_with(prefix)))
            .unwrap_or_else(|| panic!("no record starting with {prefix:?} in {:?}", self.records()))
    }
}
