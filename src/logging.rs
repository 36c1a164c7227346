//! Structured JSON logging.
//!
//! Every `tracing` event becomes one JSON object on its own line:
//!
//! ```text
//! {"level":"warn","msg":"found deviceId=dev-123","time":"2024-05-01T12:00:00.000000Z","network":{"client":{"ip":"10.0.0.7","port":51234}},"url":"/v1/devices/link"}
//! ```
//!
//! Field mapping:
//!
//! | event field | record key |
//! |---|---|
//! | `message` | `msg` |
//! | `url` | `url` |
//! | `client_ip`, `client_port` | `network.client.ip`, `network.client.port` |
//! | anything else | appended to `msg` as ` key=value` |
//!
//! `network` and `url` are omitted when the event does not carry them.

use std::fmt::{self, Write as _};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::registry::LookupSpan;

use crate::error::Error;

/// One log line.
#[derive(Debug, Serialize)]
pub struct LogRecord {
    pub level: &'static str,
    pub msg: String,
    pub time: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network: Option<Network>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct Network {
    pub client: Client,
}

#[derive(Debug, Serialize)]
pub struct Client {
    pub ip: String,
    pub port: u16,
}

/// Installs the global subscriber writing [`LogRecord`]s to stdout.
///
/// `RUST_LOG` wins over `default_level` when it is set.
pub fn init(default_level: &str) -> Result<(), Error> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .map_err(|e| Error::Logging(e.to_string()))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stdout)
        .event_format(LogRecordFormat)
        .try_init()
        .map_err(|e| Error::Logging(e.to_string()))
}

/// [`FormatEvent`] that renders events as [`LogRecord`] JSON.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogRecordFormat;

impl<S, N> FormatEvent<S, N> for LogRecordFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let mut fields = RecordFields::default();
        event.record(&mut fields);

        let record = fields.into_record(*event.metadata().level(), Utc::now());
        let line = serde_json::to_string(&record).map_err(|_| fmt::Error)?;
        writeln!(writer, "{line}")
    }
}

fn level_name(level: Level) -> &'static str {
    match level {
        Level::TRACE => "trace",
        Level::DEBUG => "debug",
        Level::INFO => "info",
        Level::WARN => "warn",
        _ => "error",
    }
}

#[derive(Default)]
struct RecordFields {
    msg: String,
    extra: String,
    url: Option<String>,
    client_ip: Option<String>,
    client_port: Option<u16>,
}

impl RecordFields {
    fn into_record(self, level: Level, time: DateTime<Utc>) -> LogRecord {
        let network = match (self.client_ip, self.client_port) {
            (Some(ip), port) => Some(Network { client: Client { ip, port: port.unwrap_or(0) } }),
            (None, _) => None,
        };
        LogRecord {
            level: level_name(level),
            msg: self.msg + &self.extra,
            time,
            network,
            url: self.url,
        }
    }

    fn record_text(&mut self, field: &Field, value: String) {
        match field.name() {
            "message" => self.msg = value,
            "url" => self.url = Some(value),
            "client_ip" => self.client_ip = Some(value),
            name => {
                let _ = write!(self.extra, " {name}={value}");
            }
        }
    }
}

impl Visit for RecordFields {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.record_text(field, value.to_owned());
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        if field.name() == "client_port" {
            if let Ok(port) = u16::try_from(value) {
                self.client_port = Some(port);
                return;
            }
        }
        self.record_text(field, value.to_string());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.record_text(field, format!("{value:?}"));
    }
}
