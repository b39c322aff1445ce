//! Runtime event log.
//!
//! A leveled, human-readable log of what the simulated users did
//! (`timestamp - source - LEVEL - message`, one line per event). It runs on
//! its own `tracing` dispatcher so it never mixes with the console output
//! of the global subscriber, and it stays silent until [`EventLog::init`]
//! gives it a destination.

use crate::error::LoadResult;
use chrono::Local;
use parking_lot::{Mutex, MutexGuard};
use std::fmt;
use std::fmt::Write as _;
use std::fs::File;
use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;
use tracing::dispatcher::{self, Dispatch};
use tracing::{Event, Subscriber};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields, MakeWriter};
use tracing_subscriber::registry::LookupSpan;

/// Target used to tag critical events, which `tracing` has no level for
const CRITICAL_TARGET: &str = "critical";

/// Event severity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventLevel {
    Info,
    Debug,
    Error,
    Critical,
}

/// Leveled runtime event log
///
/// Clones write to the same destination.
#[derive(Debug, Clone)]
pub struct EventLog {
    source: String,
    sink: EventSink,
    dispatch: Dispatch,
}

impl EventLog {
    /// Create an event log whose lines carry `source` as the logger name
    pub fn new(source: impl Into<String>) -> Self {
        let source = source.into();
        let sink = EventSink::default();

        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_ansi(false)
            .event_format(EventLineFormat {
                source: source.clone(),
            })
            .with_writer(sink.clone())
            .finish();

        Self {
            source,
            sink,
            dispatch: Dispatch::new(subscriber),
        }
    }

    /// Point the log at `path`, truncating it
    ///
    /// Calling this again replaces the previous destination.
    pub fn init(&self, path: impl AsRef<Path>) -> LoadResult<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let file = File::create(path)?;
        *self.sink.file.lock() = Some(file);
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.sink.file.lock().is_some()
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Log `message` at `level`; a no-op until `init` has been called
    pub fn log_message(&self, message: &str, level: EventLevel) {
        dispatcher::with_default(&self.dispatch, || match level {
            EventLevel::Info => tracing::info!("{}", message),
            EventLevel::Debug => tracing::debug!("{}", message),
            EventLevel::Error => tracing::error!("{}", message),
            EventLevel::Critical => tracing::error!(target: CRITICAL_TARGET, "{}", message),
        });
    }

    pub fn info(&self, message: &str) {
        self.log_message(message, EventLevel::Info);
    }

    pub fn debug(&self, message: &str) {
        self.log_message(message, EventLevel::Debug);
    }

    pub fn error(&self, message: &str) {
        self.log_message(message, EventLevel::Error);
    }

    pub fn critical(&self, message: &str) {
        self.log_message(message, EventLevel::Critical);
    }
}

/// Swappable file destination; discards output while unset
#[derive(Debug, Clone, Default)]
struct EventSink {
    file: Arc<Mutex<Option<File>>>,
}

struct EventSinkWriter<'a> {
    file: MutexGuard<'a, Option<File>>,
}

impl<'a> MakeWriter<'a> for EventSink {
    type Writer = EventSinkWriter<'a>;

    fn make_writer(&'a self) -> Self::Writer {
        EventSinkWriter {
            file: self.file.lock(),
        }
    }
}

impl Write for EventSinkWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.file.as_mut() {
            Some(file) => file.write(buf),
            None => Ok(buf.len()),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.file.as_mut() {
            Some(file) => file.flush(),
            None => Ok(()),
        }
    }
}

/// `2024-01-31 12:00:00,123 - source - LEVEL - message`
struct EventLineFormat {
    source: String,
}

impl<S, N> FormatEvent<S, N> for EventLineFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let metadata = event.metadata();
        let level = if metadata.target() == CRITICAL_TARGET {
            "CRITICAL".to_string()
        } else {
            metadata.level().to_string()
        };

        write!(
            writer,
            "{} - {} - {} - ",
            Local::now().format("%Y-%m-%d %H:%M:%S,%3f"),
            self.source,
            level
        )?;
        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}
