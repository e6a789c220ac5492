//! # Optional Colorized Logging
//!
//! The core only ever calls into `tracing`; it never installs a subscriber
//! itself, since that is a whole-process decision an application makes
//! once at startup. [`ColorizedFormatter`] is offered as a convenience for
//! applications that want the core's `info!`/`warn!`/`debug!` output
//! colored by level without timestamps or target names cluttering a
//! terminal session — the formatting a developer actually watches while
//! driving a flight against a live simulator.

use std::fmt;

use colored::Colorize;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::fmt::format::{FormatEvent, FormatFields, Writer};
use tracing_subscriber::fmt::FmtContext;
use tracing_subscriber::registry::LookupSpan;

/// A `tracing-subscriber` event formatter that colors an entire log line by
/// its level, with no timestamp, level label, or target prefix.
pub struct ColorizedFormatter;

impl<S, N> FormatEvent<S, N> for ColorizedFormatter
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
        let mut buffer = String::new();
        let buf_writer = Writer::new(&mut buffer);
        ctx.format_fields(buf_writer, event)?;

        let colored_output = match *event.metadata().level() {
            Level::INFO => buffer.white(),
            Level::WARN => buffer.yellow(),
            Level::ERROR => buffer.red(),
            Level::DEBUG => buffer.blue(),
            Level::TRACE => buffer.purple(),
        };

        writeln!(writer, "{colored_output}")
    }
}
