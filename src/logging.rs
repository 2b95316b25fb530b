use colored::*;
use std::fmt;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::fmt::format::{FormatEvent, FormatFields, Writer};
use tracing_subscriber::fmt::FmtContext;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::EnvFilter;

/// A tracing event formatter that colors each log line by level.
///
/// Log lines go to stderr while the summary is printed on stdout, so every
/// line carries a short level prefix to stay readable when both streams end
/// up in the same terminal. No timestamps or targets are printed.
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
        // Buffer the fields so the whole line can be colored at once.
        let mut buffer = String::new();
        let mut buf_writer = Writer::new(&mut buffer);
        ctx.format_fields(buf_writer.by_ref(), event)?;

        let level = *event.metadata().level();
        let line = format!("{:>5} {}", level, buffer);
        let colored_output = match level {
            Level::INFO => line.white(),
            Level::WARN => line.yellow(),
            Level::ERROR => line.red(),
            Level::DEBUG => line.blue(),
            Level::TRACE => line.purple(),
        };

        writeln!(writer, "{}", colored_output)
    }
}

/// Install the global subscriber.
///
/// `RUST_LOG` takes precedence; otherwise `verbose` selects between `debug`
/// and `info`.
pub fn init(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    // a subscriber may already be installed, e.g. by a test harness
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .event_format(ColorizedFormatter)
        .try_init();
}
