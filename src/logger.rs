//! Logging setup for quad-solver binaries and tests
//!
//! The solvers emit their per-iteration tables through `tracing` at DEBUG
//! level; this module wires up a subscriber whose compact bracketed format
//! keeps those tables readable and traceable to the emitting solver.

use tracing::Level;
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::EnvFilter;

/// Initialize the tracing subscriber at the default INFO level
///
/// # Example
/// ```no_run
/// use quad_solver::init_logger;
///
/// init_logger();
/// tracing::info!("Application started");
/// ```
///
/// # Environment Variables
/// Override the default level using `RUST_LOG`:
/// ```bash
/// RUST_LOG=debug cargo test
/// RUST_LOG=quad_solver=trace cargo run
/// ```
pub fn init_logger() {
    init_logger_with_level(Level::INFO)
}

/// Initialize the tracing subscriber with a custom default level
///
/// Pass `Level::DEBUG` to see the per-iteration solver tables.
///
/// # Example
/// ```no_run
/// use quad_solver::init_logger_with_level;
/// use tracing::Level;
///
/// init_logger_with_level(Level::DEBUG);
/// tracing::debug!("Debug logging enabled");
/// ```
pub fn init_logger_with_level(default_level: Level) {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(default_level.into())
                .from_env_lossy(),
        )
        .event_format(SolverFormatter)
        .init();
}

/// Bracketed `[LEVEL timestamp location]` event formatter
///
/// DEBUG and TRACE events carry the emitting file and line so iteration
/// tables can be traced back to their solver; INFO and above show only the
/// module path.
struct SolverFormatter;

fn level_tag(level: Level) -> &'static str {
    match level {
        Level::ERROR => "\x1b[31mERROR\x1b[0m",
        Level::WARN => "\x1b[33mWARN\x1b[0m",
        Level::INFO => "\x1b[32mINFO\x1b[0m",
        Level::DEBUG => "\x1b[34mDEBUG\x1b[0m",
        Level::TRACE => "\x1b[35mTRACE\x1b[0m",
    }
}

impl<S, N> FormatEvent<S, N> for SolverFormatter
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &tracing::Event<'_>,
    ) -> std::fmt::Result {
        let metadata = event.metadata();
        let level = *metadata.level();

        write!(
            writer,
            "[{} {} ",
            level_tag(level),
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
        )?;

        let location = if level == Level::DEBUG || level == Level::TRACE {
            metadata.file().zip(metadata.line())
        } else {
            None
        };
        match location {
            Some((file, line)) => {
                let filename = file.rsplit('/').next().unwrap_or(file);
                write!(writer, "{}:{}", filename, line)?;
            }
            None => write!(writer, "{}", metadata.target())?,
        }

        write!(writer, "] ")?;
        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}
