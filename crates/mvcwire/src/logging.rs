use clap::ValueEnum;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::filter::Targets;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Crates whose diagnostics follow `--log-level`; everything else is held at warn.
const WIRE_TARGETS: [&str; 3] = ["mvcwire", "mvcwire_frame", "mvcwire_protocol"];

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_filter(self) -> LevelFilter {
        match self {
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace => LevelFilter::TRACE,
        }
    }
}

fn targets(level: LogLevel) -> Targets {
    let filter = Targets::new().with_default(LevelFilter::WARN.min(level.as_filter()));
    WIRE_TARGETS
        .iter()
        .fold(filter, |filter, target| filter.with_target(*target, level.as_filter()))
}

/// Rejected headers and checksum failures are reported on stderr.
pub fn init_logging(format: LogFormat, level: LogLevel) {
    let layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_target(false);
    let registry = tracing_subscriber::registry().with(targets(level));

    let _ = match format {
        LogFormat::Text => registry.with(layer).try_init(),
        LogFormat::Json => registry.with(layer.json()).try_init(),
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_crates_follow_requested_level() {
        let filter = targets(LogLevel::Trace);
        assert!(filter.would_enable("mvcwire_frame::reader", &tracing::Level::TRACE));
        assert!(!filter.would_enable("tokio_util::codec", &tracing::Level::DEBUG));
        assert!(filter.would_enable("tokio_util::codec", &tracing::Level::WARN));
    }

    #[test]
    fn quiet_levels_apply_everywhere() {
        let filter = targets(LogLevel::Error);
        assert!(!filter.would_enable("mvcwire_frame::message", &tracing::Level::WARN));
        assert!(!filter.would_enable("other", &tracing::Level::WARN));
        assert!(filter.would_enable("other", &tracing::Level::ERROR));
    }
}
