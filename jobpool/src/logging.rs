// Logging for jobpool
//
// Thin setup layer over the `tracing` ecosystem. The pool itself only emits
// events through `tracing` macros; nothing is printed unless the application
// installs a subscriber, either its own or one of the presets below.
//
// # Usage Examples
//
// ```rust
// use jobpool::logging;
//
// // INFO level, human-readable console output
// logging::init_default();
//
// // Or pick the settings explicitly
// let config = logging::LogConfig {
//     level: tracing::Level::DEBUG,
//     json_format: false,
//     ..Default::default()
// };
// logging::init(config);
// ```
//
// Worker threads pick up the dispatcher that was current when `Pool::start`
// ran, so a scoped subscriber installed by a test also sees worker events.

use std::io;
use std::sync::Once;
use tracing::{Level, Subscriber};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[doc(hidden)]
pub use tracing;

/// Configuration for the jobpool logging presets.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Minimum log level to display
    pub level: Level,
    /// Whether to use JSON format for logs
    pub json_format: bool,
    /// Whether to include file and line information
    pub show_file_line: bool,
    /// Whether to include thread name/id
    pub show_thread_info: bool,
    /// Whether to include timestamps
    pub show_time: bool,
    /// Target filter expressions (format: "target=level,target2=level2,...")
    pub target_filters: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            json_format: false,
            show_file_line: true,
            show_thread_info: true,
            show_time: true,
            target_filters: None,
        }
    }
}

static INIT: Once = Once::new();

fn env_filter(config: &LogConfig) -> EnvFilter {
    let mut env_filter = EnvFilter::from_default_env().add_directive(config.level.into());

    if let Some(filters) = &config.target_filters {
        for filter in filters.split(',') {
            if let Ok(directive) = filter.parse() {
                env_filter = env_filter.add_directive(directive);
            }
        }
    }
    env_filter
}

/// Initialize the global subscriber.
///
/// Only the first call of any `init*` function takes effect.
pub fn init(config: LogConfig) {
    INIT.call_once(|| {
        let registry = tracing_subscriber::registry().with(env_filter(&config));

        let subscriber: Box<dyn Subscriber + Send + Sync> = if config.json_format {
            Box::new(registry.with(fmt::layer().json().flatten_event(true)))
        } else {
            let fmt_layer = fmt::layer()
                .with_ansi(atty::is(atty::Stream::Stdout))
                .with_file(config.show_file_line)
                .with_line_number(config.show_file_line)
                .with_thread_names(config.show_thread_info)
                .with_thread_ids(config.show_thread_info);
            if config.show_time {
                Box::new(registry.with(fmt_layer))
            } else {
                Box::new(registry.with(fmt_layer.without_time()))
            }
        };

        set_global_subscriber(subscriber);
    });
}

fn set_global_subscriber<S>(subscriber: S)
where
    S: Subscriber + Send + Sync + 'static,
{
    if let Err(err) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Error setting global tracing subscriber: {}", err);
    }
}

/// Open `path` for appending, creating it if needed.
pub fn file_writer(path: &str) -> io::Result<Box<dyn io::Write + Send + Sync + 'static>> {
    use std::fs::OpenOptions;

    let file = OpenOptions::new().create(true).append(true).open(path)?;
    Ok(Box::new(file))
}

/// Initialize logging to the console and to `log_file`.
///
/// The file is checked up front so a bad path is reported to the caller
/// instead of silently falling back to stderr.
pub fn init_with_file(config: LogConfig, log_file: &str) -> Result<(), io::Error> {
    file_writer(log_file)?;

    INIT.call_once(|| {
        let console_layer = fmt::layer()
            .with_ansi(atty::is(atty::Stream::Stdout))
            .with_file(config.show_file_line)
            .with_line_number(config.show_file_line)
            .with_thread_names(config.show_thread_info)
            .with_thread_ids(config.show_thread_info);

        let log_file_path = log_file.to_string();
        let file_layer = fmt::layer()
            .with_ansi(false)
            .with_writer(move || match file_writer(&log_file_path) {
                Ok(writer) => writer,
                Err(_) => Box::new(std::io::stderr()),
            })
            .with_file(true)
            .with_line_number(true)
            .with_thread_names(true)
            .with_thread_ids(true);

        let subscriber = tracing_subscriber::registry()
            .with(env_filter(&config))
            .with(console_layer)
            .with(file_layer);

        set_global_subscriber(subscriber);
    });

    Ok(())
}

/// INFO level, human-readable console output.
pub fn init_default() {
    init(LogConfig::default());
}

/// DEBUG everywhere, TRACE for the scheduler, with file/line info.
pub fn init_development() {
    init(LogConfig {
        level: Level::DEBUG,
        target_filters: Some("jobpool=debug,jobpool::scheduler=trace".to_string()),
        ..Default::default()
    });
}

/// JSON output without file/line information, for log aggregators.
pub fn init_production() {
    init(LogConfig {
        level: Level::INFO,
        json_format: true,
        show_file_line: false,
        show_thread_info: true,
        show_time: true,
        target_filters: None,
    });
}

/// Warnings and errors only, compact output for test runs.
pub fn init_test() {
    init(LogConfig {
        level: Level::WARN,
        json_format: false,
        show_file_line: true,
        show_thread_info: false,
        show_time: false,
        target_filters: None,
    });
}

/// Span covering the lifetime of one worker thread.
///
/// ```rust
/// let span = jobpool::worker_span!(3);
/// let _guard = span.enter();
/// ```
#[macro_export]
macro_rules! worker_span {
    ($worker_id:expr) => {
        $crate::logging::tracing::info_span!("worker", id = $worker_id)
    };
    ($worker_id:expr, $($fields:tt)*) => {
        $crate::logging::tracing::info_span!("worker", id = $worker_id, $($fields)*)
    };
}

/// Span covering the execution of one job.
#[macro_export]
macro_rules! job_span {
    ($job_id:expr) => {
        $crate::logging::tracing::debug_span!("job", id = %$job_id)
    };
    ($job_id:expr, $($fields:tt)*) => {
        $crate::logging::tracing::debug_span!("job", id = %$job_id, $($fields)*)
    };
}

/// Log pool lifecycle events.
///
/// ```rust
/// jobpool::log_pool!("start", "completed", workers = 4);
/// ```
#[macro_export]
macro_rules! log_pool {
    ($operation:expr, $status:expr) => {
        $crate::logging::tracing::info!(operation = $operation, status = $status);
    };
    ($operation:expr, $status:expr, $($fields:tt)*) => {
        $crate::logging::tracing::info!(operation = $operation, status = $status, $($fields)*);
    };
}

/// The dispatcher current on the calling thread.
///
/// Worker threads install it so they log wherever their creator logs.
#[inline]
pub fn current_subscriber() -> tracing::Dispatch {
    tracing::dispatcher::get_default(|d| d.clone())
}

pub use tracing::{debug, error, info, trace, warn};
