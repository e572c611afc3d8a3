//! Process-wide `tracing` setup for binaries embedding the client.
//!
//! Library code only emits events; nothing is installed until a binary calls
//! [`init_observability`].

use std::path::{Path, PathBuf};

use once_cell::sync::OnceCell;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

static INIT: OnceCell<()> = OnceCell::new();

const ENABLED_KEYS: [&str; 2] = [
    "ANSWER_STREAM_OBSERVABILITY_ENABLED",
    "ANSWER_STREAM_OBSERVABILITY",
];
const LEVEL_KEY: &str = "ANSWER_STREAM_LOG_LEVEL";
const JSON_PATH_KEY: &str = "ANSWER_STREAM_JSON_LOG_PATH";
const DEFAULT_JSON_FILE: &str = "answer-stream.logs.jsonl";

/// Logging options resolved from the environment.
#[derive(Clone, Debug, PartialEq, Eq)]
struct LogSettings {
    enabled: bool,
    level: Option<String>,
    json_path: Option<PathBuf>,
}

impl LogSettings {
    fn from_env() -> Self {
        Self::resolve(|key| std::env::var(key).ok())
    }

    // The first enable key that is present decides; an unreadable value keeps
    // logging on.
    fn resolve(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let enabled = ENABLED_KEYS
            .iter()
            .find_map(|key| lookup(key))
            .map(|value| parse_bool_env(&value).unwrap_or(true))
            .unwrap_or(true);
        Self {
            enabled,
            level: lookup(LEVEL_KEY).filter(|level| !level.trim().is_empty()),
            json_path: lookup(JSON_PATH_KEY)
                .filter(|path| !path.trim().is_empty())
                .map(PathBuf::from),
        }
    }

    fn filter(&self) -> EnvFilter {
        self.level
            .as_deref()
            .and_then(|level| EnvFilter::try_new(level).ok())
            .or_else(|| EnvFilter::try_from_default_env().ok())
            .unwrap_or_else(|| EnvFilter::new("info"))
    }
}

fn parse_bool_env(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" | "enabled" => Some(true),
        "0" | "false" | "no" | "off" | "disabled" => Some(false),
        _ => None,
    }
}

/// Splits a log file path into the directory `tracing-appender` writes in and
/// the file name.
fn split_log_path(path: &Path) -> (&Path, &str) {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(DEFAULT_JSON_FILE);
    (dir, file_name)
}

/// Installs the global tracing subscriber once per process.
///
/// Environment variables:
/// - `ANSWER_STREAM_OBSERVABILITY_ENABLED` / `ANSWER_STREAM_OBSERVABILITY`:
///   enable/disable flag (default enabled).
/// - `ANSWER_STREAM_LOG_LEVEL`: level/filter override (`info`, `answer_stream=debug`, ...).
/// - `ANSWER_STREAM_JSON_LOG_PATH`: when set, logs are written as JSON lines to
///   that file; otherwise they go to stderr so they never interleave with a
///   streamed answer on stdout.
/// - `RUST_LOG`: fallback filter.
pub fn init_observability() {
    INIT.get_or_init(|| {
        let settings = LogSettings::from_env();
        if !settings.enabled {
            return;
        }

        let filter = settings.filter();
        match &settings.json_path {
            Some(path) => {
                let (dir, file_name) = split_log_path(path);
                let _ = std::fs::create_dir_all(dir);
                let json_layer = tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(true)
                    .with_target(false)
                    .with_writer(tracing_appender::rolling::never(dir, file_name));
                let _ = tracing_subscriber::registry()
                    .with(filter)
                    .with(json_layer)
                    .try_init();
            }
            None => {
                let console_layer = tracing_subscriber::fmt::layer()
                    .compact()
                    .with_target(false)
                    .with_writer(std::io::stderr);
                let _ = tracing_subscriber::registry()
                    .with(filter)
                    .with(console_layer)
                    .try_init();
            }
        }
    });
}
