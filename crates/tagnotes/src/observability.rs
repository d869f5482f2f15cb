//! Structured JSON-lines logging.
//!
//! stdout carries rendered changelogs, so log records never go there: they
//! are written to a daily-rolling file, or to stderr when no log location is
//! writable.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Result;
use serde_json::{Map, Value};
use tracing::Event;
use tracing::field::{Field, Visit};
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::layer::{Context as LayerContext, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;

const ENV_LOG_PATH: &str = "TAGNOTES_LOG_PATH";
const ENV_LOG_DIR: &str = "TAGNOTES_LOG_DIR";
const LOG_FILE_SUFFIX: &str = ".jsonl";

/// Logging settings gathered from configuration.
#[derive(Clone, Debug)]
pub struct ObservabilityConfig {
    /// Service name, used for the log file name and the `service` field.
    pub service: String,
    /// `log_dir` from configuration.
    pub log_dir: Option<PathBuf>,
}

impl ObservabilityConfig {
    /// Settings for this binary, logging to `log_dir` when set.
    pub fn new(log_dir: Option<PathBuf>) -> Self {
        Self {
            service: env!("CARGO_PKG_NAME").to_string(),
            log_dir,
        }
    }
}

/// Overrides read from the environment.
#[derive(Clone, Debug, Default)]
struct LogEnv {
    path: Option<PathBuf>,
    dir: Option<PathBuf>,
}

impl LogEnv {
    fn from_env() -> Self {
        Self {
            path: std::env::var_os(ENV_LOG_PATH).map(PathBuf::from),
            dir: std::env::var_os(ENV_LOG_DIR).map(PathBuf::from),
        }
    }
}

/// A writable log file location.
#[derive(Clone, Debug, PartialEq, Eq)]
struct LogFile {
    dir: PathBuf,
    file_name: String,
}

/// Keeps the non-blocking writer flushing until dropped.
pub struct ObservabilityGuard {
    _log_guard: tracing_appender::non_blocking::WorkerGuard,
}

/// Install the global subscriber.
///
/// Hold the returned guard until the process exits.
pub fn init_observability(
    cfg: &ObservabilityConfig,
    env_filter: EnvFilter,
) -> Result<ObservabilityGuard> {
    let target = resolve_log_file(&cfg.service, &LogEnv::from_env(), cfg.log_dir.as_deref());
    let (writer, guard) = match target {
        Ok(file) => {
            let appender = tracing_appender::rolling::daily(&file.dir, &file.file_name);
            tracing_appender::non_blocking(appender)
        }
        Err(reason) => {
            eprintln!("warning: {reason}; logging to stderr");
            tracing_appender::non_blocking(std::io::stderr())
        }
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(JsonLogLayer {
            writer,
            service: cfg.service.clone(),
        })
        .init();

    tracing::debug!("observability initialized");
    Ok(ObservabilityGuard { _log_guard: guard })
}

/// Build an `EnvFilter` based on CLI flags and environment.
///
/// Priority: quiet flag > verbose flag > RUST_LOG env > default_level
pub fn env_filter(quiet: bool, verbose: u8, default_level: &str) -> EnvFilter {
    if quiet {
        return EnvFilter::new("error");
    }

    match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        1 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    }
}

// ============================================================================
// Log file resolution
// ============================================================================

/// Pick the log file: `TAGNOTES_LOG_PATH`, `TAGNOTES_LOG_DIR`, configured
/// `log_dir`, then the platform data directory and the temp directory.
fn resolve_log_file(
    service: &str,
    env: &LogEnv,
    config_dir: Option<&Path>,
) -> Result<LogFile, String> {
    if let Some(ref path) = env.path {
        return log_file_at(path);
    }

    let default_name = format!("{service}{LOG_FILE_SUFFIX}");
    if let Some(dir) = env.dir.as_deref().or(config_dir) {
        return writable(dir, &default_name);
    }

    let mut candidates = Vec::new();
    if let Some(dirs) = directories::ProjectDirs::from("", "", service) {
        candidates.push(dirs.data_local_dir().join("logs"));
    }
    candidates.push(std::env::temp_dir().join(service));

    candidates
        .iter()
        .find_map(|dir| writable(dir, &default_name).ok())
        .ok_or_else(|| "no writable log directory found".to_string())
}

fn log_file_at(path: &Path) -> Result<LogFile, String> {
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| format!("{ENV_LOG_PATH} must end in a UTF-8 file name"))?;
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    writable(dir, file_name)
}

fn writable(dir: &Path, file_name: &str) -> Result<LogFile, String> {
    std::fs::create_dir_all(dir)
        .map_err(|e| format!("cannot create log directory {}: {e}", dir.display()))?;

    let path = dir.join(file_name);
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(|e| format!("cannot open log file {}: {e}", path.display()))?;

    Ok(LogFile {
        dir: dir.to_path_buf(),
        file_name: file_name.to_string(),
    })
}

// ============================================================================
// JSON layer
// ============================================================================

/// One JSON object per event, with the fields of every enclosing span.
struct JsonLogLayer<W> {
    writer: W,
    service: String,
}

#[derive(Clone, Debug, Default)]
struct SpanFields(Map<String, Value>);

impl<S, W> tracing_subscriber::Layer<S> for JsonLogLayer<W>
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
    W: for<'writer> tracing_subscriber::fmt::MakeWriter<'writer> + Send + Sync + 'static,
{
    fn on_new_span(
        &self,
        attrs: &tracing::span::Attributes<'_>,
        id: &tracing::span::Id,
        ctx: LayerContext<'_, S>,
    ) {
        let Some(span) = ctx.span(id) else { return };
        let mut fields = SpanFields::default();
        attrs.record(&mut fields);
        span.extensions_mut().insert(fields);
    }

    fn on_record(
        &self,
        id: &tracing::span::Id,
        values: &tracing::span::Record<'_>,
        ctx: LayerContext<'_, S>,
    ) {
        let Some(span) = ctx.span(id) else { return };
        let mut extensions = span.extensions_mut();
        match extensions.get_mut::<SpanFields>() {
            Some(fields) => values.record(fields),
            None => {
                let mut fields = SpanFields::default();
                values.record(&mut fields);
                extensions.insert(fields);
            }
        }
    }

    fn on_event(&self, event: &Event<'_>, ctx: LayerContext<'_, S>) {
        let meta = event.metadata();
        let mut record = SpanFields::default();
        record.insert("ts_ms", Value::from(unix_millis()));
        record.insert("level", Value::from(meta.level().as_str().to_lowercase()));
        record.insert("service", Value::from(self.service.as_str()));
        record.insert("target", Value::from(meta.target()));

        if let Some(scope) = ctx.event_scope(event) {
            let mut names = Vec::new();
            for span in scope.from_root() {
                names.push(span.name());
                if let Some(fields) = span.extensions().get::<SpanFields>() {
                    record.0.extend(fields.0.clone());
                }
            }
            record.insert("spans", Value::from(names.join(":")));
        }

        event.record(&mut record);

        let mut writer = self.writer.make_writer();
        if serde_json::to_writer(&mut writer, &Value::Object(record.0)).is_ok() {
            let _ = writer.write_all(b"\n");
        }
    }
}

impl SpanFields {
    fn insert(&mut self, key: &str, value: Value) {
        self.0.insert(key.to_string(), value);
    }
}

impl Visit for SpanFields {
    fn record_bool(&mut self, field: &Field, value: bool) {
        self.insert(field.name(), Value::from(value));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.insert(field.name(), Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.insert(field.name(), Value::from(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        if let Some(number) = serde_json::Number::from_f64(value) {
            self.insert(field.name(), Value::Number(number));
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.insert(field.name(), Value::from(value));
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        self.insert(field.name(), Value::from(value.to_string()));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        self.insert(field.name(), Value::from(format!("{value:?}")));
    }
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or_default()
}
