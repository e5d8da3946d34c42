use serde_json::{Value, json};
use std::fs::{File, OpenOptions, create_dir_all};
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Mutex, OnceLock};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

static LOGGER: OnceLock<Logger> = OnceLock::new();

/// Append-only JSONL run log. Failures to write are swallowed: the log is
/// diagnostic and must never change the wrapper's observable behavior.
pub struct Logger {
    run_id: String,
    file: Mutex<File>,
}

impl Logger {
    fn log(&self, level: &str, event: &str, fields: Value) {
        let ts = OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .unwrap_or_else(|_| "unknown".to_owned());

        let mut line = json!({
            "ts": ts,
            "level": level,
            "event": event,
            "run_id": self.run_id,
        });
        if let (Some(obj), Value::Object(extra)) = (line.as_object_mut(), fields) {
            obj.extend(extra);
        }

        let Ok(mut file) = self.file.lock() else {
            return;
        };
        let _ = writeln!(file, "{line}");
    }
}

pub fn init() -> anyhow::Result<PathBuf> {
    let path = default_log_path();
    if let Some(parent) = path.parent() {
        create_dir_all(parent)?;
    }
    let file = OpenOptions::new().create(true).append(true).open(&path)?;

    let _ = LOGGER.set(Logger {
        run_id: format!("{:016x}", rand::random::<u64>()),
        file: Mutex::new(file),
    });
    Ok(path)
}

pub fn default_log_path() -> PathBuf {
    if let Some(home) = dirs::home_dir() {
        return home.join(".soundgrade").join("soundgrade.log.jsonl");
    }
    PathBuf::from(".soundgrade").join("soundgrade.log.jsonl")
}

pub fn info(event: &str, fields: Value) {
    if let Some(logger) = LOGGER.get() {
        logger.log("info", event, fields);
    }
}

pub fn warn(event: &str, fields: Value) {
    if let Some(logger) = LOGGER.get() {
        logger.log("warn", event, fields);
    }
}

pub fn error(event: &str, fields: Value) {
    if let Some(logger) = LOGGER.get() {
        logger.log("error", event, fields);
    }
}

pub fn event_fields() -> Value {
    json!({
        "pid": std::process::id(),
        "os": std::env::consts::OS,
        "arch": std::env::consts::ARCH,
        "version": env!("CARGO_PKG_VERSION"),
    })
}
