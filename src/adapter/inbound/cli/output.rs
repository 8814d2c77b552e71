//! CLI output formatting.
//!
//! Human-readable lines by default; one JSON object per line with `--json`
//! so the output can be piped into other tools.

use std::fmt::Display;
use std::sync::OnceLock;

use serde::Serialize;
use serde_json::json;

/// Output settings shared by CLI handlers.
#[derive(Debug, Clone, Copy, Default)]
pub struct OutputConfig {
    /// Emit machine-readable JSON output instead of human-readable text.
    pub json: bool,
    /// Suppress non-essential output.
    pub quiet: bool,
}

impl OutputConfig {
    #[must_use]
    pub const fn new(json: bool, quiet: bool) -> Self {
        Self { json, quiet }
    }
}

static OUTPUT_CONFIG: OnceLock<OutputConfig> = OnceLock::new();

fn read_config() -> OutputConfig {
    OUTPUT_CONFIG.get().copied().unwrap_or_default()
}

fn emit_json_line(kind: &str, payload: serde_json::Value) {
    println!("{}", json!({ "type": kind, "payload": payload }));
}

/// Apply output settings from global CLI flags. Only the first call counts.
pub fn configure(config: OutputConfig) {
    let _ = OUTPUT_CONFIG.set(config);
}

#[must_use]
pub fn is_json() -> bool {
    read_config().json
}

/// Emit a serializable value in JSON mode. Returns `true` when emitted, so
/// callers can skip their text rendering.
pub fn record<T: Serialize>(kind: &str, value: &T) -> bool {
    if !is_json() {
        return false;
    }
    match serde_json::to_value(value) {
        Ok(payload) => emit_json_line(kind, payload),
        Err(e) => error(&format!("Failed to serialize {kind}: {e}")),
    }
    true
}

/// Print a section header.
pub fn section(title: &str) {
    let config = read_config();
    if config.json || config.quiet {
        return;
    }
    println!();
    println!("{title}");
}

/// Print a labeled value.
pub fn field(label: &str, value: impl Display) {
    if is_json() {
        return;
    }
    println!("  {label:<14} {value}");
}

/// Print a bare line of text.
pub fn line(text: impl Display) {
    if is_json() {
        return;
    }
    println!("  {text}");
}

pub fn warning(message: &str) {
    if is_json() {
        emit_json_line("warning", json!({ "message": message }));
        return;
    }
    println!("  ! {message}");
}

pub fn error(message: &str) {
    if is_json() {
        eprintln!("{}", json!({ "type": "error", "payload": { "message": message } }));
        return;
    }
    eprintln!("  x {message}");
}

/// Render an optional value, `-` when absent.
pub fn or_dash<T: Display>(value: Option<T>) -> String {
    value.map_or_else(|| "-".to_string(), |v| v.to_string())
}
