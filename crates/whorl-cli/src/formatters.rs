//! Output formatters for CLI commands.
//!
//! Every command result is a `Serialize` value rendered in one of three
//! modes: JSON, plain text or colored text.

use anyhow::Result;
use colored::Colorize;
use serde::Serialize;
use serde_json::Value;
use std::fmt::Write as _;
use whorl_core::cli::OutputFormat;

/// Format data according to the specified output format.
///
/// # Errors
///
/// Returns an error if `data` cannot be serialized.
///
/// # Examples
///
/// ```
/// use serde::Serialize;
/// use whorl_cli::formatters::format_output;
/// use whorl_core::cli::OutputFormat;
///
/// #[derive(Serialize)]
/// struct Held {
///     name: String,
///     weight: f64,
/// }
///
/// let held = Held { name: "lamp".to_string(), weight: 1.5 };
/// let output = format_output(&held, OutputFormat::Text)?;
/// assert_eq!(output, "name: lamp\nweight: 1.5");
/// # Ok::<(), anyhow::Error>(())
/// ```
pub fn format_output<T: Serialize>(data: &T, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => json::format(data),
        OutputFormat::Text => text::format(data),
        OutputFormat::Pretty => pretty::format(data),
    }
}

/// JSON output formatting.
pub mod json {
    use super::{Result, Serialize};

    /// Format data as JSON with 2-space indentation.
    pub fn format<T: Serialize>(data: &T) -> Result<String> {
        Ok(serde_json::to_string_pretty(data)?)
    }

    /// Format data as single-line JSON.
    pub fn format_compact<T: Serialize>(data: &T) -> Result<String> {
        Ok(serde_json::to_string(data)?)
    }
}

/// Plain text output formatting.
pub mod text {
    use super::{Result, Serialize, Style, render};

    /// Format data as indented `key: value` lines without colors.
    ///
    /// Suitable for piping to other commands.
    pub fn format<T: Serialize>(data: &T) -> Result<String> {
        let value = serde_json::to_value(data)?;
        Ok(render(&value, Style::Plain))
    }
}

/// Pretty (human-readable) output formatting.
pub mod pretty {
    use super::{Result, Serialize, Style, render};

    /// Format data as indented `key: value` lines with colors.
    pub fn format<T: Serialize>(data: &T) -> Result<String> {
        let value = serde_json::to_value(data)?;
        Ok(render(&value, Style::Colored))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Style {
    Plain,
    Colored,
}

impl Style {
    fn key(self, key: &str) -> String {
        match self {
            Self::Plain => key.to_string(),
            Self::Colored => key.blue().bold().to_string(),
        }
    }

    fn scalar(self, value: &Value) -> String {
        match self {
            Self::Plain => match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            },
            Self::Colored => match value {
                Value::Null => "-".dimmed().to_string(),
                Value::Bool(b) => b.to_string().yellow().to_string(),
                Value::Number(n) => n.to_string().cyan().to_string(),
                Value::String(s) => s.green().to_string(),
                other => other.to_string(),
            },
        }
    }
}

fn is_scalar(value: &Value) -> bool {
    !matches!(value, Value::Array(_) | Value::Object(_))
}

fn render(value: &Value, style: Style) -> String {
    let mut out = String::new();
    match value {
        Value::Object(_) | Value::Array(_) => render_nested(value, 0, style, &mut out),
        scalar => out.push_str(&style.scalar(scalar)),
    }
    while out.ends_with('\n') {
        out.pop();
    }
    out
}

fn render_nested(value: &Value, indent: usize, style: Style, out: &mut String) {
    let pad = "  ".repeat(indent);
    match value {
        Value::Object(map) => {
            for (key, val) in map {
                match val {
                    Value::Array(items) if items.is_empty() => {
                        let _ = writeln!(out, "{pad}{}: []", style.key(key));
                    }
                    Value::Object(inner) if inner.is_empty() => {
                        let _ = writeln!(out, "{pad}{}: {{}}", style.key(key));
                    }
                    nested if !is_scalar(nested) => {
                        let _ = writeln!(out, "{pad}{}:", style.key(key));
                        render_nested(nested, indent + 1, style, out);
                    }
                    scalar => {
                        let _ = writeln!(out, "{pad}{}: {}", style.key(key), style.scalar(scalar));
                    }
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                if is_scalar(item) {
                    let _ = writeln!(out, "{pad}- {}", style.scalar(item));
                } else {
                    let _ = writeln!(out, "{pad}-");
                    render_nested(item, indent + 1, style, out);
                }
            }
        }
        scalar => {
            let _ = writeln!(out, "{pad}{}", style.scalar(scalar));
        }
    }
}
