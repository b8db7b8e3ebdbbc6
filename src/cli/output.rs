use serde::Serialize;

use super::OutputFormat;

/// Format any serializable value according to the requested output format.
/// Text falls back to pretty JSON; commands that want custom text formatting
/// build it themselves.
pub fn format_json<T: Serialize>(value: &T, format: &OutputFormat) -> String {
    match format {
        OutputFormat::Json => serde_json::to_string_pretty(value).unwrap_or_default(),
        OutputFormat::Compact => serde_json::to_string(value).unwrap_or_default(),
        OutputFormat::Text => serde_json::to_string_pretty(value).unwrap_or_default(),
    }
}

/// Two-column key/value lines for text output, skipping empty values.
pub fn format_fields(fields: &[(&str, String)]) -> String {
    let mut out = String::new();
    for (key, value) in fields {
        if value.is_empty() {
            continue;
        }
        out.push_str(&format!("{:<12} {}\n", key, value));
    }
    out
}
