//! Result text formatting and the console display cap.

use crate::UnitId;
use core::fmt::Display;

/// Default number of characters shown for one result before it is elided.
pub const DEFAULT_DISPLAY_CAP: usize = 80;

/// Formats the text a worker attaches to a computed result.
pub fn result_text(name: &str, value: i64, output: impl Display) -> String {
    format!("{name}({value}) is {output}")
}

/// Caps `text` at `cap` characters for display.
///
/// Text of at most `cap` characters is returned unmodified. Longer text keeps
/// its first `cap` characters followed by `... (<k> more digits)`, where `k`
/// counts the elided characters.
pub fn cap_display(text: &str, cap: usize) -> String {
    match text.char_indices().nth(cap) {
        None => text.to_string(),
        Some((cut, _)) => {
            let elided = text[cut..].chars().count();
            format!("{}... ({elided} more digits)", &text[..cut])
        }
    }
}

/// Formats one console line as `<unit> @ <timestamp>: <message>`.
pub fn console_line(unit: UnitId, message: &str) -> String {
    let now = chrono::Utc::now().format("%Y-%m-%d %H:%M:%S%.6f");
    format!("{unit} @ {now}: {message}")
}
