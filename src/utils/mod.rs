use std::time::{SystemTime, UNIX_EPOCH};

/// Current Unix time in milliseconds
pub fn timestamp_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default()
}

/// Sanitize filename to remove invalid characters
pub fn sanitize_filename(filename: &str) -> String {
    filename
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            c if c.is_control() => '_',
            _ => c,
        })
        .collect::<String>()
        .trim()
        .trim_matches(|c| c == '.' || c == ' ')
        .to_string()
}

/// Append `.mp4` unless the name already carries it.
pub fn ensure_mp4_extension(filename: &str) -> String {
    if filename.ends_with(".mp4") {
        filename.to_string()
    } else {
        format!("{}.mp4", filename)
    }
}
