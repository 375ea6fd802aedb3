use std::time::{SystemTime, UNIX_EPOCH};

/// Seconds since the Unix epoch, `0` if the clock is before it.
pub fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

/// Split newline-joined stored text into exactly `line_count` owned lines.
///
/// `None` for NULL text or a zero count. A lone blank line is stored as `""`,
/// so the count, not the text, decides whether anything is there.
pub fn split_stored_lines(raw: Option<String>, line_count: i64) -> Option<Vec<String>> {
    let raw = raw?;
    let line_count = usize::try_from(line_count).ok().filter(|count| *count > 0)?;
    let mut lines: Vec<String> = raw.split('\n').map(str::to_string).collect();
    lines.resize(line_count, String::new());
    Some(lines)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_stored_lines_handles_missing_and_zero_count() {
        assert_eq!(split_stored_lines(None, 3), None);
        assert_eq!(split_stored_lines(Some(String::new()), 0), None);
        assert_eq!(split_stored_lines(Some("a".to_string()), -1), None);
    }

    #[test]
    fn split_stored_lines_keeps_blank_line_slots() {
        let lines = split_stored_lines(Some("a\n\nb".to_string()), 3).unwrap();
        assert_eq!(lines, vec!["a", "", "b"]);
    }

    #[test]
    fn single_blank_line_survives() {
        assert_eq!(split_stored_lines(Some(String::new()), 1), Some(vec![String::new()]));
    }
}
