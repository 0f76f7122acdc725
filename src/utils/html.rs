// src/utils/html.rs

/// Clean a violation log line before it leaves the sidecar.
///
/// Log lines embed shell-supplied text (key names, geometry payloads) and the
/// grading service renders them in instructor panels. Dangerous tags such as
/// <script> are removed together with their content; plain text passes through.
pub fn clean_log_line(input: &str) -> String {
    ammonia::clean(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_log_line_is_untouched() {
        let line = r#"[2026-03-01T10:00:00+00:00] clipboard: {"action":"paste"}"#;
        assert_eq!(clean_log_line(line), line);
    }

    #[test]
    fn test_script_is_stripped() {
        let cleaned = clean_log_line(r#"keydown: <script>alert(1)</script>F12"#);
        assert!(!cleaned.contains("<script>"));
        assert!(cleaned.contains("F12"));
    }
}
