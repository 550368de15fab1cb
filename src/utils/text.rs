//! Text processing utilities

/// Bytes per token used by [`estimate_tokens`]
pub const BYTES_PER_TOKEN: usize = 4;

/// Marker appended to content cut at the per-file line limit
pub const TRUNCATION_MARKER: &str = "\n... [truncated]";

/// Lines taken from the start of a file for its summary
pub const SUMMARY_HEAD_LINES: usize = 5;

/// Lines taken from the end of a file for its summary
pub const SUMMARY_TAIL_LINES: usize = 3;

/// Estimate the token count of a piece of text.
///
/// This is `ceil(bytes / 4)`, an approximation rather than a tokenizer. It
/// depends only on the byte length of `text`.
pub fn estimate_tokens(text: &str) -> usize {
    text.len().div_ceil(BYTES_PER_TOKEN)
}

/// Result of applying a line limit to some text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TruncatedText {
    /// Retained content, with [`TRUNCATION_MARKER`] appended if cut
    pub content: String,
    /// Number of retained lines (the marker is not counted)
    pub lines: usize,
    /// Line count of the original text
    pub original_lines: usize,
    /// Whether anything was cut
    pub truncated: bool,
}

/// Keep at most `max_lines` lines of `text`
pub fn truncate_lines(text: &str, max_lines: usize) -> TruncatedText {
    let original_lines = text.lines().count();

    if original_lines <= max_lines {
        return TruncatedText {
            content: text.to_string(),
            lines: original_lines,
            original_lines,
            truncated: false,
        };
    }

    let mut content = text.lines().take(max_lines).collect::<Vec<_>>().join("\n");
    content.push_str(TRUNCATION_MARKER);

    TruncatedText {
        content,
        lines: max_lines,
        original_lines,
        truncated: true,
    }
}

/// Build the short summary shown in place of a truncated file's tail.
///
/// Contains the first [`SUMMARY_HEAD_LINES`] and last [`SUMMARY_TAIL_LINES`]
/// lines of the original text.
pub fn summarize_lines(name: &str, text: &str) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let head_end = SUMMARY_HEAD_LINES.min(lines.len());
    let tail_start = lines.len().saturating_sub(SUMMARY_TAIL_LINES).max(head_end);

    let mut summary = format!("{} ({} lines)\n", name, lines.len());
    summary.push_str(&lines[..head_end].join("\n"));
    if tail_start < lines.len() {
        summary.push_str("\n...\n");
        summary.push_str(&lines[tail_start..].join("\n"));
    }
    summary
}

/// Truncate text to a maximum length with ellipsis
pub fn truncate(text: &str, max_length: usize) -> String {
    if text.chars().count() <= max_length {
        text.to_string()
    } else if max_length <= 3 {
        "...".to_string()
    } else {
        let kept: String = text.chars().take(max_length - 3).collect();
        format!("{}...", kept)
    }
}
