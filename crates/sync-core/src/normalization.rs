use unicode_normalization::UnicodeNormalization;

/// Maximum characters kept in a dialog preview line.
pub const PREVIEW_MAX_CHARS: usize = 50;

/// Normalize a single-line label (names, previews).
///
/// Applies NFKC (which also spells out the ellipsis), maps typographic
/// dashes to ASCII, drops control, format and pictographic characters, and
/// collapses all whitespace runs (including line breaks) to one space.
pub fn normalize_line(text: &str) -> String {
    let cleaned = clean_chars(text);
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Normalize a message body, keeping line structure.
///
/// Same character cleanup as [`normalize_line`], but line breaks survive and
/// only horizontal whitespace is collapsed. Leading/trailing blank lines are
/// removed.
pub fn normalize_multiline(text: &str) -> String {
    let cleaned = clean_chars(text);
    let lines: Vec<String> = cleaned
        .lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .collect();

    let start = lines.iter().position(|line| !line.is_empty());
    let end = lines.iter().rposition(|line| !line.is_empty());
    match (start, end) {
        (Some(start), Some(end)) => lines[start..=end].join("\n"),
        _ => String::new(),
    }
}

/// Truncate to `max_chars` characters, marking the cut with `...`.
pub fn truncate_preview(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_owned();
    }
    let keep = max_chars.saturating_sub(3);
    let mut out: String = text.chars().take(keep).collect();
    out.push_str("...");
    out
}

/// First printable, non-space character of an already-normalized label.
pub fn avatar_initial(label: &str) -> char {
    label
        .chars()
        .find(|ch| !ch.is_whitespace())
        .map(|ch| ch.to_uppercase().next().unwrap_or(ch))
        .unwrap_or('?')
}

/// Case-insensitive substring match on normalized text.
pub fn matches_query(haystack: &str, query: &str) -> bool {
    let query = normalize_line(query).to_lowercase();
    if query.is_empty() {
        return true;
    }
    normalize_line(haystack).to_lowercase().contains(&query)
}

fn clean_chars(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.nfkc() {
        match ch {
            '\u{2014}' | '\u{2013}' | '\u{2212}' => out.push('-'),
            '\n' | '\t' => out.push(ch),
            '\r' => {}
            ch if ch.is_control() || is_format_char(ch) || is_pictographic(ch) => {}
            ch => out.push(ch),
        }
    }
    out
}

fn is_format_char(ch: char) -> bool {
    matches!(
        ch,
        '\u{00AD}'
            | '\u{200B}'..='\u{200F}'
            | '\u{202A}'..='\u{202E}'
            | '\u{2060}'..='\u{2064}'
            | '\u{FE00}'..='\u{FE0F}'
            | '\u{FEFF}'
    )
}

fn is_pictographic(ch: char) -> bool {
    matches!(
        ch,
        '\u{1F000}'..='\u{1FAFF}' | '\u{2600}'..='\u{27BF}' | '\u{1F1E6}'..='\u{1F1FF}'
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_normalization_maps_typography_and_collapses_space() {
        assert_eq!(
            normalize_line("  Hello\u{2014}world\u{2026}\n\tagain  "),
            "Hello-world... again"
        );
    }

    #[test]
    fn strips_emoji_and_zero_width_characters() {
        assert_eq!(normalize_line("hi \u{1F600}\u{200B}there\u{FE0F}"), "hi there");
    }

    #[test]
    fn nfkc_folds_compatibility_forms() {
        assert_eq!(normalize_line("\u{FF21}\u{FF22}\u{FB01}"), "ABfi");
    }

    #[test]
    fn multiline_keeps_line_breaks_and_trims_blank_edges() {
        assert_eq!(
            normalize_multiline("\n\nfirst   line\r\n\nsecond\u{0007} line\n\n"),
            "first line\n\nsecond line"
        );
    }

    #[test]
    fn preview_truncation_marks_cut() {
        let long = "a".repeat(60);
        let preview = truncate_preview(&long, PREVIEW_MAX_CHARS);
        assert_eq!(preview.chars().count(), PREVIEW_MAX_CHARS);
        assert!(preview.ends_with("..."));
        assert_eq!(truncate_preview("short", PREVIEW_MAX_CHARS), "short");
    }

    #[test]
    fn avatar_initial_falls_back_to_question_mark() {
        assert_eq!(avatar_initial("alice"), 'A');
        assert_eq!(avatar_initial(""), '?');
    }

    #[test]
    fn query_match_ignores_case_and_typography() {
        assert!(matches_query("Rust\u{2014}Lang Chat", "rust-lang"));
        assert!(matches_query("Anything", "   "));
        assert!(!matches_query("Anything", "nothing"));
    }
}
