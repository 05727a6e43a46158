/// Collapse a body into a single line, keeping at most `max_chars` characters.
pub fn normalize_snippet(s: &str, max_chars: usize) -> String {
    let mut out = String::new();
    for line in s.lines() {
        let line = line.split_whitespace().collect::<Vec<_>>().join(" ");
        if line.is_empty() {
            continue;
        }
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(&line);
        if out.chars().count() >= max_chars {
            break;
        }
    }
    truncate_chars(&out, max_chars)
}

/// Char-boundary safe truncation.
pub fn truncate_chars(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}

/// Renders HTML as plain text; the raw markup is returned when rendering fails.
pub fn html_to_text(html: &str) -> String {
    html2text::from_read(html.as_bytes(), 10_000).unwrap_or_else(|e| {
        log::debug!("html2text failed ({e}); using raw body");
        html.to_string()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snippet_joins_lines_and_caps_length() {
        let body = "Hello   there\n\n  second line\nthird";
        assert_eq!(normalize_snippet(body, 100), "Hello there second line third");
        assert_eq!(normalize_snippet(body, 5), "Hello");
    }

    #[test]
    fn truncation_respects_multibyte_chars() {
        assert_eq!(truncate_chars("héllo wörld", 7), "héllo w");
    }

    #[test]
    fn html_is_reduced_to_text() {
        let text = html_to_text("<p>Quarterly <b>numbers</b></p>");
        assert!(text.contains("Quarterly"));
        assert!(text.contains("numbers"));
        assert!(!text.contains("<b>"));
    }

    #[test]
    fn unclosed_markup_still_yields_the_words() {
        let text = html_to_text("<div>Deal <b>closed");
        let snippet = normalize_snippet(&text, 100);
        assert!(snippet.contains("Deal"));
        assert!(snippet.contains("closed"));
    }
}
