//! Sanitization of generated text.

/// Remove non-printable characters from generated text.
///
/// Control and invisible format characters are dropped. Newlines and tabs
/// are kept so multi-line answers survive.
#[must_use]
pub fn sanitize_text(text: &str) -> String {
    text.chars().filter(|c| is_printable(*c)).collect()
}

fn is_printable(c: char) -> bool {
    if c == '\n' || c == '\t' {
        return true;
    }
    if c.is_control() {
        return false;
    }
    // Unicode format characters (Cf) that render as nothing
    !matches!(
        c,
        '\u{00AD}'
            | '\u{200B}'..='\u{200F}'
            | '\u{202A}'..='\u{202E}'
            | '\u{2060}'..='\u{2064}'
            | '\u{FEFF}'
            | '\u{FFF9}'..='\u{FFFB}'
    )
}
