// src/util.rs — Shared utility functions

/// Truncate a string for display/logging (UTF-8 safe).
///
/// Returns a substring of at most `max_len` bytes, ensuring the cut
/// point falls on a valid UTF-8 character boundary.
pub fn truncate_str(s: &str, max_len: usize) -> &str {
    if s.len() <= max_len {
        s
    } else {
        let mut end = max_len;
        while end > 0 && !s.is_char_boundary(end) {
            end -= 1;
        }
        &s[..end]
    }
}

/// Characters Telegram MarkdownV2 treats as markup. `*` and `` ` `` are
/// left alone so the model's bold text and code blocks survive.
const MARKDOWN_V2_SPECIAL: &[char] = &[
    '_', '[', ']', '(', ')', '~', '>', '#', '+', '-', '=', '|', '{', '}', '.', '!',
];

/// Prepare model output for a MarkdownV2 message.
///
/// Pre-escaped `\*` and `` \` `` are unescaped first, then every other
/// special character is backslash-escaped.
pub fn escape_markdown_v2(text: &str) -> String {
    let text = text.replace("\\*", "*").replace("\\`", "`");
    let mut out = String::with_capacity(text.len() + text.len() / 8);
    for c in text.chars() {
        if MARKDOWN_V2_SPECIAL.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
