//! Post-processing of provider output and provider error messages.

use std::sync::OnceLock;

use regex::Regex;

/// Remove Markdown code fences that enclose a model reply
///
/// A leading ```` ``` ```` line (with optional language tag) is dropped, as is a
/// trailing ```` ``` ````. A fence closed on its opening line has no tag, so
/// only the delimiters go. Text that does not open with a fence is only trimmed.
pub fn strip_code_fences(text: &str) -> String {
    let trimmed = text.trim();
    let Some(after_open) = trimmed.strip_prefix("```") else {
        return trimmed.to_string();
    };

    // The rest of the opening line is the language tag
    let body = match after_open.find('\n') {
        Some(idx) => &after_open[idx + 1..],
        None => after_open,
    };
    let body = body.trim_end();
    let body = body.strip_suffix("```").unwrap_or(body);
    body.trim().to_string()
}

/// Whether the whole reply is wrapped in a single fenced block
///
/// The opening and closing fence lines must pair with each other: any other
/// fence line in between means the reply holds several blocks.
pub fn is_fenced(text: &str) -> bool {
    let lines: Vec<&str> = text.trim().lines().collect();
    let [first, inner @ .., last] = lines.as_slice() else {
        return false;
    };
    first.starts_with("```")
        && last.trim() == "```"
        && !inner.iter().any(|l| l.trim_start().starts_with("```"))
}

fn secret_patterns() -> &'static [(Regex, &'static str)] {
    static PATTERNS: OnceLock<Vec<(Regex, &'static str)>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            (r"sk-ant-[A-Za-z0-9_-]{10,}", "sk-ant-***"),
            (r"sk-[A-Za-z0-9_-]{20,}", "sk-***"),
            (r"AIza[0-9A-Za-z_-]{30,}", "AIza***"),
            (r"(?i)bearer\s+[A-Za-z0-9._~+/=-]{16,}", "Bearer ***"),
            (r"[A-Za-z0-9_-]{32,}", "***REDACTED***"),
        ]
        .into_iter()
        .filter_map(|(p, r)| Regex::new(p).ok().map(|re| (re, r)))
        .collect()
    })
}

/// Sanitize an upstream error message before it reaches logs or users
pub fn sanitize_error_message(message: &str) -> String {
    let mut sanitized = message.to_string();
    for (re, replacement) in secret_patterns() {
        sanitized = re.replace_all(&sanitized, *replacement).into_owned();
    }

    const MAX: usize = 256;
    if sanitized.len() > MAX {
        let mut cut = MAX;
        while !sanitized.is_char_boundary(cut) {
            cut -= 1;
        }
        format!("{}... [truncated]", &sanitized[..cut])
    } else {
        sanitized
    }
}
