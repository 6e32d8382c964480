//! Tolerant cleanup of model-produced JSON.
//!
//! Generative models wrap JSON in Markdown fences and produce minor syntax
//! defects (trailing commas, typographic quotes, stray interior quotes). The
//! helpers here normalize such output enough for `serde_json` to parse it;
//! anything beyond these repairs is treated as a hard failure by callers.

/// Remove a surrounding Markdown code fence, including an optional language
/// tag, returning the inner payload. Input without fences is only trimmed.
pub fn strip_code_fences(raw: &str) -> String {
    let trimmed = raw.trim();
    let Some(start) = trimmed.find("```") else {
        return trimmed.to_string();
    };

    let after = &trimmed[start + 3..];
    let body = match after.find('\n') {
        Some(index) => &after[index + 1..],
        // Single-line fence: drop the language tag glued to the payload.
        None => after.trim_start_matches(|c: char| c.is_ascii_alphabetic()),
    };
    let body = match body.rfind("```") {
        Some(end) => &body[..end],
        None => body,
    };
    body.trim().to_string()
}

/// Best-effort repair pass over almost-JSON text.
///
/// Fixes applied: typographic double quotes become ASCII quotes, raw newlines
/// inside strings are escaped, interior quotes that cannot close a string are
/// escaped, and trailing commas before `]`/`}` are dropped.
pub fn repair_json(raw: &str) -> String {
    let normalized: String = raw
        .chars()
        .map(|c| match c {
            '\u{201c}' | '\u{201d}' => '"',
            other => other,
        })
        .collect();

    let chars: Vec<char> = normalized.chars().collect();
    let mut out = String::with_capacity(normalized.len());
    let mut in_string = false;
    let mut escaped = false;

    for (i, &c) in chars.iter().enumerate() {
        if in_string {
            if escaped {
                out.push(c);
                escaped = false;
                continue;
            }
            match c {
                '\\' => {
                    out.push(c);
                    escaped = true;
                }
                '\n' => out.push_str("\\n"),
                '\r' => {}
                '"' => {
                    // A quote only terminates the string when followed by
                    // structural JSON; otherwise it was unescaped content.
                    if closes_string(&chars, i + 1) {
                        in_string = false;
                        out.push('"');
                    } else {
                        out.push_str("\\\"");
                    }
                }
                _ => out.push(c),
            }
        } else {
            match c {
                '"' => {
                    in_string = true;
                    out.push(c);
                }
                ',' => {
                    if !followed_by_closer(&chars, i + 1) {
                        out.push(',');
                    }
                }
                _ => out.push(c),
            }
        }
    }

    out
}

fn closes_string(chars: &[char], mut index: usize) -> bool {
    while let Some(&c) = chars.get(index) {
        if c.is_whitespace() {
            index += 1;
            continue;
        }
        return matches!(c, ',' | ']' | '}' | ':');
    }
    true
}

fn followed_by_closer(chars: &[char], mut index: usize) -> bool {
    while let Some(&c) = chars.get(index) {
        if c.is_whitespace() {
            index += 1;
            continue;
        }
        return matches!(c, ']' | '}');
    }
    false
}
