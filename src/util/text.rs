use std::borrow::Cow;

use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

/// Maximum length, in characters, of an article's plain-text preview.
pub const PREVIEW_MAX_CHARS: usize = 250;

/// Derives a plain-text preview from an HTML fragment.
///
/// Tags are removed (each tag acts as a word break), the handful of entities
/// that survive XML unescaping in feed bodies are decoded, runs of whitespace
/// collapse to a single space, and the result is cut at `max_chars`
/// characters. The cut never splits a UTF-8 sequence.
///
/// # Examples
///
/// ```
/// use feedsync::util::plain_text_preview;
///
/// let html = "<p>Hello <b>world</b></p>\n\n<p>Second&nbsp;para</p>";
/// assert_eq!(plain_text_preview(html, 250), "Hello world Second para");
/// assert_eq!(plain_text_preview(html, 5), "Hello");
/// ```
pub fn plain_text_preview(html: &str, max_chars: usize) -> String {
    let stripped = strip_tags(html);
    let decoded = decode_common_entities(&stripped);

    let mut out = String::with_capacity(decoded.len().min(max_chars * 4));
    let mut count = 0;
    for word in decoded.split_whitespace() {
        if count >= max_chars {
            break;
        }
        if count > 0 {
            out.push(' ');
            count += 1;
        }
        for c in word.chars() {
            if count >= max_chars {
                break;
            }
            out.push(c);
            count += 1;
        }
    }
    // A cut right after a separator leaves a dangling space
    let trimmed_len = out.trim_end().len();
    out.truncate(trimmed_len);
    out
}

/// Removes markup, replacing each tag with a space so adjacent block
/// elements do not glue their words together. `<script>` and `<style>`
/// bodies are dropped entirely.
fn strip_tags(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut rest = html;

    while let Some(open) = rest.find('<') {
        out.push_str(&rest[..open]);
        out.push(' ');
        let after = &rest[open..];
        let Some(close) = after.find('>') else {
            // Unterminated tag: nothing after it is text
            return out;
        };
        let tag = after[1..close].trim_start().to_ascii_lowercase();
        rest = &after[close + 1..];

        for raw in ["script", "style"] {
            if tag.starts_with(raw) {
                let end_tag = format!("</{raw}");
                rest = match rest.to_ascii_lowercase().find(&end_tag) {
                    Some(pos) => {
                        let tail = &rest[pos..];
                        tail.find('>').map_or("", |gt| &tail[gt + 1..])
                    }
                    None => "",
                };
            }
        }
    }
    out.push_str(rest);
    out
}

fn decode_common_entities(s: &str) -> Cow<'_, str> {
    if !s.contains('&') {
        return Cow::Borrowed(s);
    }
    Cow::Owned(
        s.replace("&nbsp;", " ")
            .replace("&#160;", " ")
            .replace("&quot;", "\"")
            .replace("&#39;", "'")
            .replace("&apos;", "'")
            .replace("&lt;", "<")
            .replace("&gt;", ">")
            .replace("&amp;", "&"),
    )
}

/// Truncates a string to fit within a maximum terminal display width,
/// appending "..." when something was cut.
///
/// CJK characters and emoji count as two columns.
///
/// ```
/// use feedsync::util::truncate_to_width;
///
/// assert_eq!(truncate_to_width("Short", 10), "Short");
/// assert_eq!(truncate_to_width("Hello World", 8), "Hello...");
/// ```
pub fn truncate_to_width(s: &str, max_width: usize) -> Cow<'_, str> {
    const ELLIPSIS: &str = "...";

    if UnicodeWidthStr::width(s) <= max_width {
        return Cow::Borrowed(s);
    }
    // Too narrow for text plus ellipsis: keep what fits
    let budget = if max_width < ELLIPSIS.len() {
        max_width
    } else {
        max_width - ELLIPSIS.len()
    };

    let mut width = 0;
    let mut cut = 0;
    for (idx, c) in s.char_indices() {
        let w = UnicodeWidthChar::width(c).unwrap_or(0);
        if width + w > budget {
            break;
        }
        width += w;
        cut = idx + c.len_utf8();
    }

    if max_width < ELLIPSIS.len() {
        return Cow::Owned(s[..cut].to_string());
    }
    Cow::Owned(format!("{}{}", &s[..cut], ELLIPSIS))
}

/// Strips terminal control characters from feed-controlled text before it is
/// written to a terminal.
///
/// Removes C0 controls (except tab, newline, carriage return), DEL, and the
/// full extent of ANSI CSI (`ESC [ … final`) and OSC (`ESC ] … BEL|ST`)
/// sequences. Returns the input borrowed when nothing needs removing.
pub fn strip_control_chars(s: &str) -> Cow<'_, str> {
    fn is_control(c: char) -> bool {
        c == '\x7f' || (c < ' ' && !matches!(c, '\t' | '\n' | '\r'))
    }

    if !s.chars().any(is_control) {
        return Cow::Borrowed(s);
    }

    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\x1b' {
            if !is_control(c) {
                out.push(c);
            }
            continue;
        }
        match chars.peek() {
            Some('[') => {
                chars.next();
                for c in chars.by_ref() {
                    if ('\x40'..='\x7e').contains(&c) {
                        break;
                    }
                }
            }
            Some(']') => {
                chars.next();
                while let Some(c) = chars.next() {
                    if c == '\x07' {
                        break;
                    }
                    if c == '\x1b' && chars.peek() == Some(&'\\') {
                        chars.next();
                        break;
                    }
                }
            }
            _ => {}
        }
    }
    Cow::Owned(out)
}
