//! Plain-terminal rendering of articles for the CLI.

use chrono::{DateTime, Utc};

use crate::feed::Article;
use crate::util::{strip_control_chars, truncate_to_width};

/// Parses a feed date: RFC 2822 (RSS) first, then RFC 3339 (Atom).
pub fn parse_feed_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    DateTime::parse_from_rfc2822(raw)
        .or_else(|_| DateTime::parse_from_rfc3339(raw))
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Format a feed date relative to `now`: `5m`, `3h`, `2d`, else `Oct 21`.
/// Unparseable dates are shown as-is, truncated.
pub fn format_relative_time(raw: &str, now: DateTime<Utc>) -> String {
    let Some(published) = parse_feed_date(raw) else {
        return truncate_to_width(&strip_control_chars(raw), 10).into_owned();
    };

    let diff = (now - published).num_seconds();

    // Future dates (malformed feeds)
    if diff < 0 {
        return "now".to_string();
    }
    if diff < 3600 {
        return format!("{}m", diff / 60);
    }
    if diff < 86400 {
        return format!("{}h", diff / 3600);
    }
    if diff < 604800 {
        return format!("{}d", diff / 86400);
    }
    published.format("%b %d").to_string()
}

/// One line per article: new marker, age, title, fitted to `width` columns.
///
/// SEC-001: Feed text is untrusted; control sequences are stripped before
/// it reaches the terminal.
pub fn article_line(article: &Article, width: usize, now: DateTime<Utc>) -> String {
    let marker = if article.is_new { '*' } else { ' ' };
    let age = format_relative_time(&article.published_at, now);
    let title = strip_control_chars(&article.title);
    let title = if title.trim().is_empty() {
        strip_control_chars(&article.link)
    } else {
        title
    };
    let prefix = format!("{marker} {age:>6}  ");
    let budget = width.saturating_sub(prefix.len());
    format!("{prefix}{}", truncate_to_width(title.trim(), budget))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 10, 21, 12, 0, 0).unwrap()
    }

    fn article(title: &str, published_at: &str) -> Article {
        Article {
            guid: "g".into(),
            link: "https://example.com/post".into(),
            title: title.into(),
            published_at: published_at.into(),
            description: String::new(),
            content: String::new(),
            thumbnail: None,
            is_new: false,
        }
    }

    #[test]
    fn test_parses_rss_and_atom_dates() {
        assert!(parse_feed_date("Mon, 21 Oct 2024 07:28:00 GMT").is_some());
        assert!(parse_feed_date("2024-10-21T07:28:00Z").is_some());
        assert!(parse_feed_date("yesterday").is_none());
    }

    #[test]
    fn test_relative_buckets() {
        assert_eq!(format_relative_time("2024-10-21T11:30:00Z", now()), "30m");
        assert_eq!(format_relative_time("Mon, 21 Oct 2024 07:00:00 GMT", now()), "5h");
        assert_eq!(format_relative_time("2024-10-18T12:00:00Z", now()), "3d");
        assert_eq!(format_relative_time("2024-09-01T12:00:00Z", now()), "Sep 01");
        assert_eq!(format_relative_time("2030-01-01T00:00:00Z", now()), "now");
    }

    #[test]
    fn test_line_strips_escape_sequences() {
        let line = article_line(&article("Evil \x1b[2Jtitle", "2024-10-21T11:00:00Z"), 80, now());
        assert!(!line.contains('\x1b'));
        assert!(line.contains("title"));
    }

    #[test]
    fn test_line_fits_width() {
        let long = "A very long headline that will not fit in a narrow terminal column";
        let line = article_line(&article(long, ""), 30, now());
        assert!(unicode_width::UnicodeWidthStr::width(line.as_str()) <= 30);
        assert!(line.ends_with("..."));
    }

    #[test]
    fn test_new_marker_and_link_fallback() {
        let mut a = article("", "");
        a.is_new = true;
        let line = article_line(&a, 80, now());
        assert!(line.starts_with('*'));
        assert!(line.contains("https://example.com/post"));
    }
}
