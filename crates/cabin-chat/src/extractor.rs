//! Booking field extraction.
//!
//! Pulls an attendee email, an event title, and a start time out of a
//! booking reply. Two layouts are understood:
//!
//! - delimited: `email, title, date...` (at least three comma-separated parts,
//!   the first containing `@`)
//! - freeform: a sentence containing an email, an optionally quoted title,
//!   and a date expression
//!
//! Extraction never fails; missing fields are `None`.

use std::sync::LazyLock;

use chrono::NaiveDateTime;
use regex::Regex;

use crate::intent::EMAIL;
use crate::time_parser;

/// Title used when none can be found.
pub const DEFAULT_TITLE: &str = "Appointment";

/// Titles at or above this length are treated as not-a-title.
const MAX_TITLE_CHARS: usize = 200;

static QUOTED: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#""(.*?)"|'(.*?)'"#).unwrap());

static TEMPORAL_KEYWORD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:on|at|tomorrow|next|this|am|pm|morning|afternoon)\b").unwrap()
});

/// Fields found in a booking reply.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedFields {
    pub email: Option<String>,
    pub title: Option<String>,
    /// Text the start time was parsed from.
    pub date_text: Option<String>,
    /// Wall-clock start in the booking zone.
    pub start: Option<NaiveDateTime>,
}

impl ExtractedFields {
    /// Both required fields are present.
    pub fn is_complete(&self) -> bool {
        self.email.is_some() && self.start.is_some()
    }

    pub fn title_or_default(&self) -> &str {
        self.title
            .as_deref()
            .filter(|t| !t.is_empty())
            .unwrap_or(DEFAULT_TITLE)
    }
}

/// Extract booking fields from `message`. Dates are resolved relative to
/// `reference`, the current wall-clock time in the booking zone.
pub fn extract(message: &str, reference: NaiveDateTime) -> ExtractedFields {
    let mut fields = delimited(message).unwrap_or_else(|| freeform(message));
    fields.start = fields
        .date_text
        .as_deref()
        .and_then(|text| time_parser::parse(text, reference))
        .map(|parsed| parsed.start);
    fields
}

fn delimited(message: &str) -> Option<ExtractedFields> {
    let parts: Vec<&str> = message
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect();

    if parts.len() < 3 || !parts[0].contains('@') {
        return None;
    }

    Some(ExtractedFields {
        email: Some(parts[0].to_string()),
        title: Some(parts[1].to_string()),
        date_text: Some(parts[2..].join(", ")),
        start: None,
    })
}

fn freeform(message: &str) -> ExtractedFields {
    let email = EMAIL.find(message).map(|m| m.as_str().to_string());

    let quoted = QUOTED.captures(message).and_then(|caps| {
        caps.get(1)
            .or_else(|| caps.get(2))
            .map(|m| m.as_str().to_string())
    });
    let title = quoted.filter(|t| !t.is_empty()).unwrap_or_else(|| {
        let before = TEMPORAL_KEYWORD
            .split(message)
            .next()
            .unwrap_or(message);
        if before.chars().count() < MAX_TITLE_CHARS {
            let trimmed = before.trim();
            if trimmed.is_empty() {
                DEFAULT_TITLE.to_string()
            } else {
                trimmed.to_string()
            }
        } else {
            DEFAULT_TITLE.to_string()
        }
    });

    ExtractedFields {
        email,
        title: Some(title),
        date_text: Some(message.to_string()),
        start: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 10, 15)
            .unwrap()
            .and_hms_opt(10, 30, 0)
            .unwrap()
    }

    fn at(y: i32, m: u32, d: u32, h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_delimited_layout() {
        let f = extract("me@example.com, Demo, Oct 22 2025 9am", now());
        assert_eq!(f.email.as_deref(), Some("me@example.com"));
        assert_eq!(f.title.as_deref(), Some("Demo"));
        assert_eq!(f.date_text.as_deref(), Some("Oct 22 2025 9am"));
        assert_eq!(f.start, Some(at(2025, 10, 22, 9)));
        assert!(f.is_complete());
    }

    #[test]
    fn test_delimited_rejoins_date_parts() {
        let f = extract("me@example.com, Site visit, October 22, 2025 3pm", now());
        assert_eq!(f.date_text.as_deref(), Some("October 22, 2025 3pm"));
        assert_eq!(f.start, Some(at(2025, 10, 22, 15)));
    }

    #[test]
    fn test_delimited_requires_email_first() {
        let f = extract("Demo, me@example.com, tomorrow 9am", now());
        assert_eq!(f.email.as_deref(), Some("me@example.com"));
        assert_eq!(f.date_text.as_deref(), Some("Demo, me@example.com, tomorrow 9am"));
        assert_eq!(f.start, Some(at(2025, 10, 16, 9)));
    }

    #[test]
    fn test_freeform_with_quoted_title() {
        let f = extract(r#"Book "Cabin tour" for jo@cabins.io next friday at 2pm"#, now());
        assert_eq!(f.email.as_deref(), Some("jo@cabins.io"));
        assert_eq!(f.title.as_deref(), Some("Cabin tour"));
        // Reference is a Wednesday; the nearest Friday after today.
        assert_eq!(f.start, Some(at(2025, 10, 17, 14)));
    }

    #[test]
    fn test_freeform_single_quoted_title() {
        let f = extract("jo@cabins.io 'Kickoff' tomorrow 10am", now());
        assert_eq!(f.title.as_deref(), Some("Kickoff"));
    }

    #[test]
    fn test_freeform_title_before_temporal_keyword() {
        let f = extract("Design review with jo@cabins.io tomorrow at 9am", now());
        assert_eq!(f.title.as_deref(), Some("Design review with jo@cabins.io"));
        assert_eq!(f.start, Some(at(2025, 10, 16, 9)));
    }

    #[test]
    fn test_freeform_title_defaults() {
        let f = extract("tomorrow at 9am, jo@cabins.io", now());
        assert_eq!(f.title.as_deref(), Some(DEFAULT_TITLE));

        let long = format!("{} on Oct 22 2025", "x".repeat(250));
        let f = extract(&long, now());
        assert_eq!(f.title.as_deref(), Some(DEFAULT_TITLE));
    }

    #[test]
    fn test_missing_fields() {
        let f = extract("sometime soon maybe", now());
        assert!(f.email.is_none());
        assert!(f.start.is_none());
        assert!(!f.is_complete());
        assert_eq!(f.title_or_default(), "sometime soon maybe");

        let f = extract("jo@cabins.io", now());
        assert!(f.email.is_some());
        assert!(f.start.is_none());
    }
}
