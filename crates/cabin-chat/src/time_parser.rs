//! Forward-biased natural-language date/time parsing.
//!
//! Finds a date expression and a time-of-day expression anywhere in free
//! text and combines them into a wall-clock start time. Ambiguous input
//! resolves to the future:
//!
//! - a month/day without a year that has already passed rolls to next year
//! - `next <weekday>` is the nearest occurrence strictly after today
//! - a time with no date that has already passed today means tomorrow
//!
//! A date with no time resolves to 12:00. Offsets that fall outside
//! chrono's representable range count as no date at all.

use std::ops::Range;
use std::sync::LazyLock;

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, Weekday};
use regex::{Captures, Regex};

/// A date/time found in text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedDate {
    /// Resolved start, as wall-clock time in the caller's zone.
    pub start: NaiveDateTime,
    /// The portion of the input that produced the result.
    pub matched: String,
}

const MONTHS: &str = "january|february|march|april|may|june|july|august|september|october|november|december|jan|feb|mar|apr|jun|jul|aug|sept|sep|oct|nov|dec";

struct DatePatterns {
    iso: Regex,
    month_day: Regex,
    day_month: Regex,
    numeric: Regex,
    day_after_tomorrow: Regex,
    tomorrow: Regex,
    today: Regex,
    tonight: Regex,
    next_week: Regex,
    in_offset: Regex,
    weekday: Regex,
}

static DATE_PATTERNS: LazyLock<DatePatterns> = LazyLock::new(|| DatePatterns {
    iso: Regex::new(r"\b(\d{4})-(\d{1,2})-(\d{1,2})\b").unwrap(),
    month_day: Regex::new(&format!(
        r"(?i)\b({MONTHS})\.?\s+(\d{{1,2}})(?:st|nd|rd|th)?\b(?:,?\s*(\d{{4}})\b)?"
    ))
    .unwrap(),
    day_month: Regex::new(&format!(
        r"(?i)\b(\d{{1,2}})(?:st|nd|rd|th)?\s+(?:of\s+)?({MONTHS})\b\.?(?:,?\s*(\d{{4}})\b)?"
    ))
    .unwrap(),
    numeric: Regex::new(r"\b(\d{1,2})/(\d{1,2})(?:/(\d{4}|\d{2}))?\b").unwrap(),
    day_after_tomorrow: Regex::new(r"(?i)\bday\s+after\s+tomorrow\b").unwrap(),
    tomorrow: Regex::new(r"(?i)\b(?:tomorrow|tmrw|tmr)\b").unwrap(),
    today: Regex::new(r"(?i)\btoday\b").unwrap(),
    tonight: Regex::new(r"(?i)\btonight\b").unwrap(),
    next_week: Regex::new(r"(?i)\bnext\s+week\b").unwrap(),
    in_offset: Regex::new(
        r"(?i)\bin\s+(\d+|an?|one|two|three|four|five|six|seven|eight|nine|ten)\s+(minutes?|mins?|hours?|hrs?|days?|weeks?)\b",
    )
    .unwrap(),
    weekday: Regex::new(
        r"(?i)\b(?:(next|this|on)\s+)?(monday|tuesday|wednesday|thursday|friday|saturday|sunday|mon|tues|tue|wed|thurs|thur|thu|fri|sat|sun)\b",
    )
    .unwrap(),
});

struct TimePatterns {
    meridiem: Regex,
    named: Regex,
    clock: Regex,
    at_hour: Regex,
    day_part: Regex,
}

static TIME_PATTERNS: LazyLock<TimePatterns> = LazyLock::new(|| TimePatterns {
    meridiem: Regex::new(r"(?i)\b(\d{1,2})(?::([0-5]\d))?\s*(a\.?m\.?|p\.?m\.?)(?:\s|$|[^a-z])").unwrap(),
    named: Regex::new(r"(?i)\b(noon|midday|midnight)\b").unwrap(),
    clock: Regex::new(r"\b([01]?\d|2[0-3]):([0-5]\d)\b").unwrap(),
    at_hour: Regex::new(r"(?i)\bat\s+(\d{1,2})\b").unwrap(),
    day_part: Regex::new(r"(?i)\b(morning|afternoon|evening|tonight)\b").unwrap(),
});

/// A date expression and what it implies.
#[derive(Debug, Clone, Copy)]
enum DateComponent {
    /// A calendar date. Without an explicit year it may roll forward.
    Calendar { date: NaiveDate, year_given: bool },
    /// A date relative to today, possibly implying a time of day.
    Relative {
        date: NaiveDate,
        implied_time: Option<NaiveTime>,
    },
    /// A fully resolved moment ("in 30 minutes").
    Moment(NaiveDateTime),
}

/// Parse the first date/time expression in `text` relative to `reference`.
///
/// Returns `None` if the text contains no recognisable date or time.
pub fn parse(text: &str, reference: NaiveDateTime) -> Option<ParsedDate> {
    let today = reference.date();
    let date = find_date(text, reference);
    let time = find_time(text);

    let (start, span) = match (date, time) {
        (Some((DateComponent::Moment(moment), span)), _) => (moment, span),
        (Some((DateComponent::Calendar { date, year_given }, span)), time) => {
            let date = if !year_given && date < today {
                date.with_year(date.year() + 1).unwrap_or(date)
            } else {
                date
            };
            let (time, span) = with_time(span, time, default_time());
            (date.and_time(time), span)
        }
        (Some((DateComponent::Relative { date, implied_time }, span)), time) => {
            let (time, span) = with_time(span, time, implied_time.unwrap_or_else(default_time));
            (date.and_time(time), span)
        }
        (None, Some((time, span))) => {
            let candidate = today.and_time(time);
            let start = if candidate <= reference {
                candidate.checked_add_signed(Duration::days(1))?
            } else {
                candidate
            };
            (start, span)
        }
        (None, None) => return None,
    };

    Some(ParsedDate {
        start,
        matched: text[span].trim().to_string(),
    })
}

fn default_time() -> NaiveTime {
    NaiveTime::from_hms_opt(12, 0, 0).unwrap_or(NaiveTime::MIN)
}

/// Combine a date span with an optional explicit time, widening the span.
fn with_time(
    date_span: Range<usize>,
    time: Option<(NaiveTime, Range<usize>)>,
    fallback: NaiveTime,
) -> (NaiveTime, Range<usize>) {
    match time {
        Some((time, time_span)) => (
            time,
            date_span.start.min(time_span.start)..date_span.end.max(time_span.end),
        ),
        None => (fallback, date_span),
    }
}

fn span_of(caps: &Captures<'_>) -> Range<usize> {
    caps.get(0).map(|m| m.range()).unwrap_or(0..0)
}

fn find_date(text: &str, reference: NaiveDateTime) -> Option<(DateComponent, Range<usize>)> {
    let p = &*DATE_PATTERNS;
    let today = reference.date();

    for caps in p.iso.captures_iter(text) {
        let date = ymd(num(&caps, 1)?, num(&caps, 2)?, num(&caps, 3)?);
        if let Some(date) = date {
            return Some((DateComponent::Calendar { date, year_given: true }, span_of(&caps)));
        }
    }

    for caps in p.month_day.captures_iter(text) {
        let month = month_number(caps.get(1)?.as_str())?;
        if let Some(found) = calendar_date(&caps, month, num(&caps, 2)?, 3, today) {
            return Some(found);
        }
    }

    for caps in p.day_month.captures_iter(text) {
        let month = month_number(caps.get(2)?.as_str())?;
        if let Some(found) = calendar_date(&caps, month, num(&caps, 1)?, 3, today) {
            return Some(found);
        }
    }

    for caps in p.numeric.captures_iter(text) {
        let year = caps.get(3).and_then(|m| m.as_str().parse::<i32>().ok()).map(|y| {
            if y < 100 {
                2000 + y
            } else {
                y
            }
        });
        let (month, day) = (num(&caps, 1)?, num(&caps, 2)?);
        if let Some(date) = ymd(year.unwrap_or(today.year()), month, day) {
            return Some((
                DateComponent::Calendar {
                    date,
                    year_given: year.is_some(),
                },
                span_of(&caps),
            ));
        }
    }

    let relative = |m: regex::Match<'_>, days: i64, implied_time: Option<NaiveTime>| {
        Some((
            DateComponent::Relative {
                date: today.checked_add_signed(Duration::days(days))?,
                implied_time,
            },
            m.range(),
        ))
    };

    if let Some(m) = p.day_after_tomorrow.find(text) {
        return relative(m, 2, None);
    }
    if let Some(m) = p.tomorrow.find(text) {
        return relative(m, 1, None);
    }
    if let Some(m) = p.tonight.find(text) {
        return relative(m, 0, NaiveTime::from_hms_opt(20, 0, 0));
    }
    if let Some(m) = p.today.find(text) {
        return relative(m, 0, None);
    }
    if let Some(m) = p.next_week.find(text) {
        return relative(m, 7, None);
    }

    if let Some(caps) = p.in_offset.captures(text) {
        let amount = word_number(caps.get(1)?.as_str())?;
        let unit = caps.get(2)?.as_str().to_ascii_lowercase();
        let span = span_of(&caps);
        let component = if unit.starts_with("min") {
            let offset = Duration::try_minutes(amount)?;
            DateComponent::Moment(reference.checked_add_signed(offset)?)
        } else if unit.starts_with('h') {
            let offset = Duration::try_hours(amount)?;
            DateComponent::Moment(reference.checked_add_signed(offset)?)
        } else {
            let days = if unit.starts_with('w') {
                amount.checked_mul(7)?
            } else {
                amount
            };
            DateComponent::Relative {
                date: today.checked_add_signed(Duration::try_days(days)?)?,
                implied_time: Some(reference.time()),
            }
        };
        return Some((component, span));
    }

    for caps in p.weekday.captures_iter(text) {
        let prefix = caps.get(1).map(|m| m.as_str().to_ascii_lowercase());
        let name = caps.get(2)?.as_str().to_ascii_lowercase();
        // Bare abbreviations ("sun", "sat") are too likely to be ordinary words.
        if prefix.is_none() && !FULL_WEEKDAYS.contains(&name.as_str()) {
            continue;
        }
        let weekday = weekday_from_name(&name)?;
        let strict = prefix.as_deref() == Some("next");
        let date = next_weekday(today, weekday, strict)?;
        return Some((
            DateComponent::Relative {
                date,
                implied_time: None,
            },
            span_of(&caps),
        ));
    }

    None
}

const FULL_WEEKDAYS: [&str; 7] = [
    "monday",
    "tuesday",
    "wednesday",
    "thursday",
    "friday",
    "saturday",
    "sunday",
];

fn find_time(text: &str) -> Option<(NaiveTime, Range<usize>)> {
    let p = &*TIME_PATTERNS;

    for caps in p.meridiem.captures_iter(text) {
        let hour = num(&caps, 1)?;
        let minute = caps.get(2).and_then(|m| m.as_str().parse().ok()).unwrap_or(0);
        let pm = caps.get(3)?.as_str().to_ascii_lowercase().starts_with('p');
        if !(1..=12).contains(&hour) {
            continue;
        }
        let hour = match (hour, pm) {
            (12, false) => 0,
            (12, true) => 12,
            (h, true) => h + 12,
            (h, false) => h,
        };
        if let Some(time) = NaiveTime::from_hms_opt(hour, minute, 0) {
            let whole = caps.get(0)?;
            let end = caps.get(3).map(|m| m.end()).unwrap_or(whole.end());
            return Some((time, whole.start()..end));
        }
    }

    if let Some(caps) = p.named.captures(text) {
        let time = match caps.get(1)?.as_str().to_ascii_lowercase().as_str() {
            "midnight" => NaiveTime::MIN,
            _ => NaiveTime::from_hms_opt(12, 0, 0)?,
        };
        return Some((time, span_of(&caps)));
    }

    if let Some(caps) = p.clock.captures(text) {
        let time = NaiveTime::from_hms_opt(num(&caps, 1)?, num(&caps, 2)?, 0)?;
        return Some((time, span_of(&caps)));
    }

    for caps in p.at_hour.captures_iter(text) {
        let hour = num(&caps, 1)?;
        // Bare hours read as business hours: "at 3" is mid-afternoon.
        let hour = match hour {
            1..=7 => hour + 12,
            8..=23 => hour,
            _ => continue,
        };
        if let Some(time) = NaiveTime::from_hms_opt(hour, 0, 0) {
            return Some((time, span_of(&caps)));
        }
    }

    if let Some(caps) = p.day_part.captures(text) {
        let hour = match caps.get(1)?.as_str().to_ascii_lowercase().as_str() {
            "morning" => 9,
            "afternoon" => 15,
            "evening" => 18,
            _ => 20,
        };
        return Some((NaiveTime::from_hms_opt(hour, 0, 0)?, span_of(&caps)));
    }

    None
}

fn calendar_date(
    caps: &Captures<'_>,
    month: u32,
    day: u32,
    year_group: usize,
    today: NaiveDate,
) -> Option<(DateComponent, Range<usize>)> {
    let year = caps.get(year_group).and_then(|m| m.as_str().parse::<i32>().ok());
    let date = ymd(year.unwrap_or(today.year()), month, day)?;
    Some((
        DateComponent::Calendar {
            date,
            year_given: year.is_some(),
        },
        span_of(caps),
    ))
}

fn num<T: std::str::FromStr>(caps: &Captures<'_>, group: usize) -> Option<T> {
    caps.get(group)?.as_str().parse().ok()
}

fn ymd(year: i32, month: u32, day: u32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year, month, day)
}

fn month_number(name: &str) -> Option<u32> {
    let name = name.to_ascii_lowercase();
    let month = match name.get(..3)? {
        "jan" => 1,
        "feb" => 2,
        "mar" => 3,
        "apr" => 4,
        "may" => 5,
        "jun" => 6,
        "jul" => 7,
        "aug" => 8,
        "sep" => 9,
        "oct" => 10,
        "nov" => 11,
        "dec" => 12,
        _ => return None,
    };
    Some(month)
}

fn weekday_from_name(name: &str) -> Option<Weekday> {
    let weekday = match name.get(..3)? {
        "mon" => Weekday::Mon,
        "tue" => Weekday::Tue,
        "wed" => Weekday::Wed,
        "thu" => Weekday::Thu,
        "fri" => Weekday::Fri,
        "sat" => Weekday::Sat,
        "sun" => Weekday::Sun,
        _ => return None,
    };
    Some(weekday)
}

fn word_number(word: &str) -> Option<i64> {
    let n = match word.to_ascii_lowercase().as_str() {
        "a" | "an" | "one" => 1,
        "two" => 2,
        "three" => 3,
        "four" => 4,
        "five" => 5,
        "six" => 6,
        "seven" => 7,
        "eight" => 8,
        "nine" => 9,
        "ten" => 10,
        digits => digits.parse().ok()?,
    };
    Some(n)
}

/// Nearest `weekday` on or after `today`, or strictly after it when `strict`.
fn next_weekday(today: NaiveDate, weekday: Weekday, strict: bool) -> Option<NaiveDate> {
    let current = today.weekday().num_days_from_monday() as i64;
    let target = weekday.num_days_from_monday() as i64;
    let mut ahead = (target - current).rem_euclid(7);
    if strict && ahead == 0 {
        ahead = 7;
    }
    today.checked_add_signed(Duration::days(ahead))
}
