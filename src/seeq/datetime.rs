//! Permissive date/time normalization for spreadsheet input.
//!
//! Host spreadsheets send bounds as ISO strings, regional layouts such as `9/1/2025`,
//! spreadsheet day-serials (`45292.5`) or free text. [`normalize`] walks a fixed fallback
//! chain and returns the first interpretation that succeeds, then attaches a zone:
//!
//! 1. flexible ISO-8601 / RFC 3339 / RFC 2822 parsing,
//! 2. the explicit layouts in [`EXPLICIT_LAYOUTS`], in order,
//! 3. a day-serial counted from 1899-12-30,
//! 4. a permissive natural-language parse.
//!
//! Naive results are read as UTC. Missing or empty input is an error, never "now".

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value as JsonValue;
use std::fmt;
use tracing::debug;

use crate::constants::EXCEL_EPOCH;
use crate::seeq::error::{Result, SeeqError};
use crate::seeq::types::{Instant, Timestamp, Zone};

/// Layouts tried after flexible parsing fails. The flag marks layouts with a time part.
pub const EXPLICIT_LAYOUTS: [(&str, bool); 9] = [
    ("%m/%d/%Y", false),
    ("%m/%d/%Y %H:%M:%S", true),
    ("%m/%d/%Y %I:%M:%S %p", true),
    ("%Y-%m-%d", false),
    ("%Y-%m-%d %H:%M:%S", true),
    ("%m-%d-%Y", false),
    ("%m-%d-%Y %H:%M:%S", true),
    ("%d/%m/%Y", false),
    ("%d/%m/%Y %H:%M:%S", true),
];

const OFFSET_LAYOUTS: [&str; 6] = [
    "%Y-%m-%dT%H:%M:%S%.f%:z",
    "%Y-%m-%d %H:%M:%S%.f%:z",
    "%Y-%m-%dT%H:%M:%S%.f%z",
    "%Y-%m-%d %H:%M:%S%.f%z",
    "%Y-%m-%dT%H:%M%:z",
    "%Y-%m-%d %H:%M%:z",
];

const NAIVE_LAYOUTS: [&str; 7] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S%.f",
    "%Y/%m/%d %H:%M",
    "%Y%m%dT%H%M%S",
];

const DATE_LAYOUTS: [&str; 3] = ["%Y-%m-%d", "%Y/%m/%d", "%Y%m%d"];

const MONTHS: [&str; 12] = [
    "january",
    "february",
    "march",
    "april",
    "may",
    "june",
    "july",
    "august",
    "september",
    "october",
    "november",
    "december",
];

const WEEKDAYS: [&str; 7] = [
    "monday",
    "tuesday",
    "wednesday",
    "thursday",
    "friday",
    "saturday",
    "sunday",
];

const FILLER_WORDS: [&str; 5] = ["at", "on", "of", "the", "t"];

static NUMERIC_ONLY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[+-]?(\d+\.?\d*|\.\d+)([eE][+-]?\d+)?$").expect("Failed to compile numeric regex")
});

// ISO-8601 basic dates look numeric but are calendar dates first.
static BASIC_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{8}$").expect("Failed to compile basic date regex"));

static NATURAL_TOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?P<time>\d{1,2}:\d{2}(?::\d{2}(?:\.\d+)?)?)|(?P<num>\d+)(?:st|nd|rd|th)?|(?P<word>[a-z]+)")
        .expect("Failed to compile natural date regex")
});

/// Raw date/time input as the host sends it.
#[derive(Debug, Clone, PartialEq)]
pub enum DateInput {
    Missing,
    Text(String),
    Serial(f64),
}

impl DateInput {
    pub fn from_json(value: &JsonValue) -> Self {
        match value {
            JsonValue::Null => DateInput::Missing,
            JsonValue::String(s) => DateInput::Text(s.clone()),
            JsonValue::Number(n) => n
                .as_f64()
                .map(DateInput::Serial)
                .unwrap_or_else(|| DateInput::Text(n.to_string())),
            other => DateInput::Text(other.to_string()),
        }
    }
}

impl From<&str> for DateInput {
    fn from(s: &str) -> Self {
        DateInput::Text(s.to_string())
    }
}

impl From<f64> for DateInput {
    fn from(days: f64) -> Self {
        DateInput::Serial(days)
    }
}

impl fmt::Display for DateInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DateInput::Missing => Ok(()),
            DateInput::Text(s) => f.write_str(s),
            DateInput::Serial(days) => write!(f, "{}", days),
        }
    }
}

/// Parses `raw` and attaches a zone. See the module docs for the fallback order.
pub fn normalize(raw: &DateInput, zone: Option<&str>) -> Result<Instant> {
    let parsed = parse_timestamp(raw)?;
    let zone = match zone.map(str::trim).filter(|z| !z.is_empty()) {
        Some(name) => Some(parse_zone(name)?),
        None => None,
    };
    let instant = resolve_zone(parsed, zone);
    debug!(input = %raw, resolved = %instant, "normalized datetime");
    Ok(instant)
}

/// Runs the fallback chain without any zone handling.
pub fn parse_timestamp(raw: &DateInput) -> Result<Timestamp> {
    let fail = || SeeqError::DateParse {
        input: raw.to_string(),
    };

    let text = match raw {
        DateInput::Missing => return Err(fail()),
        DateInput::Serial(days) => {
            return from_excel_serial(*days)
                .map(Timestamp::Naive)
                .ok_or_else(fail);
        }
        DateInput::Text(text) => text.trim(),
    };
    if text.is_empty() {
        debug!("empty datetime input");
        return Err(fail());
    }

    if let Some(ts) = parse_flexible(text) {
        debug!(input = text, "flexible parsing succeeded");
        return Ok(ts);
    }
    if let Some(naive) = parse_explicit(text) {
        return Ok(Timestamp::Naive(naive));
    }
    if let Some(naive) = text.parse::<f64>().ok().and_then(from_excel_serial) {
        debug!(input = text, "parsed as spreadsheet serial");
        return Ok(Timestamp::Naive(naive));
    }
    if let Some(ts) = parse_natural(text) {
        debug!(input = text, "natural-language parsing succeeded");
        return Ok(ts);
    }

    debug!(input = text, "all datetime parsing methods failed");
    Err(fail())
}

/// Accepts `UTC` (any case) or an IANA zone name such as `America/Chicago`.
pub fn parse_zone(name: &str) -> Result<Zone> {
    if name.eq_ignore_ascii_case("utc") || name.eq_ignore_ascii_case("z") {
        return Ok(Zone::Utc);
    }
    name.parse::<Tz>()
        .map(Zone::Named)
        .map_err(|_| SeeqError::InvalidTimezone {
            zone: name.to_string(),
        })
}

/// Naive values are read as UTC. A requested zone only changes how the instant is displayed.
pub fn resolve_zone(parsed: Timestamp, zone: Option<Zone>) -> Instant {
    let instant = match parsed {
        Timestamp::Naive(naive) => Instant::from_utc(Utc.from_utc_datetime(&naive)),
        Timestamp::Zoned(instant) => instant,
    };
    match (parsed, zone) {
        (_, Some(zone)) => instant.in_zone(zone),
        (Timestamp::Naive(_), None) => instant.in_zone(Zone::Utc),
        (Timestamp::Zoned(_), None) => instant,
    }
}

/// Day-serial counted from 1899-12-30; fractional days are time of day.
pub fn from_excel_serial(days: f64) -> Option<NaiveDateTime> {
    if !days.is_finite() {
        return None;
    }
    let micros = (days * 86_400_000_000.0).round();
    if micros.abs() >= i64::MAX as f64 {
        return None;
    }
    let (year, month, day) = EXCEL_EPOCH;
    let epoch = NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(0, 0, 0)?;
    epoch.checked_add_signed(Duration::microseconds(micros as i64))
}

fn parse_flexible(text: &str) -> Option<Timestamp> {
    if NUMERIC_ONLY.is_match(text) && !BASIC_DATE.is_match(text) {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(Timestamp::Zoned(Instant::from_fixed(dt)));
    }
    for layout in OFFSET_LAYOUTS {
        if let Ok(dt) = DateTime::parse_from_str(text, layout) {
            return Some(Timestamp::Zoned(Instant::from_fixed(dt)));
        }
    }

    let (body, utc) = match text.strip_suffix('Z').or_else(|| text.strip_suffix(" UTC")) {
        Some(body) => (body.trim_end(), true),
        None => (text, false),
    };
    let naive = NAIVE_LAYOUTS
        .iter()
        .find_map(|layout| NaiveDateTime::parse_from_str(body, layout).ok())
        .or_else(|| {
            DATE_LAYOUTS
                .iter()
                .find_map(|layout| NaiveDate::parse_from_str(body, layout).ok())
                .map(|date| date.and_time(NaiveTime::MIN))
        });
    if let Some(naive) = naive {
        return Some(if utc {
            Timestamp::Zoned(Instant::from_utc(Utc.from_utc_datetime(&naive)))
        } else {
            Timestamp::Naive(naive)
        });
    }

    DateTime::parse_from_rfc2822(text)
        .ok()
        .map(|dt| Timestamp::Zoned(Instant::from_fixed(dt)))
}

fn parse_explicit(text: &str) -> Option<NaiveDateTime> {
    EXPLICIT_LAYOUTS.iter().find_map(|(layout, has_time)| {
        let parsed = if *has_time {
            NaiveDateTime::parse_from_str(text, layout).ok()
        } else {
            NaiveDate::parse_from_str(text, layout)
                .ok()
                .map(|date| date.and_time(NaiveTime::MIN))
        };
        match parsed {
            Some(naive) => {
                debug!(input = text, layout, "explicit layout parsing succeeded");
                Some(naive)
            }
            None => None,
        }
    })
}

#[derive(Default)]
struct NaturalParts {
    numbers: Vec<(u32, usize)>,
    month: Option<u32>,
    time: Option<(u32, u32, u32, u32)>,
    meridiem: Option<bool>,
    utc: bool,
}

fn month_from_word(word: &str) -> Option<u32> {
    if word.len() < 3 {
        return None;
    }
    if word == "sept" {
        return Some(9);
    }
    MONTHS
        .iter()
        .position(|month| month.starts_with(word))
        .map(|i| i as u32 + 1)
}

fn is_weekday(word: &str) -> bool {
    word.len() >= 3 && WEEKDAYS.iter().any(|day| day.starts_with(word))
}

fn parse_clock(token: &str) -> Option<(u32, u32, u32, u32)> {
    let mut parts = token.split(':');
    let hour = parts.next()?.parse().ok()?;
    let minute = parts.next()?.parse().ok()?;
    let (second, micros) = match parts.next() {
        Some(sec) => match sec.split_once('.') {
            Some((whole, frac)) => {
                let digits: String = frac.chars().chain(std::iter::repeat('0')).take(6).collect();
                (whole.parse().ok()?, digits.parse().ok()?)
            }
            None => (sec.parse().ok()?, 0),
        },
        None => (0, 0),
    };
    Some((hour, minute, second, micros))
}

fn tokenize_natural(text: &str) -> Option<NaturalParts> {
    let mut parts = NaturalParts::default();
    let mut consumed = 0;

    for caps in NATURAL_TOKEN.captures_iter(text) {
        let whole = caps.get(0)?;
        // Only separators may sit between tokens.
        if text[consumed..whole.start()]
            .chars()
            .any(|c| !(c.is_whitespace() || ",./-".contains(c)))
        {
            return None;
        }
        consumed = whole.end();

        if let Some(time) = caps.name("time") {
            if parts.time.is_some() {
                return None;
            }
            parts.time = Some(parse_clock(time.as_str())?);
        } else if let Some(num) = caps.name("num") {
            let digits = num.as_str();
            parts.numbers.push((digits.parse().ok()?, digits.len()));
        } else if let Some(word) = caps.name("word") {
            let word = word.as_str().to_ascii_lowercase();
            match word.as_str() {
                "am" | "a" => parts.meridiem = Some(false),
                "pm" | "p" => parts.meridiem = Some(true),
                "utc" | "gmt" | "z" => parts.utc = true,
                w if FILLER_WORDS.contains(&w) || is_weekday(w) => {}
                w => {
                    let month = month_from_word(w)?;
                    if parts.month.replace(month).is_some() {
                        return None;
                    }
                }
            }
        }
    }

    if text[consumed..]
        .chars()
        .any(|c| !(c.is_whitespace() || ",./-".contains(c)))
    {
        return None;
    }
    Some(parts)
}

/// Free-text dates such as `September 1, 2025`, `Mon 1st Sep 2025 3:15 pm` or `01.09.2025`.
fn parse_natural(text: &str) -> Option<Timestamp> {
    let mut parts = tokenize_natural(text)?;

    let year_pos = parts.numbers.iter().position(|(_, width)| *width >= 3)?;
    let (year, _) = parts.numbers.remove(year_pos);

    // A bare hour next to am/pm, as in "3pm".
    if parts.time.is_none() && parts.meridiem.is_some() {
        let expected = if parts.month.is_some() { 2 } else { 3 };
        if parts.numbers.len() == expected {
            let (hour, _) = parts.numbers.pop()?;
            parts.time = Some((hour, 0, 0, 0));
        }
    }

    let (month, day) = match (parts.month, parts.numbers.as_slice()) {
        (Some(month), [(day, _)]) => (month, *day),
        (None, [(first, _), (second, _)]) => {
            if year_pos == 0 || *first <= 12 {
                (*first, *second)
            } else {
                (*second, *first)
            }
        }
        _ => return None,
    };

    let (mut hour, minute, second, micros) = parts.time.unwrap_or((0, 0, 0, 0));
    match parts.meridiem {
        Some(true) if hour < 12 => hour += 12,
        Some(false) if hour == 12 => hour = 0,
        Some(_) if hour > 12 => return None,
        _ => {}
    }

    let naive = NaiveDate::from_ymd_opt(i32::try_from(year).ok()?, month, day)?
        .and_hms_micro_opt(hour, minute, second, micros)?;
    Some(if parts.utc {
        Timestamp::Zoned(Instant::from_utc(Utc.from_utc_datetime(&naive)))
    } else {
        Timestamp::Naive(naive)
    })
}
