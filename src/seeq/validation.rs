// validation.rs

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value as JsonValue;
use std::str::FromStr;
use url::Url;

use crate::error::AppError;
use crate::seeq::datetime::DateInput;
use crate::seeq::error::{Result, SeeqError};
use crate::seeq::types::{Credential, Grid};

// Static Patterns
static GRID_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(\d+)?\s*([A-Za-z]+)\s*$").expect("Failed to compile grid regex")
});

const TRUTHY: [&str; 4] = ["true", "1", "yes", "on"];

/// Loose host flags: `true`, `1`, `yes`, `on` (any case) and non-zero numbers are true.
pub fn coerce_bool(value: &JsonValue) -> bool {
    match value {
        JsonValue::Bool(b) => *b,
        JsonValue::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        JsonValue::String(s) => {
            let s = s.trim().to_ascii_lowercase();
            TRUTHY.contains(&s.as_str())
        }
        _ => false,
    }
}

fn canonical_unit(unit: &str) -> Option<&'static str> {
    let unit = match unit {
        "T" => return Some("min"),
        "H" => return Some("h"),
        "D" => return Some("d"),
        "W" => return Some("w"),
        "S" => return Some("s"),
        other => other.to_ascii_lowercase(),
    };
    match unit.as_str() {
        "ms" | "msec" | "millisecond" | "milliseconds" => Some("ms"),
        "s" | "sec" | "secs" | "second" | "seconds" => Some("s"),
        "min" | "mins" | "minute" | "minutes" => Some("min"),
        "h" | "hr" | "hrs" | "hour" | "hours" => Some("h"),
        "d" | "day" | "days" => Some("d"),
        "w" | "wk" | "week" | "weeks" => Some("w"),
        _ => None,
    }
}

impl FromStr for Grid {
    type Err = SeeqError;

    /// Accepts `15min`, `1h`, `30s`, `1d` and the pandas spellings `15T`, `1H`, `1D`.
    fn from_str(s: &str) -> Result<Self> {
        let invalid = || SeeqError::InvalidGrid {
            grid: s.to_string(),
        };
        let caps = GRID_REGEX.captures(s).ok_or_else(invalid)?;
        let count = match caps.get(1) {
            Some(digits) => digits.as_str().parse::<u64>().map_err(|_| invalid())?,
            None => 1,
        };
        if count == 0 {
            return Err(invalid());
        }
        let unit = caps
            .get(2)
            .and_then(|unit| canonical_unit(unit.as_str()))
            .ok_or_else(invalid)?;
        Ok(Grid(format!("{}{}", count, unit)))
    }
}

#[derive(Debug, Clone)]
pub struct Validator;

impl Validator {
    /// Trims requested names and drops blank ones; an empty result is an error.
    pub fn sensor_names(names: &[String]) -> Result<Vec<String>> {
        let names: Vec<String> = names
            .iter()
            .map(|name| name.trim())
            .filter(|name| !name.is_empty())
            .map(String::from)
            .collect();
        if names.is_empty() {
            return Err(SeeqError::NoSensorsRequested);
        }
        Ok(names)
    }

    pub fn grid(raw: Option<&str>) -> Result<Grid> {
        match raw.map(str::trim).filter(|g| !g.is_empty()) {
            Some(raw) => raw.parse(),
            None => Ok(Grid(crate::constants::DEFAULT_GRID.to_string())),
        }
    }

    /// Base URL with a trailing slash so relative API paths join beneath it.
    pub fn server_url(raw: &str) -> Result<Url> {
        let mut base = raw.trim().trim_end_matches('/').to_string();
        base.push('/');
        Ok(Url::parse(&base)?)
    }
}

/// Positional JSON arguments for one operation.
#[derive(Debug, Clone, Default)]
pub struct ArgList {
    values: Vec<JsonValue>,
}

impl ArgList {
    pub fn parse(raw: &str) -> std::result::Result<Self, AppError> {
        let values: Vec<JsonValue> = serde_json::from_str(raw)?;
        Ok(Self { values })
    }

    pub fn from_values(values: Vec<JsonValue>) -> Self {
        Self { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Missing trailing arguments and explicit nulls read the same.
    fn get(&self, index: usize) -> Option<&JsonValue> {
        self.values.get(index).filter(|v| !v.is_null())
    }

    pub fn expect_at_most(&self, max: usize, operation: &str) -> std::result::Result<(), AppError> {
        if self.values.len() > max {
            return Err(AppError::invalid_argument(
                "args",
                format!(
                    "{} takes at most {} arguments, got {}",
                    operation,
                    max,
                    self.values.len()
                ),
            ));
        }
        Ok(())
    }

    pub fn required_str(&self, index: usize, name: &'static str) -> std::result::Result<String, AppError> {
        match self.get(index) {
            Some(JsonValue::String(s)) => Ok(s.clone()),
            Some(other) => Err(AppError::invalid_argument(
                name,
                format!("expected a string, got {}", other),
            )),
            None => Err(AppError::invalid_argument(name, "missing required argument")),
        }
    }

    /// Blank strings count as absent.
    pub fn optional_str(&self, index: usize, name: &'static str) -> std::result::Result<Option<String>, AppError> {
        match self.get(index) {
            Some(JsonValue::String(s)) if s.trim().is_empty() => Ok(None),
            Some(JsonValue::String(s)) => Ok(Some(s.clone())),
            Some(other) => Err(AppError::invalid_argument(
                name,
                format!("expected a string, got {}", other),
            )),
            None => Ok(None),
        }
    }

    /// A JSON array of names. Numbers are accepted and rendered as text.
    pub fn string_list(&self, index: usize, name: &'static str) -> std::result::Result<Vec<String>, AppError> {
        let items = match self.get(index) {
            Some(JsonValue::Array(items)) => items,
            Some(other) => {
                return Err(AppError::invalid_argument(
                    name,
                    format!("expected an array, got {}", other),
                ))
            }
            None => return Err(AppError::invalid_argument(name, "missing required argument")),
        };
        items
            .iter()
            .map(|item| match item {
                JsonValue::String(s) => Ok(s.clone()),
                JsonValue::Number(n) => Ok(n.to_string()),
                other => Err(AppError::invalid_argument(
                    name,
                    format!("expected string items, got {}", other),
                )),
            })
            .collect()
    }

    pub fn date(&self, index: usize) -> DateInput {
        self.get(index)
            .map(DateInput::from_json)
            .unwrap_or(DateInput::Missing)
    }

    pub fn flag(&self, index: usize) -> bool {
        self.get(index).map(coerce_bool).unwrap_or(false)
    }

    /// Reads `url, accessKey, secret, authProvider?, ignoreTls?` starting at `index`.
    ///
    /// Returns `None` unless url, key and secret are all present.
    pub fn credential(&self, index: usize) -> std::result::Result<Option<Credential>, AppError> {
        let url = self.optional_str(index, "url")?;
        let key = self.optional_str(index + 1, "accessKey")?;
        let secret = self.optional_str(index + 2, "secret")?;
        let provider = self.optional_str(index + 3, "authProvider")?;
        let ignore_tls = self.flag(index + 4);

        Ok(match (url, key, secret) {
            (Some(url), Some(key), Some(secret)) => {
                let mut credential = Credential::new(url, key, secret).with_ignore_tls(ignore_tls);
                if let Some(provider) = provider {
                    credential = credential.with_auth_provider(provider);
                }
                Some(credential)
            }
            _ => None,
        })
    }
}
