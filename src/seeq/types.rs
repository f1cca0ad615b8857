use chrono::{DateTime, FixedOffset, NaiveDateTime, Offset, TimeZone, Utc};
use chrono_tz::Tz;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;

use crate::constants::{DEFAULT_AUTH_PROVIDER, INDEX_COLUMN, OUTPUT_TIMESTAMP_FORMAT, STORED_SIGNAL};

/// Login material for one server account.
///
/// Never written anywhere; `Debug` output redacts the secret.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub server_url: String,
    pub access_key: String,
    pub secret: String,
    pub auth_provider: String,
    pub ignore_tls: bool,
}

impl Credential {
    pub fn new<T: Into<String>>(server_url: T, access_key: T, secret: T) -> Self {
        Self {
            server_url: server_url.into(),
            access_key: access_key.into(),
            secret: secret.into(),
            auth_provider: DEFAULT_AUTH_PROVIDER.to_string(),
            ignore_tls: false,
        }
    }

    pub fn with_auth_provider<T: Into<String>>(mut self, provider: T) -> Self {
        self.auth_provider = provider.into();
        self
    }

    pub fn with_ignore_tls(mut self, ignore_tls: bool) -> Self {
        self.ignore_tls = ignore_tls;
        self
    }

    /// Server URL without trailing slashes.
    pub fn base_url(&self) -> &str {
        self.server_url.trim_end_matches('/')
    }

    /// True when both credentials would log into the same account the same way.
    pub fn same_account(&self, other: &Credential) -> bool {
        self.base_url() == other.base_url()
            && self.access_key == other.access_key
            && self.secret == other.secret
            && self.auth_provider == other.auth_provider
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("server_url", &self.server_url)
            .field("access_key", &self.access_key)
            .field("secret", &"<redacted>")
            .field("auth_provider", &self.auth_provider)
            .field("ignore_tls", &self.ignore_tls)
            .finish()
    }
}

/// Display zone attached to an instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Zone {
    Utc,
    Named(Tz),
    Fixed(FixedOffset),
}

impl Zone {
    pub fn offset_at(&self, utc: &DateTime<Utc>) -> FixedOffset {
        match self {
            Zone::Utc => utc.offset().fix(),
            Zone::Named(tz) => tz.offset_from_utc_datetime(&utc.naive_utc()).fix(),
            Zone::Fixed(offset) => *offset,
        }
    }
}

impl fmt::Display for Zone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Zone::Utc => write!(f, "UTC"),
            Zone::Named(tz) => write!(f, "{}", tz.name()),
            Zone::Fixed(offset) => write!(f, "{}", offset),
        }
    }
}

/// A point on the absolute timeline plus the zone it is displayed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instant {
    utc: DateTime<Utc>,
    zone: Zone,
}

impl Instant {
    pub fn from_utc(utc: DateTime<Utc>) -> Self {
        Self {
            utc,
            zone: Zone::Utc,
        }
    }

    pub fn from_fixed(local: DateTime<FixedOffset>) -> Self {
        Self {
            utc: local.with_timezone(&Utc),
            zone: Zone::Fixed(*local.offset()),
        }
    }

    /// Same instant, displayed in `zone`.
    pub fn in_zone(self, zone: Zone) -> Self {
        Self { zone, ..self }
    }

    pub fn utc(&self) -> DateTime<Utc> {
        self.utc
    }

    pub fn zone(&self) -> Zone {
        self.zone
    }

    pub fn local(&self) -> DateTime<FixedOffset> {
        self.utc.with_timezone(&self.zone.offset_at(&self.utc))
    }

    pub fn to_rfc3339(&self) -> String {
        self.local().to_rfc3339()
    }
}

impl fmt::Display for Instant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let local = self.local();
        if local.timestamp_subsec_nanos() == 0 {
            write!(f, "{}", local.format("%Y-%m-%d %H:%M:%S%:z"))
        } else {
            write!(f, "{}", local.format("%Y-%m-%d %H:%M:%S%.f%:z"))
        }
    }
}

/// A timestamp as it arrives from a parser or the analytics client.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Timestamp {
    Naive(NaiveDateTime),
    Zoned(Instant),
}

impl Timestamp {
    /// `YYYY-MM-DD HH:MM:SS`, converted to UTC first when a zone is attached.
    pub fn to_output_string(&self) -> String {
        match self {
            Timestamp::Naive(naive) => naive.format(OUTPUT_TIMESTAMP_FORMAT).to_string(),
            Timestamp::Zoned(instant) => instant.utc().format(OUTPUT_TIMESTAMP_FORMAT).to_string(),
        }
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Timestamp::Naive(naive) => write!(f, "{}", naive),
            Timestamp::Zoned(instant) => write!(f, "{}", instant),
        }
    }
}

/// Closed set of values that may flow into the sanitizer and out through an envelope.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Timestamp(Timestamp),
    Mapping(Vec<(String, Value)>),
    Sequence(Vec<Value>),
}

impl Value {
    pub fn mapping<K, I>(entries: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        Value::Mapping(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Looks up a key in a mapping; `None` for other variants.
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Mapping(entries) => entries.iter().find(|(k, _)| k == key).map(|(_, v)| v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_sequence(&self) -> Option<&[Value]> {
        match self {
            Value::Sequence(items) => Some(items),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<u16> for Value {
    fn from(i: u16) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        Value::Int(i64::try_from(n).unwrap_or(i64::MAX))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Timestamp> for Value {
    fn from(ts: Timestamp) -> Self {
        Value::Timestamp(ts)
    }
}

impl From<Instant> for Value {
    fn from(instant: Instant) -> Self {
        Value::Timestamp(Timestamp::Zoned(instant))
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(opt: Option<T>) -> Self {
        opt.map(Into::into).unwrap_or(Value::Null)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::Sequence(items.into_iter().map(Into::into).collect())
    }
}

/// One item returned by a server-side search.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SearchHit {
    #[serde(alias = "ID")]
    pub id: String,
    #[serde(alias = "Name")]
    pub name: String,
    #[serde(rename = "type", alias = "Type", default = "default_item_type")]
    pub item_type: String,
    #[serde(default)]
    pub description: Option<String>,
}

fn default_item_type() -> String {
    STORED_SIGNAL.to_string()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SensorStatus {
    Found,
    NotFound,
    SearchError(String),
}

impl fmt::Display for SensorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SensorStatus::Found => write!(f, "Found"),
            SensorStatus::NotFound => write!(f, "Not Found"),
            SensorStatus::SearchError(message) => write!(f, "Search Error: {}", message),
        }
    }
}

/// Outcome of searching for one requested sensor name.
///
/// `id` is `Some` exactly when `status` is [`SensorStatus::Found`].
#[derive(Debug, Clone, PartialEq)]
pub struct SensorRecord {
    pub name: String,
    pub id: Option<String>,
    pub item_type: String,
    pub original_name: String,
    pub status: SensorStatus,
    pub description: Option<String>,
}

impl SensorRecord {
    pub fn found(hit: SearchHit, original_name: &str) -> Self {
        Self {
            name: hit.name,
            id: Some(hit.id),
            item_type: hit.item_type,
            original_name: original_name.to_string(),
            status: SensorStatus::Found,
            description: hit.description,
        }
    }

    pub fn not_found(original_name: &str) -> Self {
        Self::placeholder(original_name, SensorStatus::NotFound)
    }

    pub fn search_error<T: Into<String>>(original_name: &str, message: T) -> Self {
        Self::placeholder(original_name, SensorStatus::SearchError(message.into()))
    }

    fn placeholder(original_name: &str, status: SensorStatus) -> Self {
        Self {
            name: original_name.to_string(),
            id: None,
            item_type: STORED_SIGNAL.to_string(),
            original_name: original_name.to_string(),
            status,
            description: None,
        }
    }

    pub fn is_found(&self) -> bool {
        self.id.is_some()
    }

    pub fn to_value(&self) -> Value {
        let mut entries = vec![
            ("Name", Value::from(self.name.as_str())),
            ("ID", Value::from(self.id.clone())),
            ("Type", Value::from(self.item_type.as_str())),
            ("Original_Name", Value::from(self.original_name.as_str())),
            ("Status", Value::from(self.status.to_string())),
        ];
        if let Some(description) = &self.description {
            entries.push(("Description", Value::from(description.as_str())));
        }
        Value::mapping(entries)
    }
}

/// Validated sampling interval in the server's unit spelling, e.g. `15min`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grid(pub(crate) String);

impl Grid {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Grid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TimeRange {
    pub start: Instant,
    pub end: Instant,
    pub grid: Grid,
}

/// Pulled samples: one row per index timestamp, one column per sensor.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Table {
    pub index: Vec<Timestamp>,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl Table {
    /// Aligns per-sensor series on the union of their timestamps.
    ///
    /// Cells with no sample at a timestamp are NaN. Index entries are displayed in `zone`.
    pub fn from_series(zone: Zone, series: Vec<(String, Vec<(DateTime<Utc>, Value)>)>) -> Self {
        let width = series.len();
        let mut grid: BTreeMap<DateTime<Utc>, Vec<Value>> = BTreeMap::new();
        let mut columns = Vec::with_capacity(width);

        for (col, (name, samples)) in series.into_iter().enumerate() {
            columns.push(name);
            for (at, value) in samples {
                let row = grid
                    .entry(at)
                    .or_insert_with(|| vec![Value::Float(f64::NAN); width]);
                row[col] = value;
            }
        }

        let mut index = Vec::with_capacity(grid.len());
        let mut rows = Vec::with_capacity(grid.len());
        for (at, row) in grid {
            index.push(Timestamp::Zoned(Instant::from_utc(at).in_zone(zone)));
            rows.push(row);
        }

        Self {
            index,
            columns,
            rows,
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Row records with the index moved into an `index` column.
    pub fn to_records(&self) -> Vec<Value> {
        self.index
            .iter()
            .zip(&self.rows)
            .map(|(at, row)| {
                let mut entries = Vec::with_capacity(row.len() + 1);
                entries.push((INDEX_COLUMN.to_string(), Value::Timestamp(*at)));
                entries.extend(self.columns.iter().cloned().zip(row.iter().cloned()));
                Value::Mapping(entries)
            })
            .collect()
    }

    pub fn index_labels(&self) -> Vec<String> {
        self.index.iter().map(ToString::to_string).collect()
    }
}
