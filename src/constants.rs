use std::time::Duration;

// Server defaults
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_SEARCH_LIMIT: usize = 1000;
pub const DEFAULT_AUTH_PROVIDER: &str = "Seeq";
pub const DEFAULT_GRID: &str = "15min";

// REST surface
pub const LOGIN_PATH: &str = "api/auth/login";
pub const ITEMS_PATH: &str = "api/items";
pub const STATUS_PATH: &str = "api/status";
pub const AUTH_HEADER: &str = "x-sq-auth";
pub const AUTH_PROVIDER_CLASS: &str = "Auth";
pub const STORED_SIGNAL: &str = "StoredSignal";

// Spreadsheet day-serial epoch (1899-12-30 keeps the 1900 leap-day quirk)
pub const EXCEL_EPOCH: (i32, u32, u32) = (1899, 12, 30);

/// Fixed textual format for every timestamp leaving the sanitizer.
pub const OUTPUT_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Column name given to the pulled table's timestamp index.
pub const INDEX_COLUMN: &str = "index";

pub const SUPPORTED_DATETIME_FORMATS: [&str; 4] = [
    "Excel dates: 9/1/2025, 9/1/2025 12:00:00 PM",
    "ISO format: 2025-09-01T00:00:00Z",
    "Standard formats: 09/01/2025, 2025-09-01",
    "Excel serial numbers: 45292.5",
];
