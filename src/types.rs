use std::time::Duration;

use crate::constants::{DEFAULT_PROBE_TIMEOUT, DEFAULT_SEARCH_LIMIT, DEFAULT_TIMEOUT};

#[derive(Debug, Clone)]
pub struct Config {
    pub timeout_secs: u64,
    pub probe_timeout_secs: u64,
    pub search_limit: usize,
}

impl Config {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_TIMEOUT.as_secs(),
            probe_timeout_secs: DEFAULT_PROBE_TIMEOUT.as_secs(),
            search_limit: DEFAULT_SEARCH_LIMIT,
        }
    }
}
