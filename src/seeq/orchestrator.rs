// orchestrator.rs

use futures::future::join_all;
use std::collections::HashSet;
use std::fmt;
use tracing::{debug, info, warn};

use crate::constants::STORED_SIGNAL;
use crate::seeq::client::AnalyticsClient;
use crate::seeq::datetime::{normalize, DateInput};
use crate::seeq::envelope::records_to_value;
use crate::seeq::error::{Result, SeeqError};
use crate::seeq::sanitize::sanitize;
use crate::seeq::session::Session;
use crate::seeq::types::{Credential, SensorRecord, TimeRange, Value};
use crate::seeq::validation::Validator;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Unauthenticated,
    Authenticating,
    SearchingSensors,
    PullingData,
    Sanitizing,
    Done,
    Error,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Unauthenticated => "unauthenticated",
            Stage::Authenticating => "authenticating",
            Stage::SearchingSensors => "searching_sensors",
            Stage::PullingData => "pulling_data",
            Stage::Sanitizing => "sanitizing",
            Stage::Done => "done",
            Stage::Error => "error",
        };
        f.write_str(name)
    }
}

/// Arguments of a search-and-pull request, before any validation.
#[derive(Debug, Clone)]
pub struct PullRequest {
    pub sensor_names: Vec<String>,
    pub start: DateInput,
    pub end: DateInput,
    pub grid: Option<String>,
    pub timezone: Option<String>,
    pub credential: Option<Credential>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchOutcome {
    pub search_results: Value,
    pub sensor_count: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PullOutcome {
    pub search_results: Value,
    pub data: Value,
    pub data_columns: Vec<String>,
    pub data_index: Vec<String>,
    pub sensor_count: usize,
    pub time_range: String,
}

/// Runs one search against the client per requested name, in request order.
///
/// Failures and empty results become placeholder records instead of aborting the batch.
pub async fn search_sensors<C>(client: &C, names: &[String]) -> Vec<SensorRecord>
where
    C: AnalyticsClient + ?Sized,
{
    let searches = names.iter().map(|name| client.search(name, STORED_SIGNAL));
    let results = join_all(searches).await;

    names
        .iter()
        .zip(results)
        .flat_map(|(name, result)| match result {
            Ok(hits) if hits.is_empty() => {
                debug!(sensor = %name, "sensor not found");
                vec![SensorRecord::not_found(name)]
            }
            Ok(hits) => hits
                .into_iter()
                .map(|hit| SensorRecord::found(hit, name))
                .collect(),
            Err(e) => {
                warn!(sensor = %name, error = %e, "search failed");
                vec![SensorRecord::search_error(name, e.to_string())]
            }
        })
        .collect()
}

/// Found records with one entry per requested name, keeping the first hit.
///
/// Returns the kept records and how many duplicates were dropped.
pub fn dedup_by_original_name(records: &[SensorRecord]) -> (Vec<SensorRecord>, usize) {
    let mut seen = HashSet::new();
    let mut removed = 0;
    let mut kept = Vec::new();
    for record in records.iter().filter(|r| r.is_found()) {
        if seen.insert(record.original_name.as_str()) {
            kept.push(record.clone());
        } else {
            removed += 1;
        }
    }
    (kept, removed)
}

fn records_value(records: &[SensorRecord]) -> Value {
    sanitize(records_to_value(records))
}

/// Sequences authentication, search, pull and sanitization for one operation.
pub struct Orchestrator<'a, C: AnalyticsClient + ?Sized> {
    client: &'a C,
    session: &'a mut Session,
    stage: Stage,
}

impl<'a, C: AnalyticsClient + ?Sized> Orchestrator<'a, C> {
    pub fn new(client: &'a C, session: &'a mut Session) -> Self {
        Self {
            client,
            session,
            stage: Stage::Unauthenticated,
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    fn enter(&mut self, stage: Stage) {
        debug!(from = %self.stage, to = %stage, "stage transition");
        self.stage = stage;
    }

    fn fail(&mut self, err: SeeqError) -> SeeqError {
        self.enter(Stage::Error);
        err
    }

    async fn authenticate(&mut self, credential: Option<Credential>) -> Result<()> {
        if self.session.is_authenticated() && credential.is_none() {
            return Ok(());
        }
        self.enter(Stage::Authenticating);
        let result = self.session.ensure(self.client, credential).await.map(|_| ());
        result.map_err(|e| self.fail(e))
    }

    pub async fn search_only(
        &mut self,
        names: &[String],
        credential: Option<Credential>,
    ) -> Result<SearchOutcome> {
        let names = Validator::sensor_names(names).map_err(|e| self.fail(e))?;
        self.authenticate(credential).await?;

        self.enter(Stage::SearchingSensors);
        let records = search_sensors(self.client, &names).await;
        if records.is_empty() {
            return Err(self.fail(SeeqError::NoResults));
        }

        self.enter(Stage::Sanitizing);
        let outcome = SearchOutcome {
            search_results: records_value(&records),
            sensor_count: names.len(),
        };
        self.enter(Stage::Done);
        info!(requested = names.len(), records = records.len(), "search complete");
        Ok(outcome)
    }

    pub async fn search_and_pull(&mut self, request: PullRequest) -> Result<PullOutcome> {
        let PullRequest {
            sensor_names,
            start,
            end,
            grid,
            timezone,
            credential,
        } = request;

        let names = Validator::sensor_names(&sensor_names).map_err(|e| self.fail(e))?;
        let zone = timezone.as_deref();
        let start_at = normalize(&start, zone).map_err(|e| self.fail(e))?;
        let end_at = normalize(&end, zone).map_err(|e| self.fail(e))?;
        let grid = Validator::grid(grid.as_deref()).map_err(|e| self.fail(e))?;
        if end_at.utc() < start_at.utc() {
            debug!(start = %start_at, end = %end_at, "end precedes start; passing through");
        }

        self.authenticate(credential).await?;

        self.enter(Stage::SearchingSensors);
        let records = search_sensors(self.client, &names).await;
        if records.is_empty() {
            return Err(self.fail(SeeqError::NoResults));
        }

        let (found, removed) = dedup_by_original_name(&records);
        if removed > 0 {
            info!(removed, "removed duplicate sensor matches");
        }
        if found.is_empty() {
            return Err(self.fail(SeeqError::NoValidSensors { records }));
        }

        self.enter(Stage::PullingData);
        let range = TimeRange {
            start: start_at,
            end: end_at,
            grid,
        };
        let table = match self.client.pull(&found, &range).await {
            Ok(table) => table,
            Err(e) => {
                return Err(self.fail(SeeqError::PullFailed {
                    message: e.to_string(),
                    records,
                }))
            }
        };

        self.enter(Stage::Sanitizing);
        let outcome = PullOutcome {
            search_results: records_value(&records),
            data: sanitize(Value::Sequence(table.to_records())),
            data_columns: table.columns.clone(),
            data_index: table.index_labels(),
            sensor_count: found.len(),
            time_range: format!("{} to {}", start, end),
        };
        self.enter(Stage::Done);
        info!(
            sensors = found.len(),
            rows = table.len(),
            "search and pull complete"
        );
        Ok(outcome)
    }
}
