// seeq/mod.rs

pub mod client;
pub mod commands;
pub mod datetime;
pub mod envelope;
pub mod error;
pub mod health;
pub mod orchestrator;
pub mod sanitize;
pub mod session;
pub mod types;
pub mod validation;

pub use client::{AnalyticsClient, SeeqClient};
pub use commands::{Operation, Runner};
pub use datetime::{normalize, DateInput};
pub use envelope::Envelope;
pub use error::{Result, SeeqError};
pub use health::ServerProbe;
pub use orchestrator::{Orchestrator, PullOutcome, PullRequest, SearchOutcome, Stage};
pub use sanitize::sanitize;
pub use session::Session;
pub use types::*;
