pub mod constants;
pub mod error;
pub mod seeq;
pub mod types;

pub use error::AppError;
pub use seeq::{Envelope, Runner, SeeqClient, SeeqError};
pub use types::Config;
