pub mod config;
pub mod core;
pub mod dispatch;
pub mod error;
pub mod log;
pub mod orchestration;

pub use config::Config;
pub use crate::core::{CorrelatedResult, CorrelationRegistry, CorrelationToken, CreationRequest, Person};
pub use error::{Error, Result};
