pub mod config;
pub mod error;
pub mod fetcher;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod pipeline;
pub mod proto;
pub mod report;
pub mod reshape;
pub mod table;

pub use error::{ReportError, Result};
