//! Core sync types and logic.

pub mod price_point;
pub mod instrument;
pub mod quote;
pub mod normalize;
pub mod rate_limiter;
pub mod convergence;
pub mod checkpoint;
pub mod fetcher;
pub mod writer;
pub mod sync;
pub mod instrument_sync;
pub mod config_validation;
pub mod error;
