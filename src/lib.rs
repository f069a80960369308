// src/lib.rs
pub mod cancel;
pub mod classify;
pub mod cli;
pub mod config;
pub mod engine;
pub mod enumerator;
pub mod error;
pub mod geo;
pub mod map;
pub mod output;
pub mod progress;
pub mod resolver;
pub mod retry;
pub mod session;
pub mod sources;
pub mod types;
pub mod utils;

pub use cancel::{CancelHandle, CancelSignal};
pub use cli::Args;
pub use engine::ReconEngine;
pub use types::{AggregatedRecord, Config, ReconMapError, ReconOutcome, ReconReport, RiskTier};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
