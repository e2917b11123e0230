//! groundloop core - state, config, loop types, and error handling

pub mod config;
pub mod error;
pub mod state;
pub mod types;

pub use config::LoopConfig;
pub use error::{Error, Result};
pub use state::{DurableState, StateStore};
pub use types::*;
