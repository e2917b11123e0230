//! groundloop — a bounded goal loop that opens a fresh engine session per
//! iteration and carries only durable state between them.

pub mod app;
pub mod logging;

pub use app::{build_engine, config_base_dir, App, Overrides};
