// src/config/mod.rs
pub mod sources;

pub use sources::{load_config_default, load_config_from, DigestConfig, RunSettings, SourceConfig};
