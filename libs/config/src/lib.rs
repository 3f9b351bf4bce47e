//! # VectorLink Centralized Configuration
//!
//! Configuration loading and default values for every VectorLink service,
//! so the generator, the analyser and the launcher agree on endpoints and
//! pacing without duplicating constants.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use vectorlink_config::LinkConfig;
//!
//! let config = LinkConfig::load(None).unwrap();
//! let addr = config.network.socket_addr().unwrap();
//! ```

pub mod service;
pub mod service_config;

// Re-export commonly used types
pub use service_config::{
    AnalyserSettings, GeneratorSettings, LinkConfig, NetworkSettings, ENV_PREFIX,
};
