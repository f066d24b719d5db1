// Error taxonomy
pub mod error;

// TOML + environment configuration
pub mod config;

// Asset ids and topic resolution
pub mod topic;

// Wire payload parsing and field-name normalization
pub mod telemetry;

// Canonical state, diffing and the state store
pub mod state;

// Broker transports, backoff and connection management
pub mod broker;

// Persister/Renderer traits and the reconciliation coordinator
pub mod reconcile;

// HTTP persistence and initial snapshot loading
pub mod persist;

// Display adapters
pub mod display;

// Engine wiring
pub mod engine;

pub use engine::TelemetryEngine;
pub use error::EngineError;
