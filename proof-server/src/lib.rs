// Library entry point for the proof server
// Exposes core modules for testing and external use

pub mod calldata;
pub mod circuit;
pub mod config;
pub mod error;
pub mod routes;
pub mod services;
pub mod state;
pub mod types;

// Re-export commonly used items
pub use error::PipelineError;
pub use services::orchestrator;
pub use services::prover;
