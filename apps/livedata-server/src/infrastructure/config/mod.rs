//! Configuration
//!
//! Environment-driven settings for the server, its reconciliation loop
//! and the normalization pipeline.

mod settings;

pub use settings::{
    DispatchSettings, LiveDataSettings, ManagerSettings, PipelineSettings,
};
