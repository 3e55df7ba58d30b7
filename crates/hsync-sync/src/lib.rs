//! Reconciliation engine: schema resolution, field mapping, change detection,
//! per-date upserts and run orchestration.

pub mod config;
pub mod detect;
pub mod errors;
pub mod mapper;
pub mod pipeline;
pub mod report;
pub mod scheduler;
pub mod schema;
pub mod upsert;
pub mod window;

pub use config::{GarminCredential, SyncConfig};
pub use detect::{changed_columns, needs_update};
pub use errors::{ConfigError, RunError, SchemaError, SyncError};
pub use mapper::{map_payload, map_record};
pub use pipeline::{ContainerSummary, DateSummary, RunSummary, SyncPipeline};
pub use scheduler::build_scheduler;
pub use schema::{resolve_catalog, SchemaCache};
pub use upsert::{DateResult, UpsertEngine};
pub use window::lookback_window;

pub const CRATE_NAME: &str = "hsync-sync";
