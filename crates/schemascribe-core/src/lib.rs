pub mod catalog;
pub mod config;
pub mod error;
pub mod llm;
pub mod output;
pub mod registry;
pub mod render;
pub mod schema;
pub mod workflow;

// Re-export key types for convenience
pub use catalog::{
    CatalogGenerator, CatalogRun, CatalogState, ColumnFailure, GeneratorOptions, TableFailure,
};
pub use config::{ConnectionProfile, LlmProfile, ScribeConfig};
pub use error::{Result, ScribeError};
pub use registry::Registry;
pub use schema::types::{ColumnInfo, Description, SchemaSnapshot, SourceKind, TableInfo};
pub use workflow::{CatalogOutput, DbtMode, Workflow};
