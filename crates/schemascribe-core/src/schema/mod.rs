//! Schema extraction: the normalized snapshot model and the connectors
//! that produce it from live databases or dbt project metadata.

pub mod connector;
pub mod dbt;
pub mod duckdb;
pub mod mysql;
pub mod postgres;
pub mod sqlite;
pub mod types;

pub use connector::{extract, Connector};
