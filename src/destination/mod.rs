//! Import side: on-disk snapshots to Azure DevOps work items.

pub mod exporter;
pub mod item;
pub mod store;
pub mod text;
