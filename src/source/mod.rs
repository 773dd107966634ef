//! Export side: Redmine issues to on-disk snapshots.

pub mod html;
pub mod importer;
pub mod item;
