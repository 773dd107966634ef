pub mod mapping;
pub mod patch;
pub mod snapshot;
