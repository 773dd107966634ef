use std::path::PathBuf;

use thiserror::Error;

/// Domain failures raised while migrating tickets.
///
/// Plumbing errors (I/O, JSON, transport) travel as `anyhow::Error` with
/// context attached; these variants name the conditions callers branch on or
/// log with a specific message.
#[derive(Error, Debug)]
pub enum MigrateError {
    /// A source value has no entry in the destination mapping table.
    #[error("no {field} mapping for source value '{value}'")]
    UnmappedValue { field: &'static str, value: String },

    /// The remote side answered with a non-success status.
    #[error("server responded {status} [{body}]")]
    Http { status: u16, body: String },

    /// A structured response lacked a field the caller cannot do without.
    #[error("response is missing '{0}'")]
    MissingField(&'static str),

    /// An attachment name that is not a bare file name.
    #[error("attachment name '{0}' is not a plain file name")]
    UnsafeFileName(String),

    /// The per-issue snapshot directory exists from an earlier dump.
    #[error("snapshot directory {} already exists", path.display())]
    AlreadyDumped { path: PathBuf },
}
