//! User-facing failures and process exit-code classification.
use thiserror::Error;

use crate::config::ConfigError;

/// Exit code for configuration, validation and API errors.
pub const EXIT_USER_ERROR: i32 = 1;
/// Exit code for anything that is not a [`SyncError`].
pub const EXIT_UNEXPECTED: i32 = 2;

/// Errors the user can act on. Anything else bubbling out of a run is
/// treated as unexpected.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("There is no table specified on the input mapping! You must provide exactly one input table!")]
    NoInputTable,
    #[error("There is more than one table specified on the input mapping ({0} found)! You must provide exactly one input table!")]
    TooManyInputTables(usize),
    #[error("Input table {table} is missing required column '{column}'")]
    MissingColumn { table: String, column: String },
    #[error("Failed to {operation} API. Status Code: {status}, Response: {body}")]
    Api {
        operation: &'static str,
        status: u16,
        body: String,
    },
}

/// Map a run failure to the process exit code.
pub fn exit_code(err: &anyhow::Error) -> i32 {
    if err.downcast_ref::<SyncError>().is_some() {
        EXIT_USER_ERROR
    } else {
        EXIT_UNEXPECTED
    }
}
