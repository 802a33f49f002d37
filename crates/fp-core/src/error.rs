use crate::table::{Hook, Table};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FirewallError {
    /// The executor rejected a directive
    #[error("`{directive}` failed: {message}")]
    Exec { directive: String, message: String },

    /// The firewall binary could not be started
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("table {table} has no {hook} chain")]
    UnknownHook { table: Table, hook: Hook },

    #[error("chain {chain} has no parent to jump from")]
    MissingParent { chain: String },
}

pub type Result<T, E = FirewallError> = std::result::Result<T, E>;
