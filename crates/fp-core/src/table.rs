use serde::{Deserialize, Serialize};
use std::fmt;

/// Prefix shared by every application-owned entry chain.
pub const ENTRY_PREFIX: &str = "FENCE";

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Table {
    #[default]
    Filter,
    Nat,
    Mangle,
    Raw,
}

/// Packet path stage. Names both the native base chain of a table and the
/// application entry chain hooked into it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Hook {
    Pre,
    In,
    Forward,
    Out,
    Post,
}

impl Table {
    pub const ALL: [Table; 4] = [Table::Filter, Table::Nat, Table::Mangle, Table::Raw];

    pub fn as_str(&self) -> &'static str {
        match self {
            Table::Filter => "filter",
            Table::Nat => "nat",
            Table::Mangle => "mangle",
            Table::Raw => "raw",
        }
    }

    /// Hooks this table carries an entry chain for, in install order.
    pub fn hooks(&self) -> &'static [Hook] {
        match self {
            Table::Filter => &[Hook::In, Hook::Forward, Hook::Out],
            Table::Nat => &[Hook::Pre, Hook::In, Hook::Out, Hook::Post],
            Table::Mangle => &[Hook::Pre, Hook::In, Hook::Forward, Hook::Out, Hook::Post],
            Table::Raw => &[Hook::Pre, Hook::Out],
        }
    }

    pub fn has_hook(&self, hook: Hook) -> bool {
        self.hooks().contains(&hook)
    }
}

impl Hook {
    /// Native chain the kernel ships for this hook.
    pub fn base_chain(&self) -> &'static str {
        match self {
            Hook::Pre => "PREROUTING",
            Hook::In => "INPUT",
            Hook::Forward => "FORWARD",
            Hook::Out => "OUTPUT",
            Hook::Post => "POSTROUTING",
        }
    }

    /// Reserved application entry chain, e.g. `FENCE_in`.
    pub fn entry_chain(&self) -> &'static str {
        match self {
            Hook::Pre => "FENCE_pre",
            Hook::In => "FENCE_in",
            Hook::Forward => "FENCE_for",
            Hook::Out => "FENCE_out",
            Hook::Post => "FENCE_pos",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Hook::Pre => "pre",
            Hook::In => "in",
            Hook::Forward => "forward",
            Hook::Out => "out",
            Hook::Post => "post",
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
