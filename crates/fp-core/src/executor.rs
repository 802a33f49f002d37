use crate::error::Result;
use crate::rule::Directive;

/// Applies chain and rule directives to a packet filter.
///
/// Calls are synchronous and may block on an external process. Every call is
/// independent: the executor keeps no transaction across directives.
pub trait Executor: Send + Sync {
    /// One-time setup before the first directive.
    fn init(&self) -> Result<()> {
        Ok(())
    }

    fn apply(&self, directive: &Directive) -> Result<()>;
}

