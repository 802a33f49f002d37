use crate::executor::Executor;
use crate::rule::Directive;
use serde::{Deserialize, Serialize};

/// Outcome of a best-effort batch: every directive is attempted, failures are
/// collected instead of aborting.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchReport {
    pub applied: usize,
    pub failures: Vec<Failure>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Failure {
    pub directive: Directive,
    pub error: String,
}

impl BatchReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs one directive and folds its outcome into the report.
    /// Returns whether it succeeded.
    pub fn apply(&mut self, executor: &dyn Executor, directive: Directive, context: &str) -> bool {
        match executor.apply(&directive) {
            Ok(()) => {
                self.applied += 1;
                true
            }
            Err(e) => {
                tracing::warn!(context, %directive, error = %e, "directive failed");
                self.record_failure(directive, e.to_string());
                false
            }
        }
    }

    pub fn record_failure(&mut self, directive: Directive, error: impl Into<String>) {
        self.failures.push(Failure {
            directive,
            error: error.into(),
        });
    }

    pub fn merge(&mut self, other: BatchReport) {
        self.applied += other.applied;
        self.failures.extend(other.failures);
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn attempted(&self) -> usize {
        self.applied + self.failures.len()
    }

    pub fn display(&self) {
        if self.is_clean() {
            println!("✅ {} directives applied", self.applied);
            return;
        }

        println!(
            "⚠️  {} applied, {} failed:",
            self.applied,
            self.failures.len()
        );
        for (i, failure) in self.failures.iter().enumerate() {
            println!("  {}. {}", i + 1, failure.directive);
            println!("     {}", failure.error);
        }
    }
}
