use fp_core::{
    BatchReport, ChainSpec, Directive, Executor, FirewallError, RuleOp, RuleRegistry, RuleSpec,
};
use std::sync::Arc;

/// Insert-rules routing traffic from parent chains into their children.
///
/// Only rules that were actually installed are recorded, so a cancel never
/// tries to remove a jump that failed to go in.
pub struct Jump {
    rules: RuleRegistry,
    executor: Arc<dyn Executor>,
}

impl Jump {
    pub fn new(executor: Arc<dyn Executor>) -> Self {
        Self {
            rules: RuleRegistry::new(),
            executor,
        }
    }

    pub fn rules(&self) -> &RuleRegistry {
        &self.rules
    }

    /// Inserts a jump from `target`'s parent into `target`.
    pub fn install(&mut self, target: &ChainSpec) -> BatchReport {
        let mut report = BatchReport::new();

        let rule = RuleSpec::new(target.table, target.parent.clone().unwrap_or_default())
            .with_order(RuleOp::Insert)
            .with_jump(target.name.clone());
        let directive = Directive::Rule(RuleOp::Insert, rule.clone());

        if target.parent.is_none() {
            let err = FirewallError::MissingParent {
                chain: target.name.clone(),
            };
            tracing::error!(chain = %target.name, "jump.install: {}", err);
            report.record_failure(directive, err.to_string());
            return report;
        }

        if report.apply(self.executor.as_ref(), directive, "jump.install") {
            self.rules.add(rule);
        }

        report
    }

    /// Deletes every recorded jump. The record is kept as-is.
    pub fn cancel(&self) -> BatchReport {
        let mut report = BatchReport::new();

        for rule in &self.rules {
            report.apply(
                self.executor.as_ref(),
                Directive::Rule(RuleOp::Delete, rule.clone()),
                "jump.cancel",
            );
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fp_core::{MemoryExecutor, Table};

    fn target(name: &str) -> ChainSpec {
        ChainSpec::new(Table::Filter, format!("FENCE_in-{}", name)).with_parent("FENCE_in")
    }

    #[test]
    fn install_inserts_into_parent() {
        let fw = Arc::new(MemoryExecutor::new());
        for name in ["FENCE_in", "FENCE_in-vpn0"] {
            fw.apply(&Directive::CreateChain(ChainSpec::new(Table::Filter, name)))
                .unwrap();
        }

        let mut jump = Jump::new(fw.clone());
        assert!(jump.install(&target("vpn0")).is_clean());

        let rule = &jump.rules().as_slice()[0];
        assert_eq!(rule.order, Some(RuleOp::Insert));
        assert_eq!(rule.chain, "FENCE_in");
        assert_eq!(rule.jump.as_deref(), Some("FENCE_in-vpn0"));
        assert_eq!(fw.rules(Table::Filter, "FENCE_in").unwrap().len(), 1);
    }

    #[test]
    fn failed_install_is_not_recorded() {
        let fw = Arc::new(MemoryExecutor::new());
        let mut jump = Jump::new(fw.clone());

        // Neither chain exists, so the executor rejects the insert.
        let report = jump.install(&target("vpn0"));
        assert_eq!(report.failures.len(), 1);
        assert!(jump.rules().is_empty());

        fw.clear_journal();
        assert!(jump.cancel().is_clean());
        assert!(fw.journal().is_empty());
    }

    #[test]
    fn target_without_parent_never_reaches_executor() {
        let fw = Arc::new(MemoryExecutor::new());
        let mut jump = Jump::new(fw.clone());

        let report = jump.install(&ChainSpec::new(Table::Raw, "orphan"));
        assert_eq!(report.failures.len(), 1);
        assert!(fw.journal().is_empty());
    }

    #[test]
    fn cancel_keeps_record_when_delete_fails() {
        let fw = Arc::new(MemoryExecutor::new());
        for name in ["FENCE_in", "FENCE_in-a", "FENCE_in-b"] {
            fw.apply(&Directive::CreateChain(ChainSpec::new(Table::Filter, name)))
                .unwrap();
        }
        let mut jump = Jump::new(fw.clone());
        jump.install(&target("a"));
        jump.install(&target("b"));

        fw.flush();
        let report = jump.cancel();
        assert_eq!(report.failures.len(), 2);
        assert_eq!(jump.rules().len(), 2);
    }
}
