use fp_core::{BatchReport, ChainSpec, Directive, Executor, RuleOp, RuleRegistry, RuleSpec, Table};
use std::sync::Arc;

/// A consumer's sub-chain hanging off one entry chain.
///
/// The chain owns the addressing of its rules: whatever table or chain a rule
/// was built with, it is rewritten to this chain on `add_rule`.
pub struct Chain {
    name: String,
    parent: String,
    table: Table,
    rules: RuleRegistry,
    executor: Arc<dyn Executor>,
}

impl Chain {
    pub fn new(
        name: impl Into<String>,
        table: Table,
        parent: impl Into<String>,
        executor: Arc<dyn Executor>,
    ) -> Self {
        Self {
            name: name.into(),
            parent: parent.into(),
            table,
            rules: RuleRegistry::new(),
            executor,
        }
    }

    /// Live identity: `<parent>-<name>` in this chain's table.
    pub fn spec(&self) -> ChainSpec {
        ChainSpec::new(self.table, format!("{}-{}", self.parent, self.name))
            .with_parent(self.parent.clone())
    }

    pub fn add_rule(&mut self, mut rule: RuleSpec) -> bool {
        rule.table = self.table;
        rule.chain = self.spec().name;
        self.rules.add(rule)
    }

    pub fn rules(&self) -> &RuleRegistry {
        &self.rules
    }

    /// Creates the chain, then applies every rule in insertion order.
    pub fn install(&self) -> BatchReport {
        let mut report = BatchReport::new();
        let executor = self.executor.as_ref();

        report.apply(executor, Directive::CreateChain(self.spec()), "chain.install");
        for rule in &self.rules {
            report.apply(
                executor,
                Directive::Rule(rule.install_op(), rule.clone()),
                "chain.install",
            );
        }

        report
    }

    /// Deletes every rule in insertion order, then destroys the chain.
    pub fn cancel(&self) -> BatchReport {
        let mut report = BatchReport::new();
        let executor = self.executor.as_ref();

        for rule in &self.rules {
            report.apply(
                executor,
                Directive::Rule(RuleOp::Delete, rule.clone()),
                "chain.cancel",
            );
        }
        report.apply(executor, Directive::DestroyChain(self.spec()), "chain.cancel");

        report
    }
}
