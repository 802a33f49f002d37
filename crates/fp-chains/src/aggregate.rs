use crate::group::TableGroup;
use fp_core::error::Result;
use fp_core::{BatchReport, ConsumerConfig, Executor, FirewallError, Hook, RuleSpec, Table};
use std::sync::Arc;

/// Every table's chain group for one consumer (a tunnel, a bridge, ...).
pub struct TableAggregate {
    name: String,
    filter: TableGroup,
    nat: TableGroup,
    mangle: TableGroup,
    raw: TableGroup,
}

impl TableAggregate {
    pub fn new(name: impl Into<String>, executor: Arc<dyn Executor>) -> Self {
        let name = name.into();
        Self {
            filter: TableGroup::filter(&name, executor.clone()),
            nat: TableGroup::nat(&name, executor.clone()),
            mangle: TableGroup::mangle(&name, executor.clone()),
            raw: TableGroup::raw(&name, executor),
            name,
        }
    }

    /// Builds the aggregate and stages the consumer's configured rules.
    pub fn from_config(config: &ConsumerConfig, executor: Arc<dyn Executor>) -> Result<Self> {
        let mut aggregate = Self::new(config.name.clone(), executor);
        for hook_rule in &config.rules {
            let rule = RuleSpec::from(&hook_rule.rule);
            aggregate.add_rule(rule.table, hook_rule.hook, rule)?;
        }
        Ok(aggregate)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn group(&self, table: Table) -> &TableGroup {
        match table {
            Table::Filter => &self.filter,
            Table::Nat => &self.nat,
            Table::Mangle => &self.mangle,
            Table::Raw => &self.raw,
        }
    }

    pub fn group_mut(&mut self, table: Table) -> &mut TableGroup {
        match table {
            Table::Filter => &mut self.filter,
            Table::Nat => &mut self.nat,
            Table::Mangle => &mut self.mangle,
            Table::Raw => &mut self.raw,
        }
    }

    /// Stages a rule in the sub-chain for `hook`. Returns whether it was new.
    pub fn add_rule(&mut self, table: Table, hook: Hook, rule: RuleSpec) -> Result<bool> {
        let chain = self
            .group_mut(table)
            .chain_mut(hook)
            .ok_or(FirewallError::UnknownHook { table, hook })?;
        Ok(chain.add_rule(rule))
    }

    pub fn start(&mut self) -> BatchReport {
        tracing::info!(consumer = %self.name, "installing consumer chains");

        let mut report = BatchReport::new();
        report.merge(self.filter.install());
        report.merge(self.nat.install());
        report.merge(self.mangle.install());
        report.merge(self.raw.install());
        report
    }

    pub fn stop(&mut self) -> BatchReport {
        tracing::info!(consumer = %self.name, "removing consumer chains");

        let mut report = BatchReport::new();
        report.merge(self.raw.cancel());
        report.merge(self.mangle.cancel());
        report.merge(self.nat.cancel());
        report.merge(self.filter.cancel());
        report
    }
}
