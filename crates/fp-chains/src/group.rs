use crate::chain::Chain;
use crate::jump::Jump;
use fp_core::{BatchReport, Executor, Hook, Table};
use std::sync::Arc;

/// One consumer's sub-chains within a single table, plus the jumps that
/// connect each entry chain to them.
///
/// Filter carries In/Forward/Out, NAT Pre/In/Out/Post, Mangle all five hooks
/// and Raw Pre/Out; see [`Table::hooks`].
pub struct TableGroup {
    table: Table,
    chains: Vec<(Hook, Chain)>,
    jump: Jump,
}

impl TableGroup {
    pub fn new(table: Table, consumer: &str, executor: Arc<dyn Executor>) -> Self {
        let chains = table
            .hooks()
            .iter()
            .map(|hook| {
                let chain = Chain::new(consumer, table, hook.entry_chain(), executor.clone());
                (*hook, chain)
            })
            .collect();

        Self {
            table,
            chains,
            jump: Jump::new(executor),
        }
    }

    pub fn filter(consumer: &str, executor: Arc<dyn Executor>) -> Self {
        Self::new(Table::Filter, consumer, executor)
    }

    pub fn nat(consumer: &str, executor: Arc<dyn Executor>) -> Self {
        Self::new(Table::Nat, consumer, executor)
    }

    pub fn mangle(consumer: &str, executor: Arc<dyn Executor>) -> Self {
        Self::new(Table::Mangle, consumer, executor)
    }

    pub fn raw(consumer: &str, executor: Arc<dyn Executor>) -> Self {
        Self::new(Table::Raw, consumer, executor)
    }

    pub fn table(&self) -> Table {
        self.table
    }

    pub fn chain(&self, hook: Hook) -> Option<&Chain> {
        self.chains.iter().find(|(h, _)| *h == hook).map(|(_, c)| c)
    }

    pub fn chain_mut(&mut self, hook: Hook) -> Option<&mut Chain> {
        self.chains
            .iter_mut()
            .find(|(h, _)| *h == hook)
            .map(|(_, c)| c)
    }

    pub fn chains(&self) -> impl Iterator<Item = &Chain> {
        self.chains.iter().map(|(_, c)| c)
    }

    pub fn jump(&self) -> &Jump {
        &self.jump
    }

    /// Installs every sub-chain, then jumps into each of them. A jump is never
    /// inserted before its target exists.
    pub fn install(&mut self) -> BatchReport {
        let mut report = BatchReport::new();

        for (_, chain) in &self.chains {
            report.merge(chain.install());
        }
        for (_, chain) in &self.chains {
            report.merge(self.jump.install(&chain.spec()));
        }

        report
    }

    /// Removes the jumps first; a chain cannot be destroyed while referenced.
    pub fn cancel(&self) -> BatchReport {
        let mut report = self.jump.cancel();

        for (_, chain) in &self.chains {
            report.merge(chain.cancel());
        }

        report
    }
}
