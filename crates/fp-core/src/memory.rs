use crate::error::{FirewallError, Result};
use crate::executor::Executor;
use crate::rule::{ChainSpec, Directive, RuleOp, RuleSpec};
use crate::table::Table;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Targets the kernel resolves without a chain of that name.
const BUILTIN_TARGETS: &[&str] = &[
    "ACCEPT",
    "DROP",
    "REJECT",
    "RETURN",
    "LOG",
    "MASQUERADE",
    "SNAT",
    "DNAT",
    "REDIRECT",
    "MARK",
    "CONNMARK",
    "TCPMSS",
    "NOTRACK",
    "CT",
    "TPROXY",
    "NFQUEUE",
];

pub type LiveRules = BTreeMap<(Table, String), Vec<RuleSpec>>;

type FailWhen = Box<dyn Fn(&Directive) -> bool + Send + Sync>;

/// In-memory model of a host packet filter.
///
/// Enforces the same ordering constraints the kernel does: a rule cannot jump
/// to a missing chain, and a chain cannot be destroyed while it holds rules or
/// is referenced. Every attempted directive is journaled, failed or not.
pub struct MemoryExecutor {
    state: Mutex<State>,
    fail_when: Option<FailWhen>,
}

#[derive(Default)]
struct State {
    chains: LiveRules,
    journal: Vec<Directive>,
    initialized: bool,
}

impl MemoryExecutor {
    pub fn new() -> Self {
        let mut chains = LiveRules::new();
        for table in Table::ALL {
            for hook in table.hooks() {
                chains.insert((table, hook.base_chain().to_string()), Vec::new());
            }
        }

        Self {
            state: Mutex::new(State {
                chains,
                ..Default::default()
            }),
            fail_when: None,
        }
    }

    /// Rejects every directive matching `pred` before it touches the model.
    pub fn fail_when<F>(mut self, pred: F) -> Self
    where
        F: Fn(&Directive) -> bool + Send + Sync + 'static,
    {
        self.fail_when = Some(Box::new(pred));
        self
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn journal(&self) -> Vec<Directive> {
        self.state().journal.clone()
    }

    pub fn clear_journal(&self) {
        self.state().journal.clear();
    }

    pub fn is_initialized(&self) -> bool {
        self.state().initialized
    }

    pub fn has_chain(&self, table: Table, name: &str) -> bool {
        self.state().chains.contains_key(&(table, name.to_string()))
    }

    pub fn rules(&self, table: Table, chain: &str) -> Option<Vec<RuleSpec>> {
        self.state().chains.get(&(table, chain.to_string())).cloned()
    }

    /// Every chain and its rules, as the kernel would list them.
    pub fn snapshot(&self) -> LiveRules {
        self.state().chains.clone()
    }

    /// User-defined chains, sorted by table then name.
    pub fn custom_chains(&self) -> Vec<ChainSpec> {
        self.state()
            .chains
            .keys()
            .filter(|(table, name)| !is_base_chain(*table, name))
            .map(|(table, name)| ChainSpec::new(*table, name.clone()))
            .collect()
    }

    /// Drops every user-defined chain and every rule, the way an external
    /// firewall reload does.
    pub fn flush(&self) {
        let mut state = self.state();
        state
            .chains
            .retain(|(table, name), _| is_base_chain(*table, name));
        for rules in state.chains.values_mut() {
            rules.clear();
        }
    }
}

impl Default for MemoryExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl Executor for MemoryExecutor {
    fn init(&self) -> Result<()> {
        self.state().initialized = true;
        Ok(())
    }

    fn apply(&self, directive: &Directive) -> Result<()> {
        let mut state = self.state();
        state.journal.push(directive.clone());

        if self.fail_when.as_ref().is_some_and(|pred| pred(directive)) {
            return Err(rejected(directive, "injected failure"));
        }

        match directive {
            Directive::CreateChain(chain) => {
                let key = (chain.table, chain.name.clone());
                if state.chains.contains_key(&key) {
                    return Err(rejected(directive, "Chain already exists"));
                }
                state.chains.insert(key, Vec::new());
            }
            Directive::DestroyChain(chain) => {
                if is_base_chain(chain.table, &chain.name) {
                    return Err(rejected(directive, "Can't delete built-in chain"));
                }
                let key = (chain.table, chain.name.clone());
                match state.chains.get(&key) {
                    None => return Err(rejected(directive, "No chain/target/match by that name")),
                    Some(rules) if !rules.is_empty() => {
                        return Err(rejected(directive, "Directory not empty"));
                    }
                    Some(_) => {}
                }
                if is_referenced(&state.chains, chain.table, &chain.name) {
                    return Err(rejected(directive, "Too many links"));
                }
                state.chains.remove(&key);
            }
            Directive::Rule(op, rule) => {
                let live = RuleSpec {
                    order: None,
                    ..rule.clone()
                };
                if let Some(target) = &live.jump {
                    let resolvable = BUILTIN_TARGETS.contains(&target.as_str())
                        || state.chains.contains_key(&(live.table, target.clone()));
                    if !resolvable && *op != RuleOp::Delete {
                        return Err(rejected(directive, "No chain/target/match by that name"));
                    }
                }

                let rules = state
                    .chains
                    .get_mut(&(live.table, live.chain.clone()))
                    .ok_or_else(|| rejected(directive, "No chain/target/match by that name"))?;

                match op {
                    RuleOp::Append => rules.push(live),
                    RuleOp::Insert => rules.insert(0, live),
                    RuleOp::Delete => {
                        let idx = rules.iter().position(|r| *r == live).ok_or_else(|| {
                            rejected(directive, "Bad rule (does a matching rule exist in that chain?)")
                        })?;
                        rules.remove(idx);
                    }
                }
            }
        }

        Ok(())
    }
}

fn rejected(directive: &Directive, message: &str) -> FirewallError {
    FirewallError::Exec {
        directive: directive.to_string(),
        message: message.to_string(),
    }
}

fn is_base_chain(table: Table, name: &str) -> bool {
    table.hooks().iter().any(|hook| hook.base_chain() == name)
}

fn is_referenced(chains: &LiveRules, table: Table, name: &str) -> bool {
    chains
        .iter()
        .filter(|((t, _), _)| *t == table)
        .flat_map(|(_, rules)| rules.iter())
        .any(|rule| rule.jump.as_deref() == Some(name))
}
