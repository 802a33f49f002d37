use crate::reload::ReloadNotifier;
use fp_core::error::Result;
use fp_core::{
    BatchReport, ChainRegistry, ChainSpec, Directive, Executor, FirewallConfig, Matcher,
    RuleOp, RuleRegistry, RuleSpec, Table,
};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ControllerState {
    Uninitialized,
    Initialized,
    Started,
    Stopped,
}

struct Inner {
    state: ControllerState,
    chains: ChainRegistry,
    rules: RuleRegistry,
    reload_registered: bool,
}

/// Owner of the application's entry chains and custom rule set.
///
/// Every mutation of the registries and every batch sent to the executor runs
/// under one lock, including the replay triggered by a host firewall reload.
///
/// Reload recovery only replays while the controller is started. After
/// `stop` a host reload is ignored until the next `start` or `refresh`.
pub struct GlobalController {
    inner: Arc<Mutex<Inner>>,
    executor: Arc<dyn Executor>,
    notifier: Arc<dyn ReloadNotifier>,
}

impl GlobalController {
    /// Stages `flows` in order; nothing touches the host until `start`.
    pub fn new(
        flows: impl IntoIterator<Item = RuleSpec>,
        executor: Arc<dyn Executor>,
        notifier: Arc<dyn ReloadNotifier>,
    ) -> Self {
        Self::with_registry(flows.into_iter().collect(), executor, notifier)
    }

    /// Like [`GlobalController::new`], deduplicating rules with `identity`
    /// instead of full structural equality.
    pub fn with_rule_identity(
        flows: impl IntoIterator<Item = RuleSpec>,
        identity: Matcher<RuleSpec>,
        executor: Arc<dyn Executor>,
        notifier: Arc<dyn ReloadNotifier>,
    ) -> Self {
        let mut rules = RuleRegistry::with_matcher(identity);
        for rule in flows {
            rules.add(rule);
        }
        Self::with_registry(rules, executor, notifier)
    }

    pub fn from_config(
        config: &FirewallConfig,
        executor: Arc<dyn Executor>,
        notifier: Arc<dyn ReloadNotifier>,
    ) -> Self {
        Self::new(config.rule_specs(), executor, notifier)
    }

    fn with_registry(
        rules: RuleRegistry,
        executor: Arc<dyn Executor>,
        notifier: Arc<dyn ReloadNotifier>,
    ) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                state: ControllerState::Uninitialized,
                chains: ChainRegistry::new(),
                rules,
                reload_registered: false,
            })),
            executor,
            notifier,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        lock(&self.inner)
    }

    pub fn state(&self) -> ControllerState {
        self.lock().state
    }

    pub fn chains(&self) -> Vec<ChainSpec> {
        self.lock().chains.as_slice().to_vec()
    }

    pub fn rules(&self) -> Vec<RuleSpec> {
        self.lock().rules.as_slice().to_vec()
    }

    /// Runs executor setup and stages the entry chains of every table along
    /// with the jumps from each native base chain into them. Only the first
    /// call has any effect.
    pub fn initialize(&self) {
        let mut inner = self.lock();
        if inner.state != ControllerState::Uninitialized {
            warn!(state = ?inner.state, "firewall already initialized");
            return;
        }

        info!("initializing firewall entry chains");
        if let Err(e) = self.executor.init() {
            warn!(error = %e, "executor setup failed");
        }

        for table in Table::ALL {
            for hook in table.hooks() {
                inner.chains.add(ChainSpec::new(table, hook.entry_chain()));
            }
        }
        for table in Table::ALL {
            for hook in table.hooks() {
                inner.rules.add(
                    RuleSpec::new(table, hook.base_chain())
                        .with_order(RuleOp::Insert)
                        .with_jump(hook.entry_chain()),
                );
            }
        }

        inner.state = ControllerState::Initialized;
    }

    /// Stages a chain; no effect on the host.
    pub fn add_chain(&self, chain: ChainSpec) -> bool {
        self.lock().chains.add(chain)
    }

    /// Stages a rule; no effect on the host.
    pub fn add_rule(&self, rule: RuleSpec) -> bool {
        self.lock().rules.add(rule)
    }

    /// Creates every staged chain, then applies every staged rule, and arms
    /// reload recovery on the first call.
    pub fn start(&self) -> BatchReport {
        let (report, arm) = {
            let mut inner = self.lock();
            info!(
                chains = inner.chains.len(),
                rules = inner.rules.len(),
                "starting firewall"
            );

            let report = install(&inner, self.executor.as_ref());
            inner.state = ControllerState::Started;
            (report, take_registration(&mut inner))
        };

        if arm {
            self.arm_reload();
        }
        report
    }

    /// Removes every staged rule, then every staged chain.
    pub fn stop(&self) -> BatchReport {
        let mut inner = self.lock();
        info!("stopping firewall");

        let report = cancel(&inner, self.executor.as_ref());
        inner.state = ControllerState::Stopped;
        report
    }

    /// Tears down and rebuilds the live state from the registries. Holds the
    /// same lock as `start` and `stop`, and leaves the controller started.
    pub fn refresh(&self) -> BatchReport {
        let (report, arm) = {
            let mut inner = self.lock();
            info!("refreshing firewall");

            let mut report = cancel(&inner, self.executor.as_ref());
            report.merge(install(&inner, self.executor.as_ref()));
            inner.state = ControllerState::Started;
            (report, take_registration(&mut inner))
        };

        if arm {
            self.arm_reload();
        }
        report
    }

    /// Runs outside the lock: a notifier may invoke the callback right away.
    fn arm_reload(&self) {
        self.notifier
            .on_reload(reload_callback(Arc::downgrade(&self.inner), self.executor.clone()));
    }

    /// Applies one rule to the host and stages it only if that succeeded.
    pub fn install_rule(&self, rule: RuleSpec) -> Result<()> {
        let mut inner = self.lock();
        self.executor
            .apply(&Directive::Rule(rule.install_op(), rule.clone()))?;
        inner.rules.add(rule);
        Ok(())
    }

    /// Deletes one rule from the host and unstages it only if that succeeded.
    pub fn cancel_rule(&self, rule: &RuleSpec) -> Result<()> {
        let mut inner = self.lock();
        self.executor
            .apply(&Directive::Rule(RuleOp::Delete, rule.clone()))?;
        inner.rules.remove(rule);
        Ok(())
    }
}

fn lock(inner: &Mutex<Inner>) -> MutexGuard<'_, Inner> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Claims the one-time reload registration.
fn take_registration(inner: &mut Inner) -> bool {
    !std::mem::replace(&mut inner.reload_registered, true)
}

fn install(inner: &Inner, executor: &dyn Executor) -> BatchReport {
    let mut report = BatchReport::new();

    for chain in &inner.chains {
        report.apply(executor, Directive::CreateChain(chain.clone()), "firewall.install");
    }
    for rule in &inner.rules {
        report.apply(
            executor,
            Directive::Rule(rule.install_op(), rule.clone()),
            "firewall.install",
        );
    }

    report
}

fn cancel(inner: &Inner, executor: &dyn Executor) -> BatchReport {
    let mut report = BatchReport::new();

    for rule in &inner.rules {
        report.apply(
            executor,
            Directive::Rule(RuleOp::Delete, rule.clone()),
            "firewall.cancel",
        );
    }
    for chain in &inner.chains {
        report.apply(executor, Directive::DestroyChain(chain.clone()), "firewall.cancel");
    }

    report
}

/// Replays the install whenever the host firewall reloads, as long as the
/// controller is alive and started.
fn reload_callback(
    inner: Weak<Mutex<Inner>>,
    executor: Arc<dyn Executor>,
) -> crate::reload::ReloadCallback {
    Box::new(move || {
        let Some(inner) = inner.upgrade() else {
            debug!("firewall controller dropped, ignoring reload");
            return;
        };
        let guard = lock(&inner);
        if guard.state != ControllerState::Started {
            debug!(state = ?guard.state, "firewall not started, ignoring reload");
            return;
        }

        info!("host firewall reloaded, replaying chains and rules");
        let report = install(&guard, executor.as_ref());
        if !report.is_clean() {
            warn!(failed = report.failures.len(), "reload replay incomplete");
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reload::ReloadHub;
    use fp_core::MemoryExecutor;

    fn custom_rule() -> RuleSpec {
        RuleSpec::new(Table::Filter, "In-test")
            .with_jump("ACCEPT")
            .with_source("10.0.0.0/8")
    }

    fn setup(flows: Vec<RuleSpec>) -> (Arc<MemoryExecutor>, Arc<ReloadHub>, GlobalController) {
        let fw = Arc::new(MemoryExecutor::new());
        let hub = Arc::new(ReloadHub::new());
        let controller = GlobalController::new(flows, fw.clone(), hub.clone());
        (fw, hub, controller)
    }

    #[test]
    fn lifecycle_states() {
        let (_, _, controller) = setup(vec![]);
        assert_eq!(controller.state(), ControllerState::Uninitialized);
        controller.initialize();
        assert_eq!(controller.state(), ControllerState::Initialized);
        controller.start();
        assert_eq!(controller.state(), ControllerState::Started);
        controller.stop();
        assert_eq!(controller.state(), ControllerState::Stopped);
        controller.start();
        assert_eq!(controller.state(), ControllerState::Started);
    }

    #[test]
    fn state_serializes_lowercase() {
        let (_, _, controller) = setup(vec![]);
        controller.initialize();
        controller.start();
        assert_eq!(
            serde_json::to_value(controller.state()).unwrap(),
            serde_json::json!("started")
        );
    }

    #[test]
    fn initialize_runs_once() {
        let (fw, _, controller) = setup(vec![]);
        controller.initialize();
        controller.initialize();

        assert!(fw.is_initialized());
        assert_eq!(controller.chains().len(), 14);
        assert_eq!(controller.rules().len(), 14);
        assert!(fw.journal().is_empty());
    }

    #[test]
    fn start_realizes_entry_chains_jumps_and_custom_rules() {
        let (fw, _, controller) = setup(vec![custom_rule()]);
        controller.add_chain(ChainSpec::new(Table::Filter, "In-test"));
        controller.initialize();
        let report = controller.start();
        assert!(report.is_clean(), "{:?}", report.failures);

        for table in Table::ALL {
            for hook in table.hooks() {
                assert!(fw.has_chain(table, hook.entry_chain()));
                let base = fw.rules(table, hook.base_chain()).unwrap();
                assert_eq!(base.len(), 1);
                assert_eq!(base[0].jump.as_deref(), Some(hook.entry_chain()));
            }
        }

        let live = fw.rules(Table::Filter, "In-test").unwrap();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].source.as_deref(), Some("10.0.0.0/8"));
    }

    #[test]
    fn start_replays_each_chain_and_rule_exactly_once() {
        let (fw, _, controller) = setup(vec![custom_rule()]);
        controller.add_chain(ChainSpec::new(Table::Filter, "In-test"));
        controller.initialize();
        controller.start();

        let journal = fw.journal();
        let chains = controller.chains();
        let rules = controller.rules();
        assert_eq!(journal.len(), chains.len() + rules.len());

        for chain in &chains {
            let creates = journal
                .iter()
                .filter(|d| matches!(d, Directive::CreateChain(c) if c == chain))
                .count();
            assert_eq!(creates, 1);
        }
        for rule in &rules {
            let applies = journal
                .iter()
                .filter(|d| matches!(d, Directive::Rule(op, r) if r == rule && *op == rule.install_op()))
                .count();
            assert_eq!(applies, 1);
        }
    }

    #[test]
    fn stop_then_start_reproduces_live_state() {
        let (fw, _, controller) = setup(vec![custom_rule()]);
        controller.add_chain(ChainSpec::new(Table::Filter, "In-test"));
        controller.initialize();
        controller.start();
        let first = fw.snapshot();

        let report = controller.stop();
        assert!(report.is_clean(), "{:?}", report.failures);
        assert!(fw.custom_chains().is_empty());

        controller.start();
        assert_eq!(fw.snapshot(), first);
    }

    #[test]
    fn stop_cancels_rules_before_chains() {
        let (fw, _, controller) = setup(vec![]);
        controller.initialize();
        controller.start();
        fw.clear_journal();

        controller.stop();
        let journal = fw.journal();
        let first_destroy = journal
            .iter()
            .position(|d| matches!(d, Directive::DestroyChain(_)))
            .unwrap();
        assert!(journal[..first_destroy]
            .iter()
            .all(|d| matches!(d, Directive::Rule(RuleOp::Delete, _))));
        assert_eq!(first_destroy, 14);
    }

    #[test]
    fn reload_callback_replays_install() {
        let (fw, hub, controller) = setup(vec![custom_rule()]);
        controller.add_chain(ChainSpec::new(Table::Filter, "In-test"));
        controller.initialize();
        controller.start();
        let expected = fw.snapshot();

        fw.flush();
        fw.clear_journal();
        assert_eq!(hub.notify(), 1);

        assert_eq!(fw.journal().len(), 15 + 15);
        assert_eq!(fw.snapshot(), expected);
    }

    #[test]
    fn reload_callback_registered_once() {
        let (_, hub, controller) = setup(vec![]);
        controller.initialize();
        controller.start();
        controller.stop();
        controller.start();
        controller.refresh();
        assert_eq!(hub.len(), 1);
    }

    #[test]
    fn reload_ignored_while_stopped_or_dropped() {
        let (fw, hub, controller) = setup(vec![]);
        controller.initialize();
        controller.start();
        controller.stop();
        fw.clear_journal();

        hub.notify();
        assert!(fw.journal().is_empty());

        drop(controller);
        hub.notify();
        assert!(fw.journal().is_empty());
    }

    #[test]
    fn install_rule_failure_leaves_registry_untouched() {
        let fw = Arc::new(MemoryExecutor::new());
        let hub = Arc::new(ReloadHub::new());
        let controller = GlobalController::new(vec![], fw.clone(), hub);
        controller.initialize();
        let before = controller.rules().len();

        // No such chain on the host.
        let err = controller.install_rule(RuleSpec::new(Table::Filter, "missing").with_jump("DROP"));
        assert!(err.is_err());
        assert_eq!(controller.rules().len(), before);
    }

    #[test]
    fn install_and_cancel_rule_keep_registry_in_step() {
        let (fw, _, controller) = setup(vec![]);
        controller.initialize();
        controller.start();

        let rule = RuleSpec::new(Table::Filter, "FENCE_in")
            .with_source("192.0.2.0/24")
            .with_jump("DROP");
        controller.install_rule(rule.clone()).unwrap();
        assert!(controller.rules().contains(&rule));
        assert_eq!(fw.rules(Table::Filter, "FENCE_in").unwrap().len(), 1);

        controller.cancel_rule(&rule).unwrap();
        assert!(!controller.rules().contains(&rule));
        assert!(fw.rules(Table::Filter, "FENCE_in").unwrap().is_empty());
    }

    #[test]
    fn cancel_rule_never_installed_still_calls_executor() {
        let (fw, _, controller) = setup(vec![]);
        controller.initialize();
        controller.start();
        let before = controller.rules();
        fw.clear_journal();

        let rule = RuleSpec::new(Table::Nat, "FENCE_pre").with_jump("DNAT");
        assert!(controller.cancel_rule(&rule).is_err());
        assert_eq!(fw.journal(), vec![Directive::Rule(RuleOp::Delete, rule)]);
        assert_eq!(controller.rules(), before);
    }

    #[test]
    fn refresh_rebuilds_without_changing_registries() {
        let (fw, _, controller) = setup(vec![custom_rule()]);
        controller.add_chain(ChainSpec::new(Table::Filter, "In-test"));
        controller.initialize();
        controller.start();
        let live = fw.snapshot();
        let chains = controller.chains();

        let report = controller.refresh();
        assert!(report.is_clean(), "{:?}", report.failures);
        assert_eq!(fw.snapshot(), live);
        assert_eq!(controller.chains(), chains);
    }

    #[test]
    fn rule_identity_is_swappable() {
        let fw = Arc::new(MemoryExecutor::new());
        let plain = custom_rule();
        let inserted = plain.clone().with_order(RuleOp::Insert);

        let controller = GlobalController::with_rule_identity(
            vec![plain, inserted],
            RuleSpec::same_ignoring_order,
            fw,
            Arc::new(ReloadHub::new()),
        );
        assert_eq!(controller.rules().len(), 1);
    }

    #[test]
    fn chain_staged_with_another_parent_is_created_once() {
        let (fw, _, controller) = setup(vec![]);
        assert!(controller.add_chain(ChainSpec::new(Table::Filter, "X")));
        assert!(!controller.add_chain(ChainSpec::new(Table::Filter, "X").with_parent("FENCE_in")));
        assert_eq!(controller.chains().len(), 1);

        let report = controller.start();
        assert!(report.is_clean(), "{:?}", report.failures);
        assert_eq!(fw.journal().len(), 1);

        fw.clear_journal();
        assert!(controller.stop().is_clean());
        assert_eq!(fw.journal().len(), 1);
    }

    #[test]
    fn refresh_after_stop_rearms_reload_recovery() {
        let (fw, hub, controller) = setup(vec![]);
        controller.initialize();
        controller.start();
        controller.stop();

        assert!(!controller.refresh().is_clean());
        assert_eq!(controller.state(), ControllerState::Started);
        let live = fw.snapshot();

        fw.flush();
        fw.clear_journal();
        hub.notify();
        assert_eq!(fw.journal().len(), 28);
        assert_eq!(fw.snapshot(), live);
    }

    #[test]
    fn refresh_before_start_registers_reload_callback() {
        let (_, hub, controller) = setup(vec![]);
        controller.initialize();
        controller.refresh();
        controller.start();
        assert_eq!(hub.len(), 1);
    }

    /// Replays as soon as it is handed a callback.
    struct EagerNotifier;

    impl ReloadNotifier for EagerNotifier {
        fn on_reload(&self, callback: crate::reload::ReloadCallback) {
            callback();
        }
    }

    #[test]
    fn notifier_may_invoke_callback_during_registration() {
        let fw = Arc::new(MemoryExecutor::new());
        let controller = GlobalController::new(vec![], fw.clone(), Arc::new(EagerNotifier));
        controller.initialize();

        assert!(controller.start().is_clean());
        assert_eq!(controller.state(), ControllerState::Started);
        // start, then the immediate replay
        assert_eq!(fw.journal().len(), 28 * 2);
    }

    #[test]
    fn reload_on_another_thread_keeps_registry_consistent() {
        let (fw, hub, controller) = setup(vec![custom_rule()]);
        controller.add_chain(ChainSpec::new(Table::Filter, "In-test"));
        controller.initialize();
        controller.start();
        let before = controller.rules();

        let rule = RuleSpec::new(Table::Filter, "FENCE_in")
            .with_source("198.51.100.0/24")
            .with_jump("DROP");

        std::thread::scope(|scope| {
            scope.spawn(|| {
                for _ in 0..50 {
                    hub.notify();
                }
            });
            for _ in 0..50 {
                controller.install_rule(rule.clone()).unwrap();
                controller.cancel_rule(&rule).unwrap();
            }
        });

        assert_eq!(controller.rules(), before);
        assert_eq!(controller.state(), ControllerState::Started);

        controller.stop();
        assert_eq!(controller.state(), ControllerState::Stopped);
        assert!(fw.journal().len() > 50 * 2);
    }
}
