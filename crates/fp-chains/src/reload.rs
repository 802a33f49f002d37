use std::sync::{Arc, Mutex, PoisonError};

pub type ReloadCallback = Box<dyn Fn() + Send + Sync>;

/// Source of "the host firewall was reloaded or flushed" notifications.
pub trait ReloadNotifier: Send + Sync {
    fn on_reload(&self, callback: ReloadCallback);
}

/// In-process notifier. Whoever observes the reload (a signal handler, a
/// D-Bus listener, a test) calls [`ReloadHub::notify`].
#[derive(Default)]
pub struct ReloadHub {
    callbacks: Mutex<Vec<Arc<dyn Fn() + Send + Sync>>>,
}

impl ReloadHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs every registered callback on the calling thread and returns how
    /// many ran. The hub's own lock is released first so a callback may take
    /// other locks freely.
    pub fn notify(&self) -> usize {
        let callbacks = self
            .callbacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        tracing::debug!(count = callbacks.len(), "dispatching reload callbacks");
        for callback in &callbacks {
            callback();
        }
        callbacks.len()
    }

    pub fn len(&self) -> usize {
        self.callbacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ReloadNotifier for ReloadHub {
    fn on_reload(&self, callback: ReloadCallback) {
        self.callbacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::from(callback));
    }
}
