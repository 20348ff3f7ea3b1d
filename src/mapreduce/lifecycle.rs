use std::sync::{Arc, RwLock};

/// Hooks invoked around reduction on the node that runs it.
pub trait TaskLifecycleListener: Send + Sync {
    fn on_pre_execute(&self, reducer: &str, cache_name: &str);

    fn on_post_execute(&self, reducer: &str);
}

#[derive(Default)]
pub struct TaskLifecycleService {
    listeners: RwLock<Vec<Arc<dyn TaskLifecycleListener>>>,
}

impl TaskLifecycleService {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add_listener(&self, listener: Arc<dyn TaskLifecycleListener>) {
        self.listeners
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(listener);
    }

    pub fn on_pre_execute(&self, reducer: &str, cache_name: &str) {
        for listener in self.snapshot() {
            listener.on_pre_execute(reducer, cache_name);
        }
    }

    pub fn on_post_execute(&self, reducer: &str) {
        for listener in self.snapshot() {
            listener.on_post_execute(reducer);
        }
    }

    fn snapshot(&self) -> Vec<Arc<dyn TaskLifecycleListener>> {
        self.listeners
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}
