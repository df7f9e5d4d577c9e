//! Scripted process control

use rulesync_core::{ActivationError, ProcessControl};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

#[derive(Debug, Default)]
struct State {
    restart_fails: AtomicBool,
    never_active: AtomicBool,
    restarts: AtomicUsize,
    checks: AtomicUsize,
}

/// Process control driven by flags instead of a real service.
///
/// Clones share state, so a test can keep a handle after moving one into
/// an orchestrator.
#[derive(Debug, Clone, Default)]
pub struct ScriptedControl {
    state: Arc<State>,
}

impl ScriptedControl {
    /// Restarts succeed and every check reports active.
    pub fn healthy() -> Self {
        Self::default()
    }

    /// Every restart fails.
    pub fn restart_fails() -> Self {
        let control = Self::default();
        control.state.restart_fails.store(true, Ordering::SeqCst);
        control
    }

    /// Restarts succeed but the liveness check never passes.
    pub fn never_active() -> Self {
        let control = Self::default();
        control.state.never_active.store(true, Ordering::SeqCst);
        control
    }

    pub fn set_restart_fails(&self, fails: bool) {
        self.state.restart_fails.store(fails, Ordering::SeqCst);
    }

    pub fn restarts(&self) -> usize {
        self.state.restarts.load(Ordering::SeqCst)
    }

    pub fn checks(&self) -> usize {
        self.state.checks.load(Ordering::SeqCst)
    }
}

impl ProcessControl for ScriptedControl {
    fn service(&self) -> &str {
        "scripted"
    }

    fn restart(&self) -> Result<(), ActivationError> {
        self.state.restarts.fetch_add(1, Ordering::SeqCst);
        if self.state.restart_fails.load(Ordering::SeqCst) {
            return Err(ActivationError::CommandFailed {
                command: "scripted restart".into(),
                code: "1".into(),
                stderr: "unit failed to start".into(),
            });
        }
        Ok(())
    }

    fn is_active(&self) -> Result<bool, ActivationError> {
        self.state.checks.fetch_add(1, Ordering::SeqCst);
        Ok(!self.state.never_active.load(Ordering::SeqCst))
    }
}
