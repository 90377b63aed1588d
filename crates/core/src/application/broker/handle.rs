use super::{BrokerState, Callback, Snapshot, WatchPath};
use super::panic_guard::{execute_guarded, PanicGuardResult};
use std::cell::Cell;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError, Weak};
use tracing::{debug, error};

pub type SubscriptionId = u64;

thread_local! {
    // Subscription whose callback is running on this thread, if any
    static DISPATCHING: Cell<Option<SubscriptionId>> = const { Cell::new(None) };
}

/// Shared between a handle and its dispatcher.
///
/// The dispatcher holds `gate` for the whole callback, and deactivation takes
/// the same gate, so once `unsubscribe` returns no callback is running and
/// none will start. Deactivating from inside the subscription's own callback
/// skips the gate.
pub(crate) struct SubscriptionControl {
    id: SubscriptionId,
    active: AtomicBool,
    gate: Mutex<()>,
}

impl SubscriptionControl {
    pub(crate) fn new(id: SubscriptionId) -> Self {
        Self {
            id,
            active: AtomicBool::new(true),
            gate: Mutex::new(()),
        }
    }

    pub(crate) fn id(&self) -> SubscriptionId {
        self.id
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    fn deactivate(&self) {
        if DISPATCHING.with(|d| d.get()) == Some(self.id) {
            self.active.store(false, Ordering::Release);
            return;
        }
        let _gate = self.gate.lock().unwrap_or_else(PoisonError::into_inner);
        self.active.store(false, Ordering::Release);
    }

    /// Run the callback for one snapshot. Returns false once the
    /// subscription is inactive, telling the dispatcher to stop.
    pub(crate) fn deliver(&self, callback: &Callback, snapshot: Snapshot) -> bool {
        let _gate = self.gate.lock().unwrap_or_else(PoisonError::into_inner);
        if !self.is_active() {
            return false;
        }

        let previous = DISPATCHING.with(|d| d.replace(Some(self.id)));
        let outcome = execute_guarded(AssertUnwindSafe(|| callback(snapshot)));
        DISPATCHING.with(|d| d.set(previous));

        if let PanicGuardResult::Panicked(message) = outcome {
            error!(subscription_id = self.id, panic_msg = %message, "Subscriber callback panicked");
        }
        self.is_active()
    }
}

/// Returned by `subscribe`. Cloning shares the same subscription.
///
/// Dropping a handle does not cancel the subscription; call
/// [`SubscriptionHandle::unsubscribe`]. Avoid unsubscribing subscription B
/// from A's callback while B's callback unsubscribes A: both wait on the
/// other's gate.
#[derive(Clone)]
pub struct SubscriptionHandle {
    id: SubscriptionId,
    path: WatchPath,
    control: std::sync::Arc<SubscriptionControl>,
    state: Weak<Mutex<BrokerState>>,
}

impl std::fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionHandle")
            .field("id", &self.id)
            .field("path", &self.path)
            .field("active", &self.control.is_active())
            .finish()
    }
}

impl SubscriptionHandle {
    pub(crate) fn new(
        id: SubscriptionId,
        path: WatchPath,
        control: std::sync::Arc<SubscriptionControl>,
        state: Weak<Mutex<BrokerState>>,
    ) -> Self {
        Self {
            id,
            path,
            control,
            state,
        }
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn path(&self) -> &WatchPath {
        &self.path
    }

    pub fn is_active(&self) -> bool {
        self.control.is_active()
    }

    /// Stop delivery. Idempotent, and safe to call from the subscription's
    /// own callback. After it returns the callback is not running and will
    /// not be invoked again.
    pub fn unsubscribe(&self) {
        self.control.deactivate();
        if let Some(state) = self.state.upgrade() {
            let removed = state
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove_subscriber(self.id);
            if removed {
                debug!(subscription_id = self.id, "Unsubscribed");
            }
        }
    }
}
