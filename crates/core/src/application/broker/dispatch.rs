// Per-subscription delivery loop
use super::handle::SubscriptionControl;
use super::{Callback, Snapshot};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::debug;

/// Drains the subscription's channel in order until the broker drops the
/// sender or the subscription is deactivated.
pub(crate) async fn run(
    mut rx: UnboundedReceiver<Snapshot>,
    control: Arc<SubscriptionControl>,
    callback: Callback,
) {
    while let Some(snapshot) = rx.recv().await {
        if !control.deliver(&callback, snapshot) {
            break;
        }
    }
    debug!(subscription_id = control.id(), "Dispatcher stopped");
}
