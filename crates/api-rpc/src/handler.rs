//! RPC Method Handlers
//!
//! Thin translation between wire types and `QueueService`.

use crate::error::to_rpc_error;
use crate::gate::TokenGate;
use crate::types::{
    AdminQueueRequest, CreateQueueRequest, CreateQueueResponse, DeleteResponse, JoinResponse,
    QueueRequest, ServeNextResponse, SnapshotNotification, StatsRequest, StatusResponse,
    ViewQueueRequest,
};
use jsonrpsee::core::SubscriptionResult;
use jsonrpsee::types::ErrorObjectOwned;
use jsonrpsee::{PendingSubscriptionSink, SubscriptionMessage};
use std::sync::Arc;
use ticketline_core::application::{QueueService, SubscriptionHandle};
use ticketline_core::domain::{BoardSummary, Queue, QueueProjection, ViewerTicket};
use ticketline_core::error::AppError;
use tokio::sync::watch;
use tracing::debug;

type RpcResult<T> = Result<T, ErrorObjectOwned>;

/// RPC Handler with injected dependencies
pub struct RpcHandler {
    service: Arc<QueueService>,
    admin_token: Option<String>,
}

impl RpcHandler {
    pub fn new(service: Arc<QueueService>, admin_token: Option<String>) -> Self {
        Self {
            service,
            admin_token,
        }
    }

    fn gate<'a>(&'a self, presented: Option<&'a str>) -> TokenGate<'a> {
        TokenGate::new(self.admin_token.as_deref(), presented)
    }

    /// queue.create.v1
    pub async fn create(&self, req: CreateQueueRequest) -> RpcResult<CreateQueueResponse> {
        let gate = self.gate(req.admin_token.as_deref());
        let queue_id = self
            .service
            .create_queue(&gate, &req.name, req.avg_service_time)
            .await
            .map_err(to_rpc_error)?;
        Ok(CreateQueueResponse { queue_id })
    }

    /// queue.join.v1
    pub async fn join(&self, req: QueueRequest) -> RpcResult<JoinResponse> {
        let receipt = self
            .service
            .join_queue(&req.queue_id)
            .await
            .map_err(to_rpc_error)?;
        Ok(receipt.into())
    }

    /// queue.serve_next.v1
    pub async fn serve_next(&self, req: AdminQueueRequest) -> RpcResult<ServeNextResponse> {
        let gate = self.gate(req.admin_token.as_deref());
        let outcome = self
            .service
            .serve_next(&gate, &req.queue_id)
            .await
            .map_err(to_rpc_error)?;
        Ok(ServeNextResponse::new(req.queue_id, outcome))
    }

    /// queue.toggle_pause.v1
    pub async fn toggle_pause(&self, req: AdminQueueRequest) -> RpcResult<StatusResponse> {
        let gate = self.gate(req.admin_token.as_deref());
        let status = self
            .service
            .toggle_pause(&gate, &req.queue_id)
            .await
            .map_err(to_rpc_error)?;
        Ok(StatusResponse {
            queue_id: req.queue_id,
            status,
        })
    }

    /// queue.close.v1
    pub async fn close(&self, req: AdminQueueRequest) -> RpcResult<StatusResponse> {
        let gate = self.gate(req.admin_token.as_deref());
        let status = self
            .service
            .close_queue(&gate, &req.queue_id)
            .await
            .map_err(to_rpc_error)?;
        Ok(StatusResponse {
            queue_id: req.queue_id,
            status,
        })
    }

    /// queue.delete.v1
    pub async fn delete(&self, req: AdminQueueRequest) -> RpcResult<DeleteResponse> {
        let gate = self.gate(req.admin_token.as_deref());
        self.service
            .delete_queue(&gate, &req.queue_id)
            .await
            .map_err(to_rpc_error)?;
        Ok(DeleteResponse {
            queue_id: req.queue_id,
            deleted: true,
        })
    }

    /// queue.get.v1
    pub async fn get(&self, req: QueueRequest) -> RpcResult<Queue> {
        self.service
            .get_queue(&req.queue_id)
            .await
            .map_err(to_rpc_error)
    }

    /// queue.list.v1
    pub async fn list(&self) -> RpcResult<Vec<Queue>> {
        self.service.list_queues().await.map_err(to_rpc_error)
    }

    /// queue.view.v1
    pub async fn view(&self, req: ViewQueueRequest) -> RpcResult<QueueProjection> {
        let viewer = match (req.member_id, req.members_at_join) {
            (Some(member_id), Some(members_at_join)) => Some(ViewerTicket {
                member_id,
                members_at_join,
            }),
            (None, _) => None,
            (Some(_), None) => {
                return Err(to_rpc_error(AppError::InvalidInput(
                    "members_at_join is required with member_id".to_string(),
                )))
            }
        };

        self.service
            .view_queue(&req.queue_id, viewer.as_ref())
            .await
            .map_err(to_rpc_error)
    }

    /// admin.stats.v1
    pub async fn stats(&self, req: StatsRequest) -> RpcResult<BoardSummary> {
        let gate = self.gate(req.admin_token.as_deref());
        self.service
            .board_summary(&gate)
            .await
            .map_err(to_rpc_error)
    }

    /// queue.watch.v1 - `queue.snapshot` notifications until the client
    /// unsubscribes or disconnects
    pub async fn watch_queue(
        &self,
        req: QueueRequest,
        pending: PendingSubscriptionSink,
    ) -> SubscriptionResult {
        let (tx, rx) = watch::channel(None);
        let watched = self
            .service
            .watch_queue(&req.queue_id, move |snapshot| {
                tx.send_replace(Some(snapshot));
            })
            .await;

        let handle = match watched {
            Ok(handle) => handle,
            Err(e) => {
                pending.reject(to_rpc_error(e)).await;
                return Ok(());
            }
        };

        let queue_id = req.queue_id;
        forward(pending, handle, rx, move |snapshot| {
            SubscriptionMessage::from_json(&SnapshotNotification::new(&queue_id, snapshot))
        })
        .await
    }

    /// queue.watch_all.v1 - `queue.snapshot_list` notifications
    pub async fn watch_all(&self, pending: PendingSubscriptionSink) -> SubscriptionResult {
        let (tx, rx) = watch::channel(None);
        let watched = self
            .service
            .watch_all_queues(move |list| {
                tx.send_replace(Some(list));
            })
            .await;

        let handle = match watched {
            Ok(handle) => handle,
            Err(e) => {
                pending.reject(to_rpc_error(e)).await;
                return Ok(());
            }
        };

        forward(pending, handle, rx, |list: Vec<Queue>| {
            SubscriptionMessage::from_json(&list)
        })
        .await
    }
}

/// Pump broker snapshots into the client sink. The broker subscription is
/// released on every exit path.
///
/// Only the latest snapshot is kept: a client slower than the commit rate
/// skips intermediate states instead of buffering them.
async fn forward<T, M>(
    pending: PendingSubscriptionSink,
    handle: SubscriptionHandle,
    mut rx: watch::Receiver<Option<T>>,
    to_message: M,
) -> SubscriptionResult
where
    T: Clone,
    M: Fn(T) -> Result<SubscriptionMessage, serde_json::Error>,
{
    let sink = match pending.accept().await {
        Ok(sink) => sink,
        Err(_) => {
            handle.unsubscribe();
            return Err("client went away before the subscription was accepted".into());
        }
    };

    let result = loop {
        tokio::select! {
            _ = sink.closed() => break Ok(()),
            changed = rx.changed() => {
                if changed.is_err() {
                    break Ok(());
                }
                let latest = rx.borrow_and_update().clone();
                let Some(item) = latest else { continue };
                let message = match to_message(item) {
                    Ok(message) => message,
                    Err(e) => break Err(e.to_string().into()),
                };
                if sink.send(message).await.is_err() {
                    break Ok(());
                }
            }
        }
    };

    handle.unsubscribe();
    debug!(subscription_id = handle.id(), "RPC subscription ended");
    result
}
