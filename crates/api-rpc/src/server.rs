//! JSON-RPC Server
//!
//! Serves the queue API over TCP on localhost (HTTP + WebSocket via
//! jsonrpsee; subscriptions require WebSocket).

use crate::error::ServerError;
use crate::handler::RpcHandler;
use crate::types::{AdminQueueRequest, CreateQueueRequest, QueueRequest, StatsRequest, ViewQueueRequest};
use jsonrpsee::server::{Server, ServerHandle};
use jsonrpsee::RpcModule;
use std::net::SocketAddr;
use std::sync::Arc;
use ticketline_core::application::QueueService;
use tracing::info;

pub const DEFAULT_RPC_HOST: &str = "127.0.0.1";
pub const DEFAULT_RPC_PORT: u16 = 9630;

/// RPC Server Configuration
#[derive(Debug, Clone)]
pub struct RpcServerConfig {
    pub host: String,
    pub port: u16,
    /// Shared admin token; `None` disables every admin method
    pub admin_token: Option<String>,
}

impl Default for RpcServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_RPC_HOST.to_string(),
            port: DEFAULT_RPC_PORT,
            admin_token: None,
        }
    }
}

/// RPC Server
pub struct RpcServer {
    config: RpcServerConfig,
    handler: Arc<RpcHandler>,
}

macro_rules! register {
    ($module:expr, $handler:expr, $method:literal, $req:ty, $call:ident) => {{
        let handler = Arc::clone(&$handler);
        $module
            .register_async_method($method, move |params, _, _| {
                let handler = Arc::clone(&handler);
                async move {
                    let req: $req = params.parse()?;
                    handler.$call(req).await
                }
            })
            .map_err(|e| ServerError::Register {
                method: $method,
                reason: e.to_string(),
            })?;
    }};
}

impl RpcServer {
    pub fn new(config: RpcServerConfig, service: Arc<QueueService>) -> Self {
        let handler = Arc::new(RpcHandler::new(service, config.admin_token.clone()));
        Self { config, handler }
    }

    fn build_module(&self) -> Result<RpcModule<()>, ServerError> {
        let mut module = RpcModule::new(());

        register!(module, self.handler, "queue.create.v1", CreateQueueRequest, create);
        register!(module, self.handler, "queue.join.v1", QueueRequest, join);
        register!(module, self.handler, "queue.serve_next.v1", AdminQueueRequest, serve_next);
        register!(module, self.handler, "queue.toggle_pause.v1", AdminQueueRequest, toggle_pause);
        register!(module, self.handler, "queue.close.v1", AdminQueueRequest, close);
        register!(module, self.handler, "queue.delete.v1", AdminQueueRequest, delete);
        register!(module, self.handler, "queue.get.v1", QueueRequest, get);
        register!(module, self.handler, "queue.view.v1", ViewQueueRequest, view);
        register!(module, self.handler, "admin.stats.v1", StatsRequest, stats);

        let handler = Arc::clone(&self.handler);
        module
            .register_async_method("queue.list.v1", move |_, _, _| {
                let handler = Arc::clone(&handler);
                async move { handler.list().await }
            })
            .map_err(|e| ServerError::Register {
                method: "queue.list.v1",
                reason: e.to_string(),
            })?;

        let handler = Arc::clone(&self.handler);
        module
            .register_subscription(
                "queue.watch.v1",
                "queue.snapshot",
                "queue.unwatch.v1",
                move |params, pending, _, _| {
                    let handler = Arc::clone(&handler);
                    async move {
                        let req: QueueRequest = match params.parse() {
                            Ok(req) => req,
                            Err(e) => {
                                pending.reject(e).await;
                                return Ok(());
                            }
                        };
                        handler.watch_queue(req, pending).await
                    }
                },
            )
            .map_err(|e| ServerError::Register {
                method: "queue.watch.v1",
                reason: e.to_string(),
            })?;

        let handler = Arc::clone(&self.handler);
        module
            .register_subscription(
                "queue.watch_all.v1",
                "queue.snapshot_list",
                "queue.unwatch_all.v1",
                move |_, pending, _, _| {
                    let handler = Arc::clone(&handler);
                    async move { handler.watch_all(pending).await }
                },
            )
            .map_err(|e| ServerError::Register {
                method: "queue.watch_all.v1",
                reason: e.to_string(),
            })?;

        Ok(module)
    }

    /// Bind and start serving. Returns the bound address (useful with port 0)
    /// and the handle used to stop the server.
    pub async fn start(self) -> Result<(SocketAddr, ServerHandle), ServerError> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let module = self.build_module()?;

        let server = Server::builder()
            .build(&addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.clone(),
                source,
            })?;
        let local_addr = server.local_addr().map_err(|source| ServerError::Bind {
            addr: addr.clone(),
            source,
        })?;

        info!(
            addr = %local_addr,
            admin_enabled = self.config.admin_token.is_some(),
            "JSON-RPC server started"
        );
        Ok((local_addr, server.start(module)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ticketline_core::application::{QueueStore, RetryBudget, SubscriptionBroker};
    use ticketline_core::port::id_provider::mocks::SequentialIdProvider;
    use ticketline_core::port::queue_repository::mocks::InMemoryQueueRepository;
    use ticketline_core::port::time_provider::mocks::FixedTimeProvider;

    fn server(port: u16) -> RpcServer {
        let store = QueueStore::new(
            Arc::new(InMemoryQueueRepository::new()),
            Arc::new(SubscriptionBroker::new()),
            Arc::new(SequentialIdProvider::new("id")),
            Arc::new(FixedTimeProvider::new(0)),
            RetryBudget::default(),
        );
        RpcServer::new(
            RpcServerConfig {
                port,
                ..RpcServerConfig::default()
            },
            Arc::new(QueueService::new(Arc::new(store))),
        )
    }

    #[test]
    fn test_module_registers_every_method() {
        let module = server(0).build_module().unwrap();
        let names: Vec<&str> = module.method_names().collect();
        for method in [
            "queue.create.v1",
            "queue.join.v1",
            "queue.serve_next.v1",
            "queue.toggle_pause.v1",
            "queue.close.v1",
            "queue.delete.v1",
            "queue.get.v1",
            "queue.list.v1",
            "queue.view.v1",
            "admin.stats.v1",
            "queue.watch.v1",
            "queue.unwatch.v1",
            "queue.watch_all.v1",
            "queue.unwatch_all.v1",
        ] {
            assert!(names.contains(&method), "missing {}", method);
        }
    }

    #[tokio::test]
    async fn test_module_answers_list_call() {
        let module = server(0).build_module().unwrap();
        let queues: Vec<serde_json::Value> = module
            .call("queue.list.v1", jsonrpsee::rpc_params![])
            .await
            .unwrap();
        assert!(queues.is_empty());
    }

    #[tokio::test]
    async fn test_watch_all_subscription_sends_current_list() {
        let module = server(0).build_module().unwrap();
        let mut sub = module
            .subscribe_unbounded("queue.watch_all.v1", jsonrpsee::rpc_params![])
            .await
            .unwrap();

        let (queues, _) = tokio::time::timeout(
            std::time::Duration::from_secs(2),
            sub.next::<Vec<serde_json::Value>>(),
        )
        .await
        .unwrap()
        .unwrap()
        .unwrap();
        assert!(queues.is_empty());
    }

    #[tokio::test]
    async fn test_start_on_ephemeral_port() {
        let (addr, handle) = server(0).start().await.unwrap();
        assert!(addr.port() > 0);
        handle.stop().unwrap();
        handle.stopped().await;
    }
}
