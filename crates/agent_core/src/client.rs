use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::error::AgentError;
use crate::handler::ApprovalTable;
use crate::transport::{NotificationHandler, PanicCallback, RequestHandler, Transport};

pub use crate::handler::ApprovalMethod;

/// Default per-call timeout applied when the caller's own deadline is unset.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// A notification listener: fires with the notification's raw `params`.
pub type NotificationCallback = Arc<dyn Fn(Value) + Send + Sync>;

/// Handle returned by [`Client::add_notification_listener`], used to remove
/// that specific listener later without disturbing any others on the method.
#[derive(Debug, Clone)]
pub struct SubscriptionToken {
    method: String,
    id: u64,
}

#[derive(Default)]
struct ListenerRegistry {
    replacement: HashMap<String, NotificationCallback>,
    append: HashMap<String, Vec<(u64, NotificationCallback)>>,
}

/// Thin generic layer over a [`Transport`]: request id allocation, a default
/// call timeout, typed outbound helpers, a notification listener registry,
/// and the server-request router backed by an [`ApprovalTable`].
pub struct Client {
    transport: Arc<Transport>,
    next_id: AtomicU64,
    default_timeout: Duration,
    listeners: RwLock<ListenerRegistry>,
    next_token: AtomicU64,
    approvals: ApprovalTable,
}

impl Client {
    /// Wraps `transport`, wiring this client as the transport's sole request
    /// and notification handler.
    pub async fn attach(transport: Arc<Transport>) -> Arc<Client> {
        Self::attach_with_timeout(transport, DEFAULT_CALL_TIMEOUT).await
    }

    pub async fn attach_with_timeout(
        transport: Arc<Transport>,
        default_timeout: Duration,
    ) -> Arc<Client> {
        let client = Arc::new(Client {
            transport: transport.clone(),
            next_id: AtomicU64::new(1),
            default_timeout,
            listeners: RwLock::new(ListenerRegistry::default()),
            next_token: AtomicU64::new(1),
            approvals: ApprovalTable::new(),
        });

        // The transport's notify handler closes over a *weak* reference back
        // to the client so the transport -> handler -> client -> transport
        // cycle doesn't keep either side alive past its natural lifetime.
        let weak_client = Arc::downgrade(&client);
        let notify_handler: NotificationHandler = Arc::new(move |method: String, params: Value| {
            let weak_client = weak_client.clone();
            Box::pin(async move {
                if let Some(client) = weak_client.upgrade() {
                    client.dispatch_notification(method, params).await;
                }
            })
        });
        transport.on_notify(Some(notify_handler)).await;
        transport
            .on_request(Some(client.approvals.clone().into_request_handler()))
            .await;

        client
    }

    /// The underlying transport, e.g. for a supervisor to call `close()` on.
    pub fn transport(&self) -> &Arc<Transport> {
        &self.transport
    }

    /// Registers the panic callback invoked when a request or notification
    /// handler panics.
    pub async fn on_panic(&self, callback: Option<PanicCallback>) {
        self.transport.on_panic(callback).await;
    }

    /// Registers (or, with `None`, deregisters) the callback for one of the
    /// enumerated server-to-client request methods.
    pub fn set_approval_handler(&self, method: ApprovalMethod, handler: Option<RequestHandler>) {
        self.approvals.set(method, handler);
    }

    /// Sets the single replaceable listener for `method`; a later call with
    /// `Some` replaces the previous one, and `None` deregisters it.
    pub async fn set_notification_listener(
        &self,
        method: impl Into<String>,
        handler: Option<NotificationCallback>,
    ) {
        let method = method.into();
        let mut registry = self.listeners.write().await;
        match handler {
            Some(handler) => {
                registry.replacement.insert(method, handler);
            }
            None => {
                registry.replacement.remove(&method);
            }
        }
    }

    /// Appends an anonymous internal listener for `method`, returning a
    /// token that can later be passed to [`Client::remove_notification_listener`].
    pub async fn add_notification_listener(
        &self,
        method: impl Into<String>,
        handler: NotificationCallback,
    ) -> SubscriptionToken {
        let method = method.into();
        let id = self.next_token.fetch_add(1, Ordering::SeqCst);
        let mut registry = self.listeners.write().await;
        registry
            .append
            .entry(method.clone())
            .or_default()
            .push((id, handler));
        SubscriptionToken { method, id }
    }

    /// Removes one previously-appended listener without disturbing others
    /// registered for the same method.
    pub async fn remove_notification_listener(&self, token: SubscriptionToken) {
        let mut registry = self.listeners.write().await;
        if let Some(list) = registry.append.get_mut(&token.method) {
            list.retain(|(id, _)| *id != token.id);
        }
    }

    async fn dispatch_notification(&self, method: String, params: Value) {
        let (replacement, append) = {
            let registry = self.listeners.read().await;
            let replacement = registry.replacement.get(&method).cloned();
            let append = registry
                .append
                .get(&method)
                .map(|listeners| listeners.iter().map(|(_, cb)| cb.clone()).collect::<Vec<_>>())
                .unwrap_or_default();
            (replacement, append)
        };

        if let Some(callback) = replacement {
            callback(params.clone());
        }
        for callback in append {
            callback(params.clone());
        }
    }

    /// Allocates the next monotonic, non-negative request id.
    fn next_request_id(&self) -> Value {
        Value::from(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    /// Issues an RPC call: marshals `params`, dispatches through the
    /// transport, and unmarshals the result.
    ///
    /// If `expect_result` is `true` and the peer's `result` is JSON null,
    /// returns [`AgentError::EmptyResult`] instead of trying to deserialize it.
    pub async fn call<P, R>(
        &self,
        method: &str,
        params: P,
        expect_result: bool,
        timeout: Option<Duration>,
        cancel: Option<CancellationToken>,
    ) -> Result<R, AgentError>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        let params =
            serde_json::to_value(params).map_err(|err| AgentError::InvalidParams(err.to_string()))?;
        let id = self.next_request_id();
        let timeout = timeout.or(Some(self.default_timeout));

        let result = self.transport.send(id, method, params, timeout, cancel).await?;

        if expect_result && result.is_null() {
            return Err(AgentError::EmptyResult);
        }

        serde_json::from_value(result).map_err(|err| AgentError::InvalidParams(err.to_string()))
    }

    /// Sends a notification; no response is expected.
    pub async fn notify<P: Serialize>(
        &self,
        method: &str,
        params: P,
        cancel: Option<CancellationToken>,
    ) -> Result<(), AgentError> {
        let params =
            serde_json::to_value(params).map_err(|err| AgentError::InvalidParams(err.to_string()))?;
        self.transport.notify(method, params, cancel).await
    }
}
