use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::AgentError;
use crate::frame::{self, error_code, Incoming};
use crate::id::{self, IdKey};

/// A boxed, `Send` future — used instead of pulling in an async-trait crate
/// for the two handler callback shapes below.
pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// Invoked for every inbound server-to-client request. Takes the method name
/// and raw params, returns the RPC result or an error to be written back.
pub type RequestHandler =
    Arc<dyn Fn(String, Value) -> BoxFuture<Result<Value, AgentError>> + Send + Sync>;

/// Invoked for every inbound notification. Takes the method name and raw params.
pub type NotificationHandler = Arc<dyn Fn(String, Value) -> BoxFuture<()> + Send + Sync>;

/// Invoked when a request or notification handler panics. Receives the method name.
pub type PanicCallback = Arc<dyn Fn(&str) + Send + Sync>;

struct Shared {
    pending: Mutex<HashMap<IdKey, oneshot::Sender<Result<Value, AgentError>>>>,
    request_handler: Mutex<Option<RequestHandler>>,
    notify_handler: Mutex<Option<NotificationHandler>>,
    panic_callback: Mutex<Option<PanicCallback>>,
    writer: Mutex<Box<dyn AsyncWrite + Unpin + Send>>,
    cancel: CancellationToken,
    closed: AtomicBool,
    scan_error: Mutex<Option<String>>,
}

impl Shared {
    async fn write_line(&self, line: &str) -> std::io::Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(closed_io_error());
        }
        let mut writer = self.writer.lock().await;
        if self.closed.load(Ordering::SeqCst) {
            return Err(closed_io_error());
        }
        write_all_flush(&mut **writer, line.as_bytes()).await
    }

    async fn set_scan_error(&self, message: String) {
        *self.scan_error.lock().await = Some(message);
    }
}

fn closed_io_error() -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::NotConnected, "transport closed")
}

async fn write_all_flush<W: AsyncWrite + Unpin + ?Sized>(
    writer: &mut W,
    bytes: &[u8],
) -> std::io::Result<()> {
    let mut offset = 0;
    while offset < bytes.len() {
        let n = writer.write(&bytes[offset..]).await?;
        if n == 0 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::WriteZero,
                "zero-byte write",
            ));
        }
        offset += n;
    }
    writer.flush().await
}

/// Bidirectional newline-delimited JSON-RPC transport over a reader/writer pair.
///
/// Owns a single reader task; writes are serialized through a mutex rather
/// than a background writer task, so write failures propagate directly to
/// the caller that triggered them, per the send/notify contract.
pub struct Transport {
    shared: Arc<Shared>,
    reader_task: Mutex<Option<JoinHandle<()>>>,
}

impl Transport {
    /// Spawns the reader task over `reader` and takes ownership of `writer`.
    pub fn spawn_io<R, W>(reader: R, writer: W, max_frame_len: usize) -> Transport
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let shared = Arc::new(Shared {
            pending: Mutex::new(HashMap::new()),
            request_handler: Mutex::new(None),
            notify_handler: Mutex::new(None),
            panic_callback: Mutex::new(None),
            writer: Mutex::new(Box::new(writer)),
            cancel: CancellationToken::new(),
            closed: AtomicBool::new(false),
            scan_error: Mutex::new(None),
        });

        let reader_shared = shared.clone();
        let reader_task = tokio::spawn(async move {
            reader_loop(BufReader::new(reader), reader_shared, max_frame_len).await;
        });

        Transport {
            shared,
            reader_task: Mutex::new(Some(reader_task)),
        }
    }

    /// Sends a request and awaits its matching response.
    ///
    /// `timeout` and `cancel` are both optional: a `None` timeout means no
    /// deadline beyond transport shutdown; a `None` cancel token means the
    /// call can only be interrupted by shutdown or timeout.
    pub async fn send(
        &self,
        id: Value,
        method: &str,
        params: Value,
        timeout: Option<Duration>,
        cancel: Option<CancellationToken>,
    ) -> Result<Value, AgentError> {
        let key = id::normalize(&id);

        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.shared.pending.lock().await;
            if pending.contains_key(&key) {
                return Err(AgentError::DuplicateId);
            }
            pending.insert(key.clone(), tx);
        }

        let envelope = frame::request_envelope(&id, method, params);
        let encoded = match frame::encode(&envelope) {
            Ok(s) => s,
            Err(err) => {
                self.shared.pending.lock().await.remove(&key);
                return Err(AgentError::InvalidParams(err.to_string()));
            }
        };

        if let Err(err) = self.shared.write_line(&encoded).await {
            self.shared.pending.lock().await.remove(&key);
            return Err(AgentError::Transport(err.to_string()));
        }

        tokio::pin!(rx);
        let timeout_fut = async {
            match timeout {
                Some(d) => tokio::time::sleep(d).await,
                None => std::future::pending::<()>().await,
            }
        };
        let cancel_fut = async {
            match &cancel {
                Some(token) => token.cancelled().await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            result = &mut rx => {
                self.shared.pending.lock().await.remove(&key);
                match result {
                    Ok(Ok(value)) => Ok(value),
                    Ok(Err(err)) => Err(err),
                    Err(_) => Err(AgentError::Transport("transport closed".into())),
                }
            }
            _ = self.shared.cancel.cancelled() => {
                self.shared.pending.lock().await.remove(&key);
                Err(AgentError::Transport("transport closed".into()))
            }
            _ = cancel_fut => {
                self.shared.pending.lock().await.remove(&key);
                Err(AgentError::Cancelled)
            }
            _ = timeout_fut => {
                self.shared.pending.lock().await.remove(&key);
                Err(AgentError::Timeout { timeout: timeout.unwrap_or_default() })
            }
        }
    }

    /// Sends a notification; no response is expected.
    pub async fn notify(
        &self,
        method: &str,
        params: Value,
        cancel: Option<CancellationToken>,
    ) -> Result<(), AgentError> {
        let envelope = frame::notification_envelope(method, params);
        let encoded =
            frame::encode(&envelope).map_err(|e| AgentError::InvalidParams(e.to_string()))?;

        let write_fut = self.shared.write_line(&encoded);
        tokio::pin!(write_fut);
        let cancel_fut = async {
            match &cancel {
                Some(token) => token.cancelled().await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            result = &mut write_fut => result.map_err(|e| AgentError::Transport(e.to_string())),
            _ = cancel_fut => Err(AgentError::Cancelled),
        }
    }

    pub async fn on_request(&self, handler: Option<RequestHandler>) {
        *self.shared.request_handler.lock().await = handler;
    }

    pub async fn on_notify(&self, handler: Option<NotificationHandler>) {
        *self.shared.notify_handler.lock().await = handler;
    }

    pub async fn on_panic(&self, callback: Option<PanicCallback>) {
        *self.shared.panic_callback.lock().await = callback;
    }

    /// Returns the last fatal reader error, if the reader loop has stopped abnormally.
    pub async fn scan_error(&self) -> Option<String> {
        self.shared.scan_error.lock().await.clone()
    }

    /// Transitions to `Closed`: drains pending waiters with a synthesized
    /// shutdown error, rejects subsequent sends, and half-closes the writer
    /// so a child process on the other end observes EOF on its stdin.
    /// Idempotent.
    pub async fn close(&self) {
        if self.shared.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.shared.cancel.cancel();

        {
            let mut pending = self.shared.pending.lock().await;
            for (_, tx) in pending.drain() {
                let _ = tx.send(Err(AgentError::Transport("transport closed".into())));
            }
        }

        let mut writer = self.shared.writer.lock().await;
        let _ = writer.shutdown().await;
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        self.shared.cancel.cancel();
        if let Ok(mut guard) = self.reader_task.try_lock() {
            if let Some(handle) = guard.take() {
                handle.abort();
            }
        }
    }
}

enum FrameRead {
    Line(Vec<u8>),
    TooLarge,
    Eof,
    Io(std::io::Error),
}

/// Reads one `\n`-terminated frame, enforcing `max_len` without growing the
/// buffer past it: once the running line exceeds the limit, further bytes up
/// to the next newline are consumed but not retained.
async fn read_frame_limited<R: AsyncBufRead + Unpin>(reader: &mut R, max_len: usize) -> FrameRead {
    use tokio::io::AsyncBufReadExt;

    let mut buf: Vec<u8> = Vec::new();
    loop {
        let available = match reader.fill_buf().await {
            Ok(bytes) => bytes,
            Err(err) => return FrameRead::Io(err),
        };
        if available.is_empty() {
            return if buf.is_empty() {
                FrameRead::Eof
            } else {
                FrameRead::Line(buf)
            };
        }

        if let Some(pos) = available.iter().position(|&b| b == b'\n') {
            if buf.len() <= max_len {
                buf.extend_from_slice(&available[..pos]);
            }
            reader.consume(pos + 1);
            return if buf.len() > max_len {
                FrameRead::TooLarge
            } else {
                FrameRead::Line(buf)
            };
        }

        let consumed = available.len();
        if buf.len() <= max_len {
            buf.extend_from_slice(available);
        }
        reader.consume(consumed);
    }
}

async fn reader_loop<R: AsyncRead + Unpin>(
    mut reader: BufReader<R>,
    shared: Arc<Shared>,
    max_frame_len: usize,
) {
    loop {
        let read_fut = read_frame_limited(&mut reader, max_frame_len);
        tokio::pin!(read_fut);

        let outcome = tokio::select! {
            biased;
            _ = shared.cancel.cancelled() => break,
            outcome = &mut read_fut => outcome,
        };

        match outcome {
            FrameRead::Eof => break,
            FrameRead::Io(err) => {
                shared.set_scan_error(err.to_string()).await;
                break;
            }
            FrameRead::TooLarge => {
                shared
                    .set_scan_error(format!("frame exceeded {max_frame_len} byte limit"))
                    .await;
                break;
            }
            FrameRead::Line(bytes) => {
                let line = String::from_utf8_lossy(&bytes);
                let line = line.trim_end();
                if line.is_empty() {
                    continue;
                }
                dispatch_line(line, &shared).await;
            }
        }
    }

    let mut pending = shared.pending.lock().await;
    for (_, tx) in pending.drain() {
        let _ = tx.send(Err(AgentError::Transport("transport closed".into())));
    }
}

async fn dispatch_line(line: &str, shared: &Arc<Shared>) {
    let value: Value = match serde_json::from_str(line) {
        Ok(value) => value,
        Err(err) => {
            warn!(%err, "dropping malformed JSON-RPC line");
            if let Some(id_value) = frame::recover_id(line) {
                deliver_parse_error(shared, &id_value).await;
            }
            return;
        }
    };

    let had_id = value.get("id").map(|v| !v.is_null()).unwrap_or(false);
    let id_value = value.get("id").cloned();

    match frame::classify(value) {
        Some(Incoming::Response(response)) => handle_response(response, shared).await,
        Some(Incoming::Request(request)) => {
            spawn_request_dispatch(shared.clone(), request.id, request.method, request.params);
        }
        Some(Incoming::Notification(notification)) => {
            spawn_notification_dispatch(shared.clone(), notification.method, notification.params);
        }
        None => {
            if had_id {
                if let Some(id_val) = id_value {
                    deliver_parse_error(shared, &id_val).await;
                    return;
                }
            }
            warn!("dropping malformed JSON-RPC frame");
        }
    }
}

async fn deliver_parse_error(shared: &Arc<Shared>, id_value: &Value) {
    let key = id::normalize(id_value);
    if let Some(tx) = shared.pending.lock().await.remove(&key) {
        let _ = tx.send(Err(AgentError::rpc(
            error_code::PARSE,
            "failed to parse response",
            None,
        )));
    }
}

async fn handle_response(response: frame::RpcResponse, shared: &Arc<Shared>) {
    let key = id::normalize(&response.id);
    let tx = { shared.pending.lock().await.remove(&key) };
    let Some(tx) = tx else {
        debug!("received response with no matching pending request");
        return;
    };

    let outcome = if let Some(error) = response.error {
        Err(AgentError::rpc(error.code, error.message, error.data))
    } else if let Some(result) = response.result {
        Ok(result)
    } else {
        Err(AgentError::Transport(
            "response missing result and error".into(),
        ))
    };

    let _ = tx.send(outcome);
}

fn spawn_request_dispatch(shared: Arc<Shared>, id: Value, method: String, params: Option<Value>) {
    tokio::spawn(async move {
        let handler = { shared.request_handler.lock().await.clone() };
        let response_envelope = match handler {
            None => frame::error_envelope(
                &id,
                error_code::METHOD_NOT_FOUND,
                format!("method not found: {method}"),
            ),
            Some(handler) => {
                let params = params.unwrap_or(Value::Null);
                let method_for_panic = method.clone();
                let join = tokio::spawn(handler(method, params));
                match join.await {
                    Ok(Ok(result)) => frame::response_envelope(&id, result),
                    Ok(Err(err)) => {
                        let (code, message, _data) = rpc_error_parts(&err);
                        frame::error_envelope(&id, code, message)
                    }
                    Err(_join_err) => {
                        warn!(method = %method_for_panic, "request handler panicked");
                        notify_panic(&shared, &method_for_panic).await;
                        frame::error_envelope(&id, error_code::INTERNAL, "internal handler error")
                    }
                }
            }
        };

        if let Ok(encoded) = frame::encode(&response_envelope) {
            if let Err(err) = shared.write_line(&encoded).await {
                warn!(%err, "failed to write response frame");
            }
        }
    });
}

fn spawn_notification_dispatch(shared: Arc<Shared>, method: String, params: Option<Value>) {
    tokio::spawn(async move {
        let handler = { shared.notify_handler.lock().await.clone() };
        let Some(handler) = handler else {
            return;
        };
        let params = params.unwrap_or(Value::Null);
        let method_for_panic = method.clone();
        let join = tokio::spawn(handler(method, params));
        if join.await.is_err() {
            warn!(method = %method_for_panic, "notification handler panicked");
            notify_panic(&shared, &method_for_panic).await;
        }
    });
}

async fn notify_panic(shared: &Arc<Shared>, method: &str) {
    if let Some(callback) = shared.panic_callback.lock().await.clone() {
        callback(method);
    }
}

/// Maps an [`AgentError`] returned by a request handler to the `(code, message, data)`
/// written back to the peer. Only [`AgentError::Rpc`] and [`AgentError::InvalidParams`]
/// pass their detail across the wire; everything else collapses to a fixed,
/// non-leaky internal-error message.
fn rpc_error_parts(err: &AgentError) -> (i64, String, Option<Value>) {
    match err {
        AgentError::Rpc { code, message, data } => (*code, message.clone(), data.clone()),
        AgentError::InvalidParams(message) => {
            (error_code::INVALID_PARAMS, message.clone(), None)
        }
        _ => (
            error_code::INTERNAL,
            "internal handler error".to_string(),
            None,
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::duplex_transport;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test]
    async fn p1_concurrent_sends_match_responses_delivered_out_of_order() {
        let (transport, mut peer) = duplex_transport(frame::DEFAULT_MAX_FRAME_LEN);
        let transport = Arc::new(transport);

        let handles: Vec<_> = [10, 11, 12]
            .into_iter()
            .map(|id| {
                let t = transport.clone();
                tokio::spawn(async move { t.send(Value::from(id), "m", Value::Null, None, None).await })
            })
            .collect();

        let mut seen_ids = Vec::new();
        for _ in 0..3 {
            let req = peer.recv().await;
            seen_ids.push(req["id"].as_i64().unwrap());
        }
        seen_ids.sort_unstable();
        assert_eq!(seen_ids, vec![10, 11, 12]);

        for id in [12, 10, 11] {
            peer.send(json!({"jsonrpc": "2.0", "id": id, "result": {"r": format!("r-{id}")}}))
                .await;
        }

        let mut results = Vec::new();
        for handle in handles {
            results.push(handle.await.unwrap().unwrap());
        }
        assert_eq!(results[0]["r"], "r-10");
        assert_eq!(results[1]["r"], "r-11");
        assert_eq!(results[2]["r"], "r-12");
    }

    #[tokio::test]
    async fn p3_duplicate_pending_id_rejected_without_transmitting_a_frame() {
        let (transport, mut peer) = duplex_transport(frame::DEFAULT_MAX_FRAME_LEN);
        let transport = Arc::new(transport);

        let t = transport.clone();
        let first = tokio::spawn(async move { t.send(Value::from(1), "m", Value::Null, None, None).await });
        let _req = peer.recv().await;

        let err = transport.send(Value::from(1), "m2", Value::Null, None, None).await;
        assert!(matches!(err, Err(AgentError::DuplicateId)));

        let no_second_frame = tokio::time::timeout(Duration::from_millis(50), peer.recv()).await;
        assert!(no_second_frame.is_err(), "duplicate send must not write a frame");

        peer.send(json!({"jsonrpc": "2.0", "id": 1, "result": {"ok": true}}))
            .await;
        assert!(first.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn p4_cancel_unblocks_send_and_discards_late_response() {
        let (transport, mut peer) = duplex_transport(frame::DEFAULT_MAX_FRAME_LEN);
        let transport = Arc::new(transport);
        let cancel = CancellationToken::new();

        let t = transport.clone();
        let c = cancel.clone();
        let handle =
            tokio::spawn(async move { t.send(Value::from(1), "m", Value::Null, None, Some(c)).await });
        let _req = peer.recv().await;

        cancel.cancel();
        let result = handle.await.unwrap();
        assert!(matches!(result, Err(AgentError::Cancelled)));

        // A late response for the now-cancelled id must be dropped, not crash.
        peer.send(json!({"jsonrpc": "2.0", "id": 1, "result": {"ok": true}}))
            .await;
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    #[tokio::test]
    async fn p5_close_unblocks_all_pending_sends_and_rejects_new_ones() {
        let (transport, mut peer) = duplex_transport(frame::DEFAULT_MAX_FRAME_LEN);
        let transport = Arc::new(transport);

        let handles: Vec<_> = (1..=5)
            .map(|id| {
                let t = transport.clone();
                tokio::spawn(async move { t.send(Value::from(id), "m", Value::Null, None, None).await })
            })
            .collect();

        for _ in 0..5 {
            peer.recv().await;
        }

        transport.close().await;

        for handle in handles {
            assert!(matches!(handle.await.unwrap(), Err(AgentError::Transport(_))));
        }

        let rejected = transport.send(Value::from(99), "m", Value::Null, None, None).await;
        assert!(matches!(rejected, Err(AgentError::Transport(_))));
    }

    #[tokio::test]
    async fn p6_panicking_request_handler_yields_internal_error_and_transport_survives() {
        let (transport, mut peer) = duplex_transport(frame::DEFAULT_MAX_FRAME_LEN);
        let calls = Arc::new(AtomicUsize::new(0));
        let counted = calls.clone();
        let handler: RequestHandler = Arc::new(move |_method: String, _params: Value| {
            let counted = counted.clone();
            Box::pin(async move {
                if counted.fetch_add(1, Ordering::SeqCst) == 0 {
                    panic!("boom");
                }
                Ok(json!({"ok": true}))
            })
        });
        transport.on_request(Some(handler)).await;

        peer.send(json!({"jsonrpc": "2.0", "id": "a", "method": "approval/x", "params": {}}))
            .await;
        let resp = peer.recv().await;
        assert_eq!(resp["id"], "a");
        assert_eq!(resp["error"]["code"], error_code::INTERNAL);

        peer.send(json!({"jsonrpc": "2.0", "id": "b", "method": "approval/x", "params": {}}))
            .await;
        let resp2 = peer.recv().await;
        assert_eq!(resp2["id"], "b");
        assert_eq!(resp2["result"]["ok"], true);
    }

    #[tokio::test]
    async fn p6_panicking_notification_handler_is_swallowed_and_dispatch_continues() {
        let (transport, mut peer) = duplex_transport(frame::DEFAULT_MAX_FRAME_LEN);
        let seen = Arc::new(AtomicUsize::new(0));
        let counted = seen.clone();
        let handler: NotificationHandler = Arc::new(move |_method, _params| {
            let counted = counted.clone();
            Box::pin(async move {
                if counted.fetch_add(1, Ordering::SeqCst) == 0 {
                    panic!("boom");
                }
            })
        });
        transport.on_notify(Some(handler)).await;

        let panics = Arc::new(AtomicUsize::new(0));
        let panic_count = panics.clone();
        let panic_callback: PanicCallback = Arc::new(move |_method| {
            panic_count.fetch_add(1, Ordering::SeqCst);
        });
        transport.on_panic(Some(panic_callback)).await;

        peer.send(json!({"jsonrpc": "2.0", "method": "thread/started", "params": {}}))
            .await;
        peer.send(json!({"jsonrpc": "2.0", "method": "thread/started", "params": {}}))
            .await;

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(seen.load(Ordering::SeqCst), 2);
        assert_eq!(panics.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn p8_unknown_method_gets_method_not_found_with_id_echo() {
        let (_transport, mut peer) = duplex_transport(frame::DEFAULT_MAX_FRAME_LEN);
        peer.send(json!({"jsonrpc": "2.0", "id": 7, "method": "nope", "params": {}}))
            .await;
        let resp = peer.recv().await;
        assert_eq!(resp["id"], 7);
        assert_eq!(resp["error"]["code"], error_code::METHOD_NOT_FOUND);
    }

    #[tokio::test]
    async fn p9_frame_under_limit_is_read_correctly() {
        let (transport, mut peer) = duplex_transport(10 * 1024 * 1024);
        let transport = Arc::new(transport);
        let t = transport.clone();
        let handle =
            tokio::spawn(async move { t.send(Value::from(1), "m", Value::Null, None, None).await });
        let _req = peer.recv().await;

        let blob = "x".repeat(5_000);
        peer.send(json!({"jsonrpc": "2.0", "id": 1, "result": {"blob": blob}}))
            .await;

        let result = handle.await.unwrap().unwrap();
        assert_eq!(result["blob"].as_str().unwrap().len(), 5_000);
    }

    #[tokio::test]
    async fn p9_frame_over_limit_terminates_reader_naming_the_limit() {
        let (transport, mut peer) =
            crate::test_support::duplex_transport_with_capacity(64, 1024 * 1024);
        let blob = "y".repeat(1_000);
        peer.send_raw(&format!(r#"{{"jsonrpc":"2.0","id":1,"result":{{"blob":"{blob}"}}}}"#))
            .await;

        tokio::time::sleep(Duration::from_millis(50)).await;
        let err = transport.scan_error().await.expect("scan error should be set");
        assert!(err.contains("64"), "error should name the configured limit: {err}");
    }

    #[tokio::test]
    async fn p10_malformed_response_with_recoverable_id_fails_waiter_with_rpc_parse() {
        let (transport, mut peer) = duplex_transport(frame::DEFAULT_MAX_FRAME_LEN);
        let transport = Arc::new(transport);
        let t = transport.clone();
        let handle =
            tokio::spawn(async move { t.send(Value::from(1), "m", Value::Null, None, None).await });
        let _req = peer.recv().await;

        peer.send_raw(r#"{"jsonrpc":"2.0","id":1,"result":}"#).await;

        match handle.await.unwrap() {
            Err(AgentError::Rpc { code, .. }) => assert_eq!(code, error_code::PARSE),
            other => panic!("expected Rpc(parse) error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn malformed_line_with_no_recoverable_id_is_silently_skipped() {
        let (transport, mut peer) = duplex_transport(frame::DEFAULT_MAX_FRAME_LEN);
        let transport = Arc::new(transport);
        let t = transport.clone();
        let handle = tokio::spawn(async move {
            t.send(
                Value::from(1),
                "m",
                Value::Null,
                Some(Duration::from_millis(200)),
                None,
            )
            .await
        });
        let _req = peer.recv().await;

        peer.send_raw("not json at all").await;
        peer.send(json!({"jsonrpc": "2.0", "id": 1, "result": {"ok": true}}))
            .await;

        assert!(handle.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn notify_has_no_response_path_and_surfaces_write_errors_after_close() {
        let (transport, mut peer) = duplex_transport(frame::DEFAULT_MAX_FRAME_LEN);
        transport.notify("thread/ping", json!({}), None).await.unwrap();
        let frame = peer.recv().await;
        assert_eq!(frame["method"], "thread/ping");
        assert!(frame.get("id").is_none());

        transport.close().await;
        let err = transport.notify("thread/ping", json!({}), None).await;
        assert!(err.is_err());
    }
}
