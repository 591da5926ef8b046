use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, warn};

use scriptcell_core::protocol::{Envelope, MessageBody, Origin};
use scriptcell_core::{BridgeConfig, Error, Result, SandboxConfig, ScriptDescriptor};
use scriptcell_sandbox::SandboxHandle;

/// The fixed operation set sandboxed code may invoke. Implemented by the
/// capability gateway; the bridge only relays and never interprets the
/// method itself.
#[async_trait]
pub trait CapabilityHandler: Send + Sync {
    async fn dispatch(&self, script_id: &str, method: &str, args: &[Value]) -> Result<Value>;
}

/// A call's protocol-level reply: `ok:true` carries a result, `ok:false`
/// carries the counterpart's error message. Transport-level failures
/// (timeout, destruction) never reach this layer.
type Reply = std::result::Result<Value, String>;

type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<Reply>>>>;

/// Handshake state. Calls issued before the sandbox announces readiness
/// park their envelopes here and are flushed, in order, on `Ready`.
/// The ready flag and the queue share one lock so a flush can never race
/// a late enqueue.
#[derive(Default)]
struct ReadyState {
    ready: bool,
    queue: Vec<Envelope>,
}

struct Transport {
    to_sandbox: mpsc::Sender<Envelope>,
    pump: tokio::task::JoinHandle<()>,
}

pub struct SandboxBridge {
    bridge_config: BridgeConfig,
    sandbox_config: SandboxConfig,
    handler: Arc<dyn CapabilityHandler>,
    transport: Mutex<Option<Transport>>,
    pending: PendingMap,
    ready_state: Arc<std::sync::Mutex<ReadyState>>,
    next_id: AtomicU64,
}

impl SandboxBridge {
    pub fn new(
        bridge_config: BridgeConfig,
        sandbox_config: SandboxConfig,
        handler: Arc<dyn CapabilityHandler>,
    ) -> Self {
        Self {
            bridge_config,
            sandbox_config,
            handler,
            transport: Mutex::new(None),
            pending: Arc::new(Mutex::new(HashMap::new())),
            ready_state: Arc::new(std::sync::Mutex::new(ReadyState::default())),
            next_id: AtomicU64::new(1),
        }
    }

    /// Load a script into the sandbox. Returns the handler names the
    /// script exported; an empty set is a valid load.
    pub async fn execute(&self, descriptor: &ScriptDescriptor) -> Result<HashSet<String>> {
        let reply = self
            .call(|request_id| MessageBody::Execute {
                request_id,
                script_id: descriptor.id.clone(),
                code: descriptor.source_code.clone(),
            })
            .await?;
        match reply {
            Ok(result) => {
                let handlers = result["handlers"]
                    .as_array()
                    .map(|arr| {
                        arr.iter()
                            .filter_map(|v| v.as_str().map(|s| s.to_string()))
                            .collect::<HashSet<String>>()
                    })
                    .unwrap_or_default();
                Ok(handlers)
            }
            Err(e) => Err(Error::ScriptLoad(format!("{}: {}", descriptor.id, e))),
        }
    }

    /// Run a previously loaded handler inside the sandbox.
    pub async fn invoke(&self, script_id: &str, handler: &str) -> Result<Value> {
        let reply = self
            .call(|request_id| MessageBody::Invoke {
                request_id,
                script_id: script_id.to_string(),
                handler: handler.to_string(),
            })
            .await?;
        reply.map_err(Error::Invocation)
    }

    /// Ask the sandbox to drop every loaded script.
    pub async fn clear_all(&self) -> Result<()> {
        let reply = self.call(|request_id| MessageBody::ClearAll { request_id }).await?;
        reply.map(|_| ()).map_err(Error::Sandbox)
    }

    /// Tear down the isolated context. Every outstanding call is rejected
    /// with a transport error; a later call spawns a fresh context.
    pub async fn shutdown(&self) {
        if let Some(transport) = self.transport.lock().await.take() {
            transport.pump.abort();
            drop(transport.to_sandbox);
        }
        // Dropping the senders settles every waiter with a transport error.
        self.pending.lock().await.clear();
        let mut state = self.ready_state.lock().unwrap();
        state.ready = false;
        state.queue.clear();
    }

    /// One outbound round trip: mint an id, park the continuation, send (or
    /// queue until handshake), then await settlement within the deadline.
    async fn call(&self, make_body: impl FnOnce(u64) -> MessageBody) -> Result<Reply> {
        let to_sandbox = self.ensure_transport().await?;

        let request_id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(request_id, tx);

        let envelope = Envelope::from_host(make_body(request_id));
        let send_now = {
            let mut state = self.ready_state.lock().unwrap();
            if state.ready {
                Some(envelope)
            } else {
                debug!(request_id, "Sandbox not ready, queueing call");
                state.queue.push(envelope);
                None
            }
        };
        if let Some(envelope) = send_now {
            if to_sandbox.send(envelope).await.is_err() {
                self.pending.lock().await.remove(&request_id);
                return Err(Error::Transport("sandbox channel closed".to_string()));
            }
        }

        let timeout = Duration::from_millis(self.bridge_config.call_timeout_ms);
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(_)) => Err(Error::Transport(
                "bridge shut down before response".to_string(),
            )),
            Err(_) => {
                // A completion arriving after this point finds no pending
                // entry and is ignored.
                self.pending.lock().await.remove(&request_id);
                Err(Error::TransportTimeout(format!(
                    "request {} got no response within {}ms",
                    request_id, self.bridge_config.call_timeout_ms
                )))
            }
        }
    }

    /// Spawn the isolated context on first use; afterwards hand back the
    /// existing channel. Never recreated unless `shutdown` released it.
    async fn ensure_transport(&self) -> Result<mpsc::Sender<Envelope>> {
        let mut guard = self.transport.lock().await;
        if let Some(transport) = guard.as_ref() {
            return Ok(transport.to_sandbox.clone());
        }

        debug!("Spawning isolated script context");
        let SandboxHandle { inbound_tx, outbound_rx } = scriptcell_sandbox::spawn(
            self.sandbox_config.clone(),
            Duration::from_millis(self.bridge_config.rpc_timeout_ms),
        );
        let pump = tokio::spawn(pump_loop(
            outbound_rx,
            inbound_tx.clone(),
            self.pending.clone(),
            self.ready_state.clone(),
            self.handler.clone(),
        ));
        *guard = Some(Transport { to_sandbox: inbound_tx.clone(), pump });
        Ok(inbound_tx)
    }
}

impl Drop for SandboxBridge {
    fn drop(&mut self) {
        if let Ok(guard) = self.transport.try_lock() {
            if let Some(transport) = guard.as_ref() {
                transport.pump.abort();
            }
        }
    }
}

/// Reads everything the sandbox sends: the readiness handshake, responses
/// to host calls, and capability invocations from script code. Unmarked or
/// misdeclared envelopes are dropped before any processing.
async fn pump_loop(
    mut from_sandbox: mpsc::Receiver<Envelope>,
    to_sandbox: mpsc::Sender<Envelope>,
    pending: PendingMap,
    ready_state: Arc<std::sync::Mutex<ReadyState>>,
    handler: Arc<dyn CapabilityHandler>,
) {
    while let Some(envelope) = from_sandbox.recv().await {
        let Some(body) = envelope.accept(Origin::Sandbox) else {
            continue;
        };
        match body {
            MessageBody::Ready => {
                let queued = {
                    let mut state = ready_state.lock().unwrap();
                    if state.ready {
                        debug!("Ignoring repeated handshake");
                        Vec::new()
                    } else {
                        state.ready = true;
                        std::mem::take(&mut state.queue)
                    }
                };
                if !queued.is_empty() {
                    debug!(count = queued.len(), "Sandbox ready, flushing queued calls");
                }
                for queued_envelope in queued {
                    if to_sandbox.send(queued_envelope).await.is_err() {
                        break;
                    }
                }
            }
            MessageBody::Response { request_id, ok, result, error } => {
                let entry = pending.lock().await.remove(&request_id);
                match entry {
                    Some(tx) => {
                        let reply = if ok {
                            Ok(result)
                        } else {
                            Err(error.unwrap_or_else(|| "call failed".to_string()))
                        };
                        let _ = tx.send(reply);
                    }
                    None => {
                        // Timed out, settled, or never ours; stale and
                        // duplicate traffic lands here.
                        debug!(request_id, "Ignoring response with no pending request");
                    }
                }
            }
            MessageBody::Rpc { request_id, script_id, method, args } => {
                // Dispatched off the pump so a slow capability (waits,
                // model queries) never blocks responses or the handshake.
                let handler = handler.clone();
                let to_sandbox = to_sandbox.clone();
                tokio::spawn(async move {
                    let reply = match handler.dispatch(&script_id, &method, &args).await {
                        Ok(value) => MessageBody::ok_rpc_response(request_id, value),
                        Err(e) => {
                            debug!(script = %script_id, method = %method, error = %e, "Capability call failed");
                            MessageBody::err_rpc_response(request_id, e.to_string())
                        }
                    };
                    let _ = to_sandbox.send(Envelope::from_host(reply)).await;
                });
            }
            other => {
                debug!(?other, "Ignoring unexpected message from sandbox");
            }
        }
    }

    // Context gone: reject everything still outstanding.
    warn!("Sandbox channel closed, failing all pending requests");
    pending.lock().await.clear();
    ready_state.lock().unwrap().ready = false;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex as StdMutex;

    fn descriptor(id: &str, code: &str) -> ScriptDescriptor {
        ScriptDescriptor {
            id: id.to_string(),
            name: id.to_string(),
            source_code: code.to_string(),
            match_patterns: vec!["*".into()],
            match_type: Default::default(),
            declared_actions: vec![],
        }
    }

    /// Records capability invocations and answers from a canned table.
    struct FakeGateway {
        calls: StdMutex<Vec<(String, String)>>,
        delay: Option<Duration>,
    }

    impl FakeGateway {
        fn new() -> Arc<Self> {
            Arc::new(Self { calls: StdMutex::new(Vec::new()), delay: None })
        }

        fn slow(delay: Duration) -> Arc<Self> {
            Arc::new(Self { calls: StdMutex::new(Vec::new()), delay: Some(delay) })
        }
    }

    #[async_trait]
    impl CapabilityHandler for FakeGateway {
        async fn dispatch(&self, script_id: &str, method: &str, _args: &[Value]) -> Result<Value> {
            self.calls
                .lock()
                .unwrap()
                .push((script_id.to_string(), method.to_string()));
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            match method {
                "page.text" => Ok(json!("Example Domain")),
                "clipboard.copy_text" => Err(Error::Capability("clipboard denied".into())),
                other => Err(Error::Capability(format!("unsupported method: {}", other))),
            }
        }
    }

    fn bridge_with(handler: Arc<dyn CapabilityHandler>) -> SandboxBridge {
        SandboxBridge::new(BridgeConfig::default(), SandboxConfig::default(), handler)
    }

    #[tokio::test]
    async fn test_execute_returns_exact_handler_set() {
        let bridge = bridge_with(FakeGateway::new());
        let handlers = bridge
            .execute(&descriptor("s1", "fn h1() { 1 }\nfn h2() { 2 }"))
            .await
            .unwrap();
        let expected: HashSet<String> = ["h1", "h2"].iter().map(|s| s.to_string()).collect();
        assert_eq!(handlers, expected);
    }

    #[tokio::test]
    async fn test_calls_issued_before_handshake_are_queued_and_flushed() {
        // execute() races the sandbox's Ready announcement; queue-until-ready
        // means it must settle either way.
        let bridge = bridge_with(FakeGateway::new());
        let handlers = bridge
            .execute(&descriptor("early", "fn go() { 0 }"))
            .await
            .unwrap();
        assert!(handlers.contains("go"));
    }

    #[tokio::test]
    async fn test_invoke_round_trip_through_capability_gateway() {
        let gateway = FakeGateway::new();
        let bridge = bridge_with(gateway.clone());

        bridge
            .execute(&descriptor("s1", r#"fn grab() { page_text("h1") }"#))
            .await
            .unwrap();
        let result = bridge.invoke("s1", "grab").await.unwrap();
        assert_eq!(result, json!("Example Domain"));

        let calls = gateway.calls.lock().unwrap();
        assert_eq!(calls.as_slice(), &[("s1".to_string(), "page.text".to_string())]);
    }

    #[tokio::test]
    async fn test_capability_failure_travels_as_error_reply() {
        // The denied clipboard call reaches the script as a catchable
        // error; the invoke itself settles ok with the fallback value.
        let bridge = bridge_with(FakeGateway::new());
        let code = r#"
            fn take() {
                try { copy_text("x"); "copied" } catch (e) { "denied" }
            }
        "#;
        bridge.execute(&descriptor("s1", code)).await.unwrap();
        assert_eq!(bridge.invoke("s1", "take").await.unwrap(), json!("denied"));
    }

    #[tokio::test]
    async fn test_script_load_failure_is_script_load_error() {
        let bridge = bridge_with(FakeGateway::new());
        let err = bridge
            .execute(&descriptor("bad", "fn broken( {"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ScriptLoad(_)), "got {:?}", err);
    }

    #[tokio::test]
    async fn test_timeout_rejects_and_late_completion_is_inert() {
        // The capability handler stalls past the call deadline, so the
        // execute (whose top-level code calls it) times out. The late
        // sandbox completion then finds no pending entry.
        let mut config = BridgeConfig::default();
        config.call_timeout_ms = 200;
        config.rpc_timeout_ms = 5_000;
        let bridge = SandboxBridge::new(
            config,
            SandboxConfig::default(),
            FakeGateway::slow(Duration::from_millis(600)),
        );

        let err = bridge
            .execute(&descriptor("slow", r#"page_text("h1");"#))
            .await
            .unwrap_err();
        assert!(err.is_timeout(), "got {:?}", err);

        // Give the stalled completion time to land against the bridge.
        tokio::time::sleep(Duration::from_millis(700)).await;

        // The bridge is still healthy and ids were not reused.
        let handlers = bridge
            .execute(&descriptor("next", "fn ping() { 1 }"))
            .await
            .unwrap();
        assert!(handlers.contains("ping"));
    }

    #[tokio::test]
    async fn test_shutdown_rejects_outstanding_requests() {
        let bridge = Arc::new(SandboxBridge::new(
            BridgeConfig { call_timeout_ms: 10_000, ..Default::default() },
            SandboxConfig::default(),
            FakeGateway::slow(Duration::from_secs(30)),
        ));

        let caller = {
            let bridge = bridge.clone();
            tokio::spawn(async move {
                bridge
                    .execute(&descriptor("hang", r#"page_text("h1");"#))
                    .await
            })
        };
        // Let the call reach the sandbox and stall inside the capability.
        tokio::time::sleep(Duration::from_millis(300)).await;
        bridge.shutdown().await;

        let err = caller.await.unwrap().unwrap_err();
        assert!(matches!(err, Error::Transport(_)), "got {:?}", err);
    }

    #[tokio::test]
    async fn test_clear_all_round_trip() {
        let bridge = bridge_with(FakeGateway::new());
        bridge.execute(&descriptor("s1", "fn run() { 1 }")).await.unwrap();
        bridge.clear_all().await.unwrap();

        let err = bridge.invoke("s1", "run").await.unwrap_err();
        assert!(matches!(err, Error::Invocation(_)), "got {:?}", err);
    }
}
