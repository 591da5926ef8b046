//! The isolated execution context.
//!
//! Untrusted script code runs here, on a dedicated thread owning its own
//! Rhai engine. The only connection to the privileged host is a pair of
//! envelope channels; no host object is ever reachable from script code,
//! and only serializable values cross in either direction.
//!
//! Two threads make up the context: a router that splits inbound traffic
//! into commands and capability-call responses, and an executor that
//! serializes all script evaluation. While the executor is blocked inside
//! a capability call, the router keeps draining responses for it.

use rhai::{Dynamic, Engine, EvalAltResult, FnAccess, Scope, AST};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use scriptcell_core::protocol::{Envelope, MessageBody, Origin};
use scriptcell_core::SandboxConfig;

use crate::convert::{dynamic_to_json, json_to_dynamic};
use crate::engine::{arm_guard, build_engine};

/// Host-side handle to a spawned sandbox: one channel in, one channel out.
pub struct SandboxHandle {
    /// Host → sandbox envelopes.
    pub inbound_tx: mpsc::Sender<Envelope>,
    /// Sandbox → host envelopes; the bridge's pump consumes this.
    pub outbound_rx: mpsc::Receiver<Envelope>,
}

/// Spawn a fresh isolated context. The context lives until the host drops
/// its side of the channels.
pub fn spawn(config: SandboxConfig, rpc_timeout: Duration) -> SandboxHandle {
    let (inbound_tx, inbound_rx) = mpsc::channel::<Envelope>(256);
    let (outbound_tx, outbound_rx) = mpsc::channel::<Envelope>(256);
    let (command_tx, command_rx) = std::sync::mpsc::channel::<MessageBody>();

    let pending: PendingRpcMap = Arc::new(Mutex::new(HashMap::new()));
    let principal = Arc::new(Mutex::new(String::new()));

    let port = CapabilityPort {
        outbound: outbound_tx.clone(),
        pending: pending.clone(),
        next_id: Arc::new(AtomicU64::new(1)),
        principal: principal.clone(),
        timeout: rpc_timeout,
    };

    std::thread::spawn(move || router_loop(inbound_rx, command_tx, pending));
    std::thread::spawn(move || executor_loop(config, outbound_tx, command_rx, principal, port));

    SandboxHandle { inbound_tx, outbound_rx }
}

type PendingRpcMap = Arc<Mutex<HashMap<u64, std::sync::mpsc::Sender<Result<Value, String>>>>>;

/// Sandbox-side endpoint for capability calls issued from script code.
///
/// Each call mints its own request id, parks a sender in the pending map
/// and blocks until the router delivers the matching response or the
/// deadline passes. Ids are never reused while pending.
#[derive(Clone)]
struct CapabilityPort {
    outbound: mpsc::Sender<Envelope>,
    pending: PendingRpcMap,
    next_id: Arc<AtomicU64>,
    principal: Arc<Mutex<String>>,
    timeout: Duration,
}

impl CapabilityPort {
    fn call(&self, method: &str, args: Vec<Value>) -> Result<Value, String> {
        let request_id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = std::sync::mpsc::channel();
        self.pending.lock().unwrap().insert(request_id, tx);

        let script_id = self.principal.lock().unwrap().clone();
        let envelope = Envelope::from_sandbox(MessageBody::Rpc {
            request_id,
            script_id,
            method: method.to_string(),
            args,
        });
        if self.outbound.blocking_send(envelope).is_err() {
            self.pending.lock().unwrap().remove(&request_id);
            return Err("host channel closed".to_string());
        }

        match rx.recv_timeout(self.timeout) {
            Ok(outcome) => outcome,
            Err(_) => {
                self.pending.lock().unwrap().remove(&request_id);
                Err(format!("capability call '{}' timed out", method))
            }
        }
    }
}

/// Split inbound host traffic: capability-call responses settle pending
/// entries, commands queue for the serial executor. Anything unmarked or
/// with the wrong declared origin is dropped without processing.
fn router_loop(
    mut inbound_rx: mpsc::Receiver<Envelope>,
    command_tx: std::sync::mpsc::Sender<MessageBody>,
    pending: PendingRpcMap,
) {
    while let Some(envelope) = inbound_rx.blocking_recv() {
        let Some(body) = envelope.accept(Origin::Host) else {
            continue;
        };
        match body {
            MessageBody::RpcResponse { request_id, ok, result, error } => {
                let sender = pending.lock().unwrap().remove(&request_id);
                match sender {
                    Some(tx) => {
                        let outcome = if ok {
                            Ok(result)
                        } else {
                            Err(error.unwrap_or_else(|| "capability call failed".to_string()))
                        };
                        let _ = tx.send(outcome);
                    }
                    None => {
                        debug!(request_id, "Ignoring rpc response with no pending call");
                    }
                }
            }
            body @ (MessageBody::Execute { .. }
            | MessageBody::Invoke { .. }
            | MessageBody::ClearAll { .. }) => {
                if command_tx.send(body).is_err() {
                    break;
                }
            }
            other => {
                debug!(?other, "Ignoring unexpected message in sandbox");
            }
        }
    }
    debug!("Sandbox router stopped");
}

struct ScriptSlot {
    ast: AST,
    scope: Scope<'static>,
}

/// The single evaluation loop. Announces readiness exactly once, then
/// processes commands strictly in order.
fn executor_loop(
    config: SandboxConfig,
    outbound: mpsc::Sender<Envelope>,
    commands: std::sync::mpsc::Receiver<MessageBody>,
    principal: Arc<Mutex<String>>,
    port: CapabilityPort,
) {
    if outbound
        .blocking_send(Envelope::from_sandbox(MessageBody::Ready))
        .is_err()
    {
        return;
    }

    let mut engine = build_engine(&config);
    register_capabilities(&mut engine, &port);

    let mut scripts: HashMap<String, ScriptSlot> = HashMap::new();

    while let Ok(command) = commands.recv() {
        let reply = match command {
            MessageBody::Execute { request_id, script_id, code } => {
                *principal.lock().unwrap() = script_id.clone();
                match load_script(&mut engine, &config, &code) {
                    Ok((slot, handlers)) => {
                        debug!(script = %script_id, count = handlers.len(), "Script loaded");
                        scripts.insert(script_id, slot);
                        MessageBody::ok_response(request_id, json!({ "handlers": handlers }))
                    }
                    Err(e) => {
                        warn!(script = %script_id, error = %e, "Script load failed");
                        MessageBody::err_response(request_id, e)
                    }
                }
            }
            MessageBody::Invoke { request_id, script_id, handler } => {
                *principal.lock().unwrap() = script_id.clone();
                match scripts.get_mut(&script_id) {
                    None => MessageBody::err_response(
                        request_id,
                        format!("Unknown script: {}", script_id),
                    ),
                    Some(slot) => {
                        arm_guard(&mut engine, &config);
                        match engine.call_fn::<Dynamic>(&mut slot.scope, &slot.ast, &handler, ()) {
                            Ok(value) => {
                                MessageBody::ok_response(request_id, dynamic_to_json(&value))
                            }
                            Err(e) => MessageBody::err_response(
                                request_id,
                                format!("Handler '{}' failed: {}", handler, e),
                            ),
                        }
                    }
                }
            }
            MessageBody::ClearAll { request_id } => {
                scripts.clear();
                MessageBody::ok_response(request_id, Value::Null)
            }
            other => {
                debug!(?other, "Executor ignoring non-command message");
                continue;
            }
        };
        if outbound.blocking_send(Envelope::from_sandbox(reply)).is_err() {
            break;
        }
    }
    debug!("Sandbox executor stopped");
}

/// Compile and evaluate one script, returning its slot and the handler
/// names it exports: every public top-level function not prefixed with an
/// underscore.
fn load_script(
    engine: &mut Engine,
    config: &SandboxConfig,
    code: &str,
) -> Result<(ScriptSlot, Vec<String>), String> {
    let ast = engine
        .compile(code)
        .map_err(|e| format!("Compilation error: {}", e))?;
    let mut scope = Scope::new();
    arm_guard(engine, config);
    engine
        .run_ast_with_scope(&mut scope, &ast)
        .map_err(|e| format!("Runtime error: {}", e))?;
    let handlers = exported_handlers(&ast);
    Ok((ScriptSlot { ast, scope }, handlers))
}

fn exported_handlers(ast: &AST) -> Vec<String> {
    let mut names: Vec<String> = ast
        .iter_functions()
        .filter(|f| f.access == FnAccess::Public && !f.name.starts_with('_'))
        .map(|f| f.name.to_string())
        .collect();
    names.sort();
    names.dedup();
    names
}

fn cap_err(e: String) -> Box<EvalAltResult> {
    e.into()
}

/// The fixed capability surface visible to script code. Every function is
/// a thin relay over the RPC channel; nothing here touches the page or any
/// host resource directly.
fn register_capabilities(engine: &mut Engine, port: &CapabilityPort) {
    // ─── Page queries ─────────────────────────────────────────────────
    {
        let port = port.clone();
        engine.register_fn("page_exists", move |selector: String| -> Result<bool, Box<EvalAltResult>> {
            let v = port.call("page.exists", vec![json!(selector)]).map_err(cap_err)?;
            Ok(v.as_bool().unwrap_or(false))
        });
    }
    {
        let port = port.clone();
        engine.register_fn("page_count", move |selector: String| -> Result<i64, Box<EvalAltResult>> {
            let v = port.call("page.count", vec![json!(selector)]).map_err(cap_err)?;
            Ok(v.as_i64().unwrap_or(0))
        });
    }
    {
        let port = port.clone();
        engine.register_fn("page_text", move |selector: String| -> Result<String, Box<EvalAltResult>> {
            let v = port.call("page.text", vec![json!(selector)]).map_err(cap_err)?;
            Ok(v.as_str().unwrap_or_default().to_string())
        });
    }
    {
        let port = port.clone();
        engine.register_fn("page_html", move |selector: String| -> Result<String, Box<EvalAltResult>> {
            let v = port.call("page.html", vec![json!(selector)]).map_err(cap_err)?;
            Ok(v.as_str().unwrap_or_default().to_string())
        });
    }
    {
        let port = port.clone();
        engine.register_fn("page_attr", move |selector: String, name: String| -> Result<String, Box<EvalAltResult>> {
            let v = port.call("page.attr", vec![json!(selector), json!(name)]).map_err(cap_err)?;
            Ok(v.as_str().unwrap_or_default().to_string())
        });
    }

    // ─── Page mutation ────────────────────────────────────────────────
    {
        let port = port.clone();
        engine.register_fn("page_set_attr", move |selector: String, name: String, value: String| -> Result<(), Box<EvalAltResult>> {
            port.call("page.set_attr", vec![json!(selector), json!(name), json!(value)]).map_err(cap_err)?;
            Ok(())
        });
    }
    {
        let port = port.clone();
        engine.register_fn("page_set_value", move |selector: String, value: String| -> Result<(), Box<EvalAltResult>> {
            port.call("page.set_value", vec![json!(selector), json!(value)]).map_err(cap_err)?;
            Ok(())
        });
    }
    {
        let port = port.clone();
        engine.register_fn("page_set_html", move |selector: String, html: String| -> Result<(), Box<EvalAltResult>> {
            port.call("page.set_html", vec![json!(selector), json!(html)]).map_err(cap_err)?;
            Ok(())
        });
    }
    {
        let port = port.clone();
        engine.register_fn("page_set_class", move |selector: String, class: String| -> Result<(), Box<EvalAltResult>> {
            port.call("page.set_class", vec![json!(selector), json!(class)]).map_err(cap_err)?;
            Ok(())
        });
    }
    {
        let port = port.clone();
        engine.register_fn("page_set_visible", move |selector: String, visible: bool| -> Result<(), Box<EvalAltResult>> {
            port.call("page.set_visible", vec![json!(selector), json!(visible)]).map_err(cap_err)?;
            Ok(())
        });
    }
    {
        let port = port.clone();
        engine.register_fn("page_type", move |selector: String, text: String| -> Result<(), Box<EvalAltResult>> {
            port.call("page.type", vec![json!(selector), json!(text)]).map_err(cap_err)?;
            Ok(())
        });
    }
    {
        let port = port.clone();
        engine.register_fn("page_type", move |selector: String, text: String, delay_ms: i64| -> Result<(), Box<EvalAltResult>> {
            port.call("page.type", vec![json!(selector), json!(text), json!(delay_ms)]).map_err(cap_err)?;
            Ok(())
        });
    }
    {
        let port = port.clone();
        engine.register_fn("page_wait_for", move |selector: String, timeout_ms: i64| -> Result<(), Box<EvalAltResult>> {
            port.call("page.wait_for", vec![json!(selector), json!(timeout_ms)]).map_err(cap_err)?;
            Ok(())
        });
    }

    // ─── Clipboard ────────────────────────────────────────────────────
    {
        let port = port.clone();
        engine.register_fn("copy_text", move |text: String| -> Result<(), Box<EvalAltResult>> {
            port.call("clipboard.copy_text", vec![json!(text)]).map_err(cap_err)?;
            Ok(())
        });
    }
    {
        let port = port.clone();
        engine.register_fn("copy_rich", move |html: String, fallback: String| -> Result<(), Box<EvalAltResult>> {
            port.call("clipboard.copy_rich", vec![json!(html), json!(fallback)]).map_err(cap_err)?;
            Ok(())
        });
    }

    // ─── Transient UI ─────────────────────────────────────────────────
    {
        let port = port.clone();
        engine.register_fn("toast", move |message: String| -> Result<(), Box<EvalAltResult>> {
            port.call("ui.toast", vec![json!(message)]).map_err(cap_err)?;
            Ok(())
        });
    }
    {
        let port = port.clone();
        engine.register_fn("toast", move |message: String, severity: String| -> Result<(), Box<EvalAltResult>> {
            port.call("ui.toast", vec![json!(message), json!(severity)]).map_err(cap_err)?;
            Ok(())
        });
    }
    {
        let port = port.clone();
        engine.register_fn("toast", move |message: String, severity: String, duration_ms: i64| -> Result<(), Box<EvalAltResult>> {
            port.call("ui.toast", vec![json!(message), json!(severity), json!(duration_ms)]).map_err(cap_err)?;
            Ok(())
        });
    }
    {
        let port = port.clone();
        engine.register_fn("modal_show", move |title: String, body: String| -> Result<String, Box<EvalAltResult>> {
            let v = port.call("ui.modal_show", vec![json!(title), json!(body)]).map_err(cap_err)?;
            Ok(v.as_str().unwrap_or_default().to_string())
        });
    }
    {
        let port = port.clone();
        engine.register_fn("modal_update", move |body: String| -> Result<(), Box<EvalAltResult>> {
            port.call("ui.modal_update", vec![json!(body)]).map_err(cap_err)?;
            Ok(())
        });
    }
    {
        let port = port.clone();
        engine.register_fn("modal_close", move || -> Result<(), Box<EvalAltResult>> {
            port.call("ui.modal_close", vec![]).map_err(cap_err)?;
            Ok(())
        });
    }

    // ─── Model proxy ──────────────────────────────────────────────────
    {
        let port = port.clone();
        engine.register_fn("llm_ask", move |prompt: String| -> Result<String, Box<EvalAltResult>> {
            let v = port.call("model.ask", vec![json!(prompt)]).map_err(cap_err)?;
            Ok(v.as_str().unwrap_or_default().to_string())
        });
    }

    // ─── Per-script storage ───────────────────────────────────────────
    {
        let port = port.clone();
        engine.register_fn("store_get", move |key: String| -> Result<Dynamic, Box<EvalAltResult>> {
            let v = port.call("store.get", vec![json!(key)]).map_err(cap_err)?;
            Ok(json_to_dynamic(&v))
        });
    }
    {
        let port = port.clone();
        engine.register_fn("store_set", move |key: String, value: Dynamic| -> Result<(), Box<EvalAltResult>> {
            port.call("store.set", vec![json!(key), dynamic_to_json(&value)]).map_err(cap_err)?;
            Ok(())
        });
    }

    // Local logging from script code; no RPC round trip.
    engine.register_fn("log", |message: String| {
        info!(source = "script", "{}", message);
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    const RECV_DEADLINE: Duration = Duration::from_secs(5);

    async fn next_body(handle: &mut SandboxHandle) -> MessageBody {
        let envelope = timeout(RECV_DEADLINE, handle.outbound_rx.recv())
            .await
            .expect("sandbox produced no message in time")
            .expect("sandbox channel closed");
        envelope.accept(Origin::Sandbox).expect("sandbox sent invalid envelope")
    }

    fn test_handle() -> SandboxHandle {
        spawn(SandboxConfig::default(), Duration::from_secs(2))
    }

    #[tokio::test]
    async fn test_announces_ready_once_on_start() {
        let mut handle = test_handle();
        assert!(matches!(next_body(&mut handle).await, MessageBody::Ready));
    }

    #[tokio::test]
    async fn test_execute_reports_exported_handlers() {
        let mut handle = test_handle();
        next_body(&mut handle).await; // Ready

        let code = r#"
            fn summarize() { "ok" }
            fn copy_title() { "ok" }
            fn _helper() { 42 }
            private fn internal() { 0 }
        "#;
        handle
            .inbound_tx
            .send(Envelope::from_host(MessageBody::Execute {
                request_id: 1,
                script_id: "s1".into(),
                code: code.into(),
            }))
            .await
            .unwrap();

        match next_body(&mut handle).await {
            MessageBody::Response { request_id, ok, result, .. } => {
                assert_eq!(request_id, 1);
                assert!(ok);
                let mut handlers: Vec<String> = result["handlers"]
                    .as_array()
                    .unwrap()
                    .iter()
                    .map(|v| v.as_str().unwrap().to_string())
                    .collect();
                handlers.sort();
                assert_eq!(handlers, vec!["copy_title", "summarize"]);
            }
            other => panic!("unexpected body: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_compile_error_is_isolated_failure() {
        let mut handle = test_handle();
        next_body(&mut handle).await;

        handle
            .inbound_tx
            .send(Envelope::from_host(MessageBody::Execute {
                request_id: 1,
                script_id: "bad".into(),
                code: "fn broken( {".into(),
            }))
            .await
            .unwrap();
        match next_body(&mut handle).await {
            MessageBody::Response { ok, error, .. } => {
                assert!(!ok);
                assert!(error.unwrap().contains("Compilation error"));
            }
            other => panic!("unexpected body: {:?}", other),
        }

        // The context survives and still loads good scripts.
        handle
            .inbound_tx
            .send(Envelope::from_host(MessageBody::Execute {
                request_id: 2,
                script_id: "good".into(),
                code: "fn run() { 1 }".into(),
            }))
            .await
            .unwrap();
        assert!(matches!(
            next_body(&mut handle).await,
            MessageBody::Response { ok: true, .. }
        ));
    }

    #[tokio::test]
    async fn test_invoke_runs_handler_and_relays_capability_calls() {
        let mut handle = test_handle();
        next_body(&mut handle).await;

        handle
            .inbound_tx
            .send(Envelope::from_host(MessageBody::Execute {
                request_id: 1,
                script_id: "s1".into(),
                code: r#"fn grab() { page_text("h1") + "!" }"#.into(),
            }))
            .await
            .unwrap();
        next_body(&mut handle).await; // execute response

        handle
            .inbound_tx
            .send(Envelope::from_host(MessageBody::Invoke {
                request_id: 2,
                script_id: "s1".into(),
                handler: "grab".into(),
            }))
            .await
            .unwrap();

        // The handler's page_text call arrives as an RPC envelope carrying
        // the script principal.
        let rpc_id = match next_body(&mut handle).await {
            MessageBody::Rpc { request_id, script_id, method, args } => {
                assert_eq!(script_id, "s1");
                assert_eq!(method, "page.text");
                assert_eq!(args[0], "h1");
                request_id
            }
            other => panic!("unexpected body: {:?}", other),
        };
        handle
            .inbound_tx
            .send(Envelope::from_host(MessageBody::ok_rpc_response(rpc_id, json!("Title"))))
            .await
            .unwrap();

        match next_body(&mut handle).await {
            MessageBody::Response { request_id, ok, result, .. } => {
                assert_eq!(request_id, 2);
                assert!(ok);
                assert_eq!(result, json!("Title!"));
            }
            other => panic!("unexpected body: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_capability_failure_is_catchable_not_fatal() {
        let mut handle = test_handle();
        next_body(&mut handle).await;

        let code = r#"
            fn careful() {
                try {
                    copy_text("secret");
                    "copied"
                } catch (e) {
                    "denied"
                }
            }
        "#;
        handle
            .inbound_tx
            .send(Envelope::from_host(MessageBody::Execute {
                request_id: 1,
                script_id: "s1".into(),
                code: code.into(),
            }))
            .await
            .unwrap();
        next_body(&mut handle).await;

        handle
            .inbound_tx
            .send(Envelope::from_host(MessageBody::Invoke {
                request_id: 2,
                script_id: "s1".into(),
                handler: "careful".into(),
            }))
            .await
            .unwrap();

        let rpc_id = match next_body(&mut handle).await {
            MessageBody::Rpc { request_id, method, .. } => {
                assert_eq!(method, "clipboard.copy_text");
                request_id
            }
            other => panic!("unexpected body: {:?}", other),
        };
        handle
            .inbound_tx
            .send(Envelope::from_host(MessageBody::err_rpc_response(
                rpc_id,
                "clipboard permission denied",
            )))
            .await
            .unwrap();

        match next_body(&mut handle).await {
            MessageBody::Response { ok, result, .. } => {
                assert!(ok, "a failed capability call must not fail the handler");
                assert_eq!(result, json!("denied"));
            }
            other => panic!("unexpected body: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_invoke_unknown_script_fails_cleanly() {
        let mut handle = test_handle();
        next_body(&mut handle).await;

        handle
            .inbound_tx
            .send(Envelope::from_host(MessageBody::Invoke {
                request_id: 9,
                script_id: "ghost".into(),
                handler: "run".into(),
            }))
            .await
            .unwrap();
        match next_body(&mut handle).await {
            MessageBody::Response { request_id, ok, error, .. } => {
                assert_eq!(request_id, 9);
                assert!(!ok);
                assert!(error.unwrap().contains("Unknown script"));
            }
            other => panic!("unexpected body: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_clear_all_drops_loaded_scripts() {
        let mut handle = test_handle();
        next_body(&mut handle).await;

        handle
            .inbound_tx
            .send(Envelope::from_host(MessageBody::Execute {
                request_id: 1,
                script_id: "s1".into(),
                code: "fn run() { 1 }".into(),
            }))
            .await
            .unwrap();
        next_body(&mut handle).await;

        handle
            .inbound_tx
            .send(Envelope::from_host(MessageBody::ClearAll { request_id: 2 }))
            .await
            .unwrap();
        assert!(matches!(
            next_body(&mut handle).await,
            MessageBody::Response { request_id: 2, ok: true, .. }
        ));

        handle
            .inbound_tx
            .send(Envelope::from_host(MessageBody::Invoke {
                request_id: 3,
                script_id: "s1".into(),
                handler: "run".into(),
            }))
            .await
            .unwrap();
        assert!(matches!(
            next_body(&mut handle).await,
            MessageBody::Response { request_id: 3, ok: false, .. }
        ));
    }

    #[tokio::test]
    async fn test_unmarked_and_misdeclared_traffic_is_dropped() {
        let mut handle = test_handle();
        next_body(&mut handle).await;

        let mut unmarked = Envelope::from_host(MessageBody::Execute {
            request_id: 1,
            script_id: "s1".into(),
            code: "fn run() { 1 }".into(),
        });
        unmarked.marker = "not-the-marker".into();
        handle.inbound_tx.send(unmarked).await.unwrap();

        // Declared origin says sandbox; the sandbox expects host traffic.
        let forged = Envelope::from_sandbox(MessageBody::Execute {
            request_id: 2,
            script_id: "s1".into(),
            code: "fn run() { 1 }".into(),
        });
        handle.inbound_tx.send(forged).await.unwrap();

        // Neither message produced a response; a valid one still works.
        handle
            .inbound_tx
            .send(Envelope::from_host(MessageBody::Execute {
                request_id: 3,
                script_id: "s1".into(),
                code: "fn run() { 1 }".into(),
            }))
            .await
            .unwrap();
        match next_body(&mut handle).await {
            MessageBody::Response { request_id, ok, .. } => {
                assert_eq!(request_id, 3);
                assert!(ok);
            }
            other => panic!("unexpected body: {:?}", other),
        }
    }
}
