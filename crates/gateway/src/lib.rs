//! The capability gateway: the fixed, validated operation set sandboxed
//! code may invoke through the bridge.
//!
//! Every invocation arrives with the calling script's id as principal.
//! Failures are ordinary errors carried back over the RPC response path;
//! nothing here can fault the bridge or another script.

pub mod clipboard;
pub mod method;
pub mod page;
pub mod ui;

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::debug;

use scriptcell_bridge::CapabilityHandler;
use scriptcell_core::{Error, Result};
use scriptcell_providers::ModelProvider;
use scriptcell_storage::ScriptStore;

pub use clipboard::{Clipboard, SystemClipboard};
pub use method::CapabilityMethod;
pub use page::{HtmlPage, PageSubstrate};
pub use ui::{ToastSeverity, UiEvent, UiHub, DEFAULT_TOAST_DURATION_MS};

const DEFAULT_WAIT_TIMEOUT_MS: u64 = 5_000;
const UI_EVENT_BUFFER: usize = 64;

pub struct CapabilityGateway {
    page: Arc<dyn PageSubstrate>,
    clipboard: Arc<dyn Clipboard>,
    ui: UiHub,
    model: Option<Arc<dyn ModelProvider>>,
    store: Arc<ScriptStore>,
    wait_poll: Duration,
}

impl CapabilityGateway {
    /// Build a gateway over the given page and store. The returned receiver
    /// feeds UI collaborators with toast/modal events.
    pub fn new(
        page: Arc<dyn PageSubstrate>,
        store: Arc<ScriptStore>,
    ) -> (Self, mpsc::Receiver<UiEvent>) {
        let (ui, ui_rx) = UiHub::new(UI_EVENT_BUFFER);
        (
            Self {
                page,
                clipboard: Arc::new(SystemClipboard),
                ui,
                model: None,
                store,
                wait_poll: Duration::from_millis(100),
            },
            ui_rx,
        )
    }

    pub fn with_model(mut self, model: Arc<dyn ModelProvider>) -> Self {
        self.model = Some(model);
        self
    }

    pub fn with_clipboard(mut self, clipboard: Arc<dyn Clipboard>) -> Self {
        self.clipboard = clipboard;
        self
    }

    pub fn with_wait_poll(mut self, poll: Duration) -> Self {
        self.wait_poll = poll;
        self
    }

    async fn page_type(&self, selector: &str, text: &str, delay_ms: u64) -> Result<()> {
        let mut typed = String::new();
        for ch in text.chars() {
            typed.push(ch);
            self.page.set_value(selector, &typed).await?;
            self.page.dispatch_event(selector, "input").await?;
            if delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            }
        }
        self.page.dispatch_event(selector, "change").await?;
        Ok(())
    }

    /// Bounded wait for a selector to appear. Resolves immediately when the
    /// condition already holds; otherwise polls until the deadline and then
    /// fails with a timeout error, leaving nothing behind either way.
    async fn wait_for(&self, selector: &str, timeout_ms: u64) -> Result<Value> {
        if self.page.exists(selector).await {
            return Ok(json!(true));
        }
        let deadline = Instant::now() + Duration::from_millis(timeout_ms);
        loop {
            tokio::time::sleep(self.wait_poll).await;
            if self.page.exists(selector).await {
                return Ok(json!(true));
            }
            if Instant::now() >= deadline {
                return Err(Error::Capability(format!(
                    "wait_for '{}' timed out after {}ms",
                    selector, timeout_ms
                )));
            }
        }
    }
}

fn str_arg<'a>(args: &'a [Value], index: usize, method: &str) -> Result<&'a str> {
    args.get(index)
        .and_then(|v| v.as_str())
        .ok_or_else(|| Error::Capability(format!("{}: missing string argument {}", method, index)))
}

fn opt_u64_arg(args: &[Value], index: usize) -> Option<u64> {
    args.get(index).and_then(|v| v.as_u64())
}

fn bool_arg(args: &[Value], index: usize, method: &str) -> Result<bool> {
    args.get(index)
        .and_then(|v| v.as_bool())
        .ok_or_else(|| Error::Capability(format!("{}: missing boolean argument {}", method, index)))
}

#[async_trait]
impl CapabilityHandler for CapabilityGateway {
    async fn dispatch(&self, script_id: &str, method: &str, args: &[Value]) -> Result<Value> {
        let Some(parsed) = CapabilityMethod::parse(method) else {
            return Err(Error::Capability(format!("unsupported method: {}", method)));
        };
        debug!(script = script_id, method = method, "Capability call");

        use CapabilityMethod::*;
        match parsed {
            PageExists => {
                let selector = str_arg(args, 0, method)?;
                Ok(json!(self.page.exists(selector).await))
            }
            PageCount => {
                let selector = str_arg(args, 0, method)?;
                Ok(json!(self.page.count(selector).await))
            }
            PageText => {
                let selector = str_arg(args, 0, method)?;
                Ok(json!(self.page.text(selector).await.unwrap_or_default()))
            }
            PageHtml => {
                let selector = str_arg(args, 0, method)?;
                Ok(json!(self.page.html(selector).await.unwrap_or_default()))
            }
            PageAttr => {
                let selector = str_arg(args, 0, method)?;
                let name = str_arg(args, 1, method)?;
                Ok(json!(self.page.attr(selector, name).await.unwrap_or_default()))
            }
            PageSetAttr => {
                let selector = str_arg(args, 0, method)?;
                let name = str_arg(args, 1, method)?;
                let value = str_arg(args, 2, method)?;
                self.page.set_attr(selector, name, value).await?;
                Ok(Value::Null)
            }
            PageSetValue => {
                let selector = str_arg(args, 0, method)?;
                let value = str_arg(args, 1, method)?;
                self.page.set_value(selector, value).await?;
                Ok(Value::Null)
            }
            PageSetHtml => {
                let selector = str_arg(args, 0, method)?;
                let html = str_arg(args, 1, method)?;
                self.page.set_html(selector, html).await?;
                Ok(Value::Null)
            }
            PageSetClass => {
                let selector = str_arg(args, 0, method)?;
                let class = str_arg(args, 1, method)?;
                self.page.set_class(selector, class).await?;
                Ok(Value::Null)
            }
            PageSetVisible => {
                let selector = str_arg(args, 0, method)?;
                let visible = bool_arg(args, 1, method)?;
                self.page.set_visible(selector, visible).await?;
                Ok(Value::Null)
            }
            PageType => {
                let selector = str_arg(args, 0, method)?;
                let text = str_arg(args, 1, method)?;
                let delay_ms = opt_u64_arg(args, 2).unwrap_or(0);
                self.page_type(selector, text, delay_ms).await?;
                Ok(Value::Null)
            }
            PageWaitFor => {
                let selector = str_arg(args, 0, method)?;
                let timeout_ms = opt_u64_arg(args, 1).unwrap_or(DEFAULT_WAIT_TIMEOUT_MS);
                self.wait_for(selector, timeout_ms).await
            }
            ClipboardCopyText => {
                let text = str_arg(args, 0, method)?;
                self.clipboard.copy_text(text)?;
                Ok(Value::Null)
            }
            ClipboardCopyRich => {
                let html = str_arg(args, 0, method)?;
                let alt_text = str_arg(args, 1, method)?;
                if let Err(e) = self.clipboard.copy_rich(html, alt_text) {
                    debug!(error = %e, "Rich copy failed, falling back to plain text");
                    self.clipboard.copy_text(alt_text)?;
                }
                Ok(Value::Null)
            }
            UiToast => {
                let message = str_arg(args, 0, method)?;
                let severity = args
                    .get(1)
                    .and_then(|v| v.as_str())
                    .map(ToastSeverity::parse)
                    .unwrap_or_default();
                let duration_ms = opt_u64_arg(args, 2).unwrap_or(DEFAULT_TOAST_DURATION_MS);
                self.ui.toast(script_id, message, severity, duration_ms);
                Ok(Value::Null)
            }
            UiModalShow => {
                let title = str_arg(args, 0, method)?;
                let body = str_arg(args, 1, method)?;
                let modal_id = self.ui.modal_show(script_id, title, body);
                Ok(json!(modal_id))
            }
            UiModalUpdate => {
                let body = str_arg(args, 0, method)?;
                self.ui.modal_update(body)?;
                Ok(Value::Null)
            }
            UiModalClose => {
                self.ui.modal_close();
                Ok(Value::Null)
            }
            ModelAsk => {
                let prompt = str_arg(args, 0, method)?;
                let model = self
                    .model
                    .as_ref()
                    .ok_or_else(|| Error::Capability("no model provider configured".to_string()))?;
                let answer = model.ask(prompt).await?;
                Ok(json!(answer))
            }
            StoreGet => {
                let key = str_arg(args, 0, method)?;
                Ok(self.store.get(script_id, key)?.unwrap_or(Value::Null))
            }
            StoreSet => {
                let key = str_arg(args, 0, method)?;
                let value = args.get(1).cloned().unwrap_or(Value::Null);
                self.store.set(script_id, key, &value)?;
                Ok(Value::Null)
            }
        }
    }
}
