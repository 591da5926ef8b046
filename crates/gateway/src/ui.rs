//! Transient UI surface: toasts and a single-slot modal.
//!
//! The gateway never renders anything itself; it emits events to whatever
//! UI collaborator is listening. A missing or lagging listener never fails
//! a script.

use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use tokio::sync::mpsc;
use tracing::debug;

use scriptcell_core::{Error, Result};

pub const DEFAULT_TOAST_DURATION_MS: u64 = 4_000;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ToastSeverity {
    #[default]
    Info,
    Success,
    Warning,
    Error,
}

impl ToastSeverity {
    /// Unknown severities degrade to `info` instead of failing the script.
    pub fn parse(raw: &str) -> Self {
        match raw {
            "success" => Self::Success,
            "warning" => Self::Warning,
            "error" => Self::Error,
            _ => Self::Info,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UiEvent {
    Toast {
        script_id: String,
        message: String,
        severity: ToastSeverity,
        duration_ms: u64,
    },
    ModalShow {
        modal_id: String,
        script_id: String,
        title: String,
        body: String,
    },
    ModalUpdate {
        modal_id: String,
        body: String,
    },
    ModalClose {
        modal_id: String,
    },
}

/// Owns the event channel toward UI collaborators and the single active
/// modal slot. Opening a new modal replaces the existing one.
pub struct UiHub {
    events: mpsc::Sender<UiEvent>,
    active_modal: Mutex<Option<String>>,
}

impl UiHub {
    pub fn new(buffer: usize) -> (Self, mpsc::Receiver<UiEvent>) {
        let (tx, rx) = mpsc::channel(buffer);
        (
            Self { events: tx, active_modal: Mutex::new(None) },
            rx,
        )
    }

    fn emit(&self, event: UiEvent) {
        if let Err(e) = self.events.try_send(event) {
            debug!(error = %e, "Dropping ui event, no listener keeping up");
        }
    }

    pub fn toast(
        &self,
        script_id: &str,
        message: &str,
        severity: ToastSeverity,
        duration_ms: u64,
    ) {
        self.emit(UiEvent::Toast {
            script_id: script_id.to_string(),
            message: message.to_string(),
            severity,
            duration_ms,
        });
    }

    /// Show a modal, replacing any active one. Returns the new modal id.
    pub fn modal_show(&self, script_id: &str, title: &str, body: &str) -> String {
        let modal_id = uuid::Uuid::new_v4().to_string();
        let replaced = {
            let mut active = self.active_modal.lock().unwrap();
            active.replace(modal_id.clone())
        };
        if let Some(old_id) = replaced {
            self.emit(UiEvent::ModalClose { modal_id: old_id });
        }
        self.emit(UiEvent::ModalShow {
            modal_id: modal_id.clone(),
            script_id: script_id.to_string(),
            title: title.to_string(),
            body: body.to_string(),
        });
        modal_id
    }

    pub fn modal_update(&self, body: &str) -> Result<()> {
        let modal_id = self
            .active_modal
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| Error::Capability("no active modal to update".to_string()))?;
        self.emit(UiEvent::ModalUpdate { modal_id, body: body.to_string() });
        Ok(())
    }

    /// Closing with no active modal is a no-op.
    pub fn modal_close(&self) {
        let closed = self.active_modal.lock().unwrap().take();
        if let Some(modal_id) = closed {
            self.emit(UiEvent::ModalClose { modal_id });
        }
    }
}
