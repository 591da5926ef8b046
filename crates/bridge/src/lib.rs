//! Host-side RPC transport to the isolated script context.
//!
//! The bridge owns the sandbox: it spawns exactly one isolated context per
//! page session (lazily, on first use), correlates every outbound call with
//! its response by request id, enforces the call deadline, and relays
//! capability invocations coming back from script code to the gateway.

pub mod bridge;

pub use bridge::{CapabilityHandler, SandboxBridge};
