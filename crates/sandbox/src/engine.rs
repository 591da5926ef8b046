use rhai::{Dynamic, Engine};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use scriptcell_core::SandboxConfig;

/// Build a locked-down engine for untrusted script code.
///
/// Size and depth caps are permanent engine state; the operation/deadline
/// guard is re-armed per evaluation with [`arm_guard`].
pub fn build_engine(config: &SandboxConfig) -> Engine {
    let mut engine = Engine::new();

    engine.set_max_string_size(config.max_string_size);
    engine.set_max_array_size(config.max_array_size);
    engine.set_max_map_size(config.max_map_size);
    engine.set_max_call_levels(config.max_call_stack_depth);
    engine.set_max_expr_depths(64, 64);

    engine
}

/// Install a fresh operation counter and wall-clock deadline before one
/// evaluation. Exceeding either terminates the script, never the context.
pub fn arm_guard(engine: &mut Engine, config: &SandboxConfig) -> Arc<AtomicU64> {
    let operations = Arc::new(AtomicU64::new(0));
    let ops_counter = operations.clone();
    let max_ops = config.max_operations;
    let deadline = Instant::now() + Duration::from_secs(config.eval_timeout_secs);

    engine.on_progress(move |_| {
        let count = ops_counter.fetch_add(1, Ordering::Relaxed);
        if count >= max_ops {
            return Some(Dynamic::from(format!(
                "Operation limit exceeded: {} operations",
                max_ops
            )));
        }
        if Instant::now() > deadline {
            return Some(Dynamic::from("Evaluation deadline exceeded".to_string()));
        }
        None
    });

    operations
}
