pub mod handlers;
pub mod matcher;
pub mod navigation;
pub mod provider;

pub use handlers::{HandlerRegistry, LoadedScript, ScriptReadyInfo};
pub use matcher::{ScriptMatcher, ScriptsReady};
pub use navigation::NavigationWatcher;
pub use provider::{DirScriptProvider, ScriptProvider, StaticScriptProvider};

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::Value;
    use std::sync::Arc;

    use scriptcell_bridge::{CapabilityHandler, SandboxBridge};
    use scriptcell_core::{
        BridgeConfig, Error, MatchType, PageLocator, Result, SandboxConfig, ScriptDescriptor,
    };

    struct NullCapabilities;

    #[async_trait]
    impl CapabilityHandler for NullCapabilities {
        async fn dispatch(&self, _script_id: &str, _method: &str, _args: &[Value]) -> Result<Value> {
            Ok(Value::Null)
        }
    }

    fn descriptor(id: &str, pattern: &str, code: &str) -> ScriptDescriptor {
        ScriptDescriptor {
            id: id.to_string(),
            name: id.to_string(),
            source_code: code.to_string(),
            match_patterns: vec![pattern.to_string()],
            match_type: MatchType::Glob,
            declared_actions: vec![],
        }
    }

    struct Stack {
        registry: Arc<HandlerRegistry>,
        matcher: Arc<ScriptMatcher>,
        watcher: NavigationWatcher,
        events: tokio::sync::mpsc::Receiver<ScriptsReady>,
    }

    fn stack(scripts: Vec<ScriptDescriptor>) -> Stack {
        let bridge = Arc::new(SandboxBridge::new(
            BridgeConfig::default(),
            SandboxConfig::default(),
            Arc::new(NullCapabilities),
        ));
        let registry = Arc::new(HandlerRegistry::new(bridge.clone()));
        let provider = Arc::new(StaticScriptProvider::new(scripts));
        let (matcher, events) = ScriptMatcher::new(provider, bridge, registry.clone());
        let matcher = Arc::new(matcher);
        let watcher = NavigationWatcher::new(matcher.clone(), registry.clone());
        Stack { registry, matcher, watcher, events }
    }

    #[tokio::test]
    async fn test_refresh_loads_only_matching_scripts() {
        let mut stack = stack(vec![
            descriptor("s1", "*://a.example/*", "fn greet() { 1 }"),
            descriptor("s2", "*://b.example/*", "fn other() { 2 }"),
        ]);
        let locator = PageLocator::parse("https://a.example/page").unwrap();
        stack.matcher.refresh(&locator).await.unwrap();

        assert!(stack.registry.contains("s1").await);
        assert!(!stack.registry.contains("s2").await);

        let event = stack.events.recv().await.unwrap();
        assert_eq!(event.scripts.len(), 1);
        assert_eq!(event.scripts[0].script_id, "s1");
        assert_eq!(event.scripts[0].actions, vec!["greet"]);
    }

    #[tokio::test]
    async fn test_one_failing_script_never_blocks_the_others() {
        let stack = stack(vec![
            descriptor("good", "*://a.example/*", "fn run() { 1 }"),
            descriptor("broken", "*://a.example/*", "fn oops( {"),
        ]);
        let locator = PageLocator::parse("https://a.example/").unwrap();
        stack.matcher.refresh(&locator).await.unwrap();

        assert!(stack.registry.contains("good").await);
        assert!(!stack.registry.contains("broken").await);
    }

    #[tokio::test]
    async fn test_invoke_unknown_script_fails_without_transport() {
        let stack = stack(vec![]);
        let err = stack.registry.invoke("ghost", "run").await.unwrap_err();
        assert!(matches!(err, Error::Invocation(_)), "got {:?}", err);
    }

    #[tokio::test]
    async fn test_invoke_unknown_handler_fails_without_transport() {
        let stack = stack(vec![descriptor("s1", "*://a.example/*", "fn real() { 1 }")]);
        let locator = PageLocator::parse("https://a.example/").unwrap();
        stack.matcher.refresh(&locator).await.unwrap();

        let err = stack.registry.invoke("s1", "imaginary").await.unwrap_err();
        assert!(matches!(err, Error::Invocation(_)), "got {:?}", err);

        // The real handler still works end to end.
        let result = stack.registry.invoke("s1", "real").await.unwrap();
        assert_eq!(result, serde_json::json!(1));
    }

    #[tokio::test]
    async fn test_navigation_is_idempotent_for_unchanged_locator() {
        let stack = stack(vec![descriptor("s1", "*://a.example/*", "fn run() { 1 }")]);
        let locator = PageLocator::parse("https://a.example/page").unwrap();

        assert!(stack.watcher.on_navigate(locator.clone()).await.unwrap());
        assert!(!stack.watcher.on_navigate(locator).await.unwrap());
    }

    #[tokio::test]
    async fn test_navigation_clears_before_repopulating() {
        let mut stack = stack(vec![
            descriptor("s1", "*://a.example/*", "fn on_a() { 1 }"),
            descriptor("s2", "*://b.example/*", "fn on_b() { 2 }"),
        ]);

        let a = PageLocator::parse("https://a.example/page").unwrap();
        stack.watcher.on_navigate(a).await.unwrap();
        assert!(stack.registry.contains("s1").await);
        assert!(!stack.registry.contains("s2").await);
        stack.events.recv().await.unwrap();

        let b = PageLocator::parse("https://b.example/page").unwrap();
        stack.watcher.on_navigate(b).await.unwrap();
        assert!(!stack.registry.contains("s1").await);
        assert!(stack.registry.contains("s2").await);

        let event = stack.events.recv().await.unwrap();
        assert_eq!(event.scripts.len(), 1);
        assert_eq!(event.scripts[0].script_id, "s2");

        // Handlers bound to the superseded page are gone.
        let err = stack.registry.invoke("s1", "on_a").await.unwrap_err();
        assert!(matches!(err, Error::Invocation(_)));
    }
}
