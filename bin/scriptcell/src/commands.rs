use anyhow::Context;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::info;

use scriptcell_bridge::SandboxBridge;
use scriptcell_core::{Config, PageLocator, Paths};
use scriptcell_gateway::{CapabilityGateway, HtmlPage, UiEvent};
use scriptcell_registry::{
    DirScriptProvider, HandlerRegistry, NavigationWatcher, ScriptMatcher, ScriptProvider,
    ScriptsReady,
};
use scriptcell_storage::ScriptStore;

const EXAMPLE_SCRIPT: &str = r#"fn summarize() {
    let title = page_text("h1");
    toast("Title: " + title, "info");
    title
}

fn copy_title() {
    copy_text(page_text("h1"));
    "copied"
}
"#;

const EXAMPLE_META: &str = r#"name: Example helper
matchPatterns: ["*"]
declaredActions: [summarize, copy_title]
"#;

pub fn onboard(force: bool) -> anyhow::Result<()> {
    let paths = Paths::new();
    paths.ensure_dirs()?;

    let config_path = paths.config_file();
    if config_path.exists() && !force {
        println!("Config already exists at {} (use --force to overwrite)", config_path.display());
    } else {
        let config = Config::default();
        config.save(&config_path)?;
        println!("Wrote config to {}", config_path.display());
    }

    let script_path = paths.scripts_dir().join("example.rhai");
    if !script_path.exists() {
        std::fs::write(&script_path, EXAMPLE_SCRIPT)?;
        std::fs::write(paths.scripts_dir().join("example.yaml"), EXAMPLE_META)?;
        println!("Wrote example script to {}", script_path.display());
    }

    Ok(())
}

pub fn status() -> anyhow::Result<()> {
    let paths = Paths::new();
    let config_path = paths.config_file();
    println!(
        "Config: {} ({})",
        config_path.display(),
        if config_path.exists() { "present" } else { "missing, run onboard" }
    );

    let config = Config::load_or_default(&paths)?;
    let scripts_dir = resolve_scripts_dir(&config, &paths, None);
    let script_count = std::fs::read_dir(&scripts_dir)
        .map(|entries| {
            entries
                .flatten()
                .filter(|e| e.path().extension().map_or(false, |ext| ext == "rhai"))
                .count()
        })
        .unwrap_or(0);
    println!("Scripts: {} ({} found)", scripts_dir.display(), script_count);
    println!("Storage: {}", paths.storage_db().display());

    let provider_ready = config.providers.values().any(|p| !p.api_key.is_empty());
    println!(
        "Model provider: {}",
        if provider_ready { "configured" } else { "not configured (model.ask will fail)" }
    );
    println!("Call timeout: {}ms", config.bridge.call_timeout_ms);
    Ok(())
}

pub async fn scripts_list(url: &str, dir: Option<String>) -> anyhow::Result<()> {
    let paths = Paths::new();
    let config = Config::load_or_default(&paths)?;
    let locator = PageLocator::parse(url)?;
    let provider = DirScriptProvider::new(resolve_scripts_dir(&config, &paths, dir));

    let scripts = provider.list_scripts_for_locator(&locator).await?;
    if scripts.is_empty() {
        println!("No scripts match {}", locator);
        return Ok(());
    }
    for script in scripts {
        println!(
            "{}  {}  [{}]",
            script.id,
            script.name,
            script.declared_actions.join(", ")
        );
    }
    Ok(())
}

pub async fn run(
    page_file: &str,
    url: &str,
    dir: Option<String>,
    navigations: &[String],
) -> anyhow::Result<()> {
    let mut runtime = Runtime::build(page_file, dir).await?;

    let locator = PageLocator::parse(url)?;
    runtime.watcher.on_navigate(locator).await?;
    runtime.report().await;

    for raw in navigations {
        let locator = PageLocator::parse(raw)?;
        info!(locator = %locator, "Replaying navigation");
        runtime.watcher.on_navigate(locator).await?;
        runtime.report().await;
    }

    runtime.bridge.shutdown().await;
    Ok(())
}

pub async fn invoke(
    page_file: &str,
    url: &str,
    dir: Option<String>,
    script: &str,
    handler: &str,
) -> anyhow::Result<()> {
    let mut runtime = Runtime::build(page_file, dir).await?;

    let locator = PageLocator::parse(url)?;
    runtime.watcher.on_navigate(locator).await?;
    runtime.drain_events().await;

    let result = runtime.registry.invoke(script, handler).await?;
    println!("{}", serde_json::to_string_pretty(&result)?);

    runtime.print_ui_events();
    runtime.bridge.shutdown().await;
    Ok(())
}

fn resolve_scripts_dir(config: &Config, paths: &Paths, flag: Option<String>) -> PathBuf {
    flag.map(PathBuf::from)
        .or_else(|| config.scripts_dir.as_ref().map(PathBuf::from))
        .unwrap_or_else(|| paths.scripts_dir())
}

/// The assembled stack: page, gateway, bridge, registry, matcher, watcher.
struct Runtime {
    bridge: Arc<SandboxBridge>,
    registry: Arc<HandlerRegistry>,
    watcher: NavigationWatcher,
    events: mpsc::Receiver<ScriptsReady>,
    ui_events: mpsc::Receiver<UiEvent>,
}

impl Runtime {
    async fn build(page_file: &str, dir: Option<String>) -> anyhow::Result<Self> {
        let paths = Paths::new();
        let config = Config::load_or_default(&paths)?;

        let html = std::fs::read_to_string(page_file)
            .with_context(|| format!("Failed to read page file {}", page_file))?;
        let page = Arc::new(HtmlPage::new(&html));

        let store = Arc::new(ScriptStore::open(&paths.storage_db())?);
        let (gateway, ui_events) = CapabilityGateway::new(page, store);
        let gateway = match scriptcell_providers::create_provider(&config) {
            Ok(model) => gateway.with_model(Arc::from(model)),
            Err(e) => {
                info!("Running without model provider: {}", e);
                gateway
            }
        };

        let bridge = Arc::new(SandboxBridge::new(
            config.bridge.clone(),
            config.sandbox.clone(),
            Arc::new(gateway),
        ));
        let registry = Arc::new(HandlerRegistry::new(bridge.clone()));
        let provider = Arc::new(DirScriptProvider::new(resolve_scripts_dir(
            &config, &paths, dir,
        )));
        let (matcher, events) = ScriptMatcher::new(provider, bridge.clone(), registry.clone());
        let watcher = NavigationWatcher::new(Arc::new(matcher), registry.clone());

        Ok(Self { bridge, registry, watcher, events, ui_events })
    }

    /// Print the scripts-ready notification for the latest refresh.
    async fn report(&mut self) {
        match self.events.recv().await {
            Some(ready) if ready.scripts.is_empty() => println!("No scripts loaded"),
            Some(ready) => {
                for script in ready.scripts {
                    println!(
                        "{}  {}  handlers: [{}]",
                        script.script_id,
                        script.name,
                        script.actions.join(", ")
                    );
                }
            }
            None => println!("No scripts loaded"),
        }
        self.print_ui_events();
    }

    async fn drain_events(&mut self) {
        let _ = self.events.recv().await;
    }

    fn print_ui_events(&mut self) {
        while let Ok(event) = self.ui_events.try_recv() {
            match serde_json::to_string(&event) {
                Ok(line) => println!("ui: {}", line),
                Err(_) => {}
            }
        }
    }
}
