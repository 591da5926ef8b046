//! Page substrate: what the gateway consumes to answer page capabilities.
//!
//! Implementations expose only serializable, derived facts (existence,
//! count, text, attribute values); no DOM handle ever crosses into the
//! gateway, let alone the sandbox.

use async_trait::async_trait;
use scraper::{Html, Selector};
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::debug;

use scriptcell_core::Result;

#[async_trait]
pub trait PageSubstrate: Send + Sync {
    async fn exists(&self, selector: &str) -> bool;
    async fn count(&self, selector: &str) -> usize;
    async fn text(&self, selector: &str) -> Option<String>;
    async fn html(&self, selector: &str) -> Option<String>;
    async fn attr(&self, selector: &str, name: &str) -> Option<String>;

    async fn set_attr(&self, selector: &str, name: &str, value: &str) -> Result<()>;
    async fn set_value(&self, selector: &str, value: &str) -> Result<()>;
    async fn set_html(&self, selector: &str, html: &str) -> Result<()>;
    async fn set_class(&self, selector: &str, class: &str) -> Result<()>;
    async fn set_visible(&self, selector: &str, visible: bool) -> Result<()>;
    async fn dispatch_event(&self, selector: &str, event: &str) -> Result<()>;
}

#[derive(Default)]
struct Overlay {
    /// selector -> attribute -> value, including the `value`, `class` and
    /// `hidden` pseudo-attributes written by the mutation capabilities.
    attrs: HashMap<String, HashMap<String, String>>,
    /// selector -> replacement inner html.
    html_overrides: HashMap<String, String>,
    /// Dispatched synthetic events, in order.
    events: Vec<(String, String)>,
}

/// A static-document substrate: scraper parses the markup for queries and
/// an overlay records mutations. Used by the CLI runner and tests; a live
/// embedder plugs in its own [`PageSubstrate`].
pub struct HtmlPage {
    document: Mutex<String>,
    overlay: Mutex<Overlay>,
}

impl HtmlPage {
    pub fn new(html: &str) -> Self {
        Self {
            document: Mutex::new(html.to_string()),
            overlay: Mutex::new(Overlay::default()),
        }
    }

    /// Swap in a new document, e.g. after navigation. Recorded mutations
    /// belong to the old page and are discarded.
    pub fn replace_document(&self, html: &str) {
        *self.document.lock().unwrap() = html.to_string();
        *self.overlay.lock().unwrap() = Overlay::default();
    }

    /// Synthetic events dispatched so far, oldest first.
    pub fn events(&self) -> Vec<(String, String)> {
        self.overlay.lock().unwrap().events.clone()
    }

    /// Read back an overlay attribute written by a mutation capability.
    pub fn overlay_attr(&self, selector: &str, name: &str) -> Option<String> {
        self.overlay
            .lock()
            .unwrap()
            .attrs
            .get(selector)
            .and_then(|attrs| attrs.get(name))
            .cloned()
    }

    fn with_first<T>(&self, selector: &str, f: impl Fn(scraper::ElementRef<'_>) -> T) -> Option<T> {
        let raw = self.document.lock().unwrap().clone();
        let document = Html::parse_document(&raw);
        let parsed = match Selector::parse(selector) {
            Ok(s) => s,
            Err(_) => {
                debug!(selector = %selector, "Unparseable selector treated as absent");
                return None;
            }
        };
        document.select(&parsed).next().map(f)
    }

    fn count_matches(&self, selector: &str) -> usize {
        let raw = self.document.lock().unwrap().clone();
        let document = Html::parse_document(&raw);
        match Selector::parse(selector) {
            Ok(s) => document.select(&s).count(),
            Err(_) => 0,
        }
    }

    fn record_attr(&self, selector: &str, name: &str, value: &str) {
        if self.count_matches(selector) == 0 {
            debug!(selector = %selector, "Mutation on absent target is a no-op");
            return;
        }
        self.overlay
            .lock()
            .unwrap()
            .attrs
            .entry(selector.to_string())
            .or_default()
            .insert(name.to_string(), value.to_string());
    }
}

#[async_trait]
impl PageSubstrate for HtmlPage {
    async fn exists(&self, selector: &str) -> bool {
        self.count_matches(selector) > 0
    }

    async fn count(&self, selector: &str) -> usize {
        self.count_matches(selector)
    }

    async fn text(&self, selector: &str) -> Option<String> {
        self.with_first(selector, |el| el.text().collect::<Vec<_>>().join(""))
    }

    async fn html(&self, selector: &str) -> Option<String> {
        if let Some(replaced) = self.overlay.lock().unwrap().html_overrides.get(selector) {
            return Some(replaced.clone());
        }
        self.with_first(selector, |el| el.inner_html())
    }

    async fn attr(&self, selector: &str, name: &str) -> Option<String> {
        if let Some(written) = self.overlay_attr(selector, name) {
            return Some(written);
        }
        self.with_first(selector, |el| el.value().attr(name).map(|v| v.to_string()))
            .flatten()
    }

    async fn set_attr(&self, selector: &str, name: &str, value: &str) -> Result<()> {
        self.record_attr(selector, name, value);
        Ok(())
    }

    async fn set_value(&self, selector: &str, value: &str) -> Result<()> {
        self.record_attr(selector, "value", value);
        Ok(())
    }

    async fn set_html(&self, selector: &str, html: &str) -> Result<()> {
        if self.count_matches(selector) == 0 {
            debug!(selector = %selector, "Mutation on absent target is a no-op");
            return Ok(());
        }
        self.overlay
            .lock()
            .unwrap()
            .html_overrides
            .insert(selector.to_string(), html.to_string());
        Ok(())
    }

    async fn set_class(&self, selector: &str, class: &str) -> Result<()> {
        self.record_attr(selector, "class", class);
        Ok(())
    }

    async fn set_visible(&self, selector: &str, visible: bool) -> Result<()> {
        self.record_attr(selector, "hidden", if visible { "false" } else { "true" });
        Ok(())
    }

    async fn dispatch_event(&self, selector: &str, event: &str) -> Result<()> {
        if self.count_matches(selector) == 0 {
            return Ok(());
        }
        self.overlay
            .lock()
            .unwrap()
            .events
            .push((selector.to_string(), event.to_string()));
        Ok(())
    }
}
