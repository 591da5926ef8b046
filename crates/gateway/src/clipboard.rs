use scriptcell_core::{Error, Result};

/// Host clipboard access. Scripts never see the clipboard directly, only
/// this narrowed copy surface.
pub trait Clipboard: Send + Sync {
    fn copy_text(&self, text: &str) -> Result<()>;
    fn copy_rich(&self, html: &str, alt_text: &str) -> Result<()>;
}

/// System clipboard via arboard. A fresh handle per call keeps the type
/// Send + Sync across platforms.
pub struct SystemClipboard;

impl Clipboard for SystemClipboard {
    fn copy_text(&self, text: &str) -> Result<()> {
        arboard::Clipboard::new()
            .and_then(|mut clipboard| clipboard.set_text(text.to_string()))
            .map_err(|e| Error::Capability(format!("clipboard copy failed: {}", e)))
    }

    fn copy_rich(&self, html: &str, alt_text: &str) -> Result<()> {
        arboard::Clipboard::new()
            .and_then(|mut clipboard| clipboard.set_html(html.to_string(), Some(alt_text.to_string())))
            .map_err(|e| Error::Capability(format!("rich clipboard copy failed: {}", e)))
    }
}
