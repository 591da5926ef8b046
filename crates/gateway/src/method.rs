/// The enumerable operation set sandboxed code may invoke. Anything not in
/// this table fails with an unsupported-method error through the normal
/// response path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapabilityMethod {
    PageExists,
    PageCount,
    PageText,
    PageHtml,
    PageAttr,
    PageSetAttr,
    PageSetValue,
    PageSetHtml,
    PageSetClass,
    PageSetVisible,
    PageType,
    PageWaitFor,
    ClipboardCopyText,
    ClipboardCopyRich,
    UiToast,
    UiModalShow,
    UiModalUpdate,
    UiModalClose,
    ModelAsk,
    StoreGet,
    StoreSet,
}

impl CapabilityMethod {
    pub fn parse(method: &str) -> Option<Self> {
        let parsed = match method {
            "page.exists" => Self::PageExists,
            "page.count" => Self::PageCount,
            "page.text" => Self::PageText,
            "page.html" => Self::PageHtml,
            "page.attr" => Self::PageAttr,
            "page.set_attr" => Self::PageSetAttr,
            "page.set_value" => Self::PageSetValue,
            "page.set_html" => Self::PageSetHtml,
            "page.set_class" => Self::PageSetClass,
            "page.set_visible" => Self::PageSetVisible,
            "page.type" => Self::PageType,
            "page.wait_for" => Self::PageWaitFor,
            "clipboard.copy_text" => Self::ClipboardCopyText,
            "clipboard.copy_rich" => Self::ClipboardCopyRich,
            "ui.toast" => Self::UiToast,
            "ui.modal_show" => Self::UiModalShow,
            "ui.modal_update" => Self::UiModalUpdate,
            "ui.modal_close" => Self::UiModalClose,
            "model.ask" => Self::ModelAsk,
            "store.get" => Self::StoreGet,
            "store.set" => Self::StoreSet,
            _ => return None,
        };
        Some(parsed)
    }
}
