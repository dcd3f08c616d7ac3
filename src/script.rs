//! Supplementary script injection.
//!
//! Archives can declare extra scripts (`jsPaths` in the shared manifest) that
//! the exported wiki pages rely on. They are appended to `<head>` as-is: no
//! element id, no deduplication, no removal.

use crate::dom::Document;
use kuchiki::NodeRef;

/// Append `<script src="{path}">` to the document head.
pub fn inject_script(document: &Document, path: &str) -> NodeRef {
    let script = document.create_element("script", &[("src", path)]);
    document.head().append(script.clone());
    tracing::debug!(path, "Injected script");
    script
}
