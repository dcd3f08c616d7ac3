//! Section numbering for formula typesetting.
//!
//! Page titles carry a hierarchical section number (`1.2: The Scientific
//! Method`). The typesetting engine needs that number as the parameter of its
//! `PageIndex` macro so figure and equation tags render as `1.2.3` without the
//! content documents hardcoding it.
//!
//! ## Prefix derivation
//!
//! - `"1.2: The Scientific Method"` → `"1.2."`
//! - `"1: The Title Method"` → `"1."`
//! - `"01.02: Zero Padded"` → `"1.2."` (segments containing `0` are read as integers)
//! - `"No colon here"` → `""`
//!
//! ## Engine lifecycle
//!
//! The engine is configured once per page and cannot be reconfigured in place,
//! so [`NumberingService`] owns the single live [`EngineHandle`]: installing
//! always tears the previous handle down first (script element and
//! configuration together), leaving at most one `mathjax-script` in the
//! document.

use crate::dom::Document;
use kuchiki::NodeRef;
use serde::Serialize;
use std::collections::BTreeMap;

/// Element id of the injected typesetting runtime script.
pub const ENGINE_SCRIPT_ID: &str = "mathjax-script";

/// Default location of the bundled typesetting runtime.
pub const DEFAULT_ENGINE_SCRIPT_PATH: &str = "./mathjax/es5/tex-svg.js";

/// Derive the numbering prefix from a page title.
pub fn derive_numbering_prefix(title: &str) -> String {
    let Some((label, _)) = title.split_once(':') else {
        return String::new();
    };
    let mut prefix = if label.contains('.') {
        label
            .split('.')
            .map(|segment| {
                if segment.contains('0') {
                    leading_integer(segment)
                } else {
                    segment.to_string()
                }
            })
            .collect::<Vec<_>>()
            .join(".")
    } else {
        label.to_string()
    };
    prefix.push('.');
    prefix
}

/// Read the leading decimal integer of a segment.
///
/// Surrounding whitespace and a sign are accepted; trailing garbage is
/// ignored (`"2a"` → `"2"`). A segment without leading digits yields `"NaN"`.
fn leading_integer(segment: &str) -> String {
    let trimmed = segment.trim_start();
    let (negative, unsigned) = match trimmed.as_bytes().first() {
        Some(b'-') => (true, &trimmed[1..]),
        Some(b'+') => (false, &trimmed[1..]),
        _ => (false, trimmed),
    };
    let digits: &str = {
        let end = unsigned
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(unsigned.len());
        &unsigned[..end]
    };
    if digits.is_empty() {
        return "NaN".to_string();
    }
    let significant = digits.trim_start_matches('0');
    let magnitude = if significant.is_empty() { "0" } else { significant };
    if negative && magnitude != "0" {
        format!("-{magnitude}")
    } else {
        magnitude.to_string()
    }
}

// ============================================================================
// Engine configuration
// ============================================================================

/// Typesetting engine configuration for one page.
///
/// Serializes to the object the engine runtime reads before it boots.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineConfig {
    pub section: String,
    pub tex: TexConfig,
    pub loader: LoaderConfig,
    pub svg: SvgConfig,
    pub options: EngineOptions,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TexConfig {
    pub tags: String,
    /// Macro name → (body, argument count).
    pub macros: BTreeMap<String, (String, u8)>,
    pub autoload: BTreeMap<String, Vec<String>>,
    pub packages: TexPackages,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TexPackages {
    #[serde(rename = "[+]")]
    pub extra: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoaderConfig {
    pub load: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SvgConfig {
    pub scale: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineOptions {
    pub menu_options: MenuOptions,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MenuOptions {
    pub settings: MenuSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MenuSettings {
    pub zoom: String,
    pub zscale: String,
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl EngineConfig {
    /// Build the configuration binding `prefix` into the `PageIndex` macro.
    pub fn for_prefix(prefix: &str, svg_scale: f64) -> Self {
        let mut macros = BTreeMap::new();
        macros.insert("PageIndex".to_string(), (format!("{{{prefix}#1}}"), 1));

        let mut autoload = BTreeMap::new();
        autoload.insert("color".to_string(), Vec::new());
        autoload.insert("colorv2".to_string(), strings(&["color"]));

        Self {
            section: prefix.to_string(),
            tex: TexConfig {
                tags: "all".to_string(),
                macros,
                autoload,
                packages: TexPackages {
                    extra: strings(&["noerrors", "mhchem", "tagFormat", "color", "cancel"]),
                },
            },
            loader: LoaderConfig {
                load: strings(&[
                    "[tex]/noerrors",
                    "[tex]/mhchem",
                    "[tex]/tagFormat",
                    "[tex]/colorv2",
                    "[tex]/cancel",
                ]),
            },
            svg: SvgConfig { scale: svg_scale },
            options: EngineOptions {
                menu_options: MenuOptions {
                    settings: MenuSettings {
                        zoom: "Double-Click".to_string(),
                        zscale: "150%".to_string(),
                    },
                },
            },
        }
    }

    /// Inline script body assigning this configuration to the runtime's global.
    pub fn to_script(&self) -> String {
        let json = serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string());
        // Keep a `</script>` inside a title from closing the element early.
        format!("window.MathJax = {};", json.replace("</", "<\\/"))
    }
}

// ============================================================================
// Lifecycle
// ============================================================================

/// The live engine: its configuration and the script element that loads it.
#[derive(Debug)]
pub struct EngineHandle {
    pub config: EngineConfig,
    script: NodeRef,
}

/// Owner of the single typesetting engine slot.
#[derive(Debug)]
pub struct NumberingService {
    script_path: String,
    svg_scale: f64,
    live: Option<EngineHandle>,
    /// Prefix installed through [`refresh`](Self::refresh); the only
    /// "last known prefix" in the crate.
    last_prefix: Option<String>,
}

impl Default for NumberingService {
    fn default() -> Self {
        Self::new(DEFAULT_ENGINE_SCRIPT_PATH, 0.85)
    }
}

impl NumberingService {
    pub fn new(script_path: &str, svg_scale: f64) -> Self {
        Self {
            script_path: script_path.to_string(),
            svg_scale,
            live: None,
            last_prefix: None,
        }
    }

    /// Configuration of the live engine, if one is installed.
    pub fn config(&self) -> Option<&EngineConfig> {
        self.live.as_ref().map(|handle| &handle.config)
    }

    /// Remove the engine script and discard its configuration.
    ///
    /// Also removes a stray `mathjax-script` element the service did not
    /// create itself. No-op when nothing is installed.
    pub fn teardown(&mut self, document: &Document) {
        if let Some(handle) = self.live.take() {
            handle.script.detach();
        }
        while let Some(stray) = document.element_by_id(ENGINE_SCRIPT_ID) {
            stray.detach();
        }
    }

    /// Install a fresh engine bound to `prefix`, replacing any live one.
    pub fn install(&mut self, document: &Document, prefix: &str) {
        self.teardown(document);
        let config = EngineConfig::for_prefix(prefix, self.svg_scale);
        let script = document.create_element(
            "script",
            &[("id", ENGINE_SCRIPT_ID), ("src", self.script_path.as_str())],
        );
        document.head().append(script.clone());
        tracing::debug!(prefix, "Installed typesetting engine");
        self.live = Some(EngineHandle { config, script });
    }

    /// Teardown then install, unconditionally.
    pub fn reinstall_for_title(&mut self, document: &Document, title: &str) -> String {
        let prefix = derive_numbering_prefix(title);
        self.teardown(document);
        self.install(document, &prefix);
        self.last_prefix = Some(prefix.clone());
        prefix
    }

    /// Reinstall only when the derived prefix differs from the last one.
    ///
    /// Returns `true` when the engine was reinstalled. Repeated update
    /// notifications for the same page are absorbed here.
    pub fn refresh(&mut self, document: &Document, title: &str) -> bool {
        let prefix = derive_numbering_prefix(title);
        if self.live.is_some() && self.last_prefix.as_deref() == Some(prefix.as_str()) {
            return false;
        }
        self.install(document, &prefix);
        self.last_prefix = Some(prefix);
        true
    }

    /// Tear down and forget the last prefix.
    pub fn release(&mut self, document: &Document) {
        self.teardown(document);
        self.last_prefix = None;
    }
}
