//! The viewer document.
//!
//! A session renders into one mutable HTML document: a shell generated with
//! Maud (head, logo header, `#content` container) and parsed into a `kuchiki`
//! tree. Page markup is mounted into `#content`; every side-effect service
//! mutates this tree in place.
//!
//! ```text
//! <html>
//!   <head> … injected scripts … </head>
//!   <body>
//!     <header class="zim-header"> logo </header>
//!     <main id="content"> page markup </main>
//!   </body>
//! </html>
//! ```

use kuchiki::NodeRef;
use kuchiki::traits::TendrilSink;
use maud::{DOCTYPE, Markup, html};

/// Id of the element page markup is mounted into.
pub const CONTENT_ID: &str = "content";

/// Id of the inline script carrying the typesetting configuration on export.
pub const ENGINE_CONFIG_ID: &str = "mathjax-config";

/// Render the empty viewer shell.
pub fn viewer_shell(title: &str, logo_path: Option<&str>) -> Markup {
    html! {
        (DOCTYPE)
        html lang="en" {
            head {
                meta charset="UTF-8";
                meta name="viewport" content="width=device-width, initial-scale=1.0";
                title { (title) }
            }
            body {
                header class="zim-header" {
                    @if let Some(logo) = logo_path {
                        img class="zim-logo" src=(logo) alt="";
                    }
                }
                main id=(CONTENT_ID) class="zim-content" {}
            }
        }
    }
}

/// A parsed, mutable HTML document.
#[derive(Debug, Clone)]
pub struct Document {
    root: NodeRef,
}

impl Default for Document {
    fn default() -> Self {
        Self::blank()
    }
}

impl Document {
    /// An empty viewer shell.
    pub fn blank() -> Self {
        Self::parse(&viewer_shell("", None).into_string())
    }

    pub fn parse(html: &str) -> Self {
        Self {
            root: kuchiki::parse_html().one(html),
        }
    }

    pub fn root(&self) -> &NodeRef {
        &self.root
    }

    /// The `<head>` element. The HTML parser always synthesizes one.
    pub fn head(&self) -> NodeRef {
        self.first_match("head").unwrap_or_else(|| self.root.clone())
    }

    /// The `<body>` element.
    pub fn body(&self) -> NodeRef {
        self.first_match("body").unwrap_or_else(|| self.root.clone())
    }

    /// The content container, falling back to `<body>` for foreign documents.
    pub fn content(&self) -> NodeRef {
        self.element_by_id(CONTENT_ID).unwrap_or_else(|| self.body())
    }

    pub fn first_match(&self, selector: &str) -> Option<NodeRef> {
        self.root
            .select_first(selector)
            .ok()
            .map(|element| element.as_node().clone())
    }

    /// All elements matching a CSS selector, collected so callers may mutate freely.
    pub fn select_all(&self, selector: &str) -> Vec<NodeRef> {
        match self.root.select(selector) {
            Ok(matches) => matches.map(|element| element.as_node().clone()).collect(),
            Err(()) => Vec::new(),
        }
    }

    pub fn element_by_id(&self, id: &str) -> Option<NodeRef> {
        self.first_match(&format!("#{id}"))
    }

    /// Create a detached element with the given attributes.
    pub fn create_element(&self, tag: &str, attributes: &[(&str, &str)]) -> NodeRef {
        let scratch = kuchiki::parse_html().one(format!("<{tag}></{tag}>"));
        let node = scratch
            .select_first(tag)
            .map(|element| element.as_node().clone())
            .unwrap_or_else(|_| NodeRef::new_text(String::new()));
        node.detach();
        for (name, value) in attributes {
            set_attribute(&node, name, value);
        }
        node
    }

    /// Replace the content container's children with parsed markup.
    pub fn mount_html(&self, markup: &str) {
        let container = self.content();
        clear_children(&container);
        // An explicit <body> keeps leading <style>/<meta> in the fragment
        // instead of letting the parser hoist them into a head.
        let fragment = kuchiki::parse_html().one(format!("<body>{markup}</body>"));
        if let Ok(body) = fragment.select_first("body") {
            let children: Vec<NodeRef> = body.as_node().children().collect();
            for child in children {
                container.append(child);
            }
        }
    }

    /// Show a logo image in the header.
    pub fn set_logo(&self, logo_path: &str) {
        let Some(header) = self.first_match("header.zim-header") else {
            return;
        };
        clear_children(&header);
        let logo = self.create_element("img", &[("class", "zim-logo"), ("src", logo_path)]);
        set_attribute(&logo, "alt", "");
        header.append(logo);
    }

    /// Set the document `<title>` text.
    pub fn set_title(&self, title: &str) {
        if let Some(node) = self.first_match("title") {
            set_text(&node, title);
        }
    }

    /// Serialize the live document.
    pub fn to_html(&self) -> String {
        self.root.to_string()
    }

    /// Serialize a copy of the document for a standalone viewer.
    ///
    /// When an engine configuration is given it is emitted as an inline script
    /// ahead of the engine runtime, which reads it on boot.
    pub fn export_html(&self, engine_script: Option<&str>) -> String {
        let Some(script_body) = engine_script else {
            return self.to_html();
        };
        let copy = Document::parse(&self.to_html());
        let config = copy.create_element("script", &[("id", ENGINE_CONFIG_ID)]);
        config.append(NodeRef::new_text(script_body));
        match copy.element_by_id(crate::numbering::ENGINE_SCRIPT_ID) {
            Some(runtime) => runtime.insert_before(config),
            None => copy.head().append(config),
        }
        copy.to_html()
    }
}

pub fn attribute(node: &NodeRef, name: &str) -> Option<String> {
    node.as_element()
        .and_then(|element| element.attributes.borrow().get(name).map(str::to_string))
}

pub fn set_attribute(node: &NodeRef, name: &str, value: &str) {
    if let Some(element) = node.as_element() {
        element
            .attributes
            .borrow_mut()
            .insert(name, value.to_string());
    }
}

pub fn remove_attribute(node: &NodeRef, name: &str) {
    if let Some(element) = node.as_element() {
        element.attributes.borrow_mut().remove(name);
    }
}

/// Replace a node's children with a single text node.
pub fn set_text(node: &NodeRef, text: &str) {
    clear_children(node);
    node.append(NodeRef::new_text(text));
}

pub fn clear_children(node: &NodeRef) {
    let children: Vec<NodeRef> = node.children().collect();
    for child in children {
        child.detach();
    }
}
