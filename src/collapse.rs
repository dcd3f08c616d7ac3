//! Collapsing of long subpage listings.
//!
//! Category pages of imported archives can list hundreds of subpages in one
//! flat `<ul>` (e.g. a course catalogue). After each page load the collapser
//! keeps the first [`MAX_VISIBLE_ITEMS`] entries of every such list visible,
//! hides the rest, and inserts a "Show all" button right after the list.
//!
//! Every pass starts by removing the buttons of the previous pass, so it can
//! run on every page load without stacking controls. Toggle state lives in
//! the [`CollapseToggle`] and disappears with its button.

use crate::dom::{self, Document};
use kuchiki::NodeRef;
use std::rc::Rc;

/// Number of list items left visible in a collapsed list.
pub const MAX_VISIBLE_ITEMS: usize = 5;

/// Lists eligible for collapsing.
pub const LIST_SELECTOR: &str = "div.mt-category-container dd.mt-listing-detailed-subpages ul";

/// Marker class of the injected toggle buttons.
pub const TOGGLE_CLASS: &str = "zim-show-all-button";

const TOGGLE_CLASSES: &str =
    "mt-icon-expand-collapse mt-reveal-listing-expand-link zim-show-all-button";

pub const SHOW_ALL: &str = "Show all";
pub const SHOW_LESS: &str = "Show less";

/// One injected expand/collapse control and the list items it governs.
#[derive(Debug)]
pub struct CollapseToggle {
    button: NodeRef,
    items: Vec<NodeRef>,
    expanded: bool,
}

impl CollapseToggle {
    /// Flip between showing every item and only the first few.
    pub fn activate(&mut self) {
        self.expanded = !self.expanded;
        for (index, item) in self.items.iter().enumerate() {
            set_hidden(item, !self.expanded && index >= MAX_VISIBLE_ITEMS);
        }
        let label = self.label();
        dom::set_attribute(&self.button, "title", label);
        dom::set_text(&self.button, label);
    }

    pub fn is_expanded(&self) -> bool {
        self.expanded
    }

    pub fn label(&self) -> &'static str {
        if self.expanded { SHOW_LESS } else { SHOW_ALL }
    }
}

/// Applies collapsing passes and owns the controls of the latest pass.
#[derive(Debug, Default)]
pub struct ListCollapser {
    toggles: Vec<CollapseToggle>,
}

impl ListCollapser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Collapse every long eligible list. Returns the number of lists collapsed.
    pub fn apply_collapsing(&mut self, document: &Document) -> usize {
        for previous in document.select_all(&format!("button.{TOGGLE_CLASS}")) {
            previous.detach();
        }
        self.toggles.clear();

        for list in document.select_all(LIST_SELECTOR) {
            if list.parent().is_none() {
                continue;
            }
            let items: Vec<NodeRef> = list.children().filter(is_list_item).collect();
            if items.len() <= MAX_VISIBLE_ITEMS {
                continue;
            }

            for (index, item) in items.iter().enumerate() {
                if index >= MAX_VISIBLE_ITEMS {
                    set_hidden(item, true);
                }
            }

            let button = document.create_element(
                "button",
                &[
                    ("class", TOGGLE_CLASSES),
                    ("type", "button"),
                    ("title", SHOW_ALL),
                ],
            );
            dom::set_text(&button, SHOW_ALL);
            list.insert_after(button.clone());

            self.toggles.push(CollapseToggle {
                button,
                items,
                expanded: false,
            });
        }

        if !self.toggles.is_empty() {
            tracing::debug!(lists = self.toggles.len(), "Collapsed long listings");
        }
        self.toggles.len()
    }

    /// Forget every toggle, e.g. when the markup they control was replaced.
    pub fn clear(&mut self) {
        self.toggles.clear();
    }

    pub fn toggles(&self) -> &[CollapseToggle] {
        &self.toggles
    }

    pub fn toggle_mut(&mut self, index: usize) -> Option<&mut CollapseToggle> {
        self.toggles.get_mut(index)
    }

    /// Activate the toggle owning `button`. Returns `false` for unknown buttons,
    /// including those removed by a later pass.
    pub fn activate(&mut self, button: &NodeRef) -> bool {
        match self
            .toggles
            .iter_mut()
            .find(|toggle| Rc::ptr_eq(&toggle.button.0, &button.0))
        {
            Some(toggle) => {
                toggle.activate();
                true
            }
            None => false,
        }
    }
}

fn is_list_item(node: &NodeRef) -> bool {
    node.as_element()
        .is_some_and(|element| element.name.local.as_ref() == "li")
}

/// Whether an element is hidden by an inline `display: none`.
pub fn is_hidden(node: &NodeRef) -> bool {
    dom::attribute(node, "style").is_some_and(|style| {
        declarations(&style).any(|(name, value)| name == "display" && value == "none")
    })
}

fn declarations(style: &str) -> impl Iterator<Item = (String, String)> + '_ {
    style.split(';').filter_map(|declaration| {
        let (name, value) = declaration.split_once(':')?;
        Some((
            name.trim().to_ascii_lowercase(),
            value.trim().to_ascii_lowercase(),
        ))
    })
}

/// Add or remove an inline `display: none`, keeping other declarations.
fn set_hidden(node: &NodeRef, hidden: bool) {
    let style = dom::attribute(node, "style").unwrap_or_default();
    let mut kept: Vec<String> = style
        .split(';')
        .map(str::trim)
        .filter(|declaration| !declaration.is_empty())
        .filter(|declaration| {
            declaration
                .split_once(':')
                .is_none_or(|(name, _)| !name.trim().eq_ignore_ascii_case("display"))
        })
        .map(str::to_string)
        .collect();
    if hidden {
        kept.push("display: none".to_string());
    }
    if kept.is_empty() {
        dom::remove_attribute(node, "style");
    } else {
        dom::set_attribute(node, "style", &kept.join("; "));
    }
}
