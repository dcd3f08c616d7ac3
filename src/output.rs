//! CLI output formatting.
//!
//! Output is information-first: every page leads with its positional index
//! and title, with archive details (path, id, numbering) as indented context
//! lines.
//!
//! ```text
//! Pages
//! 001 Bookshelves (root)
//!     Path: Bookshelves
//!     Id: 1
//! 002 1.2: The Scientific Method
//!     Path: Bookshelves/Intro
//!     Id: 2
//!     Numbering: 1.2.
//! ```
//!
//! Each `format_*` function returns `Vec<String>` and is pure; `print_*`
//! wrappers write to stdout.

use crate::check::CheckReport;
use crate::numbering::derive_numbering_prefix;
use crate::types::{HomeDocument, SharedManifest, SharedPage};

/// Format a 1-based positional index as 3-digit zero-padded.
fn format_index(pos: usize) -> String {
    format!("{:0>3}", pos)
}

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

/// Strip HTML tags from a string (simple angle-bracket stripping).
fn strip_html_tags(html: &str) -> String {
    let mut result = String::with_capacity(html.len());
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => result.push(c),
            _ => {}
        }
    }
    result
}

/// Truncate text to `max` characters, appending `...` if truncated.
fn truncate_text(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

fn page_lines(index: usize, page: &SharedPage, is_root: bool) -> Vec<String> {
    let marker = if is_root { " (root)" } else { "" };
    let mut lines = vec![
        format!("{} {}{}", format_index(index), page.title, marker),
        format!("{}Path: {}", indent(1), page.path),
        format!("{}Id: {}", indent(1), page.id),
    ];
    let prefix = derive_numbering_prefix(&page.title);
    if !prefix.is_empty() {
        lines.push(format!("{}Numbering: {}", indent(1), prefix));
    }
    lines
}

/// Format the manifest's page list.
pub fn format_pages(shared: &SharedManifest) -> Vec<String> {
    let mut lines = vec!["Pages".to_string()];
    for (i, page) in shared.pages.iter().enumerate() {
        lines.extend(page_lines(i + 1, page, page.path == shared.root_page_path));
    }
    if !shared.js_paths.is_empty() {
        lines.push(String::new());
        lines.push("Scripts".to_string());
        for path in &shared.js_paths {
            lines.push(format!("{}{}", indent(1), path));
        }
    }
    lines
}

pub fn print_pages(shared: &SharedManifest) {
    for line in format_pages(shared) {
        println!("{}", line);
    }
}

/// Format the home document, one plain-text line per paragraph.
pub fn format_home(home: &HomeDocument) -> Vec<String> {
    let mut lines = vec!["Home".to_string()];
    for (i, paragraph) in home.welcome_text_paragraphs.iter().enumerate() {
        let text = strip_html_tags(paragraph);
        lines.push(format!(
            "{}{} {}",
            indent(1),
            format_index(i + 1),
            truncate_text(text.trim(), 72)
        ));
    }
    lines
}

pub fn print_home(home: &HomeDocument) {
    for line in format_home(home) {
        println!("{}", line);
    }
}

/// Format the result of an archive check.
pub fn format_check_report(report: &CheckReport) -> Vec<String> {
    let mut lines = Vec::new();
    for failure in &report.failures {
        lines.push(format!("FAIL {} (page {})", failure.path, failure.id));
        lines.push(format!("{}{}", indent(1), failure.message));
        if !failure.details.is_empty() {
            lines.push(format!("{}{}", indent(1), failure.details));
        }
    }
    for orphan in &report.orphans {
        lines.push(format!("ORPHAN {}", orphan));
    }
    lines.push(format!(
        "Checked {} pages: {} failed, {} orphaned documents",
        report.pages_checked,
        report.failures.len(),
        report.orphans.len()
    ));
    lines
}

pub fn print_check_report(report: &CheckReport) {
    for line in format_check_report(report) {
        println!("{}", line);
    }
}
