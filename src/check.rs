//! Archive consistency check.
//!
//! Loads every page listed in the shared manifest through the full pipeline
//! and, for archives on disk, looks for page content documents that no
//! manifest entry references.

use crate::compat::CapabilityProbe;
use crate::source::ContentSource;
use crate::store::{ContentStore, FetchOutcome};
use std::collections::HashSet;
use std::path::Path;
use walkdir::WalkDir;

/// A page whose content document failed to load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageFailure {
    pub id: String,
    pub path: String,
    pub message: String,
    pub details: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckReport {
    pub pages_checked: usize,
    pub failures: Vec<PageFailure>,
    /// Page content files (archive-relative) with no manifest entry.
    pub orphans: Vec<String>,
}

impl CheckReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && self.orphans.is_empty()
    }
}

/// Fetch every manifest page. The shared manifest must already be loaded.
pub async fn check_pages<S: ContentSource, P: CapabilityProbe>(
    store: &ContentStore<S, P>,
) -> CheckReport {
    let pages = store.shared().map(|shared| shared.pages).unwrap_or_default();
    let mut report = CheckReport::default();
    for page in &pages {
        report.pages_checked += 1;
        if let FetchOutcome::Failed(_) = store.fetch_page_content(page).await {
            report.failures.push(PageFailure {
                id: page.id.clone(),
                path: page.path.clone(),
                message: store.error_message(),
                details: store.error_details(),
            });
        }
    }
    report
}

/// Page content files under `archive_dir/content` whose id is not in `known_ids`.
pub fn find_orphans(archive_dir: &Path, known_ids: &HashSet<String>) -> Vec<String> {
    let content_dir = archive_dir.join("content");
    let mut orphans: Vec<String> = WalkDir::new(&content_dir)
        .max_depth(1)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| {
            let name = entry.file_name().to_str()?.to_string();
            let id = name
                .strip_prefix("page_content_")?
                .strip_suffix(".json")?
                .to_string();
            (!known_ids.contains(&id)).then(|| format!("content/{name}"))
        })
        .collect();
    orphans.sort();
    orphans
}
