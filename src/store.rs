//! Session content store and page-rendering pipeline.
//!
//! The store owns everything a viewing session loads (the shared manifest,
//! the home document and the current page) together with the viewer document
//! those pages render into. Each fetch follows the same sequence:
//!
//! ```text
//! begin     mark the slot loading, clear error strings, take a sequence number
//! fetch     ContentSource::fetch(path)           (suspension point)
//! settle    latest request clears the slot's loading flag; stale → discard below
//! parse     serde_json into the typed document   (MalformedResponse on mismatch)
//! assign    state slot (+ pages_by_path rebuild, + mount into #content)
//! effects   numbering reinstall → probe WebP → polyfill → collapse lists
//! ```
//!
//! ## Failures
//!
//! Fetch failures never leave the store. They become a fixed, resource
//! specific `error_message` plus an `error_details` string derived from the
//! [`ErrorKind`], and the failed slot is reset.
//!
//! ## Overlapping fetches
//!
//! Nothing cancels an in-flight request. Instead every request takes the next
//! sequence number of its slot, and only the most recently issued request of
//! a slot may apply state or side effects when it settles. The side-effect
//! chain re-checks after each suspension point, so a slow stale chain can
//! never collapse or polyfill over a newer page. Only the latest request of a
//! slot drives its loading flag; a stale request settling late changes nothing.

use crate::collapse::ListCollapser;
use crate::compat::{CapabilityProbe, CompatibilityService, StaticProbe};
use crate::config::ViewerConfig;
use crate::dom::Document;
use crate::numbering::{EngineConfig, NumberingService};
use crate::script::inject_script;
use crate::source::{ContentSource, FetchError};
use crate::types::{
    HOME_PATH, HomeDocument, PageContent, SHARED_PATH, SharedManifest, SharedPage,
    page_content_path,
};
use kuchiki::NodeRef;
use maud::html;
use serde::de::DeserializeOwned;
use std::cell::{Cell, Ref, RefCell};
use std::collections::HashMap;
use thiserror::Error;

pub const SHARED_ERROR: &str = "Failed to load shared data.";
pub const HOME_ERROR: &str = "Failed to load home data.";

pub fn page_error(id: &str) -> String {
    format!("Failed to load page content for page {id}")
}

// ============================================================================
// Error classification
// ============================================================================

/// Why a fetch failed, as far as the viewer can tell.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The server (or archive) answered with an HTTP error status.
    #[error("HTTP {0}")]
    NetworkOrNotFound(u16),
    /// The payload did not have the expected document shape.
    #[error("malformed response: {0}")]
    MalformedResponse(String),
    /// Anything else: connectivity, TLS, local IO.
    #[error("{0}")]
    Unclassified(String),
}

impl From<&FetchError> for ErrorKind {
    fn from(error: &FetchError) -> Self {
        match error.status() {
            Some(status) => ErrorKind::NetworkOrNotFound(status),
            None => ErrorKind::Unclassified(error.to_string()),
        }
    }
}

impl ErrorKind {
    /// User-facing explanation; empty when there is nothing useful to add.
    pub fn details(&self) -> String {
        match self {
            ErrorKind::NetworkOrNotFound(status) => {
                status_details(*status).unwrap_or_default().to_string()
            }
            ErrorKind::MalformedResponse(reason) => format!("Invalid response object: {reason}"),
            ErrorKind::Unclassified(_) => String::new(),
        }
    }
}

/// Explanation for the HTTP statuses the viewer knows how to describe.
pub fn status_details(status: u16) -> Option<&'static str> {
    match status {
        400 => Some("HTTP 400: Bad Request. The server could not understand the request."),
        404 => {
            Some("HTTP 404: Not Found. The requested resource could not be found on the server.")
        }
        500 => {
            Some("HTTP 500: Internal Server Error. The server encountered an unexpected error.")
        }
        _ => None,
    }
}

// ============================================================================
// State
// ============================================================================

/// Everything the presentation layer reads.
#[derive(Debug, Default, Clone)]
pub struct SessionState {
    pub shared: Option<SharedManifest>,
    /// Derived from `shared.pages`; rebuilt in full whenever `shared` changes.
    pub pages_by_path: HashMap<String, SharedPage>,
    pub home: Option<HomeDocument>,
    pub page_content: Option<PageContent>,
    /// Page whose content is currently mounted.
    pub current_page: Option<SharedPage>,
    pub error_message: String,
    pub error_details: String,
}

/// How a fetch call ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Loaded,
    Failed(ErrorKind),
    /// A newer request for the same slot was issued; this result was dropped.
    Superseded,
}

#[derive(Debug, Clone, Copy)]
enum Slot {
    Shared = 0,
    Home = 1,
    Page = 2,
}

/// Index pages by navigation path. A repeated path keeps the last page.
pub fn index_pages(pages: &[SharedPage]) -> HashMap<String, SharedPage> {
    let mut by_path = HashMap::with_capacity(pages.len());
    for page in pages {
        if let Some(previous) = by_path.insert(page.path.clone(), page.clone()) {
            tracing::warn!(
                "Duplicate page path {}: page {} replaces page {}",
                page.path,
                page.id,
                previous.id
            );
        }
    }
    by_path
}

// ============================================================================
// Store
// ============================================================================

/// Content store for one viewing session. Single-threaded by construction.
pub struct ContentStore<S, P = StaticProbe> {
    source: S,
    document: Document,
    numbering: RefCell<NumberingService>,
    compat: CompatibilityService<P>,
    collapser: RefCell<ListCollapser>,
    state: RefCell<SessionState>,
    loading: [Cell<bool>; 3],
    sequences: [Cell<u64>; 3],
    scripts_injected: Cell<bool>,
}

impl<S: ContentSource> ContentStore<S, StaticProbe> {
    /// Store configured from `zimview.toml` settings.
    pub fn from_config(source: S, config: &ViewerConfig) -> Self {
        ContentStore::new(
            source,
            StaticProbe(config.images.native_webp),
            NumberingService::new(&config.typesetting.script_path, config.typesetting.svg_scale),
        )
    }
}

impl<S: ContentSource, P: CapabilityProbe> ContentStore<S, P> {
    pub fn new(source: S, probe: P, numbering: NumberingService) -> Self {
        Self {
            source,
            document: Document::blank(),
            numbering: RefCell::new(numbering),
            compat: CompatibilityService::new(probe),
            collapser: RefCell::new(ListCollapser::new()),
            state: RefCell::new(SessionState::default()),
            loading: Default::default(),
            sequences: Default::default(),
            scripts_injected: Cell::new(false),
        }
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    /// Borrow the session state. Do not hold the guard across an `.await`.
    pub fn state(&self) -> Ref<'_, SessionState> {
        self.state.borrow()
    }

    pub fn shared(&self) -> Option<SharedManifest> {
        self.state.borrow().shared.clone()
    }

    pub fn pages_by_path(&self) -> HashMap<String, SharedPage> {
        self.state.borrow().pages_by_path.clone()
    }

    pub fn page_for_path(&self, path: &str) -> Option<SharedPage> {
        self.state.borrow().pages_by_path.get(path).cloned()
    }

    /// The manifest's root page, once the manifest is loaded.
    pub fn root_page(&self) -> Option<SharedPage> {
        let state = self.state.borrow();
        let root = &state.shared.as_ref()?.root_page_path;
        state.pages_by_path.get(root).cloned()
    }

    pub fn home(&self) -> Option<HomeDocument> {
        self.state.borrow().home.clone()
    }

    pub fn page_content(&self) -> Option<PageContent> {
        self.state.borrow().page_content.clone()
    }

    /// Whether the latest request of any slot is still in flight.
    pub fn is_loading(&self) -> bool {
        self.loading.iter().any(Cell::get)
    }

    pub fn error_message(&self) -> String {
        self.state.borrow().error_message.clone()
    }

    pub fn error_details(&self) -> String {
        self.state.borrow().error_details.clone()
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Configuration of the live typesetting engine.
    pub fn engine_config(&self) -> Option<EngineConfig> {
        self.numbering.borrow().config().cloned()
    }

    /// The document as a standalone page, engine configuration included.
    pub fn export_html(&self) -> String {
        let script = self.numbering.borrow().config().map(EngineConfig::to_script);
        self.document.export_html(script.as_deref())
    }

    // ------------------------------------------------------------------
    // UI lifecycle hooks
    // ------------------------------------------------------------------

    /// Reinstall numbering for `title` unless its prefix is already live.
    pub fn refresh_numbering(&self, title: &str) -> bool {
        self.numbering.borrow_mut().refresh(&self.document, title)
    }

    /// Remove the typesetting engine, e.g. when the page view goes away.
    pub fn release_numbering(&self) {
        self.numbering.borrow_mut().release(&self.document);
    }

    /// Activate the `index`-th collapse toggle of the current page.
    pub fn activate_toggle(&self, index: usize) -> bool {
        match self.collapser.borrow_mut().toggle_mut(index) {
            Some(toggle) => {
                toggle.activate();
                true
            }
            None => false,
        }
    }

    /// Activate the collapse toggle whose button is `button`.
    pub fn activate_toggle_button(&self, button: &NodeRef) -> bool {
        self.collapser.borrow_mut().activate(button)
    }

    /// Labels of the current page's collapse toggles, in document order.
    pub fn toggle_labels(&self) -> Vec<&'static str> {
        self.collapser
            .borrow()
            .toggles()
            .iter()
            .map(|toggle| toggle.label())
            .collect()
    }

    // ------------------------------------------------------------------
    // Fetch operations
    // ------------------------------------------------------------------

    /// Load `content/shared.json` and index its pages.
    pub async fn fetch_shared(&self) -> FetchOutcome {
        let seq = self.begin(Slot::Shared);
        let result = self.load::<SharedManifest>(SHARED_PATH).await;
        if !self.settle(Slot::Shared, seq) {
            return FetchOutcome::Superseded;
        }

        match result {
            Ok(shared) => {
                tracing::info!(pages = shared.pages.len(), "Loaded shared manifest");
                self.document.set_logo(&shared.logo_path);
                if !self.scripts_injected.replace(true) {
                    for path in &shared.js_paths {
                        inject_script(&self.document, path);
                    }
                }
                let mut state = self.state.borrow_mut();
                state.pages_by_path = index_pages(&shared.pages);
                state.shared = Some(shared);
                FetchOutcome::Loaded
            }
            Err(kind) => self.fail(SHARED_ERROR.to_string(), kind, |state| {
                state.shared = None;
                state.pages_by_path.clear();
            }),
        }
    }

    /// Load `content/home.json`.
    pub async fn fetch_home(&self) -> FetchOutcome {
        let seq = self.begin(Slot::Home);
        let result = self.load::<HomeDocument>(HOME_PATH).await;
        if !self.settle(Slot::Home, seq) {
            return FetchOutcome::Superseded;
        }

        match result {
            Ok(home) => {
                tracing::info!(
                    paragraphs = home.welcome_text_paragraphs.len(),
                    "Loaded home document"
                );
                self.state.borrow_mut().home = Some(home);
                FetchOutcome::Loaded
            }
            Err(kind) => self.fail(HOME_ERROR.to_string(), kind, |state| state.home = None),
        }
    }

    /// Load a page's content, mount it, and run the side-effect chain.
    pub async fn fetch_page_content(&self, page: &SharedPage) -> FetchOutcome {
        let seq = self.begin(Slot::Page);
        let result = self.load::<PageContent>(&page_content_path(&page.id)).await;
        if !self.settle(Slot::Page, seq) {
            tracing::debug!(page = %page.id, "Discarded stale page content");
            return FetchOutcome::Superseded;
        }

        match result {
            Ok(content) => {
                tracing::info!(page = %page.id, path = %page.path, "Loaded page content");
                self.document.mount_html(&content.html_body);
                self.document.set_title(&page.title);
                {
                    let mut state = self.state.borrow_mut();
                    state.page_content = Some(content);
                    state.current_page = Some(page.clone());
                }
                self.run_page_effects(page, seq).await;
                FetchOutcome::Loaded
            }
            Err(kind) => self.fail(page_error(&page.id), kind, |state| {
                state.page_content = None;
                state.current_page = None;
            }),
        }
    }

    /// Numbering → WebP probe/polyfill → list collapsing, strictly in order.
    async fn run_page_effects(&self, page: &SharedPage, seq: u64) {
        let prefix = self
            .numbering
            .borrow_mut()
            .reinstall_for_title(&self.document, &page.title);
        tracing::debug!(page = %page.id, prefix = %prefix, "Numbering installed");

        let supported = self.compat.probe_support().await;
        if !self.is_current(Slot::Page, seq) {
            return;
        }
        if !supported {
            self.compat.install_polyfill(&self.document, &self.source).await;
            if !self.is_current(Slot::Page, seq) {
                return;
            }
        }

        self.collapser.borrow_mut().apply_collapsing(&self.document);
    }

    // ------------------------------------------------------------------
    // Bookkeeping
    // ------------------------------------------------------------------

    fn begin(&self, slot: Slot) -> u64 {
        self.loading[slot as usize].set(true);
        {
            let mut state = self.state.borrow_mut();
            state.error_message.clear();
            state.error_details.clear();
        }
        let counter = &self.sequences[slot as usize];
        let seq = counter.get() + 1;
        counter.set(seq);
        seq
    }

    /// Mark a request settled; returns whether it is still the latest of its slot.
    fn settle(&self, slot: Slot, seq: u64) -> bool {
        let current = self.is_current(slot, seq);
        if current {
            self.loading[slot as usize].set(false);
        }
        current
    }

    fn is_current(&self, slot: Slot, seq: u64) -> bool {
        self.sequences[slot as usize].get() == seq
    }

    async fn load<T: DeserializeOwned>(&self, path: &str) -> Result<T, ErrorKind> {
        let bytes = self
            .source
            .fetch(path)
            .await
            .map_err(|e| ErrorKind::from(&e))?;
        serde_json::from_slice(&bytes).map_err(|e| ErrorKind::MalformedResponse(e.to_string()))
    }

    fn fail(
        &self,
        message: String,
        kind: ErrorKind,
        reset: impl FnOnce(&mut SessionState),
    ) -> FetchOutcome {
        tracing::warn!("{} ({})", message, kind);
        let details = kind.details();
        // The error block replaces the page the toggles and engine served.
        self.document.mount_html(&error_markup(&message, &details));
        self.collapser.borrow_mut().clear();
        self.numbering.borrow_mut().release(&self.document);
        let mut state = self.state.borrow_mut();
        reset(&mut state);
        state.error_message = message;
        state.error_details = details;
        FetchOutcome::Failed(kind)
    }
}

/// Markup shown in place of content when a fetch fails.
fn error_markup(message: &str, details: &str) -> String {
    html! {
        div class="zim-error" {
            p class="zim-error-message" { (message) }
            @if !details.is_empty() {
                p class="zim-error-details" { (details) }
            }
        }
    }
    .into_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collapse::{SHOW_ALL, SHOW_LESS, TOGGLE_CLASS};
    use crate::numbering::ENGINE_SCRIPT_ID;
    use crate::test_helpers::*;
    use std::time::Duration;

    fn store(source: MockSource) -> ContentStore<MockSource> {
        ContentStore::new(source, StaticProbe(true), NumberingService::default())
    }

    fn page(id: &str, path: &str, title: &str) -> SharedPage {
        SharedPage {
            id: id.to_string(),
            path: path.to_string(),
            title: title.to_string(),
        }
    }

    #[test]
    fn status_mapping() {
        assert!(status_details(400).unwrap().starts_with("HTTP 400: Bad Request."));
        assert!(status_details(404).unwrap().starts_with("HTTP 404: Not Found."));
        assert!(status_details(500).unwrap().starts_with("HTTP 500: Internal Server Error."));
        assert_eq!(status_details(403), None);
        assert_eq!(ErrorKind::NetworkOrNotFound(502).details(), "");
        assert_eq!(ErrorKind::Unclassified("reset".into()).details(), "");
    }

    #[test]
    fn fetch_errors_classify_by_status() {
        assert_eq!(
            ErrorKind::from(&FetchError::Status(404)),
            ErrorKind::NetworkOrNotFound(404)
        );
        assert!(matches!(
            ErrorKind::from(&FetchError::Transport("x".into())),
            ErrorKind::Unclassified(_)
        ));
    }

    #[test]
    fn duplicate_paths_keep_last_page() {
        let pages = vec![page("1", "a", "A"), page("2", "a", "A again"), page("3", "b", "B")];
        let index = index_pages(&pages);
        assert_eq!(index.len(), 2);
        assert_eq!(index["a"].id, "2");
    }

    #[tokio::test]
    async fn shared_success_indexes_every_page() {
        let store = store(MockSource::new().with_json(SHARED_PATH, &sample_shared_json()));
        assert_eq!(store.fetch_shared().await, FetchOutcome::Loaded);

        let shared = store.shared().unwrap();
        let by_path = store.pages_by_path();
        assert_eq!(by_path.len(), shared.pages.len());
        for p in &shared.pages {
            assert_eq!(by_path.get(&p.path), Some(p));
        }
        assert_eq!(store.root_page().unwrap().id, "1");
        assert_eq!(store.error_message(), "");
        assert!(!store.is_loading());
    }

    #[tokio::test]
    async fn shared_404_resets_state_and_reports() {
        let store = store(MockSource::new().with_status(SHARED_PATH, 404));
        let outcome = store.fetch_shared().await;
        assert_eq!(outcome, FetchOutcome::Failed(ErrorKind::NetworkOrNotFound(404)));
        assert!(store.shared().is_none());
        assert!(store.pages_by_path().is_empty());
        assert_eq!(store.error_message(), SHARED_ERROR);
        assert_eq!(
            store.error_details(),
            "HTTP 404: Not Found. The requested resource could not be found on the server."
        );
    }

    #[tokio::test]
    async fn shared_failure_after_success_clears_manifest() {
        let ok = store(MockSource::new().with_json(SHARED_PATH, &sample_shared_json()));
        ok.fetch_shared().await;
        assert!(ok.shared().is_some());

        // Same store, now the resource is corrupt.
        let store = ContentStore {
            source: MockSource::new().with_json(SHARED_PATH, "[]"),
            ..ok
        };
        let outcome = store.fetch_shared().await;
        assert!(matches!(outcome, FetchOutcome::Failed(ErrorKind::MalformedResponse(_))));
        assert!(store.shared().is_none());
        assert!(store.pages_by_path().is_empty());
        assert!(store.error_details().starts_with("Invalid response object:"));
    }

    #[tokio::test]
    async fn transport_failure_leaves_details_empty() {
        let store = store(MockSource::new().with_transport_error(SHARED_PATH));
        store.fetch_shared().await;
        assert_eq!(store.error_message(), SHARED_ERROR);
        assert_eq!(store.error_details(), "");
    }

    #[tokio::test]
    async fn errors_clear_on_next_attempt() {
        let store = store(
            MockSource::new()
                .with_status(HOME_PATH, 500)
                .with_json(SHARED_PATH, &sample_shared_json()),
        );
        store.fetch_home().await;
        assert_eq!(store.error_message(), HOME_ERROR);
        assert!(store.error_details().starts_with("HTTP 500"));

        store.fetch_shared().await;
        assert_eq!(store.error_message(), "");
        assert_eq!(store.error_details(), "");
    }

    #[tokio::test]
    async fn home_loads_paragraphs() {
        let store = store(
            MockSource::new().with_json(HOME_PATH, r#"{"welcomeTextParagraphs": ["Hello"]}"#),
        );
        assert_eq!(store.fetch_home().await, FetchOutcome::Loaded);
        assert_eq!(store.home().unwrap().welcome_text_paragraphs, vec!["Hello"]);
    }

    #[tokio::test(start_paused = true)]
    async fn loading_flag_spans_the_fetch() {
        let store = store(
            MockSource::new()
                .with_json(SHARED_PATH, &sample_shared_json())
                .with_delay(SHARED_PATH, Duration::from_millis(100)),
        );
        assert!(!store.is_loading());

        let observe = async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            store.is_loading()
        };
        let (outcome, during) = tokio::join!(store.fetch_shared(), observe);
        assert_eq!(outcome, FetchOutcome::Loaded);
        assert!(during);
        assert!(!store.is_loading());
    }

    #[tokio::test(start_paused = true)]
    async fn loading_flag_clears_after_failure() {
        let store = store(
            MockSource::new()
                .with_status(SHARED_PATH, 500)
                .with_delay(SHARED_PATH, Duration::from_millis(10)),
        );
        let observe = async {
            tokio::time::sleep(Duration::from_millis(5)).await;
            store.is_loading()
        };
        let (_, during) = tokio::join!(store.fetch_shared(), observe);
        assert!(during);
        assert!(!store.is_loading());
    }

    #[tokio::test]
    async fn page_load_runs_numbering_and_collapse() {
        let intro = page("2", "Bookshelves/Intro", "1.2: The Scientific Method");
        let store = store(
            MockSource::new().with_json(&page_content_path("2"), &page_json(&category_listing(7))),
        );
        assert_eq!(store.fetch_page_content(&intro).await, FetchOutcome::Loaded);

        assert_eq!(store.engine_config().unwrap().section, "1.2.");
        assert_eq!(store.document().select_all("#mathjax-script").len(), 1);
        assert_eq!(store.toggle_labels(), vec![SHOW_ALL]);
        assert!(store.activate_toggle(0));
        assert_eq!(store.toggle_labels(), vec![SHOW_LESS]);
        assert_eq!(store.state().current_page.as_ref(), Some(&intro));
    }

    #[tokio::test]
    async fn navigating_twice_keeps_one_engine_and_one_toggle() {
        let a = page("2", "a", "1.2: A");
        let b = page("3", "b", "1.3: B");
        let store = store(
            MockSource::new()
                .with_json(&page_content_path("2"), &page_json(&category_listing(6)))
                .with_json(&page_content_path("3"), &page_json(&category_listing(6))),
        );
        store.fetch_page_content(&a).await;
        store.fetch_page_content(&b).await;
        store.fetch_page_content(&b).await;

        let doc = store.document();
        assert_eq!(doc.select_all(&format!("#{ENGINE_SCRIPT_ID}")).len(), 1);
        assert_eq!(doc.select_all(&format!("button.{TOGGLE_CLASS}")).len(), 1);
        assert_eq!(store.engine_config().unwrap().section, "1.3.");
    }

    #[tokio::test]
    async fn page_failure_clears_content_and_keeps_manifest() {
        let broken = page("9", "broken", "9: Broken");
        let store = store(MockSource::new().with_json(SHARED_PATH, &sample_shared_json()));
        store.fetch_shared().await;

        let outcome = store.fetch_page_content(&broken).await;
        assert_eq!(outcome, FetchOutcome::Failed(ErrorKind::NetworkOrNotFound(404)));
        assert!(store.page_content().is_none());
        assert!(store.shared().is_some(), "manifest survives a page failure");
        assert_eq!(store.error_message(), "Failed to load page content for page 9");
        let shown = store.document().content().text_contents();
        assert!(shown.contains("Failed to load page content for page 9"));
        assert!(shown.contains("HTTP 404"));
    }

    #[tokio::test]
    async fn malformed_page_is_reported() {
        let p = page("4", "p", "P");
        let store = store(MockSource::new().with_json(&page_content_path("4"), r#"{"body": 1}"#));
        let outcome = store.fetch_page_content(&p).await;
        assert!(matches!(outcome, FetchOutcome::Failed(ErrorKind::MalformedResponse(_))));
        assert!(store.error_details().contains("htmlBody"));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_stale_page_does_not_overwrite_newer_one() {
        let slow = page("2", "slow", "1.2: Slow");
        let fast = page("3", "fast", "1.3: Fast");
        let store = store(
            MockSource::new()
                .with_json(&page_content_path("2"), &page_json("<p>slow</p>"))
                .with_delay(&page_content_path("2"), Duration::from_millis(100))
                .with_json(&page_content_path("3"), &page_json("<p>fast</p>"))
                .with_delay(&page_content_path("3"), Duration::from_millis(10)),
        );

        let second = async {
            tokio::time::sleep(Duration::from_millis(1)).await;
            store.fetch_page_content(&fast).await
        };
        let (first_outcome, second_outcome) =
            tokio::join!(store.fetch_page_content(&slow), second);

        assert_eq!(first_outcome, FetchOutcome::Superseded);
        assert_eq!(second_outcome, FetchOutcome::Loaded);
        assert_eq!(store.page_content().unwrap().html_body, "<p>fast</p>");
        assert_eq!(store.engine_config().unwrap().section, "1.3.");
        assert_eq!(store.document().content().text_contents(), "fast");
        assert!(!store.is_loading());
    }

    #[tokio::test(start_paused = true)]
    async fn fast_stale_page_is_discarded_while_newer_is_pending() {
        let first = page("2", "first", "1.2: First");
        let second = page("3", "second", "1.3: Second");
        let store = store(
            MockSource::new()
                .with_json(&page_content_path("2"), &page_json("<p>first</p>"))
                .with_delay(&page_content_path("2"), Duration::from_millis(10))
                .with_json(&page_content_path("3"), &page_json("<p>second</p>"))
                .with_delay(&page_content_path("3"), Duration::from_millis(100)),
        );

        let later = async {
            tokio::time::sleep(Duration::from_millis(1)).await;
            store.fetch_page_content(&second).await
        };
        let observe = async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            (store.is_loading(), store.page_content())
        };
        let (a, b, (loading, content)) =
            tokio::join!(store.fetch_page_content(&first), later, observe);

        assert_eq!(a, FetchOutcome::Superseded);
        assert_eq!(b, FetchOutcome::Loaded);
        assert!(loading, "newer request still in flight");
        assert!(content.is_none(), "stale result never applied");
        assert_eq!(store.page_content().unwrap().html_body, "<p>second</p>");
    }

    #[tokio::test(start_paused = true)]
    async fn stale_failure_does_not_report_errors() {
        let broken = page("8", "broken", "Broken");
        let good = page("3", "good", "1.3: Good");
        let store = store(
            MockSource::new()
                .with_status(&page_content_path("8"), 500)
                .with_delay(&page_content_path("8"), Duration::from_millis(100))
                .with_json(&page_content_path("3"), &page_json("<p>ok</p>")),
        );
        let later = async {
            tokio::time::sleep(Duration::from_millis(1)).await;
            store.fetch_page_content(&good).await
        };
        let (stale, fresh) = tokio::join!(store.fetch_page_content(&broken), later);
        assert_eq!(stale, FetchOutcome::Superseded);
        assert_eq!(fresh, FetchOutcome::Loaded);
        assert_eq!(store.error_message(), "");
        assert!(store.page_content().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn loading_clears_when_newest_settles_before_stale() {
        let slow = page("2", "slow", "1.2: Slow");
        let fast = page("3", "fast", "1.3: Fast");
        let store = store(
            MockSource::new()
                .with_json(&page_content_path("2"), &page_json("<p>slow</p>"))
                .with_delay(&page_content_path("2"), Duration::from_millis(100))
                .with_json(&page_content_path("3"), &page_json("<p>fast</p>"))
                .with_delay(&page_content_path("3"), Duration::from_millis(10)),
        );

        let later = async {
            tokio::time::sleep(Duration::from_millis(1)).await;
            store.fetch_page_content(&fast).await
        };
        let observe = async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            (store.is_loading(), store.page_content())
        };
        let (_, _, (loading, content)) =
            tokio::join!(store.fetch_page_content(&slow), later, observe);

        assert_eq!(content.unwrap().html_body, "<p>fast</p>");
        assert!(!loading, "stale request still in flight must not show loading");
        assert!(!store.is_loading());
    }

    #[tokio::test]
    async fn loading_tracks_each_slot() {
        let store = store(
            MockSource::new()
                .with_json(SHARED_PATH, &sample_shared_json())
                .with_json(HOME_PATH, r#"{"welcomeTextParagraphs": []}"#),
        );
        let seq = store.begin(Slot::Home);
        store.fetch_shared().await;
        assert!(store.is_loading(), "home request still open");
        assert!(store.settle(Slot::Home, seq));
        assert!(!store.is_loading());
    }

    #[tokio::test]
    async fn page_failure_drops_previous_toggles_and_engine() {
        let listing = page("2", "listing", "1.2: Listing");
        let missing = page("9", "missing", "9: Missing");
        let store = store(
            MockSource::new().with_json(&page_content_path("2"), &page_json(&category_listing(7))),
        );
        store.fetch_page_content(&listing).await;
        assert_eq!(store.toggle_labels(), vec![SHOW_ALL]);

        let outcome = store.fetch_page_content(&missing).await;
        assert_eq!(outcome, FetchOutcome::Failed(ErrorKind::NetworkOrNotFound(404)));
        assert!(store.toggle_labels().is_empty());
        assert!(!store.activate_toggle(0));
        assert!(store.engine_config().is_none());
        assert!(store.document().element_by_id(ENGINE_SCRIPT_ID).is_none());
        assert!(!store.export_html().contains("mathjax-config"));
    }

    #[tokio::test]
    async fn toggle_activates_by_button() {
        let listing = page("2", "listing", "1.2: Listing");
        let store = store(
            MockSource::new().with_json(&page_content_path("2"), &page_json(&category_listing(6))),
        );
        store.fetch_page_content(&listing).await;

        let button = store
            .document()
            .first_match(&format!("button.{TOGGLE_CLASS}"))
            .unwrap();
        assert!(store.activate_toggle_button(&button));
        assert_eq!(store.toggle_labels(), vec![SHOW_LESS]);
        let stray = store.document().create_element("button", &[]);
        assert!(!store.activate_toggle_button(&stray));
    }

    #[tokio::test]
    async fn unsupported_webp_is_polyfilled_before_collapse() {
        let p = page("5", "img", "2: Images");
        let html = format!(r#"<img id="pic" src="./content/pic.webp">{}"#, category_listing(6));
        let source = MockSource::new()
            .with_json(&page_content_path("5"), &page_json(&html))
            .with_bytes("content/pic.webp", tiny_webp());
        let store = ContentStore::new(source, StaticProbe(false), NumberingService::default());

        store.fetch_page_content(&p).await;
        let img = store.document().element_by_id("pic").unwrap();
        let src = crate::dom::attribute(&img, "src").unwrap();
        assert!(src.starts_with("data:image/png;base64,"));
        assert_eq!(store.toggle_labels().len(), 1);
        assert_eq!(
            store.source().requests(),
            vec!["content/page_content_5.json", "content/pic.webp"]
        );
    }

    #[tokio::test]
    async fn supported_webp_is_left_alone() {
        let p = page("5", "img", "Images");
        let source = MockSource::new().with_json(
            &page_content_path("5"),
            &page_json(r#"<img id="pic" src="content/pic.webp">"#),
        );
        let store = store(source);
        store.fetch_page_content(&p).await;
        let img = store.document().element_by_id("pic").unwrap();
        assert_eq!(
            crate::dom::attribute(&img, "src").as_deref(),
            Some("content/pic.webp")
        );
    }

    #[tokio::test]
    async fn manifest_scripts_are_injected_once() {
        let json = r#"{"logoPath": "l.png", "rootPagePath": "a", "pages": [], "jsPaths": ["./content/a.js", "./content/b.js"]}"#;
        let store = store(MockSource::new().with_json(SHARED_PATH, json));
        store.fetch_shared().await;
        store.fetch_shared().await;
        let scripts = store.document().select_all("head > script[src]");
        assert_eq!(scripts.len(), 2);
        assert_eq!(store.document().select_all("header img").len(), 1);
    }

    #[tokio::test]
    async fn refresh_hook_shares_prefix_with_store() {
        let p = page("2", "a", "1.2: A");
        let store = store(MockSource::new().with_json(&page_content_path("2"), &page_json("x")));
        store.fetch_page_content(&p).await;
        assert!(!store.refresh_numbering("1.2: A"));
        assert!(store.refresh_numbering("4: Other"));
        store.release_numbering();
        assert!(store.engine_config().is_none());
        assert!(store.document().element_by_id(ENGINE_SCRIPT_ID).is_none());
    }

    #[tokio::test]
    async fn export_contains_engine_config() {
        let p = page("2", "a", "1.2: A");
        let store = store(MockSource::new().with_json(&page_content_path("2"), &page_json("<p>x</p>")));
        store.fetch_page_content(&p).await;
        let html = store.export_html();
        assert!(html.contains("window.MathJax = "));
        assert!(html.contains(r#""section":"1.2.""#));
        assert!(html.contains("<title>1.2: A</title>"));
    }
}
