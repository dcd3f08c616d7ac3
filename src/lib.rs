//! # zimview
//!
//! Content loading and page rendering for offline archive viewers. An archive
//! is a directory (or HTTP location) of JSON documents exported from a wiki:
//! a shared manifest listing every page, a home document, and one pre-rendered
//! HTML body per page.
//!
//! # Architecture: Store Plus Side-Effect Chain
//!
//! A [`store::ContentStore`] owns one viewing session. It fetches documents
//! through a [`source::ContentSource`], keeps the session state, and mounts
//! page markup into a [`dom::Document`]. Loading a page then runs a fixed
//! chain of services over the mounted markup:
//!
//! ```text
//! fetch page_content_{id}.json
//!   → mount into #content
//!   → numbering    (typesetting config from the title's section number)
//!   → compat       (WebP probe; inline PNG polyfill when unsupported)
//!   → collapse     (long subpage listings get a "Show all" toggle)
//! ```
//!
//! Each fetch carries a per-slot sequence number. When two requests of the
//! same kind overlap, only the latest one updates state or touches the
//! document; the older one settles as superseded.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`store`] | Session state, fetch operations, error taxonomy, side-effect ordering |
//! | [`source`] | Resource access: archive directory on disk or HTTP base URL |
//! | [`types`] | Archive documents (`SharedManifest`, `PageContent`, `HomeDocument`) |
//! | [`dom`] | Viewer shell rendered with Maud, mutable `kuchiki` document tree |
//! | [`numbering`] | Section-number prefix derivation and typesetting engine lifecycle |
//! | [`compat`] | WebP capability probe and PNG data-URL polyfill |
//! | [`collapse`] | Subpage listing collapse with show-all/show-less toggles |
//! | [`script`] | Supplementary script injection into the document head |
//! | [`check`] | Whole-archive load check and orphaned document scan |
//! | [`config`] | `zimview.toml` loading, validation, and merging over stock defaults |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## One Document, Mutated In Place
//!
//! The side-effect services never return new markup. They find their targets
//! in the live document and edit them, so the order of the chain is the order
//! in which edits become visible. Rendering a page to disk is a serialization
//! of that tree plus the inline engine configuration.
//!
//! ## Single-Threaded Sessions
//!
//! A session is driven from one task. State lives in `Cell`/`RefCell` and no
//! borrow is held across an `.await`, which keeps overlapping fetches of one
//! store sound without locks.

pub mod check;
pub mod collapse;
pub mod compat;
pub mod config;
pub mod dom;
pub mod numbering;
pub mod output;
pub mod script;
pub mod source;
pub mod store;
pub mod types;

#[cfg(test)]
pub(crate) mod test_helpers;
