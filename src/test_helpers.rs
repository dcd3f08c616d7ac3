//! Shared test utilities.
//!
//! Provides a scripted [`MockSource`] (per-path bodies, failures and delays),
//! sample archive documents, and a tiny WebP image for polyfill tests.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let source = MockSource::new()
//!     .with_json(SHARED_PATH, &sample_shared_json())
//!     .with_status(&page_content_path("2"), 404)
//!     .with_delay(&page_content_path("1"), Duration::from_millis(50));
//! ```

use crate::source::{ContentSource, FetchError, normalize_path};
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use std::cell::RefCell;
use std::collections::HashMap;
use std::io::Cursor;
use std::time::Duration;

// =========================================================================
// Scripted source
// =========================================================================

#[derive(Debug, Clone)]
enum Reply {
    Body(Vec<u8>),
    Status(u16),
    Transport(String),
}

/// In-memory source answering each path with a scripted reply.
///
/// Unknown paths answer `404`. Paths are normalized, so `./content/a.json`
/// and `content/a.json` are the same resource.
#[derive(Debug, Default)]
pub struct MockSource {
    replies: HashMap<String, Reply>,
    delays: HashMap<String, Duration>,
    requests: RefCell<Vec<String>>,
}

impl MockSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bytes(mut self, path: &str, bytes: Vec<u8>) -> Self {
        self.replies.insert(key(path), Reply::Body(bytes));
        self
    }

    pub fn with_json(self, path: &str, json: &str) -> Self {
        self.with_bytes(path, json.as_bytes().to_vec())
    }

    pub fn with_status(mut self, path: &str, status: u16) -> Self {
        self.replies.insert(key(path), Reply::Status(status));
        self
    }

    pub fn with_transport_error(mut self, path: &str) -> Self {
        self.replies
            .insert(key(path), Reply::Transport("connection reset".to_string()));
        self
    }

    /// Delay the reply for `path` (use with a paused tokio clock).
    pub fn with_delay(mut self, path: &str, delay: Duration) -> Self {
        self.delays.insert(key(path), delay);
        self
    }

    /// Normalized paths requested so far, in order.
    pub fn requests(&self) -> Vec<String> {
        self.requests.borrow().clone()
    }
}

fn key(path: &str) -> String {
    normalize_path(path).to_string()
}

impl ContentSource for MockSource {
    async fn fetch(&self, path: &str) -> Result<Vec<u8>, FetchError> {
        let path = key(path);
        self.requests.borrow_mut().push(path.clone());
        if let Some(delay) = self.delays.get(&path) {
            tokio::time::sleep(*delay).await;
        }
        match self.replies.get(&path) {
            Some(Reply::Body(bytes)) => Ok(bytes.clone()),
            Some(Reply::Status(status)) => Err(FetchError::Status(*status)),
            Some(Reply::Transport(message)) => Err(FetchError::Transport(message.clone())),
            None => Err(FetchError::Status(404)),
        }
    }
}

// =========================================================================
// Sample documents
// =========================================================================

/// Shared manifest with three pages (ids 1–3).
pub fn sample_shared_json() -> String {
    r#"{
        "logoPath": "content/logo.png",
        "rootPagePath": "Bookshelves",
        "pages": [
            {"id": "1", "path": "Bookshelves", "title": "Bookshelves"},
            {"id": "2", "path": "Bookshelves/Intro", "title": "1.2: The Scientific Method"},
            {"id": 3, "path": "Bookshelves/Next", "title": "1.3: The Foo Method"}
        ]
    }"#
    .to_string()
}

/// Page content document wrapping `html`.
pub fn page_json(html: &str) -> String {
    serde_json::json!({ "htmlBody": html }).to_string()
}

/// Category listing markup with `count` subpage items.
pub fn category_listing(count: usize) -> String {
    let items: String = (0..count).map(|i| format!("<li>Subpage {i}</li>")).collect();
    format!(
        r#"<div class="mt-category-container"><dl><dd class="mt-listing-detailed-subpages"><ul>{items}</ul></dd></dl></div>"#
    )
}

/// A 2×2 lossless WebP image.
pub fn tiny_webp() -> Vec<u8> {
    let pixels = RgbaImage::from_pixel(2, 2, Rgba([200, 30, 30, 255]));
    let mut out = Vec::new();
    DynamicImage::ImageRgba8(pixels)
        .write_to(&mut Cursor::new(&mut out), ImageFormat::WebP)
        .unwrap();
    out
}
