//! WebP compatibility.
//!
//! Archives may ship images as WebP while the environment that displays the
//! exported document cannot decode it. The service answers one question,
//! "does the environment decode WebP natively?", once per session, and when
//! it does not, rewrites every WebP `<img>` in the document to an equivalent
//! PNG data URL decoded in-process.
//!
//! | Step | Crate / function |
//! |---|---|
//! | Decode WebP | `image::load_from_memory_with_format` |
//! | Encode PNG | `DynamicImage::write_to` |
//! | Data URL | `base64` standard engine |
//!
//! The polyfill runs before list collapsing because replacing an image can
//! change the size of the boxes around it.

use crate::dom::{self, Document};
use crate::source::{ContentSource, FetchError};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use image::ImageFormat;
use std::io::Cursor;
use thiserror::Error;
use tokio::sync::OnceCell;

#[derive(Error, Debug)]
pub enum PolyfillError {
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),
    #[error("invalid data URL")]
    DataUrl,
    #[error("decode failed: {0}")]
    Decode(String),
    #[error("encode failed: {0}")]
    Encode(String),
}

/// Answers whether the rendering environment decodes WebP itself.
#[allow(async_fn_in_trait)]
pub trait CapabilityProbe {
    async fn supports_webp(&self) -> bool;
}

/// A capability known up front, e.g. from configuration.
#[derive(Debug, Clone, Copy)]
pub struct StaticProbe(pub bool);

impl CapabilityProbe for StaticProbe {
    async fn supports_webp(&self) -> bool {
        self.0
    }
}

/// Summary of one polyfill pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PolyfillReport {
    pub converted: usize,
    pub failed: usize,
}

/// Probes once, then polyfills on demand.
#[derive(Debug)]
pub struct CompatibilityService<P> {
    probe: P,
    supported: OnceCell<bool>,
}

impl<P: CapabilityProbe> CompatibilityService<P> {
    pub fn new(probe: P) -> Self {
        Self {
            probe,
            supported: OnceCell::new(),
        }
    }

    /// Whether WebP is natively supported. The probe runs at most once.
    pub async fn probe_support(&self) -> bool {
        *self
            .supported
            .get_or_init(|| async {
                let supported = self.probe.supports_webp().await;
                tracing::debug!(supported, "WebP support probed");
                supported
            })
            .await
    }

    /// Replace every WebP image source in the document with a PNG data URL.
    ///
    /// Images that fail to load or decode are left untouched and counted.
    pub async fn install_polyfill<S: ContentSource>(
        &self,
        document: &Document,
        source: &S,
    ) -> PolyfillReport {
        let candidates: Vec<_> = document
            .select_all("img")
            .into_iter()
            .filter_map(|img| {
                let src = dom::attribute(&img, "src")?;
                is_webp_source(&src).then_some((img, src))
            })
            .collect();

        let mut report = PolyfillReport::default();
        for (img, src) in candidates {
            match load_as_png_data_url(&src, source).await {
                Ok(data_url) => {
                    dom::set_attribute(&img, "src", &data_url);
                    dom::remove_attribute(&img, "srcset");
                    report.converted += 1;
                }
                Err(e) => {
                    tracing::warn!("Could not polyfill WebP image {}: {}", src, e);
                    report.failed += 1;
                }
            }
        }
        if report.converted > 0 || report.failed > 0 {
            tracing::info!(
                converted = report.converted,
                failed = report.failed,
                "Polyfilled WebP images"
            );
        }
        report
    }
}

/// Whether an image source refers to WebP data.
///
/// Matches `data:image/webp` URLs and paths whose extension is `.webp`,
/// ignoring any query string or fragment.
pub fn is_webp_source(src: &str) -> bool {
    let src = src.trim();
    if let Some(data) = src.strip_prefix("data:") {
        return data.to_ascii_lowercase().starts_with("image/webp");
    }
    let path = src.split(['?', '#']).next().unwrap_or(src);
    path.to_ascii_lowercase().ends_with(".webp")
}

fn is_remote(src: &str) -> bool {
    let lower = src.to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://") || lower.starts_with("//")
}

async fn load_as_png_data_url<S: ContentSource>(
    src: &str,
    source: &S,
) -> Result<String, PolyfillError> {
    let bytes = match src.trim().strip_prefix("data:") {
        Some(data) => decode_data_url(data)?,
        None if is_remote(src) => {
            return Err(PolyfillError::Fetch(FetchError::Transport(
                "remote images are not part of the archive".to_string(),
            )));
        }
        None => {
            let path = src.split(['?', '#']).next().unwrap_or(src);
            source.fetch(path).await?
        }
    };
    let png = webp_to_png(&bytes)?;
    Ok(format!("data:image/png;base64,{}", STANDARD.encode(png)))
}

/// Decode the payload of a base64 `data:` URL (text after `data:`).
fn decode_data_url(data: &str) -> Result<Vec<u8>, PolyfillError> {
    let (meta, payload) = data.split_once(',').ok_or(PolyfillError::DataUrl)?;
    if !meta.ends_with(";base64") {
        return Err(PolyfillError::DataUrl);
    }
    STANDARD
        .decode(payload.trim())
        .map_err(|_| PolyfillError::DataUrl)
}

/// Transcode WebP bytes into PNG bytes.
pub fn webp_to_png(bytes: &[u8]) -> Result<Vec<u8>, PolyfillError> {
    let decoded = image::load_from_memory_with_format(bytes, ImageFormat::WebP)
        .map_err(|e| PolyfillError::Decode(e.to_string()))?;
    let mut png = Vec::new();
    decoded
        .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
        .map_err(|e| PolyfillError::Encode(e.to_string()))?;
    Ok(png)
}
