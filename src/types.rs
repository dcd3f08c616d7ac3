//! Archive document types.
//!
//! These mirror the JSON documents the exporter writes under `content/` and
//! are deserialized with their camelCase wire names. Parsing is the only
//! structural validation the viewer performs: a payload that does not match
//! these shapes is reported as a malformed response.

use serde::{Deserialize, Deserializer, Serialize};

/// Root manifest from `content/shared.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SharedManifest {
    pub logo_path: String,
    pub root_page_path: String,
    pub pages: Vec<SharedPage>,
    /// Supplementary scripts declared by the archive, injected once per session.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub js_paths: Vec<String>,
}

/// One navigable page of the archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SharedPage {
    /// Content-fetch key. Exporters write it either as a number or a string.
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    /// Navigation key, unique within a manifest.
    pub path: String,
    /// Human-readable title, optionally prefixed with a section number (`1.2: ...`).
    pub title: String,
}

/// Pre-rendered markup of one page from `content/page_content_{id}.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageContent {
    pub html_body: String,
}

/// Landing document from `content/home.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HomeDocument {
    pub welcome_text_paragraphs: Vec<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum IdRepr {
    Text(String),
    Number(serde_json::Number),
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match IdRepr::deserialize(deserializer)? {
        IdRepr::Text(text) => text,
        IdRepr::Number(number) => number.to_string(),
    })
}

/// Archive-relative location of the shared manifest.
pub const SHARED_PATH: &str = "./content/shared.json";

/// Archive-relative location of the home document.
pub const HOME_PATH: &str = "./content/home.json";

/// Archive-relative location of a page's content document.
pub fn page_content_path(id: &str) -> String {
    format!("./content/page_content_{id}.json")
}
