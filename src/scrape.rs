//! What the upstream scraper hands over

use serde::{Deserialize, Serialize};
use std::io::Read;

/// Frame URLs in display order, and the URL of the forecast chart
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapeOutput {
    pub frame_urls: Vec<String>,
    pub meteogram_url: String,
}

impl ScrapeOutput {
    pub fn from_reader(reader: impl Read) -> serde_json::Result<Self> {
        serde_json::from_reader(reader)
    }
}
