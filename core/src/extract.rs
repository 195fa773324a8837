use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Structural features pulled from one fetched page. Written once per audit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageExtract {
    pub status_code: u16,
    pub final_url: String,
    pub content_type: Option<String>,
    pub headers: BTreeMap<String, String>,
    pub truncated: bool,

    pub title: Option<String>,
    pub meta_description: Option<String>,
    pub canonical_url: Option<String>,
    pub lang: Option<String>,
    pub og_title: Option<String>,
    pub og_description: Option<String>,
    pub author: Option<String>,
    pub published_time: Option<String>,
    pub modified_time: Option<String>,

    pub headings: Vec<Heading>,
    pub heading_tree: Vec<HeadingNode>,
    pub top_blocks: Vec<String>,
    pub sections: Vec<Section>,
    pub main_text: String,

    pub word_count: usize,
    pub list_count: usize,
    pub table_count: usize,
    pub image_count: usize,
    pub images_missing_alt: usize,
    pub question_heading_count: usize,

    pub internal_link_count: usize,
    pub external_link_count: usize,
    pub links: Vec<PageLink>,
    pub link_density: f64,

    pub json_ld: Vec<serde_json::Value>,
    pub schema_types: Vec<String>,
    pub json_ld_errors: usize,

    pub robots: RobotsDirectives,
    pub sentence_stats: SentenceStats,
}

impl PageExtract {
    pub fn h1_count(&self) -> usize {
        self.headings.iter().filter(|h| h.level == 1).count()
    }

    pub fn has_schema_type(&self, ty: &str) -> bool {
        self.schema_types.iter().any(|t| t.eq_ignore_ascii_case(ty))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Heading {
    pub level: u8,
    pub text: String,
}

impl Heading {
    pub fn is_question(&self) -> bool {
        self.text.trim_end().ends_with('?')
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeadingNode {
    pub level: u8,
    pub text: String,
    pub children: Vec<HeadingNode>,
}

/// Text that follows a heading up to the next heading.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    pub heading: Option<String>,
    pub level: u8,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageLink {
    pub href: String,
    pub text: String,
    pub internal: bool,
    pub nofollow: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RobotsDirectives {
    pub noindex: bool,
    pub nofollow: bool,
    pub noarchive: bool,
    pub nosnippet: bool,
    pub max_snippet: Option<i64>,
    pub tokens: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SentenceStats {
    pub count: usize,
    pub avg_words: f64,
    pub median_words: f64,
    pub max_words: usize,
    /// Share of sentences longer than 25 words.
    pub long_ratio: f64,
}
