//! Turns a fetched HTML document into a [`PageExtract`].
//!
//! Pure: no I/O, no clock. The same `(status, headers, body, url)` always
//! yields the same record.

pub mod html;
pub mod text;

use aeo_core::{Heading, HeadingNode, PageExtract, PageLink, RobotsDirectives, Section};
use html::{Token, VOID};
use std::collections::BTreeMap;
use tracing::debug;
use url::Url;

pub const MAX_LINKS: usize = 200;
pub const MAX_TOP_BLOCKS: usize = 5;
pub const MAX_SECTIONS: usize = 50;
/// Opens past this depth are dropped, which keeps every tag O(1) however
/// deeply a page nests unclosed elements.
pub const MAX_DEPTH: usize = 512;

/// Elements whose text never counts as page content.
const HARD_EXCLUDED: &[&str] = &["script", "style", "noscript", "template", "svg", "head"];
/// Page chrome: skipped for content but still scanned for headings and links.
const CHROME: &[&str] = &["nav", "header", "footer", "aside", "form"];

const BLOCKS: &[&str] = &[
    "p", "li", "h1", "h2", "h3", "h4", "h5", "h6", "td", "th", "blockquote", "pre", "dd", "dt",
    "figcaption", "caption", "div", "section", "article", "main", "body", "tr", "ul", "ol", "table",
    "header", "footer", "nav", "aside", "form",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockKind {
    Heading(u8),
    ListItem,
    Paragraph,
    Other,
}

struct Frame {
    name: String,
    /// Innermost block kind at this depth, inherited from the parent frame.
    kind: BlockKind,
}

/// How many elements of each tracked class are currently open.
#[derive(Default)]
struct OpenCounts {
    excluded: usize,
    chrome: usize,
    title: usize,
    main: usize,
    svg: usize,
    body: usize,
}

impl OpenCounts {
    fn adjust(&mut self, name: &str, enter: bool) {
        let bump = |c: &mut usize| {
            if enter {
                *c += 1;
            } else {
                *c = c.saturating_sub(1);
            }
        };
        if HARD_EXCLUDED.contains(&name) {
            bump(&mut self.excluded);
        }
        if CHROME.contains(&name) {
            bump(&mut self.chrome);
        }
        match name {
            "title" => bump(&mut self.title),
            "main" | "article" => bump(&mut self.main),
            "body" => bump(&mut self.body),
            _ => {}
        }
        if name == "svg" {
            bump(&mut self.svg);
        }
    }
}

#[derive(Debug)]
struct Block {
    text: String,
    kind: BlockKind,
    in_main: bool,
}

struct LinkCapture {
    href: String,
    nofollow: bool,
    text: String,
    in_content: bool,
    in_main: bool,
}

#[derive(Default)]
struct Walker {
    stack: Vec<Frame>,
    open: OpenCounts,
    base: Option<Url>,

    title: Option<String>,
    title_buf: Option<String>,
    meta_description: Option<String>,
    canonical: Option<String>,
    lang: Option<String>,
    og_title: Option<String>,
    og_description: Option<String>,
    author: Option<String>,
    published: Option<String>,
    modified: Option<String>,
    robots_tokens: Vec<String>,

    headings: Vec<Heading>,
    heading_buf: Option<(u8, String)>,

    blocks: Vec<Block>,
    block_buf: String,
    block_in_main: bool,
    saw_main: bool,

    links: Vec<PageLink>,
    link_buf: Option<LinkCapture>,
    internal_links: usize,
    external_links: usize,
    link_words_all: usize,
    link_words_main: usize,

    list_count: usize,
    table_count: usize,
    image_count: usize,
    images_missing_alt: usize,

    ld_pending: bool,
    json_ld: Vec<serde_json::Value>,
    json_ld_errors: usize,
}

/// Extract structural features from a fetched document.
///
/// `final_url` is the URL after redirects; relative links resolve against it
/// (or against `<base href>` when the document declares one).
pub fn extract_content(status: u16, headers: &BTreeMap<String, String>, body: &[u8], final_url: &str) -> PageExtract {
    let doc = String::from_utf8_lossy(body);
    let mut w = Walker { base: Url::parse(final_url).ok(), ..Walker::default() };
    for tok in html::tokenize(&doc) {
        w.token(tok);
    }
    w.flush_block();
    w.finish_heading();
    w.finish_link();

    if let Some(xrt) = headers.get("x-robots-tag") {
        w.robots_tokens.extend(robots_header_tokens(xrt));
    }

    let extract = w.into_extract(status, headers, final_url);
    debug!(
        url = final_url,
        words = extract.word_count,
        headings = extract.headings.len(),
        links = extract.internal_link_count + extract.external_link_count,
        "extracted page"
    );
    extract
}

impl Walker {
    fn hard_excluded(&self) -> bool {
        self.open.excluded > 0
    }

    fn in_content(&self) -> bool {
        !self.hard_excluded() && self.open.chrome == 0 && self.open.title == 0
    }

    fn in_main(&self) -> bool {
        self.open.main > 0
    }

    fn current_kind(&self) -> BlockKind {
        self.stack.last().map_or(BlockKind::Other, |f| f.kind)
    }

    fn push(&mut self, name: String) {
        if self.stack.len() >= MAX_DEPTH {
            return;
        }
        let kind = own_kind(&name).unwrap_or_else(|| self.current_kind());
        self.open.adjust(&name, true);
        self.stack.push(Frame { name, kind });
    }

    fn pop_to(&mut self, len: usize) {
        while self.stack.len() > len {
            if let Some(f) = self.stack.pop() {
                self.open.adjust(&f.name, false);
            }
        }
    }

    fn token(&mut self, tok: Token) {
        match tok {
            Token::Start { name, attrs, self_closing } => self.start(name, &attrs, self_closing),
            Token::End { name } => self.end(&name),
            Token::Text(t) => self.text(&html::decode_entities(&t)),
            Token::Raw(raw) => {
                if std::mem::take(&mut self.ld_pending) {
                    self.json_ld_block(&raw);
                }
            }
        }
    }

    fn start(&mut self, name: String, attrs: &[(String, String)], self_closing: bool) {
        let attr = |k: &str| Token::attr(attrs, k);
        match name.as_str() {
            "html" => {
                if let Some(l) = attr("lang").filter(|l| !l.trim().is_empty()) {
                    self.lang = Some(l.trim().to_string());
                }
            }
            "base" => {
                if let Some(base) = attr("href").and_then(|h| self.resolve(h)) {
                    self.base = Some(base);
                }
            }
            "meta" => self.meta(attrs),
            "link" => {
                let rel = attr("rel").unwrap_or("").to_ascii_lowercase();
                if self.canonical.is_none() && rel.split_whitespace().any(|r| r == "canonical") {
                    if let Some(href) = attr("href") {
                        self.canonical =
                            Some(self.resolve(href).map(|u| u.to_string()).unwrap_or_else(|| href.to_string()));
                    }
                }
            }
            "script" => {
                self.ld_pending = attr("type").is_some_and(|t| t.to_ascii_lowercase().contains("ld+json"));
            }
            "img" if !self.hard_excluded() => {
                self.image_count += 1;
                if attr("alt").is_none() {
                    self.images_missing_alt += 1;
                }
            }
            "br" => self.block_buf.push(' '),
            "ul" | "ol" if self.in_content() => self.list_count += 1,
            "table" if self.in_content() => self.table_count += 1,
            "main" | "article" if !self.hard_excluded() => self.saw_main = true,
            _ => {}
        }

        if name == "a" && !self.hard_excluded() {
            self.finish_link();
            if let Some(href) = attr("href") {
                let nofollow = attr("rel").is_some_and(|r| r.to_ascii_lowercase().contains("nofollow"));
                self.link_buf = Some(LinkCapture {
                    href: href.trim().to_string(),
                    nofollow,
                    text: String::new(),
                    in_content: self.in_content(),
                    in_main: self.in_main(),
                });
            }
        }

        if let Some(level) = heading_level(&name) {
            self.finish_heading();
            if !self.hard_excluded() {
                self.heading_buf = Some((level, String::new()));
            }
        }
        if name == "title" && self.title.is_none() && self.open.svg == 0 && self.open.body == 0 {
            self.title_buf = Some(String::new());
        }

        if VOID.contains(&name.as_str()) || self_closing {
            return;
        }
        if BLOCKS.contains(&name.as_str()) {
            self.flush_block();
            // <p> and <li> close an open sibling of the same name.
            if (name == "p" || name == "li") && self.stack.last().is_some_and(|top| top.name == name) {
                self.pop_to(self.stack.len() - 1);
            }
        }
        self.push(name);
    }

    fn end(&mut self, name: &str) {
        let Some(idx) = self.stack.iter().rposition(|f| f.name == name) else { return };
        if BLOCKS.contains(&name) || heading_level(name).is_some() {
            self.flush_block();
        }
        if heading_level(name).is_some() {
            self.finish_heading();
        }
        if name == "a" {
            self.finish_link();
        }
        if name == "title" {
            if let Some(t) = self.title_buf.take() {
                let t = text::normalize_ws(&t);
                if !t.is_empty() {
                    self.title = Some(t);
                }
            }
        }
        if name == "script" {
            self.ld_pending = false;
        }
        self.pop_to(idx);
    }

    fn text(&mut self, t: &str) {
        if let Some(buf) = self.title_buf.as_mut() {
            buf.push_str(t);
            return;
        }
        if self.hard_excluded() {
            return;
        }
        if let Some((_, buf)) = self.heading_buf.as_mut() {
            buf.push_str(t);
        }
        if let Some(link) = self.link_buf.as_mut() {
            link.text.push_str(t);
        }
        if self.in_content() {
            if !t.trim().is_empty() && self.in_main() {
                self.block_in_main = true;
            }
            self.block_buf.push_str(t);
        }
    }

    fn meta(&mut self, attrs: &[(String, String)]) {
        let key = Token::attr(attrs, "name")
            .or_else(|| Token::attr(attrs, "property"))
            .unwrap_or("")
            .to_ascii_lowercase();
        let Some(content) = Token::attr(attrs, "content").map(text::normalize_ws) else { return };
        if content.is_empty() {
            return;
        }
        let slot = match key.as_str() {
            "description" => &mut self.meta_description,
            "og:title" => &mut self.og_title,
            "og:description" => &mut self.og_description,
            "author" | "article:author" => &mut self.author,
            "article:published_time" | "date" => &mut self.published,
            "article:modified_time" | "og:updated_time" => &mut self.modified,
            "robots" | "googlebot" => {
                self.robots_tokens.extend(content.split(',').map(|t| t.trim().to_ascii_lowercase()));
                return;
            }
            _ => return,
        };
        if slot.is_none() {
            *slot = Some(content);
        }
    }

    fn json_ld_block(&mut self, raw: &str) {
        match serde_json::from_str::<serde_json::Value>(raw.trim()) {
            Ok(v) => flatten_json_ld(v, &mut self.json_ld),
            Err(e) => {
                debug!(error = %e, "unparsable JSON-LD block");
                self.json_ld_errors += 1;
            }
        }
    }

    fn flush_block(&mut self) {
        let kind = self.current_kind();
        let text = text::normalize_ws(&std::mem::take(&mut self.block_buf));
        let in_main = std::mem::take(&mut self.block_in_main);
        if !text.is_empty() {
            self.blocks.push(Block { text, kind, in_main });
        }
    }

    fn finish_heading(&mut self) {
        if let Some((level, t)) = self.heading_buf.take() {
            let t = text::normalize_ws(&t);
            if !t.is_empty() {
                self.headings.push(Heading { level, text: t });
            }
        }
    }

    fn finish_link(&mut self) {
        let Some(cap) = self.link_buf.take() else { return };
        let lower = cap.href.to_ascii_lowercase();
        if cap.href.is_empty()
            || cap.href.starts_with('#')
            || ["javascript:", "mailto:", "tel:", "data:"].iter().any(|p| lower.starts_with(p))
        {
            return;
        }
        let text = text::normalize_ws(&cap.text);
        let words = text::word_count(&text);
        if cap.in_content {
            self.link_words_all += words;
            if cap.in_main {
                self.link_words_main += words;
            }
        }

        let (href, internal) = match self.resolve(&cap.href) {
            Some(u) => {
                let internal = self.base.as_ref().is_some_and(|b| same_site(b, &u));
                (u.to_string(), internal)
            }
            None => (cap.href.clone(), self.base.is_none() && !cap.href.contains("://")),
        };
        if internal {
            self.internal_links += 1;
        } else {
            self.external_links += 1;
        }
        if self.links.len() < MAX_LINKS {
            self.links.push(PageLink { href, text, internal, nofollow: cap.nofollow });
        }
    }

    fn resolve(&self, href: &str) -> Option<Url> {
        match &self.base {
            Some(b) => b.join(href).ok(),
            None => Url::parse(href).ok(),
        }
    }

    fn into_extract(self, status: u16, headers: &BTreeMap<String, String>, final_url: &str) -> PageExtract {
        let use_main = self.saw_main && self.blocks.iter().any(|b| b.in_main);
        let chosen: Vec<&Block> = self.blocks.iter().filter(|b| !use_main || b.in_main).collect();

        let main_text = chosen.iter().map(|b| b.text.as_str()).collect::<Vec<_>>().join("\n");
        let word_count = text::word_count(&main_text);
        let link_words = if use_main { self.link_words_main } else { self.link_words_all };
        let link_density = if word_count == 0 { 0.0 } else { (link_words as f64 / word_count as f64).min(1.0) };

        let top_blocks: Vec<String> = chosen
            .iter()
            .filter(|b| !matches!(b.kind, BlockKind::Heading(_)))
            .take(MAX_TOP_BLOCKS)
            .map(|b| b.text.clone())
            .collect();

        let sections = build_sections(&chosen);

        let prose: Vec<String> = chosen
            .iter()
            .filter(|b| matches!(b.kind, BlockKind::Paragraph | BlockKind::Other))
            .flat_map(|b| text::split_sentences(&b.text))
            .collect();
        let sentence_stats = text::sentence_stats(&prose);

        let mut schema_types: Vec<String> = self.json_ld.iter().flat_map(schema_types_of).collect();
        schema_types.sort();
        schema_types.dedup();

        let headers: BTreeMap<String, String> =
            headers.iter().filter(|(k, _)| k.as_str() != "set-cookie").map(|(k, v)| (k.clone(), v.clone())).collect();

        PageExtract {
            status_code: status,
            final_url: final_url.to_string(),
            content_type: headers.get("content-type").cloned(),
            headers,
            truncated: false,
            title: self.title,
            meta_description: self.meta_description,
            canonical_url: self.canonical,
            lang: self.lang,
            og_title: self.og_title,
            og_description: self.og_description,
            author: self.author,
            published_time: self.published,
            modified_time: self.modified,
            question_heading_count: self.headings.iter().filter(|h| h.is_question()).count(),
            heading_tree: build_heading_tree(&self.headings),
            headings: self.headings,
            top_blocks,
            sections,
            main_text,
            word_count,
            list_count: self.list_count,
            table_count: self.table_count,
            image_count: self.image_count,
            images_missing_alt: self.images_missing_alt,
            internal_link_count: self.internal_links,
            external_link_count: self.external_links,
            links: self.links,
            link_density,
            json_ld: self.json_ld,
            schema_types,
            json_ld_errors: self.json_ld_errors,
            robots: robots_directives(self.robots_tokens),
            sentence_stats,
        }
    }
}

fn own_kind(name: &str) -> Option<BlockKind> {
    match name {
        "li" | "dd" | "dt" => Some(BlockKind::ListItem),
        "p" | "blockquote" | "pre" | "figcaption" | "td" | "th" => Some(BlockKind::Paragraph),
        n => heading_level(n).map(BlockKind::Heading),
    }
}

fn heading_level(name: &str) -> Option<u8> {
    match name.as_bytes() {
        [b'h', d @ b'1'..=b'6'] => Some(d - b'0'),
        _ => None,
    }
}

fn same_site(a: &Url, b: &Url) -> bool {
    fn host(u: &Url) -> Option<String> {
        u.host_str().map(|h| h.trim_start_matches("www.").to_ascii_lowercase())
    }
    host(a).is_some() && host(a) == host(b)
}

fn build_sections(blocks: &[&Block]) -> Vec<Section> {
    let mut out: Vec<Section> = Vec::new();
    for b in blocks {
        match b.kind {
            BlockKind::Heading(level) => {
                if out.len() >= MAX_SECTIONS {
                    break;
                }
                out.push(Section { heading: Some(b.text.clone()), level, text: String::new() });
            }
            _ => {
                if out.is_empty() {
                    out.push(Section { heading: None, level: 0, text: String::new() });
                }
                if let Some(cur) = out.last_mut() {
                    if !cur.text.is_empty() {
                        cur.text.push(' ');
                    }
                    cur.text.push_str(&b.text);
                }
            }
        }
    }
    out
}

/// Nest a flat heading list by level. A heading adopts every following
/// heading with a deeper level until one at its own level or shallower.
pub fn build_heading_tree(headings: &[Heading]) -> Vec<HeadingNode> {
    fn build(headings: &[Heading], i: &mut usize, parent_level: u8) -> Vec<HeadingNode> {
        let mut out = Vec::new();
        while *i < headings.len() && headings[*i].level > parent_level {
            let h = &headings[*i];
            *i += 1;
            let children = build(headings, i, h.level);
            out.push(HeadingNode { level: h.level, text: h.text.clone(), children });
        }
        out
    }
    build(headings, &mut 0, 0)
}

fn flatten_json_ld(v: serde_json::Value, out: &mut Vec<serde_json::Value>) {
    match v {
        serde_json::Value::Array(items) => items.into_iter().for_each(|i| flatten_json_ld(i, out)),
        serde_json::Value::Object(mut map) => {
            if let Some(graph) = map.remove("@graph") {
                flatten_json_ld(graph, out);
                if map.keys().any(|k| k != "@context") {
                    out.push(serde_json::Value::Object(map));
                }
            } else {
                out.push(serde_json::Value::Object(map));
            }
        }
        _ => {}
    }
}

fn schema_types_of(v: &serde_json::Value) -> Vec<String> {
    match v.get("@type") {
        Some(serde_json::Value::String(s)) => vec![s.clone()],
        Some(serde_json::Value::Array(a)) => a.iter().filter_map(|t| t.as_str().map(str::to_string)).collect(),
        _ => Vec::new(),
    }
}

const BOT_SCOPED_KEYS: &[&str] = &["max-snippet", "max-image-preview", "max-video-preview", "unavailable_after"];

fn robots_header_tokens(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|part| {
            let part = part.trim().to_ascii_lowercase();
            // "googlebot: noindex" scopes a directive to one crawler.
            match part.split_once(':') {
                Some((k, v)) if !BOT_SCOPED_KEYS.contains(&k.trim()) => v.trim().to_string(),
                _ => part,
            }
        })
        .filter(|t| !t.is_empty())
        .collect()
}

fn robots_directives(mut tokens: Vec<String>) -> RobotsDirectives {
    tokens.sort();
    tokens.dedup();
    let mut r = RobotsDirectives::default();
    for t in &tokens {
        match t.as_str() {
            "noindex" => r.noindex = true,
            "nofollow" => r.nofollow = true,
            "none" => {
                r.noindex = true;
                r.nofollow = true;
            }
            "noarchive" => r.noarchive = true,
            "nosnippet" => r.nosnippet = true,
            other => {
                if let Some(n) = other.strip_prefix("max-snippet:").and_then(|n| n.trim().parse::<i64>().ok()) {
                    r.max_snippet = Some(n);
                }
            }
        }
    }
    r.tokens = tokens;
    r
}
