use aeo_core::PageExtract;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Module {
    Crawlability,
    Metadata,
    Structure,
    Content,
    StructuredData,
}

impl Module {
    pub const ALL: [Module; 5] =
        [Module::Crawlability, Module::Metadata, Module::Structure, Module::Content, Module::StructuredData];

    pub const fn as_str(self) -> &'static str {
        match self {
            Module::Crawlability => "crawlability",
            Module::Metadata => "metadata",
            Module::Structure => "structure",
            Module::Content => "content",
            Module::StructuredData => "structured_data",
        }
    }

    /// Share of the overall score.
    pub const fn weight(self) -> f64 {
        match self {
            Module::Crawlability => 0.20,
            Module::Metadata => 0.20,
            Module::Structure => 0.20,
            Module::Content => 0.25,
            Module::StructuredData => 0.15,
        }
    }
}

pub struct Check {
    pub score: f64,
    pub message: String,
    pub recommendation: Option<String>,
}

fn pass(message: impl Into<String>) -> Check {
    Check { score: 1.0, message: message.into(), recommendation: None }
}

fn partial(score: f64, message: impl Into<String>, rec: impl Into<String>) -> Check {
    Check { score, message: message.into(), recommendation: Some(rec.into()) }
}

fn fail(message: impl Into<String>, rec: impl Into<String>) -> Check {
    Check { score: 0.0, message: message.into(), recommendation: Some(rec.into()) }
}

pub struct Rule {
    pub id: &'static str,
    pub module: Module,
    pub weight: f64,
    pub check: fn(&PageExtract) -> Check,
}

pub const RULES: &[Rule] = &[
    Rule { id: "http_status_ok", module: Module::Crawlability, weight: 3.0, check: http_status_ok },
    Rule { id: "indexable", module: Module::Crawlability, weight: 3.0, check: indexable },
    Rule { id: "snippet_allowed", module: Module::Crawlability, weight: 1.0, check: snippet_allowed },
    Rule { id: "html_content_type", module: Module::Crawlability, weight: 1.0, check: html_content_type },
    Rule { id: "title_length", module: Module::Metadata, weight: 2.0, check: title_length },
    Rule { id: "meta_description_length", module: Module::Metadata, weight: 2.0, check: meta_description_length },
    Rule { id: "canonical_present", module: Module::Metadata, weight: 1.0, check: canonical_present },
    Rule { id: "lang_declared", module: Module::Metadata, weight: 1.0, check: lang_declared },
    Rule { id: "single_h1", module: Module::Structure, weight: 2.0, check: single_h1 },
    Rule { id: "heading_hierarchy", module: Module::Structure, weight: 1.0, check: heading_hierarchy },
    Rule { id: "question_headings", module: Module::Structure, weight: 2.0, check: question_headings },
    Rule { id: "lists_or_tables", module: Module::Structure, weight: 1.0, check: lists_or_tables },
    Rule { id: "word_count", module: Module::Content, weight: 3.0, check: word_count },
    Rule { id: "sentence_length", module: Module::Content, weight: 2.0, check: sentence_length },
    Rule { id: "long_sentences", module: Module::Content, weight: 1.0, check: long_sentences },
    Rule { id: "answer_first", module: Module::Content, weight: 2.0, check: answer_first },
    Rule { id: "link_density", module: Module::Content, weight: 1.0, check: link_density },
    Rule { id: "image_alt_text", module: Module::Content, weight: 1.0, check: image_alt_text },
    Rule { id: "json_ld_present", module: Module::StructuredData, weight: 2.0, check: json_ld_present },
    Rule { id: "json_ld_valid", module: Module::StructuredData, weight: 1.0, check: json_ld_valid },
    Rule { id: "faq_or_howto_schema", module: Module::StructuredData, weight: 2.0, check: faq_or_howto_schema },
    Rule { id: "authorship_signals", module: Module::StructuredData, weight: 1.0, check: authorship_signals },
];

// crawlability

fn http_status_ok(e: &PageExtract) -> Check {
    match e.status_code {
        200..=299 => pass(format!("responded {}", e.status_code)),
        300..=399 => partial(0.5, format!("responded {} (redirect not followed)", e.status_code), "Link to the final URL directly."),
        s => fail(format!("responded {s}"), "Serve the page with a 2xx status."),
    }
}

fn indexable(e: &PageExtract) -> Check {
    if e.robots.noindex {
        fail("robots directives block indexing", "Remove noindex from the robots meta tag and X-Robots-Tag header.")
    } else {
        pass("page is indexable")
    }
}

fn snippet_allowed(e: &PageExtract) -> Check {
    if e.robots.nosnippet {
        return fail("nosnippet prevents quoting", "Drop nosnippet so answer engines can quote the page.");
    }
    match e.robots.max_snippet {
        Some(0) => fail("max-snippet:0 prevents quoting", "Raise max-snippet or set it to -1."),
        Some(n) if n > 0 && n < 50 => {
            partial(0.5, format!("max-snippet:{n} limits quotes"), "Allow at least 50 characters per snippet.")
        }
        _ => pass("snippets allowed"),
    }
}

fn html_content_type(e: &PageExtract) -> Check {
    match e.content_type.as_deref().map(str::to_ascii_lowercase) {
        Some(ct) if ct.contains("text/html") || ct.contains("xhtml") => pass("served as HTML"),
        Some(ct) => fail(format!("served as {ct}"), "Serve the page as text/html."),
        None => partial(0.5, "no content-type header", "Send Content-Type: text/html."),
    }
}

// metadata

fn title_length(e: &PageExtract) -> Check {
    let Some(title) = e.title.as_deref() else {
        return fail("no <title>", "Add a descriptive title of 30-65 characters.");
    };
    let n = title.chars().count();
    match n {
        30..=65 => pass(format!("title is {n} characters")),
        10..=29 | 66..=90 => partial(0.6, format!("title is {n} characters"), "Aim for a title of 30-65 characters."),
        _ => partial(0.3, format!("title is {n} characters"), "Aim for a title of 30-65 characters."),
    }
}

fn meta_description_length(e: &PageExtract) -> Check {
    let Some(desc) = e.meta_description.as_deref() else {
        return fail("no meta description", "Add a meta description of 70-160 characters that answers the page's main question.");
    };
    let n = desc.chars().count();
    match n {
        70..=160 => pass(format!("description is {n} characters")),
        40..=69 | 161..=200 => {
            partial(0.6, format!("description is {n} characters"), "Aim for 70-160 characters.")
        }
        _ => partial(0.3, format!("description is {n} characters"), "Aim for 70-160 characters."),
    }
}

fn canonical_present(e: &PageExtract) -> Check {
    match &e.canonical_url {
        Some(c) => pass(format!("canonical is {c}")),
        None => fail("no canonical link", "Add <link rel=\"canonical\"> pointing at the preferred URL."),
    }
}

fn lang_declared(e: &PageExtract) -> Check {
    match &e.lang {
        Some(l) => pass(format!("lang=\"{l}\"")),
        None => fail("no lang attribute", "Declare the page language on <html lang>."),
    }
}

// structure

fn single_h1(e: &PageExtract) -> Check {
    match e.h1_count() {
        1 => pass("exactly one h1"),
        0 => fail("no h1", "Add one h1 stating the page's topic."),
        n => partial(0.5, format!("{n} h1 headings"), "Keep a single h1 and demote the rest."),
    }
}

fn heading_hierarchy(e: &PageExtract) -> Check {
    if e.headings.is_empty() {
        return fail("no headings", "Structure the page with h1-h3 headings.");
    }
    let skips = e.headings.windows(2).filter(|w| w[1].level > w[0].level + 1).count();
    if skips == 0 {
        pass("heading levels are nested without gaps")
    } else {
        let score = (1.0 - skips as f64 / e.headings.len() as f64).max(0.2);
        partial(score, format!("{skips} skipped heading levels"), "Do not jump heading levels (e.g. h2 to h4).")
    }
}

fn question_headings(e: &PageExtract) -> Check {
    match e.question_heading_count {
        0 => fail("no headings phrased as questions", "Phrase key headings as the questions readers ask."),
        1 => partial(0.5, "one question heading", "Add more question-style headings for common queries."),
        n => pass(format!("{n} question headings")),
    }
}

fn lists_or_tables(e: &PageExtract) -> Check {
    if e.list_count + e.table_count > 0 {
        pass(format!("{} lists, {} tables", e.list_count, e.table_count))
    } else {
        fail("no lists or tables", "Present steps, options or comparisons as lists or tables.")
    }
}

// content

fn word_count(e: &PageExtract) -> Check {
    let n = e.word_count;
    let msg = format!("{n} words of main content");
    match n {
        0 => fail("no readable text", "Render the main content as HTML text."),
        600..=usize::MAX => pass(msg),
        300..=599 => partial(0.75, msg, "Expand coverage to at least 600 words."),
        150..=299 => partial(0.4, msg, "Expand coverage to at least 600 words."),
        _ => partial(0.15, msg, "The page is thin; expand coverage to at least 600 words."),
    }
}

fn sentence_length(e: &PageExtract) -> Check {
    let st = &e.sentence_stats;
    if st.count == 0 {
        return fail("no sentences found", "Write the answer in full sentences.");
    }
    let avg = st.avg_words;
    let msg = format!("average sentence is {avg:.1} words");
    if (10.0..=22.0).contains(&avg) {
        pass(msg)
    } else if (6.0..10.0).contains(&avg) || (22.0..=28.0).contains(&avg) {
        partial(0.5, msg, "Keep sentences around 10-22 words.")
    } else {
        partial(0.2, msg, "Keep sentences around 10-22 words.")
    }
}

fn long_sentences(e: &PageExtract) -> Check {
    let st = &e.sentence_stats;
    if st.count == 0 {
        return fail("no sentences found", "Write the answer in full sentences.");
    }
    let pct = st.long_ratio * 100.0;
    let msg = format!("{pct:.0}% of sentences exceed 25 words");
    if st.long_ratio <= 0.15 {
        pass(msg)
    } else if st.long_ratio <= 0.30 {
        partial(0.5, msg, "Split long sentences; answer engines quote short ones.")
    } else {
        fail(msg, "Split long sentences; answer engines quote short ones.")
    }
}

fn answer_first(e: &PageExtract) -> Check {
    let Some(first) = e.top_blocks.first() else {
        return fail("no opening paragraph", "Open with a short paragraph that answers the main question.");
    };
    let n = first.split_whitespace().count();
    match n {
        8..=60 => pass(format!("opening paragraph is {n} words")),
        61..=120 => partial(0.5, format!("opening paragraph is {n} words"), "Tighten the opening answer to under 60 words."),
        _ => partial(0.3, format!("opening paragraph is {n} words"), "Open with a 1-3 sentence direct answer."),
    }
}

fn link_density(e: &PageExtract) -> Check {
    if e.word_count == 0 {
        return fail("no text to measure", "Render the main content as HTML text.");
    }
    let d = e.link_density;
    let msg = format!("{:.0}% of words are links", d * 100.0);
    if d <= 0.25 {
        pass(msg)
    } else if d <= 0.5 {
        partial(0.5, msg, "Reduce link-heavy passages in the main content.")
    } else {
        fail(msg, "Main content is mostly links; add explanatory text.")
    }
}

fn image_alt_text(e: &PageExtract) -> Check {
    if e.image_count == 0 || e.images_missing_alt == 0 {
        return pass(format!("{} images, none missing alt", e.image_count));
    }
    let msg = format!("{} of {} images missing alt", e.images_missing_alt, e.image_count);
    let score = 1.0 - e.images_missing_alt as f64 / e.image_count as f64;
    if score <= 0.0 {
        fail(msg, "Describe every image with alt text.")
    } else {
        partial(score, msg, "Describe every image with alt text.")
    }
}

// structured data

fn json_ld_present(e: &PageExtract) -> Check {
    if e.json_ld.is_empty() {
        fail("no JSON-LD", "Describe the page with schema.org JSON-LD.")
    } else {
        pass(format!("{} JSON-LD entities ({})", e.json_ld.len(), e.schema_types.join(", ")))
    }
}

fn json_ld_valid(e: &PageExtract) -> Check {
    match (e.json_ld_errors, e.json_ld.len()) {
        (0, _) => pass("all JSON-LD blocks parse"),
        (errs, 0) => fail(format!("{errs} JSON-LD blocks fail to parse"), "Fix the JSON syntax of ld+json scripts."),
        (errs, _) => partial(0.5, format!("{errs} JSON-LD blocks fail to parse"), "Fix the JSON syntax of ld+json scripts."),
    }
}

fn faq_or_howto_schema(e: &PageExtract) -> Check {
    if ["FAQPage", "HowTo", "QAPage"].iter().any(|t| e.has_schema_type(t)) {
        pass("question/answer schema present")
    } else if e.question_heading_count > 0 {
        partial(0.3, "questions on page without FAQ schema", "Mark up question headings with FAQPage schema.")
    } else {
        fail("no FAQ or HowTo schema", "Add FAQPage or HowTo markup for question-led content.")
    }
}

fn json_ld_has(e: &PageExtract, key: &str) -> bool {
    e.json_ld.iter().any(|v| v.get(key).is_some_and(|x| !x.is_null()))
}

fn authorship_signals(e: &PageExtract) -> Check {
    let author = e.author.is_some() || json_ld_has(e, "author");
    let published = e.published_time.is_some() || json_ld_has(e, "datePublished");
    let modified = e.modified_time.is_some() || json_ld_has(e, "dateModified");
    let found = [author, published, modified].iter().filter(|&&b| b).count();
    let msg = format!("author: {author}, published: {published}, modified: {modified}");
    match found {
        3 => pass(msg),
        0 => fail(msg, "Expose author and publish/update dates in meta tags or JSON-LD."),
        n => partial(n as f64 / 3.0, msg, "Expose author and publish/update dates in meta tags or JSON-LD."),
    }
}
