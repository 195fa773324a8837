//! How well a page answers a free-text query, plus a draft answer and FAQ
//! suggestions built from the page's own sentences.

use aeo_core::{Faq, FaqSource, PageExtract, QueryAnalysis};
use page_extract::text::{normalize_ws, split_sentences, terms};
use std::collections::HashSet;
use tracing::debug;

pub const MAX_FAQS: usize = 5;
pub const MAX_DRAFT_WORDS: usize = 80;
const MAX_DRAFT_SENTENCES: usize = 3;
const MAX_FAQ_ANSWER_WORDS: usize = 60;

const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "can", "do", "does", "for", "from", "how", "i",
    "in", "is", "it", "my", "of", "on", "or", "s", "should", "that", "the", "to", "what", "when",
    "where", "which", "who", "why", "will", "with", "you", "your",
];

const QUESTION_WORDS: &[&str] = &[
    "what", "how", "why", "when", "where", "who", "which", "can", "does", "do", "is", "are", "should",
];

/// `None` when no query was given or it is blank.
pub fn analyze_query(query: Option<&str>, extract: &PageExtract) -> Option<QueryAnalysis> {
    let query = query.map(str::trim).filter(|q| !q.is_empty())?;
    let qterms = query_terms(query);
    let sentences = page_sentences(extract);

    if qterms.is_empty() {
        return Some(QueryAnalysis {
            query_fit_score: 0,
            answer_draft: fallback_draft(extract),
            suggested_faqs: Vec::new(),
        });
    }

    let title: HashSet<String> = extract.title.as_deref().map(terms).unwrap_or_default().into_iter().collect();
    let headings: HashSet<String> = extract.headings.iter().flat_map(|h| terms(&h.text)).collect();
    let body: HashSet<String> = terms(&extract.main_text).into_iter().collect();

    let ranked = rank_sentences(&sentences, &qterms);
    let best = ranked.first().map_or(0.0, |&(_, hits)| hits as f64 / qterms.len() as f64);

    let fit = 20.0 * coverage(&qterms, &title)
        + 25.0 * coverage(&qterms, &headings)
        + 35.0 * coverage(&qterms, &body)
        + 20.0 * best;
    let query_fit_score = fit.round().clamp(0.0, 100.0) as u8;

    let answer_draft = draft_answer(&sentences, &ranked).unwrap_or_else(|| fallback_draft(extract));
    let suggested_faqs = suggest_faqs(query, &qterms, extract, &sentences, &ranked);

    debug!(query, query_fit_score, faqs = suggested_faqs.len(), "analyzed query");
    Some(QueryAnalysis { query_fit_score, answer_draft, suggested_faqs })
}

fn query_terms(query: &str) -> Vec<String> {
    let all = terms(query);
    let mut seen = HashSet::new();
    let content: Vec<String> =
        all.iter().filter(|t| !STOPWORDS.contains(&t.as_str())).filter(|t| seen.insert((*t).clone())).cloned().collect();
    if !content.is_empty() {
        return content;
    }
    // Only stopwords: score on whatever was typed.
    let mut seen = HashSet::new();
    all.into_iter().filter(|t| seen.insert(t.clone())).collect()
}

fn coverage(qterms: &[String], haystack: &HashSet<String>) -> f64 {
    let found = qterms.iter().filter(|t| haystack.contains(*t)).count();
    found as f64 / qterms.len() as f64
}

fn page_sentences(extract: &PageExtract) -> Vec<String> {
    let from_sections: Vec<String> = extract.sections.iter().flat_map(|s| split_sentences(&s.text)).collect();
    if from_sections.is_empty() {
        split_sentences(&extract.main_text)
    } else {
        from_sections
    }
}

/// Sentence indexes with at least one query term, best first; ties keep
/// document order.
fn rank_sentences(sentences: &[String], qterms: &[String]) -> Vec<(usize, usize)> {
    let mut ranked: Vec<(usize, usize)> = sentences
        .iter()
        .enumerate()
        .map(|(i, s)| {
            let st: HashSet<String> = terms(s).into_iter().collect();
            (i, qterms.iter().filter(|t| st.contains(*t)).count())
        })
        .filter(|&(_, hits)| hits > 0)
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    ranked
}

fn draft_answer(sentences: &[String], ranked: &[(usize, usize)]) -> Option<String> {
    if ranked.is_empty() {
        return None;
    }
    let mut picked: Vec<usize> = ranked.iter().take(MAX_DRAFT_SENTENCES).map(|&(i, _)| i).collect();
    picked.sort_unstable();
    let joined = picked.iter().map(|&i| sentences[i].as_str()).collect::<Vec<_>>().join(" ");
    Some(truncate_words(&joined, MAX_DRAFT_WORDS))
}

fn fallback_draft(extract: &PageExtract) -> String {
    extract
        .meta_description
        .clone()
        .or_else(|| extract.top_blocks.first().cloned())
        .map(|s| truncate_words(&s, MAX_DRAFT_WORDS))
        .unwrap_or_default()
}

fn truncate_words(s: &str, max: usize) -> String {
    let words: Vec<&str> = s.split_whitespace().collect();
    if words.len() <= max {
        words.join(" ")
    } else {
        format!("{}\u{2026}", words[..max].join(" "))
    }
}

fn is_question(query: &str) -> bool {
    query.trim_end().ends_with('?')
        || terms(query).first().is_some_and(|w| QUESTION_WORDS.contains(&w.as_str()))
}

fn as_question(s: &str) -> String {
    let s = normalize_ws(s.trim().trim_end_matches('?'));
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => format!("{}{}?", first.to_uppercase(), chars.as_str()),
        None => String::new(),
    }
}

fn suggest_faqs(
    query: &str,
    qterms: &[String],
    extract: &PageExtract,
    sentences: &[String],
    ranked: &[(usize, usize)],
) -> Vec<Faq> {
    let mut out: Vec<Faq> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    let mut push = |out: &mut Vec<Faq>, faq: Faq| {
        if out.len() < MAX_FAQS && seen.insert(faq.question.to_lowercase()) {
            out.push(faq);
        }
    };

    let qset: HashSet<&str> = qterms.iter().map(String::as_str).collect();
    for h in extract.headings.iter().filter(|h| h.is_question()) {
        if !terms(&h.text).iter().any(|t| qset.contains(t.as_str())) {
            continue;
        }
        let answer = extract
            .sections
            .iter()
            .find(|s| s.heading.as_deref() == Some(h.text.as_str()))
            .map(|s| split_sentences(&s.text).into_iter().take(2).collect::<Vec<_>>().join(" "))
            .filter(|a| !a.is_empty())
            .map(|a| truncate_words(&a, MAX_FAQ_ANSWER_WORDS));
        push(&mut out, Faq { question: h.text.clone(), answer, source: FaqSource::Page });
    }

    // A question query is already its own template.
    let templates = if is_question(query) {
        vec![as_question(query)]
    } else {
        let topic = normalize_ws(query);
        vec![format!("What is {topic}?"), format!("How does {topic} work?"), format!("Why does {topic} matter?")]
    };

    let mut answers = ranked.iter().map(|&(i, _)| truncate_words(&sentences[i], MAX_FAQ_ANSWER_WORDS));
    for question in templates {
        push(&mut out, Faq { question, answer: answers.next(), source: FaqSource::Template });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    const PAGE: &str = r#"<html lang="en"><head>
<title>Answer engine optimization guide</title>
<meta name="description" content="A short guide to answer engine optimization.">
</head><body><main>
<h1>Answer engine optimization</h1>
<p>Answer engine optimization helps assistants quote your pages. It focuses on direct answers.</p>
<h2>How does answer engine optimization work?</h2>
<p>Engines extract concise passages from well structured pages. Clear headings make extraction easier.</p>
<h2>Who are we?</h2>
<p>We are a small studio in Lisbon. We like coffee.</p>
</main></body></html>"#;

    fn page() -> PageExtract {
        let mut headers = BTreeMap::new();
        headers.insert("content-type".to_string(), "text/html".to_string());
        page_extract::extract_content(200, &headers, PAGE.as_bytes(), "https://example.com/aeo")
    }

    #[test]
    fn no_query_means_no_analysis() {
        let e = page();
        assert!(analyze_query(None, &e).is_none());
        assert!(analyze_query(Some("   "), &e).is_none());
    }

    #[test]
    fn relevant_query_outscores_unrelated_one() {
        let e = page();
        let good = analyze_query(Some("answer engine optimization"), &e).unwrap();
        let bad = analyze_query(Some("mortgage refinancing rates"), &e).unwrap();
        assert_eq!(good.query_fit_score, 100);
        assert_eq!(bad.query_fit_score, 0);
    }

    #[test]
    fn draft_uses_best_matching_sentences_in_page_order() {
        let e = page();
        let a = analyze_query(Some("answer engine optimization"), &e).unwrap();
        assert!(a.answer_draft.starts_with("Answer engine optimization helps assistants quote your pages."));
        assert!(a.answer_draft.split_whitespace().count() <= MAX_DRAFT_WORDS + 1);
        assert!(!a.answer_draft.contains("Lisbon"));
    }

    #[test]
    fn unrelated_query_falls_back_to_meta_description() {
        let e = page();
        let a = analyze_query(Some("mortgage refinancing rates"), &e).unwrap();
        assert_eq!(a.answer_draft, "A short guide to answer engine optimization.");
        assert!(a.suggested_faqs.iter().all(|f| f.answer.is_none()));
    }

    #[test]
    fn faqs_prefer_relevant_page_questions() {
        let e = page();
        let a = analyze_query(Some("answer engine optimization"), &e).unwrap();
        let first = &a.suggested_faqs[0];
        assert_eq!(first.question, "How does answer engine optimization work?");
        assert_eq!(first.source, FaqSource::Page);
        assert!(first.answer.as_deref().unwrap().starts_with("Engines extract concise passages"));
        assert!(!a.suggested_faqs.iter().any(|f| f.question == "Who are we?"));
        assert!(a.suggested_faqs.len() <= MAX_FAQS);
        assert!(a.suggested_faqs.iter().any(|f| f.question == "What is answer engine optimization?"));
        // the page heading already covers the "how" template
        let how = a.suggested_faqs.iter().filter(|f| f.question.starts_with("How does")).count();
        assert_eq!(how, 1);
    }

    #[test]
    fn question_queries_lead_with_the_question() {
        let e = page();
        let a = analyze_query(Some("why use answer engines"), &e).unwrap();
        let templates: Vec<&str> =
            a.suggested_faqs.iter().filter(|f| f.source == FaqSource::Template).map(|f| f.question.as_str()).collect();
        assert_eq!(templates, vec!["Why use answer engines?"]);
        assert!(!a.suggested_faqs.iter().any(|f| f.question.starts_with("What is")));
    }

    #[test]
    fn stopword_only_query_still_scores() {
        let e = page();
        let a = analyze_query(Some("how to"), &e).unwrap();
        assert!(a.query_fit_score > 0);
    }

    #[test]
    fn punctuation_only_query_scores_zero() {
        let e = page();
        let a = analyze_query(Some("???"), &e).unwrap();
        assert_eq!(a.query_fit_score, 0);
        assert!(a.suggested_faqs.is_empty());
    }

    #[test]
    fn truncation_marks_cut_text() {
        let long = vec!["word"; 100].join(" ");
        let t = truncate_words(&long, 10);
        assert!(t.ends_with('\u{2026}'));
        assert_eq!(t.split_whitespace().count(), 10);
    }
}
