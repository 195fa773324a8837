//! Rule-based quality score for a page extract.
//!
//! Every rule scores in `[0, 1]`. A module's score is the weighted mean of
//! its rules scaled to 0-100; the overall score is the weighted mean of the
//! module scores.

pub mod rules;

use aeo_core::{PageExtract, RuleResult, ScoreReport, Verdict};
use rules::{Module, RULES};
use std::collections::BTreeMap;
use tracing::debug;

pub fn score_extraction(extract: &PageExtract) -> ScoreReport {
    let rule_results: Vec<RuleResult> = RULES
        .iter()
        .map(|rule| {
            let check = (rule.check)(extract);
            let score = check.score.clamp(0.0, 1.0);
            RuleResult {
                id: rule.id.to_string(),
                module: rule.module.as_str().to_string(),
                verdict: Verdict::from_score(score),
                score,
                weight: rule.weight,
                message: check.message,
                recommendation: check.recommendation,
            }
        })
        .collect();

    let mut module_scores = BTreeMap::new();
    let mut weighted = 0.0;
    let mut total_weight = 0.0;
    for module in Module::ALL {
        let Some(score) = module_score(&rule_results, module) else { continue };
        module_scores.insert(module.as_str().to_string(), to_percent(score));
        weighted += module.weight() * score;
        total_weight += module.weight();
    }
    let overall_score = if total_weight > 0.0 { to_percent(weighted / total_weight) } else { 0 };

    debug!(url = %extract.final_url, overall_score, "scored page");
    ScoreReport { overall_score, module_scores, rule_results }
}

fn module_score(results: &[RuleResult], module: Module) -> Option<f64> {
    let (sum, weight) = results
        .iter()
        .filter(|r| r.module == module.as_str())
        .fold((0.0, 0.0), |(s, w), r| (s + r.score * r.weight, w + r.weight));
    (weight > 0.0).then(|| sum / weight)
}

fn to_percent(fraction: f64) -> u8 {
    (fraction * 100.0).round().clamp(0.0, 100.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use aeo_core::{Heading, RobotsDirectives, SentenceStats};
    use std::collections::HashSet;

    fn strong_page() -> PageExtract {
        PageExtract {
            status_code: 200,
            final_url: "https://example.com/aeo".into(),
            content_type: Some("text/html; charset=utf-8".into()),
            title: Some("What is answer engine optimization? A guide".into()),
            meta_description: Some(
                "Answer engine optimization shapes pages so assistants can find, trust and quote them directly."
                    .into(),
            ),
            canonical_url: Some("https://example.com/aeo".into()),
            lang: Some("en".into()),
            author: Some("Dana".into()),
            published_time: Some("2026-01-01".into()),
            modified_time: Some("2026-02-01".into()),
            headings: vec![
                Heading { level: 1, text: "What is AEO?".into() },
                Heading { level: 2, text: "Why does AEO matter?".into() },
                Heading { level: 3, text: "How do I start?".into() },
            ],
            question_heading_count: 3,
            top_blocks: vec!["AEO is the practice of writing pages that answer engines can quote directly.".into()],
            word_count: 900,
            list_count: 2,
            table_count: 1,
            image_count: 2,
            internal_link_count: 8,
            external_link_count: 2,
            link_density: 0.08,
            json_ld: vec![serde_json::json!({"@type": "FAQPage"})],
            schema_types: vec!["FAQPage".into()],
            sentence_stats: SentenceStats { count: 50, avg_words: 15.0, median_words: 14.0, max_words: 30, long_ratio: 0.05 },
            ..PageExtract::default()
        }
    }

    fn result<'a>(r: &'a ScoreReport, id: &str) -> &'a RuleResult {
        r.rule_results.iter().find(|x| x.id == id).unwrap()
    }

    #[test]
    fn rule_ids_are_unique() {
        let ids: HashSet<&str> = RULES.iter().map(|r| r.id).collect();
        assert_eq!(ids.len(), RULES.len());
    }

    #[test]
    fn strong_page_scores_full_marks() {
        let r = score_extraction(&strong_page());
        assert_eq!(r.overall_score, 100);
        assert_eq!(r.module_scores.len(), 5);
        assert!(r.rule_results.iter().all(|x| x.verdict == Verdict::Pass), "{:?}", r.rule_results);
    }

    #[test]
    fn empty_page_scores_low_but_bounded() {
        let r = score_extraction(&PageExtract::default());
        assert!(r.overall_score < 30, "got {}", r.overall_score);
        assert_eq!(r.rule_results.len(), RULES.len());
        assert!(r.rule_results.iter().all(|x| (0.0..=1.0).contains(&x.score)));
    }

    #[test]
    fn noindex_fails_indexable_and_lowers_crawlability() {
        let mut page = strong_page();
        page.robots = RobotsDirectives { noindex: true, ..RobotsDirectives::default() };
        let r = score_extraction(&page);
        assert_eq!(result(&r, "indexable").verdict, Verdict::Fail);
        assert!(result(&r, "indexable").recommendation.is_some());
        assert_eq!(r.module_scores["crawlability"], 63);
        assert!(r.overall_score < 100);
    }

    #[test]
    fn multiple_h1_is_partial() {
        let mut page = strong_page();
        page.headings.push(Heading { level: 1, text: "Another".into() });
        let r = score_extraction(&page);
        let h1 = result(&r, "single_h1");
        assert_eq!(h1.verdict, Verdict::Partial);
        assert_eq!(h1.score, 0.5);
    }

    #[test]
    fn skipped_heading_levels_are_penalised() {
        let mut page = strong_page();
        page.headings = vec![
            Heading { level: 1, text: "A".into() },
            Heading { level: 4, text: "B".into() },
        ];
        let r = score_extraction(&page);
        assert_eq!(result(&r, "heading_hierarchy").score, 0.5);
    }

    #[test]
    fn questions_without_faq_schema_get_partial_credit() {
        let mut page = strong_page();
        page.schema_types = vec!["Article".into()];
        let r = score_extraction(&page);
        assert_eq!(result(&r, "faq_or_howto_schema").verdict, Verdict::Partial);
    }
}
