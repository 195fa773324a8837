//! Word and sentence helpers shared by extraction and query analysis.

use aeo_core::SentenceStats;

/// Sentences longer than this count as "long".
pub const LONG_SENTENCE_WORDS: usize = 25;

const ABBREVIATIONS: &[&str] = &["e.g", "i.e", "etc", "vs", "mr", "mrs", "ms", "dr", "st", "inc", "no", "fig"];

pub fn normalize_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Whitespace-separated tokens that carry at least one letter or digit.
pub fn word_count(s: &str) -> usize {
    s.split_whitespace().filter(|w| w.chars().any(char::is_alphanumeric)).count()
}

/// Lowercased alphanumeric terms, in order of appearance.
pub fn terms(s: &str) -> Vec<String> {
    s.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Split prose into sentences on `.`, `!` and `?` followed by whitespace.
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let chars: Vec<(usize, char)> = text.char_indices().collect();
    let mut start = 0usize;
    let mut i = 0usize;

    while i < chars.len() {
        let (_, c) = chars[i];
        if matches!(c, '.' | '!' | '?') {
            let mut j = i + 1;
            while j < chars.len() && matches!(chars[j].1, '.' | '!' | '?' | '"' | '\'' | ')' | '\u{201D}' | '\u{2019}') {
                j += 1;
            }
            let at_end = j >= chars.len();
            if at_end || chars[j].1.is_whitespace() {
                let end = if at_end { text.len() } else { chars[j].0 };
                let candidate = &text[start..end];
                if c != '.' || !ends_with_abbreviation(candidate) {
                    push_sentence(&mut out, candidate);
                    start = end;
                }
            }
            i = j;
            continue;
        }
        i += 1;
    }
    if start < text.len() {
        push_sentence(&mut out, &text[start..]);
    }
    out
}

fn push_sentence(out: &mut Vec<String>, s: &str) {
    let s = normalize_ws(s);
    if word_count(&s) > 0 {
        out.push(s);
    }
}

fn ends_with_abbreviation(candidate: &str) -> bool {
    let last = candidate.trim_end().trim_end_matches('.');
    let word = last.rsplit(char::is_whitespace).next().unwrap_or("").to_lowercase();
    ABBREVIATIONS.contains(&word.as_str())
}

pub fn sentence_stats(sentences: &[String]) -> SentenceStats {
    if sentences.is_empty() {
        return SentenceStats::default();
    }
    let mut lens: Vec<usize> = sentences.iter().map(|s| word_count(s)).collect();
    lens.sort_unstable();
    let count = lens.len();
    let total: usize = lens.iter().sum();
    let median = if count % 2 == 1 {
        lens[count / 2] as f64
    } else {
        (lens[count / 2 - 1] + lens[count / 2]) as f64 / 2.0
    };
    let long = lens.iter().filter(|&&n| n > LONG_SENTENCE_WORDS).count();
    SentenceStats {
        count,
        avg_words: total as f64 / count as f64,
        median_words: median,
        max_words: lens[count - 1],
        long_ratio: long as f64 / count as f64,
    }
}
