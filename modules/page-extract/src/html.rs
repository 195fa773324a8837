//! Lenient HTML tag scanner.
//!
//! Produces a flat token stream; no tree is built. Comments, doctype and
//! processing instructions are dropped. `script` and `style` bodies come
//! through as a single `Raw` token.

use regex::Regex;
use std::borrow::Cow;
use std::sync::OnceLock;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Start { name: String, attrs: Vec<(String, String)>, self_closing: bool },
    End { name: String },
    Text(String),
    Raw(String),
}

impl Token {
    pub fn attr<'a>(attrs: &'a [(String, String)], key: &str) -> Option<&'a str> {
        attrs.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }
}

const RAW_TEXT: &[&str] = &["script", "style"];

pub const VOID: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

pub fn tokenize(html: &str) -> Vec<Token> {
    let lower = html.to_ascii_lowercase();
    let bytes = html.as_bytes();
    let mut out = Vec::new();
    let mut pos = 0usize;

    while pos < html.len() {
        let Some(rel) = html[pos..].find('<') else {
            out.push(Token::Text(html[pos..].to_string()));
            break;
        };
        let lt = pos + rel;
        if lt > pos {
            out.push(Token::Text(html[pos..lt].to_string()));
        }
        let rest = &lower[lt..];

        if rest.starts_with("<!--") {
            pos = lower[lt + 4..].find("-->").map_or(html.len(), |i| lt + 4 + i + 3);
            continue;
        }
        if rest.starts_with("<!") || rest.starts_with("<?") {
            pos = html[lt..].find('>').map_or(html.len(), |i| lt + i + 1);
            continue;
        }
        if rest.starts_with("</") {
            let name = tag_name(&lower[lt + 2..]);
            if name.is_empty() {
                out.push(Token::Text("<".into()));
                pos = lt + 1;
                continue;
            }
            pos = html[lt..].find('>').map_or(html.len(), |i| lt + i + 1);
            out.push(Token::End { name: name.to_string() });
            continue;
        }
        if !bytes.get(lt + 1).is_some_and(|b| b.is_ascii_alphabetic()) {
            out.push(Token::Text("<".into()));
            pos = lt + 1;
            continue;
        }

        let name = tag_name(&lower[lt + 1..]).to_string();
        let Some(gt) = find_tag_end(bytes, lt + 1) else {
            // Unterminated tag: the rest of the document is garbage.
            break;
        };
        let inner = &html[lt + 1 + name.len()..gt];
        let self_closing = inner.trim_end().ends_with('/');
        let attrs = parse_attrs(inner);
        pos = gt + 1;

        let raw = RAW_TEXT.contains(&name.as_str()) && !self_closing;
        out.push(Token::Start { name: name.clone(), attrs, self_closing });

        if raw {
            let close = format!("</{name}");
            let end = lower[pos..].find(&close).map_or(html.len(), |i| pos + i);
            out.push(Token::Raw(html[pos..end].to_string()));
            out.push(Token::End { name });
            pos = html[end..].find('>').map_or(html.len(), |i| end + i + 1);
        }
    }
    out
}

fn tag_name(s: &str) -> &str {
    let end = s
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '-' || c == ':'))
        .unwrap_or(s.len());
    &s[..end]
}

fn find_tag_end(bytes: &[u8], from: usize) -> Option<usize> {
    let mut quote: Option<u8> = None;
    for (i, &b) in bytes.iter().enumerate().skip(from) {
        match quote {
            Some(q) if b == q => quote = None,
            Some(_) => {}
            None if b == b'"' || b == b'\'' => quote = Some(b),
            None if b == b'>' => return Some(i),
            None => {}
        }
    }
    None
}

fn attr_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"([^\s"'>/=]+)(?:\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'=<>`]+)))?"#)
            .expect("attribute pattern is valid")
    })
}

fn parse_attrs(inner: &str) -> Vec<(String, String)> {
    attr_re()
        .captures_iter(inner)
        .map(|c| {
            let key = c[1].to_ascii_lowercase();
            let val = c
                .get(2)
                .or_else(|| c.get(3))
                .or_else(|| c.get(4))
                .map(|m| decode_entities(m.as_str()).into_owned())
                .unwrap_or_default();
            (key, val)
        })
        .collect()
}

pub fn decode_entities(s: &str) -> Cow<'_, str> {
    if !s.contains('&') {
        return Cow::Borrowed(s);
    }
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let after = &rest[amp + 1..];
        let decoded = after
            .find(';')
            .filter(|&semi| semi > 0 && semi <= 10)
            .and_then(|semi| entity(&after[..semi]).map(|c| (c, semi)));
        match decoded {
            Some((c, semi)) => {
                out.push(c);
                rest = &after[semi + 1..];
            }
            None => {
                out.push('&');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    Cow::Owned(out)
}

fn entity(name: &str) -> Option<char> {
    if let Some(num) = name.strip_prefix('#') {
        let code = match num.strip_prefix(['x', 'X']) {
            Some(hex) => u32::from_str_radix(hex, 16).ok()?,
            None => num.parse::<u32>().ok()?,
        };
        return char::from_u32(code);
    }
    Some(match name {
        "amp" => '&',
        "lt" => '<',
        "gt" => '>',
        "quot" => '"',
        "apos" => '\'',
        "nbsp" => ' ',
        "ndash" => '\u{2013}',
        "mdash" => '\u{2014}',
        "hellip" => '\u{2026}',
        "lsquo" => '\u{2018}',
        "rsquo" => '\u{2019}',
        "ldquo" => '\u{201C}',
        "rdquo" => '\u{201D}',
        "copy" => '\u{00A9}',
        "reg" => '\u{00AE}',
        "trade" => '\u{2122}',
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn start(name: &str) -> Token {
        Token::Start { name: name.into(), attrs: vec![], self_closing: false }
    }

    #[test]
    fn scans_tags_text_and_skips_comments() {
        let toks = tokenize("<!DOCTYPE html><P>Hi <!-- x --> there</p>");
        assert_eq!(
            toks,
            vec![
                start("p"),
                Token::Text("Hi ".into()),
                Token::Text(" there".into()),
                Token::End { name: "p".into() },
            ]
        );
    }

    #[test]
    fn attributes_handle_quotes_case_and_bare_values() {
        let toks = tokenize(r#"<a HREF="/x?a=1&amp;b=2" rel='nofollow' data-x=y hidden>"#);
        let Token::Start { name, attrs, .. } = &toks[0] else { panic!("expected start tag") };
        assert_eq!(name, "a");
        assert_eq!(Token::attr(attrs, "href"), Some("/x?a=1&b=2"));
        assert_eq!(Token::attr(attrs, "rel"), Some("nofollow"));
        assert_eq!(Token::attr(attrs, "data-x"), Some("y"));
        assert_eq!(Token::attr(attrs, "hidden"), Some(""));
    }

    #[test]
    fn script_body_is_raw() {
        let toks = tokenize("<script>if (a < b) { x = '</p>'; }</script><p>t</p>");
        assert_eq!(toks[1], Token::Raw("if (a < b) { x = '</p>'; }".into()));
        assert_eq!(toks[2], Token::End { name: "script".into() });
        assert_eq!(toks[3], start("p"));
    }

    #[test]
    fn quoted_gt_does_not_end_tag() {
        let toks = tokenize(r#"<img alt="a > b" src=x.png/>"#);
        let Token::Start { attrs, self_closing, .. } = &toks[0] else { panic!("expected start tag") };
        assert_eq!(Token::attr(attrs, "alt"), Some("a > b"));
        assert!(*self_closing);
    }

    #[test]
    fn stray_lt_is_text() {
        let toks = tokenize("1 < 2");
        let text: String = toks
            .iter()
            .filter_map(|t| if let Token::Text(s) = t { Some(s.as_str()) } else { None })
            .collect();
        assert_eq!(text, "1 < 2");
    }

    #[test]
    fn decodes_named_and_numeric_entities() {
        assert_eq!(decode_entities("Tom &amp; Jerry &#39;s &#x263A; &unknown; &"), "Tom & Jerry 's \u{263A} &unknown; &");
        assert!(matches!(decode_entities("plain"), Cow::Borrowed(_)));
    }
}
