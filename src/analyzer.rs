//! Default `TokenProducer` for MediaWiki markup.
//!
//! Zones are cut out of the lower-cased page text with regular expressions:
//!
//! ```text
//! T  the page title
//! I  {{infobox ...}}, braces balanced
//! C  [[category:...]]
//! R  {{cite ...}}
//! L  URLs in the "== external links ==" section
//! B  everything else, with markup stripped
//! ```
//!
//! Every zone's text then goes through the same token pipeline: unicode
//! word segmentation, ASCII alphanumeric runs, stopword removal, English
//! (Porter) stemming.

use std::collections::HashSet;

use regex::Regex;
use rust_stemmers::{Algorithm, Stemmer};
use stop_words::{get, LANGUAGE};
use unicode_segmentation::UnicodeSegmentation;

use crate::encoding::Zone;
use crate::error::Result;
use crate::producer::{DocumentTerms, RawDocument, TokenProducer};

const INFOBOX_OPEN: &str = "{{infobox";

/// Tokens longer than this are dropped (base64 blobs, long identifiers).
pub const MAX_TOKEN_LEN: usize = 64;

struct Patterns {
    category: Regex,
    cite: Regex,
    external_links: Regex,
    url: Regex,
    comment: Regex,
    reference: Regex,
    namespaced_link: Regex,
    link: Regex,
    tag: Regex,
}

impl Patterns {
    fn compile() -> Result<Self> {
        Ok(Self {
            category: Regex::new(r"\[\[category:(.*?)\]\]")?,
            cite: Regex::new(r"(?s)\{\{cite(.*?)\}\}")?,
            external_links: Regex::new(r"==\s?external links\s?==")?,
            url: Regex::new(
                r"(?:https?|ftp|file)://[-a-zA-Z0-9+&@#/%?=~_|!:,.;]*[-a-zA-Z0-9+&@#/%=~_|]",
            )?,
            comment: Regex::new(r"(?s)<!--.*?-->")?,
            reference: Regex::new(r"(?s)<ref[^>]*?/>|<ref.*?</ref>")?,
            namespaced_link: Regex::new(r"\[\[[^\]|]*?:[^\]]*?\]\]")?,
            link: Regex::new(r"\[\[(?:[^\]|]*\|)?([^\]]*)\]\]")?,
            tag: Regex::new(r"</?[^>]*>")?,
        })
    }
}

pub struct Analyzer {
    stemmer: Stemmer,
    stopwords: HashSet<String>,
    patterns: Patterns,
}

impl Analyzer {
    pub fn new() -> Result<Self> {
        let stopwords = get(LANGUAGE::English)
            .into_iter()
            .map(|s| s.to_lowercase())
            .collect();
        Ok(Self {
            stemmer: Stemmer::create(Algorithm::English),
            stopwords,
            patterns: Patterns::compile()?,
        })
    }

    /// Normalized terms of `text`, in order, duplicates kept.
    pub fn terms(&self, text: &str) -> Vec<String> {
        let mut terms = Vec::new();
        self.for_each_term(&text.to_lowercase(), |term| terms.push(term));
        terms
    }

    /// Calls `f` for every term of already lower-cased `text`.
    fn for_each_term(&self, text: &str, mut f: impl FnMut(String)) {
        for word in text.unicode_words() {
            for token in word.split(|c: char| !c.is_ascii_alphanumeric()) {
                if token.is_empty() || token.len() > MAX_TOKEN_LEN || self.stopwords.contains(token) {
                    continue;
                }
                let stem = self.stemmer.stem(token);
                if !stem.is_empty() {
                    f(stem.into_owned());
                }
            }
        }
    }

    fn add_zone(&self, terms: &mut DocumentTerms, text: &str, zone: Zone) {
        self.for_each_term(text, |term| terms.add(&term, zone));
    }

    fn infoboxes<'a>(&self, text: &'a str) -> Vec<&'a str> {
        let mut boxes = Vec::new();
        let mut from = 0;
        while let Some(found) = text[from..].find(INFOBOX_OPEN) {
            let start = from + found;
            let Some(end) = template_end(text, start) else {
                break;
            };
            boxes.push(&text[start + INFOBOX_OPEN.len()..end - 2]);
            from = end;
        }
        boxes
    }

    fn external_links(&self, text: &str) -> String {
        let Some(section) = self.patterns.external_links.find(text) else {
            return String::new();
        };
        let rest = &text[section.end()..];
        let rest = match rest.find("[[category:") {
            Some(end) => &rest[..end],
            None => rest,
        };
        self.patterns
            .url
            .find_iter(rest)
            .map(|m| m.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn body(&self, text: &str) -> String {
        let p = &self.patterns;
        let text = p.comment.replace_all(text, " ");
        let text = p.reference.replace_all(&text, " ");
        let text = strip_templates(&text);
        let text = p.namespaced_link.replace_all(&text, " ");
        let text = p.link.replace_all(&text, " $1 ");
        let text = p.tag.replace_all(&text, " ");
        p.url.replace_all(&text, " ").into_owned()
    }
}

impl TokenProducer for Analyzer {
    fn produce(&self, doc: &RawDocument) -> DocumentTerms {
        let mut terms = DocumentTerms::new();
        let text = doc.text.to_lowercase();

        self.add_zone(&mut terms, &doc.title.to_lowercase(), Zone::Title);
        for infobox in self.infoboxes(&text) {
            self.add_zone(&mut terms, infobox, Zone::Infobox);
        }
        for category in self.patterns.category.captures_iter(&text) {
            self.add_zone(&mut terms, &category[1], Zone::Category);
        }
        for cite in self.patterns.cite.captures_iter(&text) {
            self.add_zone(&mut terms, &cite[1], Zone::Reference);
        }
        self.add_zone(&mut terms, &self.external_links(&text), Zone::Link);
        self.add_zone(&mut terms, &self.body(&text), Zone::Body);

        terms
    }

    fn normalize(&self, text: &str) -> Vec<String> {
        self.terms(text)
    }
}

/// Byte index just past the `}}` closing the template opened at `start`.
fn template_end(text: &str, start: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut i = start;
    while i + 1 < bytes.len() {
        match &bytes[i..i + 2] {
            b"{{" => {
                depth += 1;
                i += 2;
            }
            b"}}" => {
                depth -= 1;
                i += 2;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => i += 1,
        }
    }
    None
}

/// Removes every `{{...}}` template, nested ones included. An unclosed
/// template runs to the end of the text.
fn strip_templates(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut from = 0;
    while let Some(found) = text[from..].find("{{") {
        let start = from + found;
        out.push_str(&text[from..start]);
        match template_end(text, start) {
            Some(end) => {
                out.push(' ');
                from = end;
            }
            None => return out,
        }
    }
    out.push_str(&text[from..]);
    out
}
