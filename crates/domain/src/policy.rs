//! Text policy: normalization, blacklist matching and cleanup

use regex::{Regex, RegexBuilder};
use std::sync::LazyLock;

static NON_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\w\s]").expect("Valid regex"));
static WHITESPACE_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("Valid regex"));
static INLINE_SPACE_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t]+").expect("Valid regex"));
static SPACE_BEFORE_PUNCT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t]+([.,!?])").expect("Valid regex"));
static BLANK_LINES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n[ \t]*\n(?:[ \t]*\n)+").expect("Valid regex"));

/// Lower-case, strip punctuation and collapse whitespace.
///
/// Two texts that differ only in case, punctuation or spacing normalize to
/// the same string.
pub fn normalize(text: &str) -> String {
    let lowered = text.to_lowercase();
    let stripped = NON_WORD.replace_all(&lowered, "");
    WHITESPACE_RUN
        .replace_all(&stripped, " ")
        .trim()
        .to_string()
}

/// Case-insensitive substring blacklist
///
/// Plain word terms match the normalized text. Terms carrying symbols such as
/// `18+` match the lower-cased text with those symbols intact.
#[derive(Debug, Clone, Default)]
pub struct Blacklist {
    terms: Vec<String>,
}

impl Blacklist {
    /// Merge tenant and global terms; terms without any word character are dropped
    pub fn new<'a>(
        tenant_terms: impl IntoIterator<Item = &'a String>,
        global_terms: impl IntoIterator<Item = &'a String>,
    ) -> Self {
        let mut terms: Vec<String> = tenant_terms
            .into_iter()
            .chain(global_terms)
            .map(|term| lower_collapsed(&term.replace('"', "")))
            .filter(|term| !normalize(term).is_empty())
            .collect();
        terms.sort();
        terms.dedup();
        Self { terms }
    }

    /// First term contained in the text, if any
    pub fn find(&self, text: &str) -> Option<&str> {
        if self.terms.is_empty() {
            return None;
        }
        let normalized = normalize(text);
        let lowered = lower_collapsed(text);
        self.terms
            .iter()
            .find(|term| {
                if NON_WORD.is_match(term) {
                    lowered.contains(term.as_str())
                } else {
                    normalized.contains(term.as_str())
                }
            })
            .map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }
}

fn lower_collapsed(text: &str) -> String {
    WHITESPACE_RUN
        .replace_all(&text.to_lowercase(), " ")
        .trim()
        .to_string()
}

/// Remove configured phrases and tidy spacing before the text is framed
pub fn clean_text(text: &str, strip_phrases: &[String]) -> String {
    let mut cleaned = text.to_string();

    let phrases: Vec<String> = strip_phrases
        .iter()
        .filter(|p| !p.trim().is_empty())
        .map(|p| regex::escape(p))
        .collect();
    if !phrases.is_empty() {
        match RegexBuilder::new(&phrases.join("|"))
            .case_insensitive(true)
            .build()
        {
            Ok(pattern) => cleaned = pattern.replace_all(&cleaned, "").into_owned(),
            Err(error) => {
                tracing::warn!(error = %error, "Invalid strip phrase pattern");
            }
        }
    }

    let cleaned = INLINE_SPACE_RUN.replace_all(&cleaned, " ");
    let cleaned = SPACE_BEFORE_PUNCT.replace_all(&cleaned, "$1");
    let cleaned = BLANK_LINES.replace_all(&cleaned, "\n\n");

    cleaned
        .lines()
        .map(str::trim)
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}
