//! Diacritic-insensitive query normalization.
//!
//! Lecturers type Vietnamese both with and without tone marks ("học phí" vs
//! "hoc phi") and with shorthand ("gv", "hp"). Keyword tables therefore list
//! both spellings, and every matcher runs over a small, ordered set of query
//! variants produced here.

use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

static WHITESPACE_RE: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"\s+").expect("whitespace regex is valid"));
static REPEATED_QUESTION_RE: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"\?{2,}").expect("question regex is valid"));
static REPEATED_BANG_RE: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"!{2,}").expect("bang regex is valid"));
static REPEATED_COMMA_RE: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r",{2,}").expect("comma regex is valid"));

static DIACRITIC_MAP: LazyLock<HashMap<char, char>> = LazyLock::new(|| {
    let groups: [(&str, char); 7] = [
        ("áàảãạăắằẳẵặâấầẩẫậ", 'a'),
        ("éèẻẽẹêếềểễệ", 'e'),
        ("íìỉĩị", 'i'),
        ("óòỏõọôốồổỗộơớờởỡợ", 'o'),
        ("úùủũụưứừửữự", 'u'),
        ("ýỳỷỹỵ", 'y'),
        ("đ", 'd'),
    ];
    let mut map = HashMap::new();
    for (chars, base) in groups {
        for c in chars.chars() {
            map.insert(c, base);
        }
    }
    map
});

static ABBREVIATIONS: LazyLock<HashMap<&'static str, &'static str>> = LazyLock::new(|| {
    HashMap::from([
        ("gv", "giảng viên"),
        ("sv", "sinh viên"),
        ("hs", "học sinh"),
        ("hp", "học phí"),
        ("ts", "tuyển sinh"),
        ("dh", "đại học"),
        ("đh", "đại học"),
        ("qđ", "quy định"),
        ("k", "không"),
        ("ko", "không"),
        ("kh", "không"),
        ("dc", "được"),
        ("đc", "được"),
        ("tkb", "thời khóa biểu"),
        ("nckh", "nghiên cứu khoa học"),
    ])
});

static STOP_WORDS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    HashSet::from([
        "là", "của", "và", "có", "được", "này", "đó", "một", "các", "cho", "với", "từ", "đã",
        "sẽ", "bị", "về",
    ])
});

/// Produces normalized spellings of a query for keyword matching.
#[derive(Debug, Clone, Default)]
pub struct TextNormalizer;

impl TextNormalizer {
    pub fn new() -> Self {
        Self
    }

    /// Lower-cases, folds diacritics, collapses whitespace and repeated punctuation.
    pub fn normalize(&self, query: &str) -> String {
        fold_diacritics(&clean(&query.to_lowercase()))
    }

    /// Ordered spellings of `query`: original, normalized, lower-cased, then
    /// the abbreviation-expanded and stop-word-free forms when they add
    /// something new. Blank input yields two empty strings.
    pub fn variants(&self, query: &str) -> Vec<String> {
        if query.trim().is_empty() {
            return vec![String::new(), String::new()];
        }

        let lowered = clean(&query.to_lowercase());
        let mut variants = vec![query.to_string(), self.normalize(query), lowered.clone()];

        let expanded = self.expand_abbreviations(&lowered);
        let keyword_form = self.keywords(&expanded).join(" ");
        for extra in [expanded, keyword_form] {
            if !extra.is_empty() && !variants.contains(&extra) {
                variants.push(extra);
            }
        }
        variants
    }

    /// Replaces whole-word shorthand ("gv", "hp", "ko") with its full form.
    pub fn expand_abbreviations(&self, text: &str) -> String {
        text.split_whitespace()
            .map(|word| {
                let bare = word.trim_matches(|c: char| !c.is_alphanumeric());
                match ABBREVIATIONS.get(bare) {
                    Some(full) => word.replacen(bare, full, 1),
                    None => word.to_string(),
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Content words of `text`, stop words and single characters removed.
    pub fn keywords(&self, text: &str) -> Vec<String> {
        tokenize(text)
            .into_iter()
            .filter(|w| w.chars().count() > 1 && !STOP_WORDS.contains(w.as_str()))
            .collect()
    }
}

/// Trims and collapses whitespace and runs of `?`, `!` and `,`.
pub fn clean(text: &str) -> String {
    let text = WHITESPACE_RE.replace_all(text.trim(), " ");
    let text = REPEATED_QUESTION_RE.replace_all(&text, "?");
    let text = REPEATED_BANG_RE.replace_all(&text, "!");
    REPEATED_COMMA_RE.replace_all(&text, ",").into_owned()
}

/// Maps Vietnamese vowels with tone/shape marks to their bare letter.
pub fn fold_diacritics(text: &str) -> String {
    text.chars()
        .map(|c| {
            if c.is_uppercase() {
                let lower = c.to_lowercase().next().unwrap_or(c);
                DIACRITIC_MAP
                    .get(&lower)
                    .map(|b| b.to_ascii_uppercase())
                    .unwrap_or(c)
            } else {
                DIACRITIC_MAP.get(&c).copied().unwrap_or(c)
            }
        })
        .collect()
}

/// Lower-cased word tokens; every non-alphanumeric character separates words.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| w.to_lowercase())
        .collect()
}

/// Where a term sits inside a tokenized text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TermPosition {
    /// The text consists of the term alone.
    Exact,
    /// The text starts or ends with the term.
    Edge,
    /// The term appears strictly inside the text.
    Inner,
}

/// A keyword or phrase, pre-tokenized for word-aligned matching.
///
/// Matching is aligned on syllables, so "ai" does not fire inside "khai" and
/// "cô" does not fire inside "công".
#[derive(Debug, Clone)]
pub struct Term {
    pub text: String,
    tokens: Vec<String>,
}

impl Term {
    pub fn new(text: &str) -> Self {
        Self {
            text: text.to_lowercase(),
            tokens: tokenize(text),
        }
    }

    pub fn position_in(&self, text_tokens: &[String]) -> Option<TermPosition> {
        let n = self.tokens.len();
        if n == 0 || n > text_tokens.len() {
            return None;
        }
        if text_tokens == self.tokens.as_slice() {
            return Some(TermPosition::Exact);
        }
        if text_tokens.starts_with(&self.tokens) || text_tokens.ends_with(&self.tokens) {
            return Some(TermPosition::Edge);
        }
        text_tokens
            .windows(n)
            .any(|w| w == self.tokens.as_slice())
            .then_some(TermPosition::Inner)
    }

    pub fn is_in(&self, text_tokens: &[String]) -> bool {
        self.position_in(text_tokens).is_some()
    }
}

/// An ordered list of [`Term`]s; order matters for first-match lookups.
#[derive(Debug, Clone, Default)]
pub struct TermSet {
    terms: Vec<Term>,
}

impl TermSet {
    pub fn new<S: AsRef<str>>(terms: &[S]) -> Self {
        Self {
            terms: terms.iter().map(|t| Term::new(t.as_ref())).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Term> {
        self.terms.iter()
    }

    pub fn first_match(&self, text_tokens: &[String]) -> Option<&Term> {
        self.terms.iter().find(|t| t.is_in(text_tokens))
    }

    pub fn any_match(&self, text_tokens: &[String]) -> bool {
        self.first_match(text_tokens).is_some()
    }

    pub fn count_matches(&self, text_tokens: &[String]) -> usize {
        self.terms.iter().filter(|t| t.is_in(text_tokens)).count()
    }

    pub fn matched<'a>(&'a self, text_tokens: &'a [String]) -> impl Iterator<Item = &'a Term> + 'a {
        self.terms.iter().filter(move |t| t.is_in(text_tokens))
    }
}
