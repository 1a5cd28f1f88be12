//! Deterministic rule-based suggestions used when no model is available.
//!
//! Three rules, each yielding at most one draft per paragraph:
//!
//! | Rule | Category | Effect |
//! |------|----------|--------|
//! | contractions | `tone` | `don't` → `do not`, `can't` → `cannot`, … |
//! | overlong paragraph | `length` | keep leading sentences up to 20 words |
//! | filler words | `clarity` | drop `very`, `really`, `just`, … |
//!
//! The editing request selects rules by keyword; a request that mentions
//! none of them runs all three, except `tone` for a casual request.

use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::models::{Paragraph, SuggestionCategory, SuggestionDraft, SuggestionSource};

/// Paragraphs with more words than this are flagged as too long.
pub const LONG_PARAGRAPH_WORDS: usize = 30;
/// Word budget of the shortened version.
pub const SHORTENED_WORDS: usize = 20;

static CONTRACTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b([A-Za-z]+)['’]([A-Za-z]+)\b").expect("contraction pattern is valid")
});

static FILLER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(very|really|basically|actually|just|quite)\s+").expect("filler pattern is valid")
});

static MULTI_SPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r" {2,}").expect("space pattern is valid"));

/// Which rules a request asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuleSet {
    pub tone: bool,
    pub length: bool,
    pub clarity: bool,
}

impl RuleSet {
    pub const ALL: RuleSet = RuleSet {
        tone: true,
        length: true,
        clarity: true,
    };

    pub fn for_query(query: &str) -> Self {
        let q = query.to_lowercase();
        let tokens: Vec<&str> = q.split(|c: char| !c.is_alphanumeric()).collect();
        // Keywords match word starts: "readab" matches "readability",
        // "formal" does not match "informal".
        let has = |stems: &[&str]| {
            tokens
                .iter()
                .any(|t| stems.iter().any(|stem| t.starts_with(stem)))
        };
        let selected = RuleSet {
            tone: has(&["formal", "tone", "professional", "contraction"]),
            length: has(&["concise", "shorter", "shorten", "brief", "length", "long"]),
            clarity: has(&["clear", "clarity", "readab", "simplif", "filler"]),
        };
        if selected != (RuleSet { tone: false, length: false, clarity: false }) {
            return selected;
        }
        // No contraction expansion for a casual request.
        RuleSet {
            tone: !has(&["informal", "casual", "conversational"]),
            ..RuleSet::ALL
        }
    }
}

/// Runs the selected rules over every non-blank paragraph.
pub fn suggest(paragraphs: &[Paragraph], query: &str) -> Vec<SuggestionDraft> {
    let rules = RuleSet::for_query(query);
    let mut drafts = Vec::new();
    for para in paragraphs.iter().filter(|p| !p.is_blank()) {
        if rules.tone {
            if let Some(expanded) = expand_contractions(&para.text) {
                drafts.push(draft(
                    para,
                    expanded,
                    "Replace contractions with full forms for formality",
                    SuggestionCategory::Tone,
                ));
            }
        }
        if rules.length {
            if let Some(shorter) = shorten(&para.text) {
                drafts.push(draft(
                    para,
                    shorter,
                    "Shorten long paragraph for conciseness",
                    SuggestionCategory::Length,
                ));
            }
        }
        if rules.clarity {
            if let Some(clean) = remove_filler(&para.text) {
                drafts.push(draft(
                    para,
                    clean,
                    "Remove filler words for clarity",
                    SuggestionCategory::Clarity,
                ));
            }
        }
    }
    drafts
}

fn draft(
    para: &Paragraph,
    suggested: String,
    reason: &str,
    category: SuggestionCategory,
) -> SuggestionDraft {
    SuggestionDraft {
        paragraph_index: para.index,
        original: para.text.clone(),
        suggested,
        reason: reason.to_string(),
        category,
        source: SuggestionSource::Heuristic,
    }
}

fn expansion(contraction: &str) -> Option<&'static str> {
    Some(match contraction {
        "don't" => "do not",
        "doesn't" => "does not",
        "didn't" => "did not",
        "can't" => "cannot",
        "won't" => "will not",
        "isn't" => "is not",
        "aren't" => "are not",
        "wasn't" => "was not",
        "weren't" => "were not",
        "hasn't" => "has not",
        "haven't" => "have not",
        "hadn't" => "had not",
        "shouldn't" => "should not",
        "wouldn't" => "would not",
        "couldn't" => "could not",
        "mustn't" => "must not",
        "it's" => "it is",
        "that's" => "that is",
        "there's" => "there is",
        "what's" => "what is",
        "let's" => "let us",
        "i'm" => "I am",
        "you're" => "you are",
        "we're" => "we are",
        "they're" => "they are",
        "i've" => "I have",
        "you've" => "you have",
        "we've" => "we have",
        "they've" => "they have",
        "i'll" => "I will",
        "you'll" => "you will",
        "we'll" => "we will",
        "they'll" => "they will",
        "i'd" => "I would",
        "you'd" => "you would",
        "we'd" => "we would",
        "they'd" => "they would",
        _ => return None,
    })
}

/// Expands known contractions, keeping the case of the first letter.
/// Returns `None` when nothing changed.
pub fn expand_contractions(text: &str) -> Option<String> {
    let out = CONTRACTION.replace_all(text, |caps: &Captures| {
        let matched = &caps[0];
        let key = format!("{}'{}", &caps[1], &caps[2]).to_lowercase();
        match expansion(&key) {
            Some(full) => match_case(matched, full),
            None => matched.to_string(),
        }
    });
    (out != text).then(|| out.into_owned())
}

fn match_case(source: &str, replacement: &str) -> String {
    let letters: Vec<char> = source.chars().filter(|c| c.is_alphabetic()).collect();
    if letters.len() > 1 && letters.iter().all(|c| c.is_uppercase()) {
        return replacement.to_uppercase();
    }
    if letters.first().is_some_and(|c| c.is_uppercase()) {
        return capitalize(replacement);
    }
    replacement.to_string()
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Shortens a paragraph over [`LONG_PARAGRAPH_WORDS`] words.
pub fn shorten(text: &str) -> Option<String> {
    if text.split_whitespace().count() <= LONG_PARAGRAPH_WORDS {
        return None;
    }

    let mut kept = String::new();
    let mut words = 0usize;
    for sentence in sentences(text) {
        let n = sentence.split_whitespace().count();
        if words + n > SHORTENED_WORDS {
            break;
        }
        if !kept.is_empty() {
            kept.push(' ');
        }
        kept.push_str(sentence);
        words += n;
    }

    if kept.is_empty() {
        let head: Vec<&str> = text.split_whitespace().take(SHORTENED_WORDS).collect();
        kept = format!("{}...", head.join(" "));
    }
    Some(kept)
}

/// Splits on `.`, `!` or `?` followed by whitespace; each piece is trimmed.
fn sentences(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0usize;
    let mut chars = text.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        if matches!(c, '.' | '!' | '?') {
            let at_boundary = chars.peek().map_or(true, |(_, next)| next.is_whitespace());
            if at_boundary {
                let end = i + c.len_utf8();
                let piece = text[start..end].trim();
                if !piece.is_empty() {
                    out.push(piece);
                }
                start = end;
            }
        }
    }
    let tail = text[start..].trim();
    if !tail.is_empty() {
        out.push(tail);
    }
    out
}

/// Drops filler intensifiers and doubled spaces. Returns `None` when nothing changed.
pub fn remove_filler(text: &str) -> Option<String> {
    let stripped = FILLER.replace_all(text, "");
    let collapsed = MULTI_SPACE.replace_all(&stripped, " ").into_owned();
    if collapsed == text || collapsed.trim().is_empty() {
        return None;
    }
    let starts_upper = text.chars().next().is_some_and(|c| c.is_uppercase());
    if starts_upper {
        Some(capitalize(&collapsed))
    } else {
        Some(collapsed)
    }
}
