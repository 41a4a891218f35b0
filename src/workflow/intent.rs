//! Advance-intent detection for user replies.
//!
//! The controller only needs a yes/no answer to "does this message mean
//! *move on to drafting now*?", plus any fields the classifier happened to
//! pick up. [`PhraseClassifier`] answers it deterministically.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::core::WorkflowConfig;

/// Classifies the latest user utterance.
pub trait IntentClassifier: Send + Sync {
    fn classify(&self, text: &str) -> Classification;
}

/// What made a classifier decide to advance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntentTrigger {
    /// The literal command token was sent.
    CommandToken,
    /// A canonical phrase was found in the utterance.
    Phrase(String),
    /// An action verb appeared together with a proposal noun.
    ActionRequest,
}

/// Result of classifying one utterance.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Classification {
    pub advance: bool,
    pub trigger: Option<IntentTrigger>,
    pub extracted_fields: BTreeMap<String, String>,
}

impl Classification {
    fn advance(trigger: IntentTrigger) -> Self {
        Self { advance: true, trigger: Some(trigger), extracted_fields: BTreeMap::new() }
    }
}

const ACTION_VERBS: &[&str] = &[
    "vytvor", "generuj", "vygeneruj", "udelej", "priprav", "napis", "create", "generate", "prepare",
    "write", "draft",
];

const PROPOSAL_NOUNS: &[&str] =
    &["nabidku", "nabidka", "nabidky", "proposal", "offer", "bid", "dokument", "document"];

static FIELD_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^\s*(\p{L}[\p{L}\p{N} _-]{0,40}?)\s*[:=]\s*(\S.*?)\s*$")
        .unwrap_or_else(|e| panic!("invalid field pattern: {e}"))
});

/// Phrase-matching classifier.
///
/// Matching is case-insensitive and ignores diacritics, so "Pokračuj",
/// "pokracuj" and "POKRAČUJ" are the same phrase. A phrase matches when its
/// words appear as a contiguous run anywhere in the utterance.
#[derive(Debug, Clone)]
pub struct PhraseClassifier {
    command_token: String,
    phrases: Vec<Vec<String>>,
}

impl PhraseClassifier {
    /// Create a classifier for the given phrases and command token.
    pub fn new<I, S>(phrases: I, command_token: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let phrases = phrases
            .into_iter()
            .map(|p| words(&normalize(p.as_ref())))
            .filter(|w| !w.is_empty())
            .collect();

        Self { command_token: command_token.into().trim().to_lowercase(), phrases }
    }

    /// Create a classifier from workflow configuration.
    pub fn from_config(config: &WorkflowConfig) -> Self {
        Self::new(&config.advance_phrases, config.command_token.clone())
    }

    fn is_command_token(&self, text: &str) -> bool {
        !self.command_token.is_empty() && text.trim().to_lowercase() == self.command_token
    }

    fn matching_phrase(&self, tokens: &[String]) -> Option<String> {
        self.phrases
            .iter()
            .find(|phrase| tokens.windows(phrase.len()).any(|window| window == phrase.as_slice()))
            .map(|phrase| phrase.join(" "))
    }
}

impl Default for PhraseClassifier {
    fn default() -> Self {
        Self::from_config(&WorkflowConfig::default())
    }
}

impl IntentClassifier for PhraseClassifier {
    fn classify(&self, text: &str) -> Classification {
        if self.is_command_token(text) {
            return Classification::advance(IntentTrigger::CommandToken);
        }

        let tokens = words(&normalize(text));

        let mut classification = if let Some(phrase) = self.matching_phrase(&tokens) {
            Classification::advance(IntentTrigger::Phrase(phrase))
        } else if is_action_request(&tokens) {
            Classification::advance(IntentTrigger::ActionRequest)
        } else {
            Classification::default()
        };

        classification.extracted_fields = extract_field_lines(text);
        classification
    }
}

fn is_action_request(tokens: &[String]) -> bool {
    let has = |set: &[&str]| tokens.iter().any(|t| set.contains(&t.as_str()));
    has(ACTION_VERBS) && has(PROPOSAL_NOUNS)
}

/// Pull `key: value` / `key = value` lines out of a reply.
pub fn extract_field_lines(text: &str) -> BTreeMap<String, String> {
    FIELD_LINE
        .captures_iter(text)
        .filter_map(|caps| {
            let key = words(&normalize(&caps[1])).join("_");
            let value = caps[2].to_string();
            (!key.is_empty()).then_some((key, value))
        })
        .collect()
}

/// Lowercase, strip diacritics and collapse everything that is not a letter
/// or digit into single spaces.
pub fn normalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_space = false;

    for ch in text.chars().flat_map(char::to_lowercase) {
        if !ch.is_alphanumeric() {
            pending_space = true;
            continue;
        }

        if pending_space && !out.is_empty() {
            out.push(' ');
        }
        pending_space = false;

        match fold_diacritic(ch) {
            Some(folded) => out.push_str(folded),
            None => out.push(ch),
        }
    }

    out
}

fn words(normalized: &str) -> Vec<String> {
    normalized.split_whitespace().map(str::to_string).collect()
}

fn fold_diacritic(ch: char) -> Option<&'static str> {
    let folded = match ch {
        'á' | 'à' | 'â' | 'ä' | 'ã' | 'å' | 'ā' | 'ă' | 'ą' => "a",
        'č' | 'ć' | 'ç' => "c",
        'ď' | 'đ' => "d",
        'é' | 'è' | 'ê' | 'ë' | 'ě' | 'ē' | 'ę' => "e",
        'í' | 'ì' | 'î' | 'ï' => "i",
        'ľ' | 'ĺ' | 'ł' => "l",
        'ň' | 'ń' | 'ñ' => "n",
        'ó' | 'ò' | 'ô' | 'ö' | 'õ' | 'ő' | 'ø' => "o",
        'ř' | 'ŕ' => "r",
        'š' | 'ś' | 'ş' => "s",
        'ť' | 'ţ' => "t",
        'ú' | 'ù' | 'û' | 'ü' | 'ů' | 'ű' => "u",
        'ý' | 'ÿ' => "y",
        'ž' | 'ź' | 'ż' => "z",
        'ß' => "ss",
        _ => return None,
    };
    Some(folded)
}
