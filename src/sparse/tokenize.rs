use indexmap::IndexMap;

use crate::sparse::{SparseRecord, SparseValue};

/// text -> ordered token sequence
pub trait Tokenizer {
    fn text_to_token_list(&self, text: &str) -> Vec<String>;

    /// トークンの出現回数 (初出順)
    fn text_to_counter(&self, text: &str) -> IndexMap<String, u64> {
        let mut counter = IndexMap::new();
        for token in self.text_to_token_list(text) {
            *counter.entry(token).or_insert(0) += 1;
        }
        counter
    }
}

/// Minimal English tokenizer.
///
/// Keeps alphabetic runs of at least `min_len` characters, lowercases them
/// and drops stopwords. Runs containing digits are discarded.
#[derive(Debug, Clone)]
pub struct BasicTokenizer {
    pub min_len: usize,
    pub stopwords: &'static [&'static str],
}

impl Default for BasicTokenizer {
    fn default() -> Self {
        Self {
            min_len: 2,
            stopwords: STOPWORDS,
        }
    }
}

impl BasicTokenizer {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    fn is_stopword(&self, word: &str) -> bool {
        // 短いリストなので線形探索で十分
        self.stopwords.contains(&word)
    }
}

impl Tokenizer for BasicTokenizer {
    fn text_to_token_list(&self, text: &str) -> Vec<String> {
        text.split(|c: char| !c.is_alphanumeric())
            .filter(|w| w.chars().count() >= self.min_len)
            .filter(|w| !w.chars().any(|c| c.is_numeric()))
            .map(|w| w.to_lowercase())
            .filter(|w| !self.is_stopword(w))
            .collect()
    }
}

/// Turn raw text into a vw-ready record with token counts.
/// Importance is set to 1 since vw needs one in front of a doc_id.
pub fn text_to_record<T: Tokenizer + ?Sized>(tokenizer: &T, text: &str, doc_id: &str) -> SparseRecord {
    let feature_values = tokenizer
        .text_to_counter(text)
        .into_iter()
        .map(|(token, count)| (token, SparseValue::Int(count as i64)))
        .collect();
    SparseRecord {
        feature_values,
        target: None,
        importance: Some(SparseValue::Int(1)),
        doc_id: Some(doc_id.to_string()),
    }
}

const STOPWORDS: &[&str] = &[
    "a", "about", "above", "after", "again", "against", "all", "am", "an", "and", "any", "are", "as", "at",
    "be", "because", "been", "before", "being", "below", "between", "both", "but", "by", "can", "could",
    "did", "do", "does", "doing", "down", "during", "each", "few", "for", "from", "further", "had", "has",
    "have", "having", "he", "her", "here", "hers", "herself", "him", "himself", "his", "how", "if", "in",
    "into", "is", "it", "its", "itself", "just", "me", "more", "most", "my", "myself", "no", "nor", "not",
    "now", "of", "off", "on", "once", "only", "or", "other", "our", "ours", "ourselves", "out", "over",
    "own", "same", "she", "should", "so", "some", "such", "than", "that", "the", "their", "theirs", "them",
    "themselves", "then", "there", "these", "they", "this", "those", "through", "to", "too", "under",
    "until", "up", "very", "was", "we", "were", "what", "when", "where", "which", "while", "who", "whom",
    "why", "will", "with", "would", "you", "your", "yours", "yourself", "yourselves",
];
