pub mod hasher;
pub mod collision;
pub mod rewrite;
pub mod serde;

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use indexmap::IndexMap;
use log::info;
use num::BigUint;
use rand::rngs::StdRng;
use rand::SeedableRng;
use ::serde::{Deserialize, Serialize};

use crate::error::{Result, SfileError};
use crate::sparse::stream::RecordStream;
use crate::sparse::{SparseFormat, SparseValue};
use crate::vocab::collision::{resolve_collisions, ResolveConfig};
use crate::vocab::hasher::TokenHasher;

/// token id, `[0, 2^bit_precision)`
pub type TokenId = BigUint;

/// Lifecycle of a vocabulary.
/// `NotLoaded -> Loaded -> CollisionsResolved -> Rewritten`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum VocabState {
    NotLoaded,
    Loaded,
    CollisionsResolved,
    Rewritten,
}

/// Per-token entry. Keeping id, score and doc_freq in one value means a
/// token can never have one without the others.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenEntry {
    pub id: TokenId,
    /// sum of the token's weight over all documents
    pub score: SparseValue,
    /// documents the token appears in
    pub doc_freq: u64,
}

/// One row of `Vocabulary::token_stats`.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenStats {
    pub token: String,
    pub id: TokenId,
    pub score: SparseValue,
    pub doc_freq: u64,
}

/// Document frequency limits for `remove_extreme_tokens`.
/// Tokens outside either range are dropped.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DocFreqBounds {
    pub doc_freq_min: u64,
    pub doc_freq_max: u64,
    pub doc_fraction_min: f64,
    pub doc_fraction_max: f64,
}

impl Default for DocFreqBounds {
    fn default() -> Self {
        Self {
            doc_freq_min: 0,
            doc_freq_max: u64::MAX,
            doc_fraction_min: 0.0,
            doc_fraction_max: 1.0,
        }
    }
}

/// Corpus-wide token <-> id mapping with per-token statistics.
///
/// Built from one pass over a sparse file, then made injective by
/// `resolve_collisions`, optionally trimmed, and finally used by
/// `filter_sfile` to rewrite corpora with integer ids.
///
/// # Examples
/// ```
/// use std::io::Cursor;
/// use sfile_filter::{SparseFormat, TokenHasher, Vocabulary, ResolveConfig};
///
/// let corpus = " 1 doc1| word1:1 word2:2\n 1 doc2| word1:1.1 word3:2\n";
/// let mut vocab = Vocabulary::new(SparseFormat::Vw, TokenHasher::new(18).unwrap());
/// vocab.load_reader(Cursor::new(corpus), None).unwrap();
/// vocab.resolve_collisions(&ResolveConfig::default()).unwrap();
/// vocab.remove_tokens(["word1"]).unwrap();
///
/// let mut out = Vec::new();
/// vocab.filter_sfile(Cursor::new(corpus), &mut out, None::<&[&str]>, false).unwrap();
/// assert_eq!(String::from_utf8(out).unwrap().lines().count(), 2);
/// ```
#[derive(Debug, Clone)]
pub struct Vocabulary {
    format: SparseFormat,
    hasher: TokenHasher,
    entries: IndexMap<String, TokenEntry>,
    /// collision 解決後のみ Some
    id_to_token: Option<HashMap<TokenId, String>>,
    num_docs: u64,
    state: VocabState,
}

impl Vocabulary {
    pub fn new(format: SparseFormat, hasher: TokenHasher) -> Self {
        Self {
            format,
            hasher,
            entries: IndexMap::new(),
            id_to_token: None,
            num_docs: 0,
            state: VocabState::NotLoaded,
        }
    }

    /// Start from an existing (possibly colliding) token -> id map.
    /// Scores and document frequencies start at zero.
    pub fn from_token_ids<I>(format: SparseFormat, hasher: TokenHasher, token_to_id: I) -> Result<Self>
    where
        I: IntoIterator<Item = (String, TokenId)>,
    {
        let bound = hasher.id_space();
        let mut vocab = Self::new(format, hasher);
        for (token, id) in token_to_id {
            if id >= bound {
                return Err(SfileError::Configuration(format!(
                    "id {id} of {token:?} is outside 2^{}",
                    vocab.hasher.bit_precision()
                )));
            }
            vocab.entries.insert(token, TokenEntry { id, score: SparseValue::default(), doc_freq: 0 });
        }
        vocab.state = VocabState::Loaded;
        Ok(vocab)
    }
}

/// build
impl Vocabulary {
    /// Scan a sparse file once and collect ids, scores and document frequencies.
    pub fn load_sfile<P: AsRef<Path>>(&mut self, path: P, limit: Option<usize>) -> Result<()> {
        let file = File::open(path)?;
        self.load_reader(BufReader::new(file), limit)
    }

    /// Same as `load_sfile` over any buffered reader.
    ///
    /// Stops at the first malformed line; the vocabulary is left untouched
    /// in that case.
    pub fn load_reader<R: BufRead>(&mut self, reader: R, limit: Option<usize>) -> Result<()> {
        if self.state != VocabState::NotLoaded {
            return Err(SfileError::Precondition("vocabulary is already loaded".into()));
        }

        // 失敗時に半端な状態を残さないよう、別の map に積んでから差し替える
        let mut entries: IndexMap<String, TokenEntry> = IndexMap::new();
        let mut num_docs = 0u64;
        for record in RecordStream::new(reader, self.format, limit) {
            let record = record?;
            for (token, value) in record.feature_values {
                let id = self.hasher.hash(&token);
                let entry = entries.entry(token).or_insert_with(|| TokenEntry {
                    id: id.clone(),
                    score: SparseValue::default(),
                    doc_freq: 0,
                });
                entry.id = id;
                entry.score += value;
                // feature map のキーは一意なので 1 文書 1 回
                entry.doc_freq += 1;
            }
            num_docs += 1;
        }

        info!("loaded {} tokens from {} documents", entries.len(), num_docs);
        self.entries = entries;
        self.num_docs = num_docs;
        self.state = VocabState::Loaded;
        Ok(())
    }

    /// Make `token -> id` injective, with probing seeded from `config.seed`.
    pub fn resolve_collisions(&mut self, config: &ResolveConfig) -> Result<()> {
        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        self.resolve_collisions_with(config, &mut rng)
    }

    /// `resolve_collisions` with a caller supplied generator.
    pub fn resolve_collisions_with<R: rand::Rng + ?Sized>(&mut self, config: &ResolveConfig, rng: &mut R) -> Result<()> {
        match self.state {
            VocabState::NotLoaded => {
                return Err(SfileError::Precondition("load a corpus before resolving collisions".into()))
            }
            VocabState::CollisionsResolved | VocabState::Rewritten => {
                return Err(SfileError::Precondition("collisions are already resolved".into()))
            }
            VocabState::Loaded => {}
        }

        let mut token_to_id: IndexMap<String, TokenId> = self
            .entries
            .iter()
            .map(|(token, entry)| (token.clone(), entry.id.clone()))
            .collect();
        let id_to_token = resolve_collisions(&mut token_to_id, self.hasher.bit_precision(), config, rng)?;
        for (token, id) in token_to_id {
            if let Some(entry) = self.entries.get_mut(&token) {
                entry.id = id;
            }
        }
        self.id_to_token = Some(id_to_token);
        self.state = VocabState::CollisionsResolved;
        Ok(())
    }
}

/// filter
impl Vocabulary {
    /// Remove tokens from every map.
    ///
    /// All tokens are checked first, so an unknown token removes nothing.
    pub fn remove_tokens<I, S>(&mut self, tokens: I) -> Result<usize>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let tokens: Vec<S> = tokens.into_iter().collect();
        if let Some(missing) = tokens.iter().find(|t| !self.entries.contains_key(t.as_ref())) {
            return Err(SfileError::UnknownToken(missing.as_ref().to_string()));
        }
        let mut removed = 0usize;
        for token in &tokens {
            // 同じ token が二度入っていても二度目は何もしない
            if let Some(entry) = self.entries.swap_remove(token.as_ref()) {
                if let Some(id_to_token) = self.id_to_token.as_mut() {
                    id_to_token.remove(&entry.id);
                }
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Drop tokens whose document frequency is outside
    /// `[doc_freq_min, doc_freq_max]` or outside
    /// `[doc_fraction_min * num_docs, doc_fraction_max * num_docs]`.
    ///
    /// # Returns
    /// * `usize` - number of tokens removed
    pub fn remove_extreme_tokens(&mut self, bounds: &DocFreqBounds) -> Result<usize> {
        if self.state == VocabState::NotLoaded {
            return Err(SfileError::Precondition("nothing loaded to filter".into()));
        }
        let num_docs = self.num_docs as f64;
        let frac_min = bounds.doc_fraction_min * num_docs;
        let frac_max = bounds.doc_fraction_max * num_docs;
        let to_remove: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| {
                let df = entry.doc_freq;
                let by_count = df < bounds.doc_freq_min || df > bounds.doc_freq_max;
                let by_fraction = (df as f64) < frac_min || (df as f64) > frac_max;
                by_count || by_fraction
            })
            .map(|(token, _)| token.clone())
            .collect();

        let total = self.entries.len();
        let removed = self.remove_tokens(&to_remove)?;
        info!("removed {removed} of {total} tokens outside document frequency bounds");
        Ok(removed)
    }

    /// Reassign ids to `0..vocab_size`, most frequent tokens first.
    pub fn compactify(&mut self) -> Result<()> {
        if self.id_to_token.is_none() {
            return Err(SfileError::Precondition("compactify needs resolved collisions".into()));
        }
        let order: Vec<String> = self.token_stats().into_iter().map(|row| row.token).collect();
        let mut id_to_token = HashMap::with_capacity(order.len());
        for (new_id, token) in order.into_iter().enumerate() {
            let id = BigUint::from(new_id);
            if let Some(entry) = self.entries.get_mut(&token) {
                entry.id = id.clone();
            }
            id_to_token.insert(id, token);
        }
        self.id_to_token = Some(id_to_token);
        Ok(())
    }
}

/// accessors
impl Vocabulary {
    #[inline]
    pub fn format(&self) -> SparseFormat {
        self.format
    }

    #[inline]
    pub fn hasher(&self) -> &TokenHasher {
        &self.hasher
    }

    #[inline]
    pub fn bit_precision(&self) -> u32 {
        self.hasher.bit_precision()
    }

    #[inline]
    pub fn state(&self) -> VocabState {
        self.state
    }

    #[inline]
    pub fn num_docs(&self) -> u64 {
        self.num_docs
    }

    #[inline]
    pub fn vocab_size(&self) -> usize {
        self.entries.len()
    }

    pub fn contains_token(&self, token: &str) -> bool {
        self.entries.contains_key(token)
    }

    pub fn entry(&self, token: &str) -> Option<&TokenEntry> {
        self.entries.get(token)
    }

    pub fn id_of(&self, token: &str) -> Option<&TokenId> {
        self.entries.get(token).map(|e| &e.id)
    }

    pub fn score_of(&self, token: &str) -> Option<SparseValue> {
        self.entries.get(token).map(|e| e.score)
    }

    pub fn doc_freq_of(&self, token: &str) -> Option<u64> {
        self.entries.get(token).map(|e| e.doc_freq)
    }

    /// Reverse lookup, only after collisions are resolved.
    pub fn token_of(&self, id: &TokenId) -> Option<&str> {
        self.id_to_token.as_ref()?.get(id).map(|t| t.as_str())
    }

    pub fn is_resolved(&self) -> bool {
        self.id_to_token.is_some()
    }

    pub fn tokens(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(|t| t.as_str())
    }

    pub fn token_to_id(&self) -> impl Iterator<Item = (&str, &TokenId)> {
        self.entries.iter().map(|(t, e)| (t.as_str(), &e.id))
    }

    pub fn id_to_token(&self) -> Option<&HashMap<TokenId, String>> {
        self.id_to_token.as_ref()
    }

    /// Rows sorted by descending doc_freq, then token.
    pub fn token_stats(&self) -> Vec<TokenStats> {
        let mut rows: Vec<TokenStats> = self
            .entries
            .iter()
            .map(|(token, entry)| TokenStats {
                token: token.clone(),
                id: entry.id.clone(),
                score: entry.score,
                doc_freq: entry.doc_freq,
            })
            .collect();
        rows.sort_by(|a, b| b.doc_freq.cmp(&a.doc_freq).then_with(|| a.token.cmp(&b.token)));
        rows
    }
}
