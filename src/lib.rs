//! This crate turns sparse bag-of-words corpora (Vowpal Wabbit / SVM-Light
//! lines) into hashed, collision-free, vocabulary-filtered corpora.

pub mod error;
pub mod sparse;
pub mod vocab;

/// Crate error and result types
/// Every fallible operation returns `Result<T>`; see `SfileError` for the
/// kinds (format, configuration, collision, precondition, completion, ...).
pub use error::{Result, SfileError};

/// Sparse Record
/// One document's feature vector: `feature_values` (token -> weight) plus the
/// optional `target`, `importance` and `doc_id`.
///
/// Weights are `SparseValue`s, integers when the text parses as one and
/// floats otherwise.
pub use sparse::{SparseRecord, SparseValue};

/// Sparse line formats
/// - `Vw`: `[target] [importance [doc_id]]| feature1[:value1] ...`
/// - `SvmLight`: `<target> feature1:value1 ...`
///
/// `parse` / `serialize` convert between a line and a `SparseRecord`.
pub use sparse::SparseFormat;

/// Record streaming
/// `RecordStream` reads a sparse file lazily, one record per line, with an
/// optional record limit. `tokens()` turns it into a stream of token lists.
pub use sparse::stream::{RecordStream, TokenStream};

/// Format conversion between `Vw` and `SvmLight`.
pub use sparse::convert::convert;

/// Tokenizer
/// Pluggable text -> token list step used to create sparse records from raw
/// text. `BasicTokenizer` is a small English default.
pub use sparse::tokenize::{text_to_record, BasicTokenizer, Tokenizer};

/// Token Hasher
/// Maps a token to an id below `2^bit_precision` (1..=224 bits).
/// Fast keyed hashing up to 64 bits, SHA-224 above.
pub use vocab::hasher::{HashAlgorithm, TokenHasher};

/// Vocabulary
/// The corpus-wide token <-> id mapping plus per-token statistics
/// (aggregate score, document frequency).
///
/// Lifecycle:
/// - `load_sfile` / `load_reader`: one pass over a corpus
/// - `resolve_collisions`: make the mapping injective
/// - `remove_tokens` / `remove_extreme_tokens`: optional trimming
/// - `filter_sfile`: rewrite a corpus with integer ids
///
/// # Serialization
/// `save` / `load` persist the whole state as CBOR.
pub use vocab::{DocFreqBounds, TokenEntry, TokenId, TokenStats, VocabState, Vocabulary};

/// Collision repair configuration and the free function behind
/// `Vocabulary::resolve_collisions`.
pub use vocab::collision::{resolve_collisions, ResolveConfig};

/// Vocabulary data structure for deserialization
pub use vocab::serde::VocabularyData;
