use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use indexmap::IndexMap;
use serde::{ser::SerializeStruct, Deserialize, Serialize};

use crate::error::{Result, SfileError};
use crate::sparse::SparseFormat;
use crate::vocab::hasher::TokenHasher;
use crate::vocab::{TokenEntry, TokenId, VocabState, Vocabulary};

/// Vocabulary のデシリアライズ用データ構造
/// `into_vocabulary` で整合性を確認してから `Vocabulary` に戻す
#[derive(Debug, Deserialize)]
pub struct VocabularyData {
    pub format: SparseFormat,
    pub hasher: TokenHasher,
    #[serde(with = "indexmap::map::serde_seq")]
    pub entries: IndexMap<String, TokenEntry>,
    pub id_to_token: Option<HashMap<TokenId, String>>,
    pub num_docs: u64,
    pub state: VocabState,
}

impl VocabularyData {
    /// Check the maps agree and rebuild the vocabulary.
    pub fn into_vocabulary(self) -> Result<Vocabulary> {
        let bound = self.hasher.id_space();
        if let Some((token, _)) = self.entries.iter().find(|(_, e)| e.id >= bound) {
            return Err(SfileError::Precondition(format!("saved id of {token:?} exceeds the id space")));
        }
        if let Some(id_to_token) = &self.id_to_token {
            let inverse_ok = id_to_token.len() == self.entries.len()
                && self
                    .entries
                    .iter()
                    .all(|(token, e)| id_to_token.get(&e.id) == Some(token));
            if !inverse_ok {
                return Err(SfileError::Precondition("saved id_to_token is not the inverse of token_to_id".into()));
            }
        }
        if (self.state >= VocabState::CollisionsResolved) != self.id_to_token.is_some() {
            return Err(SfileError::Precondition(format!("saved state {:?} disagrees with id_to_token", self.state)));
        }
        Ok(Vocabulary {
            format: self.format,
            hasher: self.hasher,
            entries: self.entries,
            id_to_token: self.id_to_token,
            num_docs: self.num_docs,
            state: self.state,
        })
    }
}

impl Serialize for Vocabulary {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        // indexmap::map::serde_seq と同じ並びで書く
        struct Entries<'a>(&'a IndexMap<String, TokenEntry>);
        impl Serialize for Entries<'_> {
            fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
                indexmap::map::serde_seq::serialize(self.0, serializer)
            }
        }

        let mut state = serializer.serialize_struct("Vocabulary", 6)?;
        state.serialize_field("format", &self.format)?;
        state.serialize_field("hasher", &self.hasher)?;
        state.serialize_field("entries", &Entries(&self.entries))?;
        state.serialize_field("id_to_token", &self.id_to_token)?;
        state.serialize_field("num_docs", &self.num_docs)?;
        state.serialize_field("state", &self.state)?;
        state.end()
    }
}

/// persistence
impl Vocabulary {
    pub fn save_writer<W: Write>(&self, writer: W) -> Result<()> {
        serde_cbor::to_writer(writer, self)?;
        Ok(())
    }

    pub fn load_from_reader<R: Read>(reader: R) -> Result<Self> {
        let data: VocabularyData = serde_cbor::from_reader(reader)?;
        data.into_vocabulary()
    }

    /// Save the whole state as CBOR.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        self.save_writer(&mut writer)?;
        writer.flush()?;
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::load_from_reader(BufReader::new(File::open(path)?))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::vocab::collision::ResolveConfig;

    const CORPUS: &str = " 1 doc1| word1:1 word2:2\n 1 doc2| word1:1.1 word3:2";

    fn resolved(bits: u32) -> Vocabulary {
        let mut vocab = Vocabulary::new(SparseFormat::Vw, TokenHasher::new(bits).unwrap());
        vocab.load_reader(Cursor::new(CORPUS), None).unwrap();
        vocab.resolve_collisions(&ResolveConfig { seed: Some(2), ..Default::default() }).unwrap();
        vocab
    }

    #[test]
    fn save_and_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vocab.cbor");
        let vocab = resolved(20);
        vocab.save(&path).unwrap();

        let back = Vocabulary::load(&path).unwrap();
        assert_eq!(back.state(), VocabState::CollisionsResolved);
        assert_eq!(back.num_docs(), 2);
        assert_eq!(back.bit_precision(), 20);
        assert_eq!(back.hasher(), vocab.hasher());
        for (token, id) in vocab.token_to_id() {
            assert_eq!(back.id_of(token), Some(id));
            assert_eq!(back.doc_freq_of(token), vocab.doc_freq_of(token));
            assert_eq!(back.token_of(id), Some(token));
        }
        assert_eq!(back.score_of("word1"), vocab.score_of("word1"));
    }

    #[test]
    fn wide_ids_survive() {
        let vocab = resolved(200);
        let mut buf = Vec::new();
        vocab.save_writer(&mut buf).unwrap();
        let back = Vocabulary::load_from_reader(Cursor::new(buf)).unwrap();
        assert_eq!(back.id_of("word3"), vocab.id_of("word3"));
    }

    #[test]
    fn loaded_vocabulary_can_rewrite() {
        let mut buf = Vec::new();
        resolved(18).save_writer(&mut buf).unwrap();
        let mut back = Vocabulary::load_from_reader(Cursor::new(buf)).unwrap();
        let mut out = Vec::new();
        assert_eq!(back.filter_sfile(Cursor::new(CORPUS), &mut out, None::<&[&str]>, false).unwrap(), 2);
    }

    #[test]
    fn garbage_is_a_persist_error() {
        let res = Vocabulary::load_from_reader(Cursor::new(vec![0xffu8, 0x00, 0x13]));
        assert!(matches!(res, Err(SfileError::Persist(_))));
    }
}
