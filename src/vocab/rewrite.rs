use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use indexmap::IndexMap;
use log::info;

use crate::error::{Result, SfileError};
use crate::sparse::stream::RecordStream;
use crate::vocab::{VocabState, Vocabulary};

/// corpus rewrite
impl Vocabulary {
    /// Stream `reader`, replace feature tokens with their ids and write the
    /// records to `writer` in input order.
    ///
    /// Tokens missing from the vocabulary are dropped. With `doc_id_list`,
    /// only records whose doc_id is listed are written, and with
    /// `enforce_all_doc_id` every listed id must show up in the input.
    ///
    /// # Arguments
    /// * `reader` - sparse corpus in the vocabulary's format
    /// * `writer` - destination, flushed before returning
    /// * `doc_id_list` - optional allow list of doc_ids
    /// * `enforce_all_doc_id` - fail if a listed doc_id never appeared
    ///
    /// # Returns
    /// * `usize` - records written
    pub fn filter_sfile<R, W, S>(
        &mut self,
        reader: R,
        mut writer: W,
        doc_id_list: Option<&[S]>,
        enforce_all_doc_id: bool,
    ) -> Result<usize>
    where
        R: BufRead,
        W: Write,
        S: AsRef<str>,
    {
        if self.state < VocabState::CollisionsResolved {
            return Err(SfileError::Precondition("resolve collisions before rewriting a corpus".into()));
        }

        // doc_id -> seen
        let mut wanted: Option<HashMap<&str, bool>> =
            doc_id_list.map(|ids| ids.iter().map(|id| (id.as_ref(), false)).collect());

        let mut written = 0usize;
        let mut dropped = 0usize;
        for record in RecordStream::new(reader, self.format, None) {
            let mut record = record?;
            if let Some(wanted) = wanted.as_mut() {
                let seen = record.doc_id.as_deref().and_then(|id| wanted.get_mut(id));
                match seen {
                    Some(seen) => *seen = true,
                    None => continue,
                }
            }

            let before = record.feature_values.len();
            record.feature_values = record
                .feature_values
                .into_iter()
                .filter_map(|(token, value)| self.id_of(&token).map(|id| (id.to_string(), value)))
                .collect::<IndexMap<_, _>>();
            dropped += before - record.feature_values.len();

            writeln!(writer, "{}", self.format.serialize(&record)?)?;
            written += 1;
        }
        writer.flush()?;

        if enforce_all_doc_id {
            if let Some(wanted) = wanted {
                let mut missing: Vec<String> = wanted
                    .into_iter()
                    .filter(|(_, seen)| !seen)
                    .map(|(id, _)| id.to_string())
                    .collect();
                if !missing.is_empty() {
                    missing.sort();
                    return Err(SfileError::Completion { missing });
                }
            }
        }

        info!("wrote {written} records, dropped {dropped} out-of-vocabulary features");
        self.state = VocabState::Rewritten;
        Ok(written)
    }

    /// `filter_sfile` between two paths. The output file is created (or
    /// truncated) and buffered.
    pub fn filter_sfile_path<P, Q, S>(
        &mut self,
        infile: P,
        outfile: Q,
        doc_id_list: Option<&[S]>,
        enforce_all_doc_id: bool,
    ) -> Result<usize>
    where
        P: AsRef<Path>,
        Q: AsRef<Path>,
        S: AsRef<str>,
    {
        let reader = BufReader::new(File::open(infile)?);
        let writer = BufWriter::new(File::create(outfile)?);
        self.filter_sfile(reader, writer, doc_id_list, enforce_all_doc_id)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use crate::sparse::SparseFormat;
    use crate::vocab::collision::ResolveConfig;
    use crate::vocab::hasher::TokenHasher;
    use crate::vocab::{VocabState, Vocabulary};
    use crate::error::SfileError;

    const CORPUS: &str = " 1 doc1| word1:1 word2:2\n 1 doc2| word1:1.1 word3:2";

    fn resolved() -> Vocabulary {
        let mut vocab = Vocabulary::new(SparseFormat::Vw, TokenHasher::new(18).unwrap());
        vocab.load_reader(Cursor::new(CORPUS), None).unwrap();
        vocab.resolve_collisions(&ResolveConfig { seed: Some(1), ..Default::default() }).unwrap();
        vocab
    }

    fn rewrite(vocab: &mut Vocabulary, doc_ids: Option<&[&str]>, enforce: bool) -> Result<String, SfileError> {
        let mut out = Vec::new();
        vocab.filter_sfile(Cursor::new(CORPUS), &mut out, doc_ids, enforce)?;
        Ok(String::from_utf8(out).unwrap())
    }

    #[test]
    fn rewrite_requires_resolution() {
        let mut vocab = Vocabulary::new(SparseFormat::Vw, TokenHasher::new(18).unwrap());
        vocab.load_reader(Cursor::new(CORPUS), None).unwrap();
        assert!(matches!(rewrite(&mut vocab, None, false), Err(SfileError::Precondition(_))));
    }

    #[test]
    fn removed_tokens_are_dropped_from_output() {
        let mut vocab = resolved();
        vocab.remove_tokens(["word1"]).unwrap();
        let h2 = vocab.id_of("word2").unwrap().to_string();
        let h3 = vocab.id_of("word3").unwrap().to_string();

        let out = rewrite(&mut vocab, None, false).unwrap();
        assert_eq!(out, format!(" 1 doc1| {h2}:2\n 1 doc2| {h3}:2\n"));
        assert_eq!(vocab.state(), VocabState::Rewritten);
    }

    #[test]
    fn keeps_float_values() {
        let mut vocab = resolved();
        let h1 = vocab.id_of("word1").unwrap().to_string();
        let out = rewrite(&mut vocab, None, false).unwrap();
        let second = out.lines().nth(1).unwrap();
        assert!(second.contains(&format!("{h1}:1.1")), "{second}");
    }

    #[test]
    fn doc_id_filter_limits_output() {
        let mut vocab = resolved();
        let out = rewrite(&mut vocab, Some(&["doc2"][..]), true).unwrap();
        assert_eq!(out.lines().count(), 1);
        assert!(out.starts_with(" 1 doc2|"));
    }

    #[test]
    fn unseen_doc_id_fails_completion() {
        let mut vocab = resolved();
        match rewrite(&mut vocab, Some(&["doc1", "doc3"][..]), true) {
            Err(SfileError::Completion { missing }) => assert_eq!(missing, vec!["doc3".to_string()]),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn unseen_doc_id_is_fine_when_not_enforced() {
        let mut vocab = resolved();
        let out = rewrite(&mut vocab, Some(&["doc1", "doc3"][..]), false).unwrap();
        assert_eq!(out.lines().count(), 1);
    }

    #[test]
    fn rewrite_can_run_again() {
        let mut vocab = resolved();
        let first = rewrite(&mut vocab, None, false).unwrap();
        let second = rewrite(&mut vocab, None, false).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn path_variant_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let infile = dir.path().join("in.vw");
        let outfile = dir.path().join("out.vw");
        std::fs::write(&infile, CORPUS).unwrap();

        let mut vocab = resolved();
        let n = vocab.filter_sfile_path(&infile, &outfile, None::<&[&str]>, false).unwrap();
        assert_eq!(n, 2);
        let out = std::fs::read_to_string(&outfile).unwrap();
        assert_eq!(out.lines().count(), 2);
    }
}
