use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::Path;

use crate::error::Result;
use crate::sparse::{SparseFormat, SparseRecord};

/// Lazy, one-shot iterator over the records of a sparse file.
///
/// `limit` stops the stream after that many records. Parse errors carry the
/// 1-based line number and end the stream.
pub struct RecordStream<R> {
    lines: Lines<R>,
    format: SparseFormat,
    limit: Option<usize>,
    line_no: usize,
    failed: bool,
}

impl<R: BufRead> RecordStream<R> {
    pub fn new(reader: R, format: SparseFormat, limit: Option<usize>) -> Self {
        Self {
            lines: reader.lines(),
            format,
            limit,
            line_no: 0,
            failed: false,
        }
    }

    /// Number of lines consumed so far.
    pub fn line_no(&self) -> usize {
        self.line_no
    }

    /// Map records to their token lists (with repeats).
    pub fn tokens(self) -> TokenStream<R> {
        TokenStream { records: self }
    }
}

impl RecordStream<BufReader<File>> {
    pub fn from_path<P: AsRef<Path>>(path: P, format: SparseFormat, limit: Option<usize>) -> Result<Self> {
        let file = File::open(path)?;
        Ok(Self::new(BufReader::new(file), format, limit))
    }
}

impl<R: BufRead> Iterator for RecordStream<R> {
    type Item = Result<SparseRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.limit.is_some_and(|limit| self.line_no >= limit) {
            return None;
        }
        let line = match self.lines.next()? {
            Ok(line) => line,
            Err(e) => {
                self.failed = true;
                return Some(Err(e.into()));
            }
        };
        self.line_no += 1;
        let parsed = self.format.parse(&line).map_err(|e| e.at_line(self.line_no));
        if parsed.is_err() {
            self.failed = true;
        }
        Some(parsed)
    }
}

/// Token lists, one per record.
pub struct TokenStream<R> {
    records: RecordStream<R>,
}

impl<R: BufRead> Iterator for TokenStream<R> {
    type Item = Result<Vec<String>>;

    fn next(&mut self) -> Option<Self::Item> {
        let record = self.records.next()?;
        let line_no = self.records.line_no();
        let tokens = record.and_then(|r| r.to_token_list().map_err(|e| e.at_line(line_no)));
        if tokens.is_err() {
            self.records.failed = true;
        }
        Some(tokens)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::error::SfileError;

    const CORPUS: &str = " 1 a| x:2 y:1\n 1 b| y:3\n 1 c| z:\n";

    #[test]
    fn streams_every_record() {
        let ids: Vec<String> = RecordStream::new(Cursor::new(CORPUS), SparseFormat::Vw, None)
            .map(|r| r.unwrap().doc_id.unwrap())
            .collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn limit_is_honored_by_the_producer() {
        let stream = RecordStream::new(Cursor::new(CORPUS), SparseFormat::Vw, Some(2));
        assert_eq!(stream.count(), 2);
        let stream = RecordStream::new(Cursor::new(CORPUS), SparseFormat::Vw, Some(0));
        assert_eq!(stream.count(), 0);
    }

    #[test]
    fn error_carries_line_number_and_stops() {
        let data = " 1 a| x:1\nbroken line\n 1 c| z:1\n";
        let mut stream = RecordStream::new(Cursor::new(data), SparseFormat::Vw, None);
        assert!(stream.next().unwrap().is_ok());
        match stream.next().unwrap() {
            Err(SfileError::Format { line_no, .. }) => assert_eq!(line_no, Some(2)),
            other => panic!("unexpected {other:?}"),
        }
        assert!(stream.next().is_none());
    }

    #[test]
    fn token_stream_expands_counts() {
        let tokens: Vec<Vec<String>> = RecordStream::new(Cursor::new(CORPUS), SparseFormat::Vw, None)
            .tokens()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(tokens[0], vec!["x", "x", "y"]);
        assert_eq!(tokens[1], vec!["y", "y", "y"]);
        assert_eq!(tokens[2], vec!["z"]);
    }
}
