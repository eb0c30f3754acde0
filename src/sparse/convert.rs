use std::io::{BufRead, Write};

use log::{info, warn};

use crate::error::Result;
use crate::sparse::stream::RecordStream;
use crate::sparse::SparseFormat;

/// Rewrite a sparse file from one format to another.
///
/// Converting vw to svmlight drops importance and doc_id; a warning is
/// logged once when that happens.
/// Returns the number of records written.
pub fn convert<R, W>(reader: R, mut writer: W, from: SparseFormat, to: SparseFormat, limit: Option<usize>) -> Result<usize>
where
    R: BufRead,
    W: Write,
{
    let mut written = 0usize;
    let mut warned = false;
    for record in RecordStream::new(reader, from, limit) {
        let record = record?;
        if to == SparseFormat::SvmLight && !warned && (record.doc_id.is_some() || record.importance.is_some()) {
            warn!("svmlight output drops importance and doc_id");
            warned = true;
        }
        writeln!(writer, "{}", to.serialize(&record)?)?;
        written += 1;
    }
    writer.flush()?;
    info!("converted {written} records from {from} to {to}");
    Ok(written)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn vw_to_svmlight_and_back() {
        let vw = "1 2 d1| 3:1 9:2.5\n0 1 d2| 4:7\n";
        let mut svm = Vec::new();
        let n = convert(Cursor::new(vw), &mut svm, SparseFormat::Vw, SparseFormat::SvmLight, None).unwrap();
        assert_eq!(n, 2);
        assert_eq!(String::from_utf8(svm.clone()).unwrap(), "1 3:1 9:2.5\n0 4:7\n");

        let mut back = Vec::new();
        convert(Cursor::new(svm), &mut back, SparseFormat::SvmLight, SparseFormat::Vw, None).unwrap();
        assert_eq!(String::from_utf8(back).unwrap(), "1 | 3:1 9:2.5\n0 | 4:7\n");
    }

    #[test]
    fn bad_input_propagates() {
        let mut out = Vec::new();
        let res = convert(Cursor::new("no separator\n"), &mut out, SparseFormat::Vw, SparseFormat::SvmLight, None);
        assert!(res.is_err());
    }
}
