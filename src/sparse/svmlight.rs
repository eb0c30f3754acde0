//! SVM-Light style lines, `<target> <feature>:<value> <feature>:<value> ...`
//!
//! Only the target is carried in the preamble. Importance and doc_id are
//! not representable and are dropped on serialization.

use crate::error::{Result, SfileError};
use crate::sparse::{parse_features, write_features, SparseRecord, SparseValue};

/// target を省略した場合に書き出す値
pub const DEFAULT_TARGET: SparseValue = SparseValue::Int(1);

pub(crate) fn parse(preamble: &str, features: &str) -> Result<SparseRecord> {
    if preamble.is_empty() {
        return Err(SfileError::format("svmlight line must start with a target"));
    }
    Ok(SparseRecord {
        feature_values: parse_features(features)?,
        target: Some(SparseValue::parse(preamble)?),
        importance: None,
        doc_id: None,
    })
}

pub(crate) fn serialize(record: &SparseRecord) -> Result<String> {
    let mut out = record.target.unwrap_or(DEFAULT_TARGET).to_string();
    write_features(&mut out, &record.feature_values)?;
    Ok(out)
}
