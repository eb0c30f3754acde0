//! Vowpal Wabbit style lines (namespaces are not supported).
//!
//! `[target] [importance [doc_id]]| feature1:[value1] feature2:[value2] ...`
//!
//! Every space, pipe and colon is significant.

use crate::error::{Result, SfileError};
use crate::sparse::{check_token, parse_features, write_features, SparseRecord, SparseValue};

pub(crate) fn parse(preamble: &str, features: &str) -> Result<SparseRecord> {
    let (target, importance, doc_id) = parse_preamble(preamble)?;
    // namespace 非対応なので feature 部は必ずスペースから始まる
    if !features.is_empty() && !features.starts_with(' ') {
        return Err(SfileError::format(format!(
            "feature segment must start with a space: {features:?}"
        )));
    }
    Ok(SparseRecord {
        feature_values: parse_features(features)?,
        target,
        importance,
        doc_id,
    })
}

type Preamble = (Option<SparseValue>, Option<SparseValue>, Option<String>);

/// Read `[target] [importance [doc_id]]`.
/// A doc_id sits right against the pipe, so it is peeled off from the right first.
fn parse_preamble(preamble: &str) -> Result<Preamble> {
    let (rest, doc_id) = match preamble.chars().last() {
        None | Some(' ') => (preamble, None),
        Some(_) => match preamble.rfind(' ') {
            Some(idx) => (&preamble[..idx], Some(preamble[idx + 1..].to_string())),
            None => ("", Some(preamble.to_string())),
        },
    };

    // target は最初のスペースまで、残りが importance
    let (target_str, importance_str) = rest.split_once(' ').unwrap_or((rest, ""));
    let mut importance_parts = importance_str.split_whitespace();
    let importance = importance_parts.next();
    if let Some(extra) = importance_parts.next() {
        return Err(SfileError::format(format!("unexpected preamble item {extra:?} in {preamble:?}")));
    }

    let target = match target_str {
        "" => None,
        t => Some(SparseValue::parse(t)?),
    };
    let importance = importance.map(SparseValue::parse).transpose()?;
    Ok((target, importance, doc_id))
}

pub(crate) fn serialize(record: &SparseRecord) -> Result<String> {
    let mut out = String::new();
    if let Some(target) = record.target {
        out.push_str(&target.to_string());
    }
    if let Some(importance) = record.importance {
        out.push(' ');
        out.push_str(&importance.to_string());
    }
    match &record.doc_id {
        Some(doc_id) => {
            if record.importance.is_none() {
                return Err(SfileError::format(format!(
                    "doc_id {doc_id:?} needs an importance in vw format"
                )));
            }
            check_token(doc_id)?;
            out.push(' ');
            out.push_str(doc_id);
            out.push('|');
        }
        None => out.push_str(" |"),
    }
    write_features(&mut out, &record.feature_values)?;
    Ok(out)
}
