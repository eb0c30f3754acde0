pub mod vw;
pub mod svmlight;
pub mod stream;
pub mod convert;
pub mod tokenize;

use core::fmt;
use std::ops::{Add, AddAssign};
use std::str::FromStr;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SfileError};

/// 特徴量の値
/// 整数として読めるものは `Int`、それ以外は `Float`
///
/// Equality is numeric, so `Int(2) == Float(2.0)`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub enum SparseValue {
    Int(i64),
    Float(f64),
}

impl SparseValue {
    /// Parse a value, integer first and float as a fallback.
    pub fn parse(s: &str) -> Result<Self> {
        if let Ok(i) = s.parse::<i64>() {
            return Ok(SparseValue::Int(i));
        }
        s.parse::<f64>()
            .map(SparseValue::Float)
            .map_err(|_| SfileError::format(format!("not a number: {s:?}")))
    }

    #[inline]
    pub fn as_f64(&self) -> f64 {
        match *self {
            SparseValue::Int(i) => i as f64,
            SparseValue::Float(f) => f,
        }
    }

    /// The value as a token count, if it is a non-negative integer.
    pub fn as_count(&self) -> Option<u64> {
        match *self {
            SparseValue::Int(i) => u64::try_from(i).ok(),
            SparseValue::Float(f) => {
                if f >= 0.0 && f.fract() == 0.0 && f <= u64::MAX as f64 {
                    Some(f as u64)
                } else {
                    None
                }
            }
        }
    }
}

impl Default for SparseValue {
    fn default() -> Self {
        SparseValue::Int(0)
    }
}

impl PartialEq for SparseValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (SparseValue::Int(a), SparseValue::Int(b)) => a == b,
            _ => self.as_f64() == other.as_f64(),
        }
    }
}

impl Add for SparseValue {
    type Output = SparseValue;

    fn add(self, rhs: Self) -> Self::Output {
        match (self, rhs) {
            (SparseValue::Int(a), SparseValue::Int(b)) => match a.checked_add(b) {
                Some(sum) => SparseValue::Int(sum),
                None => SparseValue::Float(a as f64 + b as f64),
            },
            (a, b) => SparseValue::Float(a.as_f64() + b.as_f64()),
        }
    }
}

impl AddAssign for SparseValue {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl From<i64> for SparseValue {
    fn from(value: i64) -> Self {
        SparseValue::Int(value)
    }
}

impl From<i32> for SparseValue {
    fn from(value: i32) -> Self {
        SparseValue::Int(value as i64)
    }
}

impl From<f64> for SparseValue {
    fn from(value: f64) -> Self {
        SparseValue::Float(value)
    }
}

impl fmt::Display for SparseValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SparseValue::Int(i) => write!(f, "{i}"),
            // Debug keeps the decimal point: 2.0 stays "2.0"
            SparseValue::Float(x) => write!(f, "{x:?}"),
        }
    }
}

/// Largest per-feature count `to_token_list` will expand.
pub const MAX_TOKEN_REPEAT: u64 = 1_000_000;

/// One document's sparse feature vector.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SparseRecord {
    /// feature token -> weight
    #[serde(with = "indexmap::map::serde_seq")]
    pub feature_values: IndexMap<String, SparseValue>,
    pub target: Option<SparseValue>,
    pub importance: Option<SparseValue>,
    pub doc_id: Option<String>,
}

impl SparseRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a record from token counts.
    pub fn from_counts<I, S>(counts: I) -> Self
    where
        I: IntoIterator<Item = (S, u64)>,
        S: Into<String>,
    {
        let feature_values = counts
            .into_iter()
            .map(|(token, count)| (token.into(), SparseValue::Int(count as i64)))
            .collect();
        SparseRecord { feature_values, ..Default::default() }
    }

    pub fn with_doc_id(mut self, doc_id: impl Into<String>) -> Self {
        self.doc_id = Some(doc_id.into());
        self
    }

    pub fn with_importance(mut self, importance: impl Into<SparseValue>) -> Self {
        self.importance = Some(importance.into());
        self
    }

    pub fn with_target(mut self, target: impl Into<SparseValue>) -> Self {
        self.target = Some(target.into());
        self
    }

    /// Expand the record into a token list with repeats.
    /// `{"hi": 2, "bye": 1}` gives `["hi", "hi", "bye"]`.
    ///
    /// Every weight must be a non-negative integer no larger than
    /// `MAX_TOKEN_REPEAT`.
    pub fn to_token_list(&self) -> Result<Vec<String>> {
        let mut tokens = Vec::new();
        for (token, value) in &self.feature_values {
            let count = value
                .as_count()
                .filter(|&count| count <= MAX_TOKEN_REPEAT)
                .ok_or_else(|| SfileError::format(format!("weight {value} of {token:?} is not a usable token count")))?;
            tokens.extend(std::iter::repeat(token.clone()).take(count as usize));
        }
        Ok(tokens)
    }
}

/// Sparse line format.
///
/// - `Vw`: `[target] [importance [doc_id]]| feature1:[value1] feature2:[value2] ...`
/// - `SvmLight`: `<target> feature1:value1 feature2:value2 ...`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SparseFormat {
    #[default]
    Vw,
    SvmLight,
}

impl SparseFormat {
    /// preamble と feature を分ける文字
    #[inline]
    pub fn separator(&self) -> char {
        match self {
            SparseFormat::Vw => '|',
            SparseFormat::SvmLight => ' ',
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            SparseFormat::Vw => "vw",
            SparseFormat::SvmLight => "svmlight",
        }
    }

    /// Parse one line (a trailing `\n` / `\r\n` is ignored).
    pub fn parse(&self, line: &str) -> Result<SparseRecord> {
        let line = line.trim_end_matches(['\n', '\r']);
        let (preamble, features) = split_at_separator(line, self.separator())?;
        match self {
            SparseFormat::Vw => vw::parse(preamble, features),
            SparseFormat::SvmLight => svmlight::parse(preamble, features),
        }
    }

    /// Serialize a record to one line, without the newline.
    pub fn serialize(&self, record: &SparseRecord) -> Result<String> {
        match self {
            SparseFormat::Vw => vw::serialize(record),
            SparseFormat::SvmLight => svmlight::serialize(record),
        }
    }

    /// Parse a line straight to its token list.
    pub fn line_to_tokens(&self, line: &str) -> Result<Vec<String>> {
        self.parse(line)?.to_token_list()
    }
}

impl FromStr for SparseFormat {
    type Err = SfileError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "vw" => Ok(SparseFormat::Vw),
            "svmlight" | "svm" => Ok(SparseFormat::SvmLight),
            other => Err(SfileError::Configuration(format!("unknown sparse format: {other:?}"))),
        }
    }
}

impl fmt::Display for SparseFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn split_at_separator(line: &str, sep: char) -> Result<(&str, &str)> {
    match line.find(sep) {
        Some(idx) => Ok((&line[..idx], &line[idx + sep.len_utf8()..])),
        None => Err(SfileError::format(format!("separator {sep:?} not found in {line:?}"))),
    }
}

/// Parse whitespace separated `token:value` items.
/// Every item needs exactly one ':'; an empty value (`token:`) means 1.
pub(crate) fn parse_features(segment: &str) -> Result<IndexMap<String, SparseValue>> {
    let mut feature_values = IndexMap::new();
    for item in segment.split_whitespace() {
        let (token, value) = item
            .split_once(':')
            .ok_or_else(|| SfileError::format(format!("missing ':' in feature {item:?}")))?;
        if value.contains(':') {
            return Err(SfileError::format(format!("more than one ':' in feature {item:?}")));
        }
        check_token(token)?;
        let value = match value {
            "" => SparseValue::Int(1),
            v => SparseValue::parse(v)?,
        };
        feature_values.insert(token.to_string(), value);
    }
    Ok(feature_values)
}

/// Append ` token:value` for every feature.
pub(crate) fn write_features(out: &mut String, feature_values: &IndexMap<String, SparseValue>) -> Result<()> {
    use std::fmt::Write;
    for (token, value) in feature_values {
        check_token(token)?;
        // String への write! は失敗しない
        let _ = write!(out, " {token}:{value}");
    }
    Ok(())
}

/// Tokens and doc ids must be non-empty runs free of whitespace, ':' and '|'.
pub(crate) fn check_token(token: &str) -> Result<()> {
    if token.is_empty() || token.chars().any(|c| c.is_whitespace() || c == ':' || c == '|') {
        return Err(SfileError::format(format!("invalid token {token:?}")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_parse_prefers_integers() {
        assert!(matches!(SparseValue::parse("2").unwrap(), SparseValue::Int(2)));
        assert!(matches!(SparseValue::parse("1.1").unwrap(), SparseValue::Float(_)));
        assert!(SparseValue::parse("abc").is_err());
    }

    #[test]
    fn value_display_keeps_float_marker() {
        assert_eq!(SparseValue::Int(2).to_string(), "2");
        assert_eq!(SparseValue::Float(2.0).to_string(), "2.0");
        assert_eq!(SparseValue::Float(1.1).to_string(), "1.1");
    }

    #[test]
    fn value_sum_mixes_int_and_float() {
        let mut v = SparseValue::Int(1);
        v += SparseValue::Float(1.1);
        assert!((v.as_f64() - 2.1).abs() < 1e-12);
        assert_eq!(SparseValue::Int(2) + SparseValue::Int(3), SparseValue::Int(5));
        assert_eq!(SparseValue::Int(2), SparseValue::Float(2.0));
    }

    #[test]
    fn features_empty_value_means_one() {
        let fv = parse_features("b:3 c:").unwrap();
        assert_eq!(fv["b"], SparseValue::Int(3));
        assert_eq!(fv["c"], SparseValue::Int(1));
    }

    #[test]
    fn features_reject_wrong_colon_count_and_empty_token() {
        assert!(parse_features("a:1:2").is_err());
        assert!(parse_features(":4").is_err());
        assert!(parse_features("a").is_err());
        assert!(SparseFormat::Vw.parse(" 1 d| word other:2").is_err());
    }

    #[test]
    fn features_reject_reserved_characters() {
        assert!(parse_features("a|b:1").is_err());
        assert!(SparseFormat::Vw.parse(" 1 d| a|b:1").is_err());
        assert!(SparseFormat::SvmLight.parse("1 a|b:1").is_err());
    }

    #[test]
    fn token_list_expands_counts() {
        let rec = SparseFormat::Vw.parse(" 1 d| hi:2 bye:").unwrap();
        assert_eq!(rec.to_token_list().unwrap(), vec!["hi", "hi", "bye"]);

        let rec = SparseFormat::Vw.parse(" | hi:0.5").unwrap();
        assert!(rec.to_token_list().is_err());
    }

    #[test]
    fn token_list_rejects_huge_counts() {
        let rec = SparseFormat::Vw.parse(" 1 d| hi:100000000000").unwrap();
        assert!(matches!(rec.to_token_list(), Err(SfileError::Format { .. })));
    }

    #[test]
    fn format_from_str() {
        assert_eq!("vw".parse::<SparseFormat>().unwrap(), SparseFormat::Vw);
        assert_eq!("SVMLight".parse::<SparseFormat>().unwrap(), SparseFormat::SvmLight);
        assert!("csv".parse::<SparseFormat>().is_err());
    }

    #[test]
    fn round_trip_both_formats() {
        let mut rec = SparseRecord::new().with_target(1);
        rec.feature_values.insert("alpha".into(), SparseValue::Int(3));
        rec.feature_values.insert("beta".into(), SparseValue::Float(0.25));

        for format in [SparseFormat::Vw, SparseFormat::SvmLight] {
            let line = format.serialize(&rec).unwrap();
            assert_eq!(format.parse(&line).unwrap(), rec, "{format}: {line:?}");
        }

        let rec = rec.with_importance(2);
        let line = SparseFormat::Vw.serialize(&rec).unwrap();
        assert_eq!(SparseFormat::Vw.parse(&line).unwrap(), rec);
    }
}
