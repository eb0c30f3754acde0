use thiserror::Error;

/// crate 全体のエラー
#[derive(Debug, Error)]
pub enum SfileError {
    /// malformed sparse record line
    #[error("format error{}: {msg}", .line_no.map(|n| format!(" at line {n}")).unwrap_or_default())]
    Format {
        msg: String,
        line_no: Option<usize>,
    },

    /// invalid hashing setup
    #[error("configuration error: {0}")]
    Configuration(String),

    /// raw vocabulary collides too often for random probing to be worth it
    #[error("too many collisions: {collisions} of {vocab_size} tokens share an id")]
    Collision {
        collisions: usize,
        vocab_size: usize,
    },

    #[error("no free id found for token {token:?} after {attempts} probes")]
    ProbeExhausted {
        token: String,
        attempts: usize,
    },

    /// operation called in the wrong lifecycle state
    #[error("precondition failed: {0}")]
    Precondition(String),

    /// doc_id filter was not fully satisfied by the stream
    #[error("{} requested doc_id(s) never seen: {}", .missing.len(), .missing.join(", "))]
    Completion {
        missing: Vec<String>,
    },

    #[error("token not in vocabulary: {0:?}")]
    UnknownToken(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("vocabulary persistence failed: {0}")]
    Persist(#[from] serde_cbor::Error),
}

impl SfileError {
    pub(crate) fn format(msg: impl Into<String>) -> Self {
        SfileError::Format { msg: msg.into(), line_no: None }
    }

    /// 行番号を付け直す (stream 側で使う)
    pub(crate) fn at_line(self, line_no: usize) -> Self {
        match self {
            SfileError::Format { msg, .. } => SfileError::Format { msg, line_no: Some(line_no) },
            other => other,
        }
    }
}

pub type Result<T> = std::result::Result<T, SfileError>;
