//! Error types.
//!
//! Only [`ClientError`] ever reaches the caller, and only at startup.
//! A [`DecodeError`] is confined to the frame that caused it: the frame is
//! logged and dropped.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("brotli decompression failed for {frame_len}-byte frame: {source}")]
    Decompress {
        frame_len: usize,
        #[source]
        source: std::io::Error,
    },

    #[error("frame payload is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("frame payload is JSON but not a record array")]
    NotABatch,
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid configuration: {0}")]
    Config(String),
}

pub type Result<T, E = ClientError> = std::result::Result<T, E>;
