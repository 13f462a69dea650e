use std::io::ErrorKind;

use thiserror::Error;

use crate::version::{MAX_SUPPORTED_VERSION, MIN_SUPPORTED_VERSION};

/// Errors surfaced by the reader
#[derive(Debug, Error)]
pub enum HicError {
    /// The container is not a readable .hic file: bad magic, truncated header or footer
    #[error("Invalid container format: {0}")]
    Format(String),

    #[error(
        "Unsupported file version {0} (supported versions are {min} to {max})",
        min = MIN_SUPPORTED_VERSION,
        max = MAX_SUPPORTED_VERSION
    )]
    UnsupportedVersion(i32),

    /// A block payload could not be decoded
    #[error("Failed to decode block{}: {reason}", block_label(.block))]
    Decode { block: Option<u32>, reason: String },

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Unknown chromosome {0:?}")]
    UnknownChromosome(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, HicError>;

fn block_label(block: &Option<u32>) -> String {
    block.map(|b| format!(" {}", b)).unwrap_or_default()
}

impl HicError {
    pub(crate) fn decode<S: Into<String>>(block: Option<u32>, reason: S) -> Self {
        HicError::Decode {
            block,
            reason: reason.into(),
        }
    }

    /// Reinterpret an I/O error raised while parsing metadata: running out of bytes
    /// means the container is truncated.
    pub(crate) fn from_metadata_io(what: &str, err: std::io::Error) -> Self {
        match err.kind() {
            ErrorKind::UnexpectedEof => {
                HicError::Format(format!("Truncated {}: {}", what, err))
            }
            ErrorKind::InvalidData => HicError::Format(format!("Malformed {}: {}", what, err)),
            _ => HicError::Io(err),
        }
    }

    /// Reinterpret an I/O error raised while decoding a decompressed payload
    pub(crate) fn from_payload_io(block: u32, err: std::io::Error) -> Self {
        match err.kind() {
            ErrorKind::UnexpectedEof | ErrorKind::InvalidData => {
                HicError::decode(Some(block), format!("malformed payload: {}", err))
            }
            _ => HicError::Io(err),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_messages() {
        let err = HicError::UnsupportedVersion(3);
        assert!(err.to_string().contains("version 3"));

        let err = HicError::decode(Some(12), "unknown block type 7");
        assert_eq!(
            err.to_string(),
            "Failed to decode block 12: unknown block type 7"
        );
        let err = HicError::decode(None, "bad");
        assert_eq!(err.to_string(), "Failed to decode block: bad");
    }

    #[test]
    fn test_truncation_maps_to_format() {
        let eof = std::io::Error::new(ErrorKind::UnexpectedEof, "eof");
        assert!(matches!(
            HicError::from_metadata_io("header", eof),
            HicError::Format(_)
        ));
        let eof = std::io::Error::new(ErrorKind::UnexpectedEof, "eof");
        assert!(matches!(
            HicError::from_payload_io(4, eof),
            HicError::Decode { block: Some(4), .. }
        ));
        let other = std::io::Error::new(ErrorKind::Other, "disk on fire");
        assert!(matches!(
            HicError::from_metadata_io("footer", other),
            HicError::Io(_)
        ));
    }
}
