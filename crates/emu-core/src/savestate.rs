use bincode::config::{Configuration, Fixint, LittleEndian};
use bincode::error::{DecodeError, EncodeError};
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SaveStateError {
    #[error("error saving state: {source}")]
    Serialization {
        #[from]
        source: EncodeError,
    },

    #[error("error loading state: {source}")]
    Deserialization {
        #[from]
        source: DecodeError,
    },

    #[error("unsupported {component} state version {found} (supported: {supported})")]
    UnsupportedVersion {
        component: &'static str,
        found: u32,
        supported: u32,
    },

    #[error("invalid state: {0}")]
    InvalidState(&'static str),
}

const BINCODE_CONFIG: Configuration<LittleEndian, Fixint> = bincode::config::standard()
    .with_little_endian()
    .with_fixed_int_encoding();

/// Canonical save-state encoding: binary, little-endian, fixed-width
/// integers, length-prefixed collections. Encoding the decode of a stream
/// reproduces the stream byte-for-byte.
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, SaveStateError> {
    Ok(bincode::serde::encode_to_vec(value, BINCODE_CONFIG)?)
}

pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, SaveStateError> {
    let (value, read) = bincode::serde::decode_from_slice(bytes, BINCODE_CONFIG)?;
    if read != bytes.len() {
        return Err(SaveStateError::InvalidState("trailing bytes after state"));
    }
    Ok(value)
}

/// Readers bail on any version they do not recognize.
pub fn check_version(
    component: &'static str,
    found: u32,
    supported: u32,
) -> Result<(), SaveStateError> {
    if found == supported {
        Ok(())
    } else {
        Err(SaveStateError::UnsupportedVersion {
            component,
            found,
            supported,
        })
    }
}
