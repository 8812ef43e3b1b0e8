use thiserror::Error;

use crate::acpi::Signature;
use crate::net::MacAddr;

/// The physical memory window could not be mapped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("could not map {len:#x} bytes of physical memory at {base:#x}")]
pub struct MapError {
    pub base: u64,
    pub len: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScanError {
    #[error(transparent)]
    Map(#[from] MapError),

    #[error("out of memory allocating {len} bytes for table copy")]
    OutOfMemory { len: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("out of bounds: offset={offset:#x} len={len} table_len={table_len}")]
    OutOfBounds {
        offset: usize,
        len: usize,
        table_len: usize,
    },

    #[error("truncated {what}: need {need} bytes, have {have}")]
    Truncated {
        what: &'static str,
        need: usize,
        have: usize,
    },

    #[error("wrong table signature (expected {expected}, found {found})")]
    WrongSignature {
        expected: Signature,
        found: Signature,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExportError {
    #[error("no {0} available")]
    NotPresent(Signature),

    #[error("unrecognised I/O control code {0:#x}")]
    UnknownRequest(u32),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("could not open registry key {0}")]
    KeyNotFound(String),

    #[error("registry value {name:?} not found under {key}")]
    ValueNotFound { key: String, name: String },

    #[error("registry value {name:?} under {key} has the wrong type")]
    TypeMismatch { key: String, name: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NicError {
    #[error("{0} not found")]
    NotFound(MacAddr),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}
