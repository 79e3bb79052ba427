//! Class file format errors.

use core_types::JvmError;
use thiserror::Error;

/// Reasons a class file is rejected by the reader.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClassFormatError {
    /// Input ended before a complete structure was read
    #[error("truncated class file at offset {offset}")]
    UnexpectedEof {
        /// Byte offset where more input was expected
        offset: usize,
    },
    /// The first four bytes are not `0xCAFEBABE`
    #[error("bad magic number {0:#010x}")]
    BadMagic(u32),
    /// Unsupported major/minor version
    #[error("unsupported class file version {major}.{minor}")]
    UnsupportedVersion {
        /// Major version
        major: u16,
        /// Minor version
        minor: u16,
    },
    /// Unknown constant pool tag
    #[error("unknown constant pool tag {tag} at index {index}")]
    BadConstantTag {
        /// Pool index
        index: u16,
        /// Offending tag byte
        tag: u8,
    },
    /// A constant pool index is out of range or refers to the wrong kind
    #[error("constant pool index {index} is not a valid {expected}")]
    BadConstantIndex {
        /// Pool index
        index: u16,
        /// Kind of entry that was required
        expected: &'static str,
    },
    /// Invalid modified UTF-8 in a `CONSTANT_Utf8` entry
    #[error("invalid modified UTF-8 in constant {index}")]
    InvalidUtf8 {
        /// Pool index
        index: u16,
    },
    /// Any other structural violation
    #[error("{0}")]
    Malformed(String),
}

impl From<ClassFormatError> for JvmError {
    fn from(err: ClassFormatError) -> Self {
        JvmError::class_format(err.to_string())
    }
}

/// Result alias for class file operations.
pub type Result<T> = std::result::Result<T, ClassFormatError>;
