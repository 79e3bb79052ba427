//! JVM error types and error handling.
//!
//! This module provides the error kinds produced at load, link, initialize
//! and dispatch boundaries, along with the Java throwable each kind maps to
//! when it surfaces inside running bytecode.

use std::fmt;

use thiserror::Error;

/// The kind of VM error.
///
/// Most kinds correspond to a `java.lang` error class; see
/// [`ErrorKind::throwable_class`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// No bytes for the requested class name
    NotFound,
    /// Malformed class file, or name mismatch
    ClassFormat,
    /// Bad superclass, interface or override
    Linkage,
    /// A class is its own superclass or superinterface
    ClassCircularity,
    /// Sticky static initialization failure
    Initialization,
    /// Method resolution failed
    NoSuchMethod,
    /// Field resolution failed
    NoSuchField,
    /// Invocation selected an abstract method
    AbstractMethod,
    /// Static/instance or class/interface mismatch at a call or field site
    IncompatibleClassChange,
    /// Native method without a registered implementation
    UnsatisfiedLink,
    /// Heap exhausted after a full collection
    OutOfMemory,
    /// Frame limit exceeded
    StackOverflow,
    /// Unsupported instruction or feature
    Unsupported,
    /// Internal VM invariant violated
    Internal,
    /// Failure reading classpath entries
    Io,
}

impl ErrorKind {
    /// Returns the internal name of the Java throwable raised for this kind
    /// when it occurs while bytecode is executing.
    ///
    /// `None` means the condition is fatal for the thread and cannot be
    /// caught by Java code.
    pub fn throwable_class(self) -> Option<&'static str> {
        match self {
            ErrorKind::NotFound | ErrorKind::Initialization => {
                Some("java/lang/NoClassDefFoundError")
            }
            ErrorKind::ClassFormat => Some("java/lang/ClassFormatError"),
            ErrorKind::Linkage => Some("java/lang/LinkageError"),
            ErrorKind::ClassCircularity => Some("java/lang/ClassCircularityError"),
            ErrorKind::NoSuchMethod => Some("java/lang/NoSuchMethodError"),
            ErrorKind::NoSuchField => Some("java/lang/NoSuchFieldError"),
            ErrorKind::AbstractMethod => Some("java/lang/AbstractMethodError"),
            ErrorKind::IncompatibleClassChange => {
                Some("java/lang/IncompatibleClassChangeError")
            }
            ErrorKind::UnsatisfiedLink => Some("java/lang/UnsatisfiedLinkError"),
            ErrorKind::StackOverflow => Some("java/lang/StackOverflowError"),
            ErrorKind::Unsupported => Some("java/lang/UnsupportedOperationException"),
            ErrorKind::OutOfMemory | ErrorKind::Internal | ErrorKind::Io => None,
        }
    }

    /// Returns true for failures while linking a class: bad supertypes,
    /// incompatible overrides and inheritance cycles.
    pub fn is_linkage(self) -> bool {
        matches!(self, ErrorKind::Linkage | ErrorKind::ClassCircularity)
    }

    /// Returns true if a failure of this kind terminates the thread.
    pub fn is_fatal(self) -> bool {
        self.throwable_class().is_none()
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::NotFound => "NotFound",
            ErrorKind::ClassFormat => "ClassFormatError",
            ErrorKind::Linkage => "LinkageError",
            ErrorKind::ClassCircularity => "ClassCircularityError",
            ErrorKind::Initialization => "InitializationError",
            ErrorKind::NoSuchMethod => "NoSuchMethodError",
            ErrorKind::NoSuchField => "NoSuchFieldError",
            ErrorKind::AbstractMethod => "AbstractMethodError",
            ErrorKind::IncompatibleClassChange => "IncompatibleClassChangeError",
            ErrorKind::UnsatisfiedLink => "UnsatisfiedLinkError",
            ErrorKind::OutOfMemory => "OutOfMemory",
            ErrorKind::StackOverflow => "StackOverflowError",
            ErrorKind::Unsupported => "Unsupported",
            ErrorKind::Internal => "InternalError",
            ErrorKind::Io => "IoError",
        };
        f.write_str(name)
    }
}

/// A VM error with kind and message.
///
/// # Examples
///
/// ```
/// use core_types::{ErrorKind, JvmError};
///
/// let error = JvmError::not_found("com/example/Missing");
///
/// assert_eq!(error.kind, ErrorKind::NotFound);
/// assert_eq!(error.to_string(), "NotFound: com/example/Missing");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct JvmError {
    /// The type of error
    pub kind: ErrorKind,
    /// Human-readable error message
    pub message: String,
}

/// Result alias used across the VM crates.
pub type JvmResult<T> = Result<T, JvmError>;

impl JvmError {
    /// Creates an error of the given kind.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        JvmError {
            kind,
            message: message.into(),
        }
    }

    /// Class bytes could not be found.
    pub fn not_found(class_name: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, class_name)
    }

    /// Malformed class file.
    pub fn class_format(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ClassFormat, message)
    }

    /// Linking failure.
    pub fn linkage(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Linkage, message)
    }

    /// Sticky initialization failure.
    pub fn initialization(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Initialization, message)
    }

    /// Method resolution failure.
    pub fn no_such_method(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NoSuchMethod, message)
    }

    /// Field resolution failure.
    pub fn no_such_field(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NoSuchField, message)
    }

    /// Heap exhausted.
    pub fn out_of_memory(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::OutOfMemory, message)
    }

    /// Internal invariant violation.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    /// Unsupported feature.
    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unsupported, message)
    }
}

impl From<std::io::Error> for JvmError {
    fn from(err: std::io::Error) -> Self {
        JvmError::new(ErrorKind::Io, err.to_string())
    }
}
