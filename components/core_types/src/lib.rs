//! Core JVM value types and error handling.
//!
//! This crate provides the foundational types shared by every component of
//! the virtual machine: the tagged [`Value`] representation of operand stack
//! and local variable entries, the handle types used to name heap objects
//! and classes, descriptor parsing, the class lifecycle state and the
//! [`JvmError`] type returned across every load/link/initialize/dispatch
//! boundary.
//!
//! # Overview
//!
//! - [`Value`] - Tagged representation of JVM values
//! - [`ObjectRef`] - Handle to a heap-resident object
//! - [`ClassId`] - Stable arena handle for a loaded class
//! - [`BasicType`] - Storage kind of a field or array element
//! - [`FieldType`] / [`MethodDescriptor`] - Parsed descriptors
//! - [`ClassState`] - Monotonic class lifecycle
//! - [`JvmError`] / [`ErrorKind`] - Typed failures
//!
//! # Examples
//!
//! ```
//! use core_types::{MethodDescriptor, Value, FieldType};
//!
//! let desc = MethodDescriptor::parse("(IJ[Ljava/lang/String;)V").unwrap();
//! assert_eq!(desc.parameters.len(), 3);
//! assert_eq!(desc.argument_slots(), 4);
//! assert!(desc.return_type.is_none());
//!
//! let value = Value::Long(7);
//! assert!(value.is_category2());
//! assert_eq!(FieldType::parse("D").unwrap(), FieldType::Double);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

mod descriptor;
mod error;
mod state;
mod value;

pub use descriptor::{FieldType, MethodDescriptor};
pub use error::{ErrorKind, JvmError, JvmResult};
pub use state::ClassState;
pub use value::{BasicType, ClassId, JavaThreadId, ObjectRef, Value};
