//! Class file system for the Corten JVM
//!
//! This crate reads the standard class file binary format into a validated
//! in-memory structure, defines the JVM instruction set, and provides a
//! writer used to synthesize runtime classes and to assemble test programs.
//!
//! # Features
//!
//! - Complete constant pool support, including modified UTF-8
//! - Access flag sets for classes, fields and methods
//! - `Code`, `ConstantValue`, `LineNumberTable` and `SourceFile` attributes
//! - Opcode table with mnemonics and operand lengths
//! - `ClassWriter` with label-based branch patching and exception tables
//!
//! # Example
//!
//! ```
//! use classfile::{ClassAccess, ClassFile, ClassWriter, MethodAccess, Opcode};
//!
//! let mut writer = ClassWriter::new("demo/Hello", Some("java/lang/Object"), ClassAccess::PUBLIC);
//! writer
//!     .add_method(MethodAccess::PUBLIC | MethodAccess::STATIC, "twice", "(I)I", |code| {
//!         code.iload(0).iconst(2).op(Opcode::Imul).op(Opcode::Ireturn);
//!     })
//!     .unwrap();
//!
//! let bytes = writer.to_bytes();
//! let class = ClassFile::parse(&bytes).unwrap();
//! assert_eq!(class.methods.len(), 1);
//! assert_eq!(class.methods[0].name, "twice");
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod access;
pub mod class_file;
pub mod constant_pool;
pub mod error;
pub mod opcode;
pub mod reader;
pub mod writer;

// Re-export main types at crate root
pub use access::{ClassAccess, FieldAccess, MethodAccess};
pub use class_file::{
    ClassFile, CodeAttribute, ConstantValue, ExceptionTableEntry, FieldEntry, MethodEntry,
};
pub use constant_pool::{Constant, ConstantPool, Loadable, MemberRef};
pub use error::ClassFormatError;
pub use opcode::Opcode;
pub use writer::{ClassWriter, CodeBuilder, Label};
