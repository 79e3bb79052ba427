//! Bytecode interpreter of the Corten JVM
//!
//! This crate executes loaded classes:
//! - Frame-based interpretation of the JVM instruction set
//! - Static, special, virtual and interface dispatch with per-call-site
//!   inline caches
//! - Exception tables, unwinding and uncaught-exception reports
//! - Static initialization with `ExceptionInInitializerError` wrapping
//! - Root enumeration and safepoints for the copying collector
//! - Native methods bound to host functions
//! - The [`JavaVm`] embedding bridge
//!
//! # Example
//!
//! ```
//! use class_loader::{BootstrapResolver, InMemoryResolver};
//! use classfile::{ClassAccess, ClassWriter, MethodAccess, Opcode};
//! use core_types::Value;
//! use interpreter::{JavaVm, VmConfig};
//!
//! let mut math = ClassWriter::new("demo/Math", Some("java/lang/Object"), ClassAccess::PUBLIC);
//! math.add_method(MethodAccess::PUBLIC | MethodAccess::STATIC, "square", "(I)I", |c| {
//!     c.iload(0).iload(0).op(Opcode::Imul).op(Opcode::Ireturn);
//! })
//! .unwrap();
//!
//! let resolver = InMemoryResolver::new().with_class("demo/Math", math.to_bytes());
//! let vm = JavaVm::with_resolver(VmConfig::default(), BootstrapResolver::new(resolver)).unwrap();
//!
//! let outcome = vm.invoke_static("demo.Math", "square", "(I)I", vec![Value::Int(7)]);
//! assert_eq!(outcome.result(), Some(Value::Int(49)));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

mod builtins;
pub mod call_frame;
mod class_init;
pub mod config;
pub mod context;
mod dispatch;
pub mod exceptions;
pub mod execution;
mod gc_integration;
pub mod inline_cache;
mod invoke;
pub mod monitors;
pub mod natives;
pub mod strings;
pub mod thread;
pub mod vm;

// Re-export main types at crate root
pub use call_frame::{Frame, FrameStack};
pub use config::{OutputSink, VmConfig, DEFAULT_MAX_STACK_DEPTH, DEFAULT_THREAD_STACK_SIZE, DEFAULT_TIME_SLICE};
pub use context::VmContext;
pub use exceptions::Unwind;
pub use execution::ExecutionContext;
pub use inline_cache::{CallSite, InlineCache};
pub use monitors::MonitorTable;
pub use natives::{NativeEnv, NativeFn, NativeRegistry, NativeResult};
pub use strings::{format_primitive, java_hash};
pub use thread::{ThreadContext, ThreadOutcome};
pub use vm::{JavaVm, StatusCode};
