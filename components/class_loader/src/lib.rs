//! Class Loader - Type graph of the Corten JVM
//!
//! This component turns class names into linked class descriptors:
//! - Classpath resolvers for directories, jar archives and in-memory maps
//! - Parsing, hierarchy checks, field layout and virtual tables
//! - The per-class lifecycle from `Allocated` to `FullyInitialized`
//! - Method and field resolution, virtual and interface selection
//! - Runtime classes (`Object`, `String`, `System`, throwables, ...)
//!   synthesized when the classpath does not provide them
//!
//! # Example
//!
//! ```
//! use class_loader::{BootstrapResolver, ClassLoader, InMemoryResolver};
//! use classfile::{ClassAccess, ClassWriter};
//! use core_types::ClassState;
//!
//! let point = ClassWriter::new("demo/Point", Some("java/lang/Object"), ClassAccess::PUBLIC);
//! let resolver = InMemoryResolver::new().with_class("demo/Point", point.to_bytes());
//! let loader = ClassLoader::new(BootstrapResolver::new(resolver));
//!
//! let class = loader.resolve("demo/Point").unwrap();
//! assert_eq!(class.state(), ClassState::Linked);
//! assert_eq!(
//!     loader.get(class.super_class().unwrap()).unwrap().name(),
//!     "java/lang/Object"
//! );
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod bootstrap;
pub mod class;
pub mod init;
mod linker;
pub mod loader;
pub mod names;
pub mod resolver;

pub use bootstrap::BootstrapResolver;
pub use class::{
    ArrayClass, ArrayComponent, ClassDescriptor, ClassKind, FieldInfo, InstanceClass, Linkage,
    MethodInfo,
};
pub use init::InitAction;
pub use loader::ClassLoader;
pub use resolver::{ClasspathResolver, Classpath, DirectoryResolver, InMemoryResolver, JarResolver};
