//! Access flag sets for classes, fields and methods.

use bitflags::bitflags;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    /// Class access and property modifiers
    pub struct ClassAccess : u16 {
        /// Declared public
        const PUBLIC = 0x0001;
        /// No subclasses allowed
        const FINAL = 0x0010;
        /// Treat superclass methods specially in invokespecial
        const SUPER = 0x0020;
        /// Is an interface
        const INTERFACE = 0x0200;
        /// Must not be instantiated
        const ABSTRACT = 0x0400;
        /// Not present in source
        const SYNTHETIC = 0x1000;
        /// Annotation interface
        const ANNOTATION = 0x2000;
        /// Enum class
        const ENUM = 0x4000;
        /// Module descriptor
        const MODULE = 0x8000;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    /// Field access and property modifiers
    pub struct FieldAccess : u16 {
        /// Declared public
        const PUBLIC = 0x0001;
        /// Declared private
        const PRIVATE = 0x0002;
        /// Declared protected
        const PROTECTED = 0x0004;
        /// Declared static
        const STATIC = 0x0008;
        /// Never assigned after construction
        const FINAL = 0x0010;
        /// Cannot be cached
        const VOLATILE = 0x0040;
        /// Not serialized
        const TRANSIENT = 0x0080;
        /// Not present in source
        const SYNTHETIC = 0x1000;
        /// Enum constant
        const ENUM = 0x4000;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    /// Method access and property modifiers
    pub struct MethodAccess : u16 {
        /// Declared public
        const PUBLIC = 0x0001;
        /// Declared private
        const PRIVATE = 0x0002;
        /// Declared protected
        const PROTECTED = 0x0004;
        /// Declared static
        const STATIC = 0x0008;
        /// Must not be overridden
        const FINAL = 0x0010;
        /// Invocation is wrapped by a monitor
        const SYNCHRONIZED = 0x0020;
        /// Compiler-generated bridge
        const BRIDGE = 0x0040;
        /// Variable arity
        const VARARGS = 0x0080;
        /// Implemented by the host
        const NATIVE = 0x0100;
        /// No implementation
        const ABSTRACT = 0x0400;
        /// FP-strict
        const STRICT = 0x0800;
        /// Not present in source
        const SYNTHETIC = 0x1000;
    }
}
