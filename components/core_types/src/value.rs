//! JVM value representation.
//!
//! This module provides the core `Value` enum used for operand stack entries,
//! local variable slots and field contents, plus the handle types that name
//! heap objects and loaded classes.

use std::fmt;
use std::num::NonZeroU32;

/// Handle to an object stored in the garbage-collected heap.
///
/// The handle is the object's byte offset inside the active semispace. The
/// offset is never zero, so `Option<ObjectRef>` has the same size as the
/// handle and `None` is the Java `null`.
///
/// A handle is only meaningful until the next collection: the collector
/// rewrites every handle it finds in the root set, so handles must live in
/// a root (frame slot, static storage, handle area) across allocations.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectRef(NonZeroU32);

impl ObjectRef {
    /// Creates a handle from a raw heap offset. Returns `None` for zero.
    pub fn from_offset(offset: u32) -> Option<Self> {
        NonZeroU32::new(offset).map(ObjectRef)
    }

    /// Returns the raw heap offset of this handle.
    pub fn offset(self) -> u32 {
        self.0.get()
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectRef(@{:#x})", self.0.get())
    }
}

/// Stable handle of a class descriptor inside the loader arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassId(pub u32);

impl ClassId {
    /// Returns the arena index of this class.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Identity of a logical Java thread (one per `ThreadContext`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JavaThreadId(pub u64);

/// Storage kind of a field or array element.
///
/// The discriminants are stable and stored in heap object headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum BasicType {
    /// `Z`
    Boolean = 1,
    /// `B`
    Byte = 2,
    /// `C`
    Char = 3,
    /// `S`
    Short = 4,
    /// `I`
    Int = 5,
    /// `J`
    Long = 6,
    /// `F`
    Float = 7,
    /// `D`
    Double = 8,
    /// `L...;` or `[...`
    Reference = 9,
}

impl BasicType {
    /// Decodes a header tag produced by `BasicType as u8`.
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(BasicType::Boolean),
            2 => Some(BasicType::Byte),
            3 => Some(BasicType::Char),
            4 => Some(BasicType::Short),
            5 => Some(BasicType::Int),
            6 => Some(BasicType::Long),
            7 => Some(BasicType::Float),
            8 => Some(BasicType::Double),
            9 => Some(BasicType::Reference),
            _ => None,
        }
    }

    /// Decodes the `atype` operand of the `newarray` instruction.
    pub fn from_newarray_code(code: u8) -> Option<Self> {
        match code {
            4 => Some(BasicType::Boolean),
            5 => Some(BasicType::Char),
            6 => Some(BasicType::Float),
            7 => Some(BasicType::Double),
            8 => Some(BasicType::Byte),
            9 => Some(BasicType::Short),
            10 => Some(BasicType::Int),
            11 => Some(BasicType::Long),
            _ => None,
        }
    }

    /// Size in bytes of one array element of this type.
    pub fn element_size(self) -> usize {
        match self {
            BasicType::Boolean | BasicType::Byte => 1,
            BasicType::Char | BasicType::Short => 2,
            BasicType::Int | BasicType::Float | BasicType::Reference => 4,
            BasicType::Long | BasicType::Double => 8,
        }
    }

    /// Descriptor character for primitive types; `None` for references.
    pub fn descriptor_char(self) -> Option<char> {
        match self {
            BasicType::Boolean => Some('Z'),
            BasicType::Byte => Some('B'),
            BasicType::Char => Some('C'),
            BasicType::Short => Some('S'),
            BasicType::Int => Some('I'),
            BasicType::Long => Some('J'),
            BasicType::Float => Some('F'),
            BasicType::Double => Some('D'),
            BasicType::Reference => None,
        }
    }

    /// Returns true for reference-typed storage.
    pub fn is_reference(self) -> bool {
        matches!(self, BasicType::Reference)
    }

    /// Zero value stored in a freshly allocated slot of this type.
    pub fn default_value(self) -> Value {
        match self {
            BasicType::Long => Value::Long(0),
            BasicType::Float => Value::Float(0.0),
            BasicType::Double => Value::Double(0.0),
            BasicType::Reference => Value::NULL,
            _ => Value::Int(0),
        }
    }
}

/// Represents any JVM value held in a local, on the operand stack or in a field.
///
/// `boolean`, `byte`, `char` and `short` are widened to [`Value::Int`], as
/// the JVM computational types require. Category-2 values (`long`,
/// `double`) occupy a single operand stack entry here; the interpreter
/// accounts for their two local-variable slots.
///
/// # Examples
///
/// ```
/// use core_types::Value;
///
/// let null = Value::NULL;
/// assert!(null.is_null());
/// assert_eq!(Value::Int(3).as_int(), Some(3));
/// assert_eq!(Value::Double(1.5).as_int(), None);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    /// 32-bit integer (also boolean, byte, char, short)
    Int(i32),
    /// 64-bit integer
    Long(i64),
    /// IEEE 754 single precision
    Float(f32),
    /// IEEE 754 double precision
    Double(f64),
    /// Object reference, `None` is `null`
    Reference(Option<ObjectRef>),
}

impl Value {
    /// The Java `null` reference.
    pub const NULL: Value = Value::Reference(None);

    /// Wraps a non-null object handle.
    pub fn object(r: ObjectRef) -> Self {
        Value::Reference(Some(r))
    }

    /// Returns true for the null reference.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Reference(None))
    }

    /// Returns true for `long` and `double` values.
    pub fn is_category2(&self) -> bool {
        matches!(self, Value::Long(_) | Value::Double(_))
    }

    /// Returns the integer payload, if this is an `Int`.
    pub fn as_int(&self) -> Option<i32> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the long payload, if this is a `Long`.
    pub fn as_long(&self) -> Option<i64> {
        match self {
            Value::Long(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the float payload, if this is a `Float`.
    pub fn as_float(&self) -> Option<f32> {
        match self {
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the double payload, if this is a `Double`.
    pub fn as_double(&self) -> Option<f64> {
        match self {
            Value::Double(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the reference payload (`Some(None)` is null).
    pub fn as_reference(&self) -> Option<Option<ObjectRef>> {
        match self {
            Value::Reference(r) => Some(*r),
            _ => None,
        }
    }

    /// Returns the non-null object handle, if any.
    pub fn as_object(&self) -> Option<ObjectRef> {
        match self {
            Value::Reference(r) => *r,
            _ => None,
        }
    }

    /// Encodes this value into a 64-bit heap slot.
    ///
    /// References store their offset (zero for null); floats store their bit
    /// pattern in the low 32 bits.
    pub fn to_slot_bits(&self) -> u64 {
        match *self {
            Value::Int(v) => v as u32 as u64,
            Value::Long(v) => v as u64,
            Value::Float(v) => v.to_bits() as u64,
            Value::Double(v) => v.to_bits(),
            Value::Reference(r) => r.map(|o| o.offset()).unwrap_or(0) as u64,
        }
    }

    /// Decodes a 64-bit heap slot written by [`Value::to_slot_bits`].
    pub fn from_slot_bits(bits: u64, ty: BasicType) -> Self {
        match ty {
            BasicType::Long => Value::Long(bits as i64),
            BasicType::Float => Value::Float(f32::from_bits(bits as u32)),
            BasicType::Double => Value::Double(f64::from_bits(bits)),
            BasicType::Reference => Value::Reference(ObjectRef::from_offset(bits as u32)),
            _ => Value::Int(bits as u32 as i32),
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::Int(0)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{}", v),
            Value::Long(v) => write!(f, "{}L", v),
            Value::Float(v) => write!(f, "{}f", v),
            Value::Double(v) => write!(f, "{}d", v),
            Value::Reference(None) => write!(f, "null"),
            Value::Reference(Some(r)) => write!(f, "@{:#x}", r.offset()),
        }
    }
}
