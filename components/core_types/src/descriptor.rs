//! Field and method descriptor parsing.
//!
//! Descriptors use the class-file grammar: `I`, `J`, `Ljava/lang/String;`,
//! `[[D`, and `(IJ)V` for methods.

use std::fmt;

use crate::error::{JvmError, JvmResult};
use crate::value::BasicType;

/// A parsed field descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldType {
    /// `B`
    Byte,
    /// `C`
    Char,
    /// `D`
    Double,
    /// `F`
    Float,
    /// `I`
    Int,
    /// `J`
    Long,
    /// `S`
    Short,
    /// `Z`
    Boolean,
    /// `L<internal name>;`
    Object(String),
    /// `[<component>`
    Array(Box<FieldType>),
}

impl FieldType {
    /// Parses a complete field descriptor.
    pub fn parse(descriptor: &str) -> JvmResult<Self> {
        let (ty, rest) = Self::parse_prefix(descriptor)?;
        if !rest.is_empty() {
            return Err(JvmError::class_format(format!(
                "trailing characters in field descriptor {}",
                descriptor
            )));
        }
        Ok(ty)
    }

    /// Parses one field type from the front of `input`, returning the rest.
    fn parse_prefix(input: &str) -> JvmResult<(Self, &str)> {
        let mut chars = input.chars();
        let tag = chars
            .next()
            .ok_or_else(|| JvmError::class_format("empty field descriptor"))?;
        let rest = chars.as_str();
        let ty = match tag {
            'B' => FieldType::Byte,
            'C' => FieldType::Char,
            'D' => FieldType::Double,
            'F' => FieldType::Float,
            'I' => FieldType::Int,
            'J' => FieldType::Long,
            'S' => FieldType::Short,
            'Z' => FieldType::Boolean,
            'L' => {
                let end = rest.find(';').ok_or_else(|| {
                    JvmError::class_format(format!("unterminated class type in {}", input))
                })?;
                if end == 0 {
                    return Err(JvmError::class_format("empty class name in descriptor"));
                }
                return Ok((FieldType::Object(rest[..end].to_string()), &rest[end + 1..]));
            }
            '[' => {
                let (component, rest) = Self::parse_prefix(rest)?;
                return Ok((FieldType::Array(Box::new(component)), rest));
            }
            other => {
                return Err(JvmError::class_format(format!(
                    "invalid descriptor character '{}'",
                    other
                )))
            }
        };
        Ok((ty, rest))
    }

    /// Storage kind used for fields and array elements of this type.
    pub fn basic_type(&self) -> BasicType {
        match self {
            FieldType::Byte => BasicType::Byte,
            FieldType::Char => BasicType::Char,
            FieldType::Double => BasicType::Double,
            FieldType::Float => BasicType::Float,
            FieldType::Int => BasicType::Int,
            FieldType::Long => BasicType::Long,
            FieldType::Short => BasicType::Short,
            FieldType::Boolean => BasicType::Boolean,
            FieldType::Object(_) | FieldType::Array(_) => BasicType::Reference,
        }
    }

    /// Number of local variable slots a value of this type occupies.
    pub fn slots(&self) -> usize {
        match self {
            FieldType::Long | FieldType::Double => 2,
            _ => 1,
        }
    }

    /// Returns true for class and array types.
    pub fn is_reference(&self) -> bool {
        matches!(self, FieldType::Object(_) | FieldType::Array(_))
    }

    /// Internal class name of this type as used by the class loader:
    /// `java/lang/String` for objects, `[I` for arrays, `None` for primitives.
    pub fn class_name(&self) -> Option<String> {
        match self {
            FieldType::Object(name) => Some(name.clone()),
            FieldType::Array(_) => Some(self.to_string()),
            _ => None,
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Object(name) => write!(f, "L{};", name),
            FieldType::Array(component) => write!(f, "[{}", component),
            primitive => {
                let c = primitive.basic_type().descriptor_char().unwrap_or('?');
                write!(f, "{}", c)
            }
        }
    }
}

/// A parsed method descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodDescriptor {
    /// Parameter types in declaration order
    pub parameters: Vec<FieldType>,
    /// Return type, `None` for `V`
    pub return_type: Option<FieldType>,
}

impl MethodDescriptor {
    /// Parses a method descriptor such as `(I[Ljava/lang/String;)J`.
    ///
    /// # Arguments
    ///
    /// * `descriptor` - Descriptor string from the constant pool
    ///
    /// # Returns
    ///
    /// The parsed descriptor, or a `ClassFormat` error.
    pub fn parse(descriptor: &str) -> JvmResult<Self> {
        let body = descriptor.strip_prefix('(').ok_or_else(|| {
            JvmError::class_format(format!("method descriptor {} must start with '('", descriptor))
        })?;
        let close = body.find(')').ok_or_else(|| {
            JvmError::class_format(format!("method descriptor {} lacks ')'", descriptor))
        })?;
        let mut params = &body[..close];
        let ret = &body[close + 1..];

        let mut parameters = Vec::new();
        while !params.is_empty() {
            let (ty, rest) = FieldType::parse_prefix(params)?;
            parameters.push(ty);
            params = rest;
        }

        let return_type = if ret == "V" {
            None
        } else {
            Some(FieldType::parse(ret)?)
        };

        Ok(MethodDescriptor {
            parameters,
            return_type,
        })
    }

    /// Number of local variable slots the parameters occupy, not counting
    /// the receiver.
    pub fn argument_slots(&self) -> usize {
        self.parameters.iter().map(FieldType::slots).sum()
    }
}

impl fmt::Display for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for p in &self.parameters {
            write!(f, "{}", p)?;
        }
        write!(f, ")")?;
        match &self.return_type {
            Some(ty) => write!(f, "{}", ty),
            None => write!(f, "V"),
        }
    }
}
