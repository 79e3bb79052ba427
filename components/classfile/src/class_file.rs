//! Class file structure and parser.

use crate::access::{ClassAccess, FieldAccess, MethodAccess};
use crate::constant_pool::{Constant, ConstantPool};
use crate::error::{ClassFormatError, Result};
use crate::reader::ByteReader;

/// First four bytes of every class file.
pub const MAGIC: u32 = 0xCAFE_BABE;
/// Oldest accepted major version (JDK 1.0.2)
pub const MIN_MAJOR_VERSION: u16 = 45;
/// Newest accepted major version (Java 21)
pub const MAX_MAJOR_VERSION: u16 = 65;

/// Value of a `ConstantValue` attribute, resolved from the pool.
#[derive(Debug, Clone, PartialEq)]
pub enum ConstantValue {
    /// `int`, `short`, `char`, `byte`, `boolean`
    Int(i32),
    /// `long`
    Long(i64),
    /// `float`
    Float(f32),
    /// `double`
    Double(f64),
    /// `String`
    String(String),
}

/// One `field_info`.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldEntry {
    /// Access flags
    pub access: FieldAccess,
    /// Simple name
    pub name: String,
    /// Field descriptor
    pub descriptor: String,
    /// Initial value of a static constant
    pub constant_value: Option<ConstantValue>,
}

/// One exception table row of a `Code` attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExceptionTableEntry {
    /// First covered pc (inclusive)
    pub start_pc: u16,
    /// End of the covered range (exclusive)
    pub end_pc: u16,
    /// Handler entry pc
    pub handler_pc: u16,
    /// Caught class, `None` catches everything
    pub catch_type: Option<String>,
}

impl ExceptionTableEntry {
    /// Returns true if `pc` lies in `[start_pc, end_pc)`.
    pub fn covers(&self, pc: usize) -> bool {
        (self.start_pc as usize) <= pc && pc < (self.end_pc as usize)
    }
}

/// A `Code` attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeAttribute {
    /// Maximum operand stack depth
    pub max_stack: u16,
    /// Number of local variable slots
    pub max_locals: u16,
    /// Instruction bytes
    pub code: Vec<u8>,
    /// Handlers in declaration order
    pub exception_table: Vec<ExceptionTableEntry>,
    /// `(start_pc, line_number)` pairs from `LineNumberTable`
    pub line_numbers: Vec<(u16, u16)>,
}

impl CodeAttribute {
    /// Source line of the instruction at `pc`, if a line table is present.
    pub fn line_number(&self, pc: usize) -> Option<u16> {
        self.line_numbers
            .iter()
            .filter(|(start, _)| (*start as usize) <= pc)
            .max_by_key(|(start, _)| *start)
            .map(|(_, line)| *line)
    }
}

/// One `method_info`.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodEntry {
    /// Access flags
    pub access: MethodAccess,
    /// Simple name (`<init>`, `<clinit>`, ...)
    pub name: String,
    /// Method descriptor
    pub descriptor: String,
    /// Body; absent for native and abstract methods
    pub code: Option<CodeAttribute>,
}

/// A parsed class file.
///
/// # Examples
///
/// ```
/// use classfile::{ClassAccess, ClassFile, ClassWriter};
///
/// let bytes = ClassWriter::new("demo/Point", Some("java/lang/Object"), ClassAccess::PUBLIC)
///     .to_bytes();
/// let class = ClassFile::parse(&bytes).unwrap();
/// assert_eq!(class.this_class, "demo/Point");
/// assert_eq!(class.super_class.as_deref(), Some("java/lang/Object"));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ClassFile {
    /// Minor version
    pub minor_version: u16,
    /// Major version
    pub major_version: u16,
    /// Constant pool
    pub constant_pool: ConstantPool,
    /// Access flags
    pub access: ClassAccess,
    /// Internal name of this class
    pub this_class: String,
    /// Internal name of the superclass, `None` only for `java/lang/Object`
    pub super_class: Option<String>,
    /// Internal names of direct superinterfaces
    pub interfaces: Vec<String>,
    /// Declared fields
    pub fields: Vec<FieldEntry>,
    /// Declared methods
    pub methods: Vec<MethodEntry>,
    /// `SourceFile` attribute
    pub source_file: Option<String>,
}

impl ClassFile {
    /// Parses and structurally validates a class file.
    ///
    /// # Arguments
    ///
    /// * `bytes` - Complete class file contents
    ///
    /// # Returns
    ///
    /// The parsed class, or the first [`ClassFormatError`] found.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let mut r = ByteReader::new(bytes);

        let magic = r.u32()?;
        if magic != MAGIC {
            return Err(ClassFormatError::BadMagic(magic));
        }
        let minor_version = r.u16()?;
        let major_version = r.u16()?;
        if !(MIN_MAJOR_VERSION..=MAX_MAJOR_VERSION).contains(&major_version) {
            return Err(ClassFormatError::UnsupportedVersion {
                major: major_version,
                minor: minor_version,
            });
        }

        let constant_pool = ConstantPool::parse(&mut r)?;
        let access = ClassAccess::from_bits_truncate(r.u16()?);
        if access.contains(ClassAccess::INTERFACE)
            && (!access.contains(ClassAccess::ABSTRACT) || access.contains(ClassAccess::FINAL))
        {
            return Err(ClassFormatError::Malformed(
                "interface must be abstract and not final".to_string(),
            ));
        }
        if access.contains(ClassAccess::FINAL | ClassAccess::ABSTRACT) {
            return Err(ClassFormatError::Malformed(
                "class cannot be both final and abstract".to_string(),
            ));
        }

        let this_class = constant_pool.class_name(r.u16()?)?.to_string();
        let super_index = r.u16()?;
        let super_class = if super_index == 0 {
            None
        } else {
            Some(constant_pool.class_name(super_index)?.to_string())
        };

        let interface_count = r.u16()?;
        let mut interfaces = Vec::with_capacity(interface_count as usize);
        for _ in 0..interface_count {
            interfaces.push(constant_pool.class_name(r.u16()?)?.to_string());
        }

        let field_count = r.u16()?;
        let mut fields = Vec::with_capacity(field_count as usize);
        for _ in 0..field_count {
            fields.push(parse_field(&mut r, &constant_pool)?);
        }

        let method_count = r.u16()?;
        let mut methods = Vec::with_capacity(method_count as usize);
        for _ in 0..method_count {
            methods.push(parse_method(&mut r, &constant_pool)?);
        }

        let mut source_file = None;
        let attribute_count = r.u16()?;
        for _ in 0..attribute_count {
            let name = constant_pool.utf8(r.u16()?)?;
            let len = r.u32()? as usize;
            let body = r.bytes(len)?;
            if name == "SourceFile" {
                let mut a = ByteReader::new(body);
                source_file = Some(constant_pool.utf8(a.u16()?)?.to_string());
            }
        }

        if r.remaining() != 0 {
            return Err(ClassFormatError::Malformed(format!(
                "{} trailing bytes after class attributes",
                r.remaining()
            )));
        }

        Ok(ClassFile {
            minor_version,
            major_version,
            constant_pool,
            access,
            this_class,
            super_class,
            interfaces,
            fields,
            methods,
            source_file,
        })
    }

    /// Returns true if this class file declares an interface.
    pub fn is_interface(&self) -> bool {
        self.access.contains(ClassAccess::INTERFACE)
    }

    /// Finds a declared method by exact name and descriptor.
    pub fn find_method(&self, name: &str, descriptor: &str) -> Option<&MethodEntry> {
        self.methods
            .iter()
            .find(|m| m.name == name && m.descriptor == descriptor)
    }

    /// Finds a declared field by exact name.
    pub fn find_field(&self, name: &str) -> Option<&FieldEntry> {
        self.fields.iter().find(|f| f.name == name)
    }
}

fn parse_field(r: &mut ByteReader<'_>, pool: &ConstantPool) -> Result<FieldEntry> {
    let access = FieldAccess::from_bits_truncate(r.u16()?);
    let name = pool.utf8(r.u16()?)?.to_string();
    let descriptor = pool.utf8(r.u16()?)?.to_string();
    let mut constant_value = None;
    let attribute_count = r.u16()?;
    for _ in 0..attribute_count {
        let attr_name = pool.utf8(r.u16()?)?;
        let len = r.u32()? as usize;
        let body = r.bytes(len)?;
        if attr_name == "ConstantValue" && access.contains(FieldAccess::STATIC) {
            let mut a = ByteReader::new(body);
            let index = a.u16()?;
            constant_value = Some(match pool.get(index)? {
                Constant::Integer(v) => ConstantValue::Int(*v),
                Constant::Long(v) => ConstantValue::Long(*v),
                Constant::Float(v) => ConstantValue::Float(*v),
                Constant::Double(v) => ConstantValue::Double(*v),
                Constant::String { string_index } => {
                    ConstantValue::String(pool.utf8(*string_index)?.to_string())
                }
                _ => {
                    return Err(ClassFormatError::BadConstantIndex {
                        index,
                        expected: "ConstantValue",
                    })
                }
            });
        }
    }
    Ok(FieldEntry {
        access,
        name,
        descriptor,
        constant_value,
    })
}

fn parse_method(r: &mut ByteReader<'_>, pool: &ConstantPool) -> Result<MethodEntry> {
    let access = MethodAccess::from_bits_truncate(r.u16()?);
    let name = pool.utf8(r.u16()?)?.to_string();
    let descriptor = pool.utf8(r.u16()?)?.to_string();
    let mut code = None;
    let attribute_count = r.u16()?;
    for _ in 0..attribute_count {
        let attr_name = pool.utf8(r.u16()?)?;
        let len = r.u32()? as usize;
        let body = r.bytes(len)?;
        if attr_name == "Code" {
            if code.is_some() {
                return Err(ClassFormatError::Malformed(format!(
                    "method {}{} has more than one Code attribute",
                    name, descriptor
                )));
            }
            code = Some(parse_code(body, pool)?);
        }
    }

    let bodiless = access.intersects(MethodAccess::NATIVE | MethodAccess::ABSTRACT);
    if bodiless && code.is_some() {
        return Err(ClassFormatError::Malformed(format!(
            "native or abstract method {}{} has a Code attribute",
            name, descriptor
        )));
    }
    if !bodiless && code.is_none() {
        return Err(ClassFormatError::Malformed(format!(
            "method {}{} lacks a Code attribute",
            name, descriptor
        )));
    }

    Ok(MethodEntry {
        access,
        name,
        descriptor,
        code,
    })
}

fn parse_code(body: &[u8], pool: &ConstantPool) -> Result<CodeAttribute> {
    let mut r = ByteReader::new(body);
    let max_stack = r.u16()?;
    let max_locals = r.u16()?;
    let code_length = r.u32()? as usize;
    if code_length == 0 || code_length >= 65536 {
        return Err(ClassFormatError::Malformed(format!(
            "invalid code length {}",
            code_length
        )));
    }
    let code = r.bytes(code_length)?.to_vec();

    let table_length = r.u16()?;
    let mut exception_table = Vec::with_capacity(table_length as usize);
    for _ in 0..table_length {
        let start_pc = r.u16()?;
        let end_pc = r.u16()?;
        let handler_pc = r.u16()?;
        let catch_index = r.u16()?;
        if start_pc >= end_pc
            || end_pc as usize > code_length
            || handler_pc as usize >= code_length
        {
            return Err(ClassFormatError::Malformed(format!(
                "exception table entry [{}, {}) -> {} outside code",
                start_pc, end_pc, handler_pc
            )));
        }
        let catch_type = if catch_index == 0 {
            None
        } else {
            Some(pool.class_name(catch_index)?.to_string())
        };
        exception_table.push(ExceptionTableEntry {
            start_pc,
            end_pc,
            handler_pc,
            catch_type,
        });
    }

    let mut line_numbers = Vec::new();
    let attribute_count = r.u16()?;
    for _ in 0..attribute_count {
        let name = pool.utf8(r.u16()?)?;
        let len = r.u32()? as usize;
        let attr = r.bytes(len)?;
        if name == "LineNumberTable" {
            let mut a = ByteReader::new(attr);
            let count = a.u16()?;
            for _ in 0..count {
                line_numbers.push((a.u16()?, a.u16()?));
            }
        }
    }

    Ok(CodeAttribute {
        max_stack,
        max_locals,
        code,
        exception_table,
        line_numbers,
    })
}
