//! Constant pool entries and typed accessors.
//!
//! Indices are 1-based as in the class file. `long` and `double` entries
//! occupy two indices; the second one holds [`Constant::Unusable`].

use crate::error::{ClassFormatError, Result};
use crate::reader::ByteReader;

/// A single constant pool entry.
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    /// Index 0 and the upper half of wide constants
    Unusable,
    /// `CONSTANT_Utf8`
    Utf8(String),
    /// `CONSTANT_Integer`
    Integer(i32),
    /// `CONSTANT_Float`
    Float(f32),
    /// `CONSTANT_Long`
    Long(i64),
    /// `CONSTANT_Double`
    Double(f64),
    /// `CONSTANT_Class`
    Class {
        /// Utf8 index of the internal name
        name_index: u16,
    },
    /// `CONSTANT_String`
    String {
        /// Utf8 index of the contents
        string_index: u16,
    },
    /// `CONSTANT_Fieldref`
    FieldRef {
        /// Class index
        class_index: u16,
        /// NameAndType index
        name_and_type_index: u16,
    },
    /// `CONSTANT_Methodref`
    MethodRef {
        /// Class index
        class_index: u16,
        /// NameAndType index
        name_and_type_index: u16,
    },
    /// `CONSTANT_InterfaceMethodref`
    InterfaceMethodRef {
        /// Class index
        class_index: u16,
        /// NameAndType index
        name_and_type_index: u16,
    },
    /// `CONSTANT_NameAndType`
    NameAndType {
        /// Utf8 index of the member name
        name_index: u16,
        /// Utf8 index of the descriptor
        descriptor_index: u16,
    },
    /// `CONSTANT_MethodHandle`
    MethodHandle {
        /// Reference kind (1..=9)
        reference_kind: u8,
        /// Member reference index
        reference_index: u16,
    },
    /// `CONSTANT_MethodType`
    MethodType {
        /// Utf8 index of the descriptor
        descriptor_index: u16,
    },
    /// `CONSTANT_Dynamic`
    Dynamic {
        /// Bootstrap method attribute index
        bootstrap_method_attr_index: u16,
        /// NameAndType index
        name_and_type_index: u16,
    },
    /// `CONSTANT_InvokeDynamic`
    InvokeDynamic {
        /// Bootstrap method attribute index
        bootstrap_method_attr_index: u16,
        /// NameAndType index
        name_and_type_index: u16,
    },
    /// `CONSTANT_Module`
    Module {
        /// Utf8 index
        name_index: u16,
    },
    /// `CONSTANT_Package`
    Package {
        /// Utf8 index
        name_index: u16,
    },
}

impl Constant {
    /// Tag byte of this entry in the class file encoding.
    pub fn tag(&self) -> u8 {
        match self {
            Constant::Unusable => 0,
            Constant::Utf8(_) => 1,
            Constant::Integer(_) => 3,
            Constant::Float(_) => 4,
            Constant::Long(_) => 5,
            Constant::Double(_) => 6,
            Constant::Class { .. } => 7,
            Constant::String { .. } => 8,
            Constant::FieldRef { .. } => 9,
            Constant::MethodRef { .. } => 10,
            Constant::InterfaceMethodRef { .. } => 11,
            Constant::NameAndType { .. } => 12,
            Constant::MethodHandle { .. } => 15,
            Constant::MethodType { .. } => 16,
            Constant::Dynamic { .. } => 17,
            Constant::InvokeDynamic { .. } => 18,
            Constant::Module { .. } => 19,
            Constant::Package { .. } => 20,
        }
    }

    /// Returns true for entries that take two pool indices.
    pub fn is_wide(&self) -> bool {
        matches!(self, Constant::Long(_) | Constant::Double(_))
    }

    /// Appends the class file encoding of this entry to `out`.
    pub fn encode(&self, out: &mut Vec<u8>) {
        out.push(self.tag());
        match self {
            Constant::Unusable => {}
            Constant::Utf8(s) => {
                let bytes = encode_modified_utf8(s);
                out.extend_from_slice(&(bytes.len() as u16).to_be_bytes());
                out.extend_from_slice(&bytes);
            }
            Constant::Integer(v) => out.extend_from_slice(&v.to_be_bytes()),
            Constant::Float(v) => out.extend_from_slice(&v.to_bits().to_be_bytes()),
            Constant::Long(v) => out.extend_from_slice(&v.to_be_bytes()),
            Constant::Double(v) => out.extend_from_slice(&v.to_bits().to_be_bytes()),
            Constant::Class { name_index: i }
            | Constant::String { string_index: i }
            | Constant::MethodType {
                descriptor_index: i,
            }
            | Constant::Module { name_index: i }
            | Constant::Package { name_index: i } => out.extend_from_slice(&i.to_be_bytes()),
            Constant::FieldRef {
                class_index: a,
                name_and_type_index: b,
            }
            | Constant::MethodRef {
                class_index: a,
                name_and_type_index: b,
            }
            | Constant::InterfaceMethodRef {
                class_index: a,
                name_and_type_index: b,
            }
            | Constant::NameAndType {
                name_index: a,
                descriptor_index: b,
            }
            | Constant::Dynamic {
                bootstrap_method_attr_index: a,
                name_and_type_index: b,
            }
            | Constant::InvokeDynamic {
                bootstrap_method_attr_index: a,
                name_and_type_index: b,
            } => {
                out.extend_from_slice(&a.to_be_bytes());
                out.extend_from_slice(&b.to_be_bytes());
            }
            Constant::MethodHandle {
                reference_kind,
                reference_index,
            } => {
                out.push(*reference_kind);
                out.extend_from_slice(&reference_index.to_be_bytes());
            }
        }
    }
}

/// A resolved symbolic reference to a field or method.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MemberRef {
    /// Internal name of the referenced class
    pub class_name: String,
    /// Member name
    pub name: String,
    /// Member descriptor
    pub descriptor: String,
    /// True for `CONSTANT_InterfaceMethodref`
    pub is_interface: bool,
}

/// A loadable constant as seen by `ldc`.
#[derive(Debug, Clone, PartialEq)]
pub enum Loadable<'a> {
    /// `int`
    Integer(i32),
    /// `float`
    Float(f32),
    /// `long`
    Long(i64),
    /// `double`
    Double(f64),
    /// String literal contents
    String(&'a str),
    /// Class literal (internal name)
    Class(&'a str),
}

/// The parsed constant pool of one class.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConstantPool {
    entries: Vec<Constant>,
}

impl ConstantPool {
    /// Parses `count - 1` entries from `reader` and validates every cross
    /// reference between entries.
    pub(crate) fn parse(reader: &mut ByteReader<'_>) -> Result<Self> {
        let count = reader.u16()?;
        if count == 0 {
            return Err(ClassFormatError::Malformed(
                "constant_pool_count must be at least 1".to_string(),
            ));
        }
        let mut entries = Vec::with_capacity(count as usize);
        entries.push(Constant::Unusable);
        while entries.len() < count as usize {
            let index = entries.len() as u16;
            let tag = reader.u8()?;
            let constant = match tag {
                1 => {
                    let len = reader.u16()? as usize;
                    let bytes = reader.bytes(len)?;
                    Constant::Utf8(
                        decode_modified_utf8(bytes)
                            .ok_or(ClassFormatError::InvalidUtf8 { index })?,
                    )
                }
                3 => Constant::Integer(reader.u32()? as i32),
                4 => Constant::Float(f32::from_bits(reader.u32()?)),
                5 => Constant::Long(reader.u64()? as i64),
                6 => Constant::Double(f64::from_bits(reader.u64()?)),
                7 => Constant::Class {
                    name_index: reader.u16()?,
                },
                8 => Constant::String {
                    string_index: reader.u16()?,
                },
                9 => Constant::FieldRef {
                    class_index: reader.u16()?,
                    name_and_type_index: reader.u16()?,
                },
                10 => Constant::MethodRef {
                    class_index: reader.u16()?,
                    name_and_type_index: reader.u16()?,
                },
                11 => Constant::InterfaceMethodRef {
                    class_index: reader.u16()?,
                    name_and_type_index: reader.u16()?,
                },
                12 => Constant::NameAndType {
                    name_index: reader.u16()?,
                    descriptor_index: reader.u16()?,
                },
                15 => Constant::MethodHandle {
                    reference_kind: reader.u8()?,
                    reference_index: reader.u16()?,
                },
                16 => Constant::MethodType {
                    descriptor_index: reader.u16()?,
                },
                17 => Constant::Dynamic {
                    bootstrap_method_attr_index: reader.u16()?,
                    name_and_type_index: reader.u16()?,
                },
                18 => Constant::InvokeDynamic {
                    bootstrap_method_attr_index: reader.u16()?,
                    name_and_type_index: reader.u16()?,
                },
                19 => Constant::Module {
                    name_index: reader.u16()?,
                },
                20 => Constant::Package {
                    name_index: reader.u16()?,
                },
                tag => return Err(ClassFormatError::BadConstantTag { index, tag }),
            };
            let wide = constant.is_wide();
            entries.push(constant);
            if wide {
                if entries.len() >= count as usize {
                    return Err(ClassFormatError::Malformed(format!(
                        "wide constant at index {} overruns the pool",
                        index
                    )));
                }
                entries.push(Constant::Unusable);
            }
        }
        let pool = ConstantPool { entries };
        pool.validate()?;
        Ok(pool)
    }

    fn validate(&self) -> Result<()> {
        for (i, entry) in self.entries.iter().enumerate() {
            let index = i as u16;
            match entry {
                Constant::Class { name_index }
                | Constant::Module { name_index }
                | Constant::Package { name_index } => {
                    self.utf8(*name_index)?;
                }
                Constant::String { string_index } => {
                    self.utf8(*string_index)?;
                }
                Constant::MethodType { descriptor_index } => {
                    self.utf8(*descriptor_index)?;
                }
                Constant::NameAndType {
                    name_index,
                    descriptor_index,
                } => {
                    self.utf8(*name_index)?;
                    self.utf8(*descriptor_index)?;
                }
                Constant::FieldRef {
                    class_index,
                    name_and_type_index,
                }
                | Constant::MethodRef {
                    class_index,
                    name_and_type_index,
                }
                | Constant::InterfaceMethodRef {
                    class_index,
                    name_and_type_index,
                } => {
                    self.class_name(*class_index)?;
                    self.name_and_type(*name_and_type_index)?;
                }
                Constant::Dynamic {
                    name_and_type_index,
                    ..
                }
                | Constant::InvokeDynamic {
                    name_and_type_index,
                    ..
                } => {
                    self.name_and_type(*name_and_type_index)?;
                }
                Constant::MethodHandle {
                    reference_kind,
                    reference_index,
                } => {
                    if !(1..=9).contains(reference_kind) {
                        return Err(ClassFormatError::Malformed(format!(
                            "bad method handle kind {} at index {}",
                            reference_kind, index
                        )));
                    }
                    match self.get(*reference_index)? {
                        Constant::FieldRef { .. }
                        | Constant::MethodRef { .. }
                        | Constant::InterfaceMethodRef { .. } => {}
                        _ => {
                            return Err(ClassFormatError::BadConstantIndex {
                                index: *reference_index,
                                expected: "member reference",
                            })
                        }
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Number of slots including the unusable index 0.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the pool has no usable entries.
    pub fn is_empty(&self) -> bool {
        self.entries.len() <= 1
    }

    /// Returns the entry at `index`.
    pub fn get(&self, index: u16) -> Result<&Constant> {
        match self.entries.get(index as usize) {
            Some(Constant::Unusable) | None => Err(ClassFormatError::BadConstantIndex {
                index,
                expected: "constant",
            }),
            Some(c) => Ok(c),
        }
    }

    /// Returns the string of a `CONSTANT_Utf8` entry.
    pub fn utf8(&self, index: u16) -> Result<&str> {
        match self.get(index) {
            Ok(Constant::Utf8(s)) => Ok(s),
            _ => Err(ClassFormatError::BadConstantIndex {
                index,
                expected: "Utf8",
            }),
        }
    }

    /// Returns the internal name named by a `CONSTANT_Class` entry.
    pub fn class_name(&self, index: u16) -> Result<&str> {
        match self.get(index) {
            Ok(Constant::Class { name_index }) => self.utf8(*name_index),
            _ => Err(ClassFormatError::BadConstantIndex {
                index,
                expected: "Class",
            }),
        }
    }

    /// Returns `(name, descriptor)` of a `CONSTANT_NameAndType` entry.
    pub fn name_and_type(&self, index: u16) -> Result<(&str, &str)> {
        match self.get(index) {
            Ok(Constant::NameAndType {
                name_index,
                descriptor_index,
            }) => Ok((self.utf8(*name_index)?, self.utf8(*descriptor_index)?)),
            _ => Err(ClassFormatError::BadConstantIndex {
                index,
                expected: "NameAndType",
            }),
        }
    }

    /// Resolves a field, method or interface method reference symbolically.
    pub fn member_ref(&self, index: u16) -> Result<MemberRef> {
        let (class_index, nat, is_interface) = match self.get(index) {
            Ok(Constant::FieldRef {
                class_index,
                name_and_type_index,
            })
            | Ok(Constant::MethodRef {
                class_index,
                name_and_type_index,
            }) => (*class_index, *name_and_type_index, false),
            Ok(Constant::InterfaceMethodRef {
                class_index,
                name_and_type_index,
            }) => (*class_index, *name_and_type_index, true),
            _ => {
                return Err(ClassFormatError::BadConstantIndex {
                    index,
                    expected: "member reference",
                })
            }
        };
        let (name, descriptor) = self.name_and_type(nat)?;
        Ok(MemberRef {
            class_name: self.class_name(class_index)?.to_string(),
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            is_interface,
        })
    }

    /// Returns the constant loaded by `ldc`/`ldc_w`/`ldc2_w` at `index`.
    pub fn loadable(&self, index: u16) -> Result<Loadable<'_>> {
        match self.get(index)? {
            Constant::Integer(v) => Ok(Loadable::Integer(*v)),
            Constant::Float(v) => Ok(Loadable::Float(*v)),
            Constant::Long(v) => Ok(Loadable::Long(*v)),
            Constant::Double(v) => Ok(Loadable::Double(*v)),
            Constant::String { string_index } => Ok(Loadable::String(self.utf8(*string_index)?)),
            Constant::Class { name_index } => Ok(Loadable::Class(self.utf8(*name_index)?)),
            _ => Err(ClassFormatError::BadConstantIndex {
                index,
                expected: "loadable constant",
            }),
        }
    }

    /// Iterates over `(index, entry)` pairs, skipping unusable slots.
    pub fn iter(&self) -> impl Iterator<Item = (u16, &Constant)> {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, c)| !matches!(c, Constant::Unusable))
            .map(|(i, c)| (i as u16, c))
    }
}

/// Decodes the modified UTF-8 used by class files.
///
/// Returns `None` on malformed byte sequences. Unpaired surrogates are
/// replaced with U+FFFD.
pub fn decode_modified_utf8(bytes: &[u8]) -> Option<String> {
    let mut units: Vec<u16> = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        if b == 0 || b >= 0xF0 {
            return None;
        }
        if b < 0x80 {
            units.push(b as u16);
            i += 1;
        } else if b & 0xE0 == 0xC0 {
            let b2 = *bytes.get(i + 1)?;
            if b2 & 0xC0 != 0x80 {
                return None;
            }
            units.push((((b & 0x1F) as u16) << 6) | (b2 & 0x3F) as u16);
            i += 2;
        } else if b & 0xF0 == 0xE0 {
            let b2 = *bytes.get(i + 1)?;
            let b3 = *bytes.get(i + 2)?;
            if b2 & 0xC0 != 0x80 || b3 & 0xC0 != 0x80 {
                return None;
            }
            units.push(
                (((b & 0x0F) as u16) << 12) | (((b2 & 0x3F) as u16) << 6) | (b3 & 0x3F) as u16,
            );
            i += 3;
        } else {
            return None;
        }
    }
    Some(String::from_utf16_lossy(&units))
}

/// Encodes a string as modified UTF-8.
pub fn encode_modified_utf8(s: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(s.len());
    for unit in s.encode_utf16() {
        match unit {
            0x0001..=0x007F => out.push(unit as u8),
            0x0000 | 0x0080..=0x07FF => {
                out.push(0xC0 | ((unit >> 6) & 0x1F) as u8);
                out.push(0x80 | (unit & 0x3F) as u8);
            }
            _ => {
                out.push(0xE0 | ((unit >> 12) & 0x0F) as u8);
                out.push(0x80 | ((unit >> 6) & 0x3F) as u8);
                out.push(0x80 | (unit & 0x3F) as u8);
            }
        }
    }
    out
}
