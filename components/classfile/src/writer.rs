//! Class file writer.
//!
//! `ClassWriter` assembles a class file with a deduplicated constant pool;
//! `CodeBuilder` emits method bodies with symbolic branch labels that are
//! patched when the method is finished.

use std::collections::HashMap;

use core_types::{BasicType, MethodDescriptor};

use crate::access::{ClassAccess, FieldAccess, MethodAccess};
use crate::class_file::{ConstantValue, MAGIC};
use crate::constant_pool::Constant;
use crate::error::{ClassFormatError, Result};
use crate::opcode::Opcode;

/// Major version emitted by the writer (Java 8)
pub const WRITER_MAJOR_VERSION: u16 = 52;

/// Constant pool under construction.
#[derive(Debug, Default)]
struct PoolBuilder {
    entries: Vec<Constant>,
    index: HashMap<Vec<u8>, u16>,
    next: u16,
}

impl PoolBuilder {
    fn new() -> Self {
        Self {
            entries: Vec::new(),
            index: HashMap::new(),
            next: 1,
        }
    }

    fn add(&mut self, constant: Constant) -> u16 {
        let mut key = Vec::new();
        constant.encode(&mut key);
        if let Some(&i) = self.index.get(&key) {
            return i;
        }
        let i = self.next;
        self.next += if constant.is_wide() { 2 } else { 1 };
        self.entries.push(constant);
        self.index.insert(key, i);
        i
    }

    fn utf8(&mut self, s: &str) -> u16 {
        self.add(Constant::Utf8(s.to_string()))
    }

    fn class(&mut self, name: &str) -> u16 {
        let name_index = self.utf8(name);
        self.add(Constant::Class { name_index })
    }

    fn string(&mut self, s: &str) -> u16 {
        let string_index = self.utf8(s);
        self.add(Constant::String { string_index })
    }

    fn name_and_type(&mut self, name: &str, descriptor: &str) -> u16 {
        let name_index = self.utf8(name);
        let descriptor_index = self.utf8(descriptor);
        self.add(Constant::NameAndType {
            name_index,
            descriptor_index,
        })
    }

    fn field_ref(&mut self, class: &str, name: &str, descriptor: &str) -> u16 {
        let class_index = self.class(class);
        let name_and_type_index = self.name_and_type(name, descriptor);
        self.add(Constant::FieldRef {
            class_index,
            name_and_type_index,
        })
    }

    fn method_ref(&mut self, class: &str, name: &str, descriptor: &str) -> u16 {
        let class_index = self.class(class);
        let name_and_type_index = self.name_and_type(name, descriptor);
        self.add(Constant::MethodRef {
            class_index,
            name_and_type_index,
        })
    }

    fn interface_method_ref(&mut self, class: &str, name: &str, descriptor: &str) -> u16 {
        let class_index = self.class(class);
        let name_and_type_index = self.name_and_type(name, descriptor);
        self.add(Constant::InterfaceMethodRef {
            class_index,
            name_and_type_index,
        })
    }

    fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.next.to_be_bytes());
        for entry in &self.entries {
            entry.encode(out);
        }
    }
}

/// A branch target inside a method body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Label(usize);

#[derive(Debug)]
struct Fixup {
    /// Offset of the operand to patch
    at: usize,
    /// pc of the instruction the offset is relative to
    base: usize,
    label: Label,
    wide: bool,
}

#[derive(Debug)]
struct Handler {
    start: Label,
    end: Label,
    handler: Label,
    catch_type: u16,
}

/// Emits the bytecode of one method.
#[derive(Debug)]
pub struct CodeBuilder<'a> {
    pool: &'a mut PoolBuilder,
    code: Vec<u8>,
    labels: Vec<Option<usize>>,
    fixups: Vec<Fixup>,
    handlers: Vec<Handler>,
    line_numbers: Vec<(u16, u16)>,
    max_stack: u16,
    max_locals: u16,
}

impl<'a> CodeBuilder<'a> {
    fn new(pool: &'a mut PoolBuilder, initial_locals: u16) -> Self {
        Self {
            pool,
            code: Vec::new(),
            labels: Vec::new(),
            fixups: Vec::new(),
            handlers: Vec::new(),
            line_numbers: Vec::new(),
            max_stack: 16,
            max_locals: initial_locals,
        }
    }

    /// Current pc
    pub fn position(&self) -> usize {
        self.code.len()
    }

    /// Override the recorded maximum operand stack depth
    pub fn max_stack(&mut self, depth: u16) -> &mut Self {
        self.max_stack = depth;
        self
    }

    /// Raise the recorded number of local slots
    pub fn max_locals(&mut self, slots: u16) -> &mut Self {
        self.max_locals = self.max_locals.max(slots);
        self
    }

    /// Record that the following instructions belong to source `line`
    pub fn line(&mut self, line: u16) -> &mut Self {
        self.line_numbers.push((self.code.len() as u16, line));
        self
    }

    /// Emit an instruction without operands
    pub fn op(&mut self, opcode: Opcode) -> &mut Self {
        self.code.push(opcode as u8);
        self
    }

    /// Emit an instruction with a one-byte operand
    pub fn op_u8(&mut self, opcode: Opcode, operand: u8) -> &mut Self {
        self.code.push(opcode as u8);
        self.code.push(operand);
        self
    }

    /// Emit an instruction with a two-byte operand
    pub fn op_u16(&mut self, opcode: Opcode, operand: u16) -> &mut Self {
        self.code.push(opcode as u8);
        self.code.extend_from_slice(&operand.to_be_bytes());
        self
    }

    /// Push an `int` constant using the shortest encoding
    pub fn iconst(&mut self, value: i32) -> &mut Self {
        match value {
            -1..=5 => self.op(
                Opcode::from_byte((Opcode::Iconst0 as i32 + value) as u8).unwrap_or(Opcode::Nop),
            ),
            -128..=127 => self.op_u8(Opcode::Bipush, value as i8 as u8),
            -32768..=32767 => self.op_u16(Opcode::Sipush, value as i16 as u16),
            _ => {
                let index = self.pool.add(Constant::Integer(value));
                self.ldc_index(index)
            }
        }
    }

    /// Push a `long` constant
    pub fn lconst(&mut self, value: i64) -> &mut Self {
        match value {
            0 => self.op(Opcode::Lconst0),
            1 => self.op(Opcode::Lconst1),
            _ => {
                let index = self.pool.add(Constant::Long(value));
                self.op_u16(Opcode::Ldc2W, index)
            }
        }
    }

    /// Push a `float` constant
    pub fn fconst(&mut self, value: f32) -> &mut Self {
        if value.to_bits() == 0 {
            self.op(Opcode::Fconst0)
        } else if value == 1.0 {
            self.op(Opcode::Fconst1)
        } else if value == 2.0 {
            self.op(Opcode::Fconst2)
        } else {
            let index = self.pool.add(Constant::Float(value));
            self.ldc_index(index)
        }
    }

    /// Push a `double` constant
    pub fn dconst(&mut self, value: f64) -> &mut Self {
        if value.to_bits() == 0 {
            self.op(Opcode::Dconst0)
        } else if value == 1.0 {
            self.op(Opcode::Dconst1)
        } else {
            let index = self.pool.add(Constant::Double(value));
            self.op_u16(Opcode::Ldc2W, index)
        }
    }

    /// Push a string literal
    pub fn ldc_string(&mut self, value: &str) -> &mut Self {
        let index = self.pool.string(value);
        self.ldc_index(index)
    }

    /// Push a class literal
    pub fn ldc_class(&mut self, name: &str) -> &mut Self {
        let index = self.pool.class(name);
        self.ldc_index(index)
    }

    fn ldc_index(&mut self, index: u16) -> &mut Self {
        if index <= u8::MAX as u16 {
            self.op_u8(Opcode::Ldc, index as u8)
        } else {
            self.op_u16(Opcode::LdcW, index)
        }
    }

    fn local(&mut self, short_form: Opcode, generic: Opcode, index: u16, slots: u16) -> &mut Self {
        self.max_locals = self.max_locals.max(index + slots);
        if index <= 3 {
            let op = Opcode::from_byte(short_form as u8 + index as u8).unwrap_or(Opcode::Nop);
            self.op(op)
        } else if index <= u8::MAX as u16 {
            self.op_u8(generic, index as u8)
        } else {
            self.op(Opcode::Wide).op_u16(generic, index)
        }
    }

    /// `iload`
    pub fn iload(&mut self, index: u16) -> &mut Self {
        self.local(Opcode::Iload0, Opcode::Iload, index, 1)
    }

    /// `lload`
    pub fn lload(&mut self, index: u16) -> &mut Self {
        self.local(Opcode::Lload0, Opcode::Lload, index, 2)
    }

    /// `fload`
    pub fn fload(&mut self, index: u16) -> &mut Self {
        self.local(Opcode::Fload0, Opcode::Fload, index, 1)
    }

    /// `dload`
    pub fn dload(&mut self, index: u16) -> &mut Self {
        self.local(Opcode::Dload0, Opcode::Dload, index, 2)
    }

    /// `aload`
    pub fn aload(&mut self, index: u16) -> &mut Self {
        self.local(Opcode::Aload0, Opcode::Aload, index, 1)
    }

    /// `istore`
    pub fn istore(&mut self, index: u16) -> &mut Self {
        self.local(Opcode::Istore0, Opcode::Istore, index, 1)
    }

    /// `lstore`
    pub fn lstore(&mut self, index: u16) -> &mut Self {
        self.local(Opcode::Lstore0, Opcode::Lstore, index, 2)
    }

    /// `fstore`
    pub fn fstore(&mut self, index: u16) -> &mut Self {
        self.local(Opcode::Fstore0, Opcode::Fstore, index, 1)
    }

    /// `dstore`
    pub fn dstore(&mut self, index: u16) -> &mut Self {
        self.local(Opcode::Dstore0, Opcode::Dstore, index, 2)
    }

    /// `astore`
    pub fn astore(&mut self, index: u16) -> &mut Self {
        self.local(Opcode::Astore0, Opcode::Astore, index, 1)
    }

    /// `iinc`, widened when the index or delta does not fit a byte
    pub fn iinc(&mut self, index: u16, delta: i16) -> &mut Self {
        self.max_locals = self.max_locals.max(index + 1);
        if index <= u8::MAX as u16 && (-128..=127).contains(&delta) {
            self.code.push(Opcode::Iinc as u8);
            self.code.push(index as u8);
            self.code.push(delta as i8 as u8);
        } else {
            self.code.push(Opcode::Wide as u8);
            self.code.push(Opcode::Iinc as u8);
            self.code.extend_from_slice(&index.to_be_bytes());
            self.code.extend_from_slice(&delta.to_be_bytes());
        }
        self
    }

    /// `getstatic`
    pub fn getstatic(&mut self, class: &str, name: &str, descriptor: &str) -> &mut Self {
        let index = self.pool.field_ref(class, name, descriptor);
        self.op_u16(Opcode::Getstatic, index)
    }

    /// `putstatic`
    pub fn putstatic(&mut self, class: &str, name: &str, descriptor: &str) -> &mut Self {
        let index = self.pool.field_ref(class, name, descriptor);
        self.op_u16(Opcode::Putstatic, index)
    }

    /// `getfield`
    pub fn getfield(&mut self, class: &str, name: &str, descriptor: &str) -> &mut Self {
        let index = self.pool.field_ref(class, name, descriptor);
        self.op_u16(Opcode::Getfield, index)
    }

    /// `putfield`
    pub fn putfield(&mut self, class: &str, name: &str, descriptor: &str) -> &mut Self {
        let index = self.pool.field_ref(class, name, descriptor);
        self.op_u16(Opcode::Putfield, index)
    }

    /// `invokevirtual`
    pub fn invokevirtual(&mut self, class: &str, name: &str, descriptor: &str) -> &mut Self {
        let index = self.pool.method_ref(class, name, descriptor);
        self.op_u16(Opcode::Invokevirtual, index)
    }

    /// `invokespecial`
    pub fn invokespecial(&mut self, class: &str, name: &str, descriptor: &str) -> &mut Self {
        let index = self.pool.method_ref(class, name, descriptor);
        self.op_u16(Opcode::Invokespecial, index)
    }

    /// `invokestatic`
    pub fn invokestatic(&mut self, class: &str, name: &str, descriptor: &str) -> &mut Self {
        let index = self.pool.method_ref(class, name, descriptor);
        self.op_u16(Opcode::Invokestatic, index)
    }

    /// `invokeinterface`; the argument count operand is derived from the
    /// descriptor
    pub fn invokeinterface(&mut self, class: &str, name: &str, descriptor: &str) -> &mut Self {
        let index = self.pool.interface_method_ref(class, name, descriptor);
        let count = MethodDescriptor::parse(descriptor)
            .map(|d| d.argument_slots() + 1)
            .unwrap_or(1);
        self.op_u16(Opcode::Invokeinterface, index);
        self.code.push(count as u8);
        self.code.push(0);
        self
    }

    /// `new`
    pub fn new_object(&mut self, class: &str) -> &mut Self {
        let index = self.pool.class(class);
        self.op_u16(Opcode::New, index)
    }

    /// `newarray` for a primitive element type
    pub fn newarray(&mut self, element: BasicType) -> &mut Self {
        let code = match element {
            BasicType::Boolean => 4,
            BasicType::Char => 5,
            BasicType::Float => 6,
            BasicType::Double => 7,
            BasicType::Byte => 8,
            BasicType::Short => 9,
            BasicType::Int => 10,
            BasicType::Long => 11,
            BasicType::Reference => return self.anewarray("java/lang/Object"),
        };
        self.op_u8(Opcode::Newarray, code)
    }

    /// `anewarray`
    pub fn anewarray(&mut self, class: &str) -> &mut Self {
        let index = self.pool.class(class);
        self.op_u16(Opcode::Anewarray, index)
    }

    /// `multianewarray`
    pub fn multianewarray(&mut self, array_class: &str, dimensions: u8) -> &mut Self {
        let index = self.pool.class(array_class);
        self.op_u16(Opcode::Multianewarray, index);
        self.code.push(dimensions);
        self
    }

    /// `checkcast`
    pub fn checkcast(&mut self, class: &str) -> &mut Self {
        let index = self.pool.class(class);
        self.op_u16(Opcode::Checkcast, index)
    }

    /// `instanceof`
    pub fn instanceof(&mut self, class: &str) -> &mut Self {
        let index = self.pool.class(class);
        self.op_u16(Opcode::Instanceof, index)
    }

    /// Allocate an unbound label
    pub fn new_label(&mut self) -> Label {
        self.labels.push(None);
        Label(self.labels.len() - 1)
    }

    /// Bind `label` to the current pc
    pub fn bind(&mut self, label: Label) -> &mut Self {
        self.labels[label.0] = Some(self.code.len());
        self
    }

    /// Emit a branch with a 16-bit offset to `label`
    pub fn branch(&mut self, opcode: Opcode, label: Label) -> &mut Self {
        let base = self.code.len();
        self.code.push(opcode as u8);
        self.fixups.push(Fixup {
            at: self.code.len(),
            base,
            label,
            wide: false,
        });
        self.code.extend_from_slice(&[0, 0]);
        self
    }

    /// `goto label`
    pub fn goto(&mut self, label: Label) -> &mut Self {
        self.branch(Opcode::Goto, label)
    }

    fn align_switch(&mut self) {
        while self.code.len() % 4 != 0 {
            self.code.push(0);
        }
    }

    fn wide_target(&mut self, base: usize, label: Label) {
        self.fixups.push(Fixup {
            at: self.code.len(),
            base,
            label,
            wide: true,
        });
        self.code.extend_from_slice(&[0, 0, 0, 0]);
    }

    /// `tableswitch` over `low..low + targets.len()`
    pub fn tableswitch(&mut self, low: i32, default: Label, targets: &[Label]) -> &mut Self {
        let base = self.code.len();
        self.code.push(Opcode::Tableswitch as u8);
        self.align_switch();
        self.wide_target(base, default);
        let high = low + targets.len() as i32 - 1;
        self.code.extend_from_slice(&low.to_be_bytes());
        self.code.extend_from_slice(&high.to_be_bytes());
        for target in targets {
            self.wide_target(base, *target);
        }
        self
    }

    /// `lookupswitch`; pairs are sorted by key as the format requires
    pub fn lookupswitch(&mut self, default: Label, pairs: &[(i32, Label)]) -> &mut Self {
        let base = self.code.len();
        self.code.push(Opcode::Lookupswitch as u8);
        self.align_switch();
        self.wide_target(base, default);
        let mut sorted = pairs.to_vec();
        sorted.sort_by_key(|(key, _)| *key);
        self.code
            .extend_from_slice(&(sorted.len() as i32).to_be_bytes());
        for (key, target) in sorted {
            self.code.extend_from_slice(&key.to_be_bytes());
            self.wide_target(base, target);
        }
        self
    }

    /// Register an exception handler; `catch_type` of `None` catches all
    pub fn try_catch(
        &mut self,
        start: Label,
        end: Label,
        handler: Label,
        catch_type: Option<&str>,
    ) -> &mut Self {
        let catch_type = catch_type.map(|c| self.pool.class(c)).unwrap_or(0);
        self.handlers.push(Handler {
            start,
            end,
            handler,
            catch_type,
        });
        self
    }

    fn resolve(&self, label: Label) -> Result<usize> {
        self.labels
            .get(label.0)
            .copied()
            .flatten()
            .ok_or_else(|| ClassFormatError::Malformed(format!("label {} never bound", label.0)))
    }

    /// Patch branches and encode the `Code` attribute
    fn finish(mut self) -> Result<Vec<u8>> {
        if self.code.is_empty() || self.code.len() >= 65536 {
            return Err(ClassFormatError::Malformed(format!(
                "invalid code length {}",
                self.code.len()
            )));
        }
        for fixup in &self.fixups {
            let target = self.resolve(fixup.label)? as i64;
            let offset = target - fixup.base as i64;
            if fixup.wide {
                self.code[fixup.at..fixup.at + 4].copy_from_slice(&(offset as i32).to_be_bytes());
            } else {
                let short = i16::try_from(offset).map_err(|_| {
                    ClassFormatError::Malformed(format!("branch offset {} out of range", offset))
                })?;
                self.code[fixup.at..fixup.at + 2].copy_from_slice(&short.to_be_bytes());
            }
        }

        let mut body = Vec::new();
        body.extend_from_slice(&self.max_stack.to_be_bytes());
        body.extend_from_slice(&self.max_locals.to_be_bytes());
        body.extend_from_slice(&(self.code.len() as u32).to_be_bytes());
        body.extend_from_slice(&self.code);
        body.extend_from_slice(&(self.handlers.len() as u16).to_be_bytes());
        for h in &self.handlers {
            body.extend_from_slice(&(self.resolve(h.start)? as u16).to_be_bytes());
            body.extend_from_slice(&(self.resolve(h.end)? as u16).to_be_bytes());
            body.extend_from_slice(&(self.resolve(h.handler)? as u16).to_be_bytes());
            body.extend_from_slice(&h.catch_type.to_be_bytes());
        }
        if self.line_numbers.is_empty() {
            body.extend_from_slice(&0u16.to_be_bytes());
        } else {
            body.extend_from_slice(&1u16.to_be_bytes());
            let name = self.pool.utf8("LineNumberTable");
            body.extend_from_slice(&name.to_be_bytes());
            body.extend_from_slice(&(2 + 4 * self.line_numbers.len() as u32).to_be_bytes());
            body.extend_from_slice(&(self.line_numbers.len() as u16).to_be_bytes());
            for (pc, line) in &self.line_numbers {
                body.extend_from_slice(&pc.to_be_bytes());
                body.extend_from_slice(&line.to_be_bytes());
            }
        }

        let mut attr = Vec::new();
        attr.extend_from_slice(&self.pool.utf8("Code").to_be_bytes());
        attr.extend_from_slice(&(body.len() as u32).to_be_bytes());
        attr.extend(body);
        Ok(attr)
    }
}

/// Assembles a class file.
///
/// # Examples
///
/// ```
/// use classfile::{ClassAccess, ClassFile, ClassWriter, MethodAccess, Opcode};
///
/// let mut writer = ClassWriter::new("demo/Answer", Some("java/lang/Object"), ClassAccess::PUBLIC);
/// writer
///     .add_method(MethodAccess::PUBLIC | MethodAccess::STATIC, "get", "()I", |code| {
///         code.iconst(42).op(Opcode::Ireturn);
///     })
///     .unwrap();
///
/// let class = ClassFile::parse(&writer.to_bytes()).unwrap();
/// let method = class.find_method("get", "()I").unwrap();
/// assert_eq!(method.code.as_ref().unwrap().code, vec![0x10, 42, 0xac]);
/// ```
#[derive(Debug)]
pub struct ClassWriter {
    name: String,
    pool: PoolBuilder,
    access: ClassAccess,
    this_class: u16,
    super_class: u16,
    interfaces: Vec<u16>,
    fields: Vec<Vec<u8>>,
    methods: Vec<Vec<u8>>,
    source_file: Option<(u16, u16)>,
}

impl ClassWriter {
    /// Start a class named `name` extending `super_class`
    ///
    /// Interfaces are marked abstract automatically.
    pub fn new(name: &str, super_class: Option<&str>, access: ClassAccess) -> Self {
        let mut pool = PoolBuilder::new();
        let this_class = pool.class(name);
        let super_class = super_class.map(|s| pool.class(s)).unwrap_or(0);
        let access = if access.contains(ClassAccess::INTERFACE) {
            access | ClassAccess::ABSTRACT
        } else {
            access
        };
        Self {
            name: name.to_string(),
            pool,
            access,
            this_class,
            super_class,
            interfaces: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            source_file: None,
        }
    }

    /// Internal name of the class being written
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declare a direct superinterface
    pub fn add_interface(&mut self, name: &str) -> &mut Self {
        let index = self.pool.class(name);
        self.interfaces.push(index);
        self
    }

    /// Set the `SourceFile` attribute
    pub fn source_file(&mut self, file: &str) -> &mut Self {
        let attribute_name = self.pool.utf8("SourceFile");
        self.source_file = Some((attribute_name, self.pool.utf8(file)));
        self
    }

    /// Declare a field without attributes
    pub fn add_field(&mut self, access: FieldAccess, name: &str, descriptor: &str) -> &mut Self {
        let mut out = Vec::new();
        out.extend_from_slice(&access.bits().to_be_bytes());
        out.extend_from_slice(&self.pool.utf8(name).to_be_bytes());
        out.extend_from_slice(&self.pool.utf8(descriptor).to_be_bytes());
        out.extend_from_slice(&0u16.to_be_bytes());
        self.fields.push(out);
        self
    }

    /// Declare a static field with a `ConstantValue` attribute
    pub fn add_constant_field(
        &mut self,
        access: FieldAccess,
        name: &str,
        descriptor: &str,
        value: ConstantValue,
    ) -> &mut Self {
        let value_index = match value {
            ConstantValue::Int(v) => self.pool.add(Constant::Integer(v)),
            ConstantValue::Long(v) => self.pool.add(Constant::Long(v)),
            ConstantValue::Float(v) => self.pool.add(Constant::Float(v)),
            ConstantValue::Double(v) => self.pool.add(Constant::Double(v)),
            ConstantValue::String(s) => self.pool.string(&s),
        };
        let mut out = Vec::new();
        out.extend_from_slice(&(access | FieldAccess::STATIC).bits().to_be_bytes());
        out.extend_from_slice(&self.pool.utf8(name).to_be_bytes());
        out.extend_from_slice(&self.pool.utf8(descriptor).to_be_bytes());
        out.extend_from_slice(&1u16.to_be_bytes());
        out.extend_from_slice(&self.pool.utf8("ConstantValue").to_be_bytes());
        out.extend_from_slice(&2u32.to_be_bytes());
        out.extend_from_slice(&value_index.to_be_bytes());
        self.fields.push(out);
        self
    }

    /// Declare a method with a body built by `build`
    ///
    /// # Arguments
    ///
    /// * `access` - Method flags; must not include `NATIVE` or `ABSTRACT`
    /// * `name` - Method name
    /// * `descriptor` - Method descriptor
    /// * `build` - Emits the instructions
    ///
    /// # Returns
    ///
    /// An error if a label was never bound, a branch does not fit its
    /// offset, or the body is empty.
    pub fn add_method<F>(
        &mut self,
        access: MethodAccess,
        name: &str,
        descriptor: &str,
        build: F,
    ) -> Result<&mut Self>
    where
        F: FnOnce(&mut CodeBuilder<'_>),
    {
        let parsed = MethodDescriptor::parse(descriptor)
            .map_err(|e| ClassFormatError::Malformed(e.message))?;
        let receiver = if access.contains(MethodAccess::STATIC) { 0 } else { 1 };
        let initial_locals = (parsed.argument_slots() + receiver) as u16;

        let name_index = self.pool.utf8(name);
        let descriptor_index = self.pool.utf8(descriptor);
        let mut code = CodeBuilder::new(&mut self.pool, initial_locals);
        build(&mut code);
        let attr = code.finish()?;

        let mut out = Vec::new();
        out.extend_from_slice(&access.bits().to_be_bytes());
        out.extend_from_slice(&name_index.to_be_bytes());
        out.extend_from_slice(&descriptor_index.to_be_bytes());
        out.extend_from_slice(&1u16.to_be_bytes());
        out.extend(attr);
        self.methods.push(out);
        Ok(self)
    }

    /// Declare a method without a body (`native` or `abstract` must be set)
    pub fn add_bodiless_method(
        &mut self,
        access: MethodAccess,
        name: &str,
        descriptor: &str,
    ) -> &mut Self {
        let mut out = Vec::new();
        out.extend_from_slice(&access.bits().to_be_bytes());
        out.extend_from_slice(&self.pool.utf8(name).to_be_bytes());
        out.extend_from_slice(&self.pool.utf8(descriptor).to_be_bytes());
        out.extend_from_slice(&0u16.to_be_bytes());
        self.methods.push(out);
        self
    }

    /// Declare a `native` method
    pub fn add_native_method(
        &mut self,
        access: MethodAccess,
        name: &str,
        descriptor: &str,
    ) -> &mut Self {
        self.add_bodiless_method(access | MethodAccess::NATIVE, name, descriptor)
    }

    /// Declare an `abstract` method
    pub fn add_abstract_method(
        &mut self,
        access: MethodAccess,
        name: &str,
        descriptor: &str,
    ) -> &mut Self {
        self.add_bodiless_method(access | MethodAccess::ABSTRACT, name, descriptor)
    }

    /// Serialize to class file bytes
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&MAGIC.to_be_bytes());
        out.extend_from_slice(&0u16.to_be_bytes());
        out.extend_from_slice(&WRITER_MAJOR_VERSION.to_be_bytes());
        self.pool.encode(&mut out);
        out.extend_from_slice(&self.access.bits().to_be_bytes());
        out.extend_from_slice(&self.this_class.to_be_bytes());
        out.extend_from_slice(&self.super_class.to_be_bytes());
        out.extend_from_slice(&(self.interfaces.len() as u16).to_be_bytes());
        for i in &self.interfaces {
            out.extend_from_slice(&i.to_be_bytes());
        }
        out.extend_from_slice(&(self.fields.len() as u16).to_be_bytes());
        for f in &self.fields {
            out.extend_from_slice(f);
        }
        out.extend_from_slice(&(self.methods.len() as u16).to_be_bytes());
        for m in &self.methods {
            out.extend_from_slice(m);
        }
        match self.source_file {
            Some((attribute_name, index)) => {
                out.extend_from_slice(&1u16.to_be_bytes());
                out.extend_from_slice(&attribute_name.to_be_bytes());
                out.extend_from_slice(&2u32.to_be_bytes());
                out.extend_from_slice(&index.to_be_bytes());
            }
            None => out.extend_from_slice(&0u16.to_be_bytes()),
        }
        out
    }
}
