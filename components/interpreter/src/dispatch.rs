//! Dispatch loop for bytecode execution
//!
//! Executes one instruction at a time on the top frame of the current
//! thread. Invocations push a frame and return to the loop, so deep Java
//! recursion does not consume host stack.

use std::cmp::Ordering;
use std::sync::Arc;

use class_loader::{names, ArrayComponent, ClassDescriptor};
use classfile::{Loadable, Opcode};
use core_types::{BasicType, ErrorKind, JvmError, JvmResult, ObjectRef, Value};
use memory_manager::{HeapError, ObjectShape};

use crate::call_frame::Frame;
use crate::exceptions::Unwind;
use crate::execution::ExecutionContext;
use crate::invoke::InvokeKind;

/// What the loop does after an instruction.
#[derive(Debug)]
enum Step {
    Next,
    Return(Option<Value>),
}

fn truncated(at: usize) -> JvmError {
    JvmError::class_format(format!("truncated instruction at offset {}", at))
}

fn u8_at(code: &[u8], at: usize) -> JvmResult<u8> {
    code.get(at).copied().ok_or_else(|| truncated(at))
}

fn u16_at(code: &[u8], at: usize) -> JvmResult<u16> {
    Ok(u16::from_be_bytes([u8_at(code, at)?, u8_at(code, at + 1)?]))
}

fn i16_at(code: &[u8], at: usize) -> JvmResult<i16> {
    Ok(u16_at(code, at)? as i16)
}

fn i32_at(code: &[u8], at: usize) -> JvmResult<i32> {
    let bytes = code.get(at..at + 4).ok_or_else(|| truncated(at))?;
    Ok(i32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

fn int_binary(frame: &mut Frame, op: impl FnOnce(i32, i32) -> i32) -> JvmResult<()> {
    let b = frame.pop_int()?;
    let a = frame.pop_int()?;
    frame.push(Value::Int(op(a, b)));
    Ok(())
}

fn long_binary(frame: &mut Frame, op: impl FnOnce(i64, i64) -> i64) -> JvmResult<()> {
    let b = frame.pop_long()?;
    let a = frame.pop_long()?;
    frame.push(Value::Long(op(a, b)));
    Ok(())
}

fn long_shift(frame: &mut Frame, op: impl FnOnce(i64, u32) -> i64) -> JvmResult<()> {
    let shift = frame.pop_int()?;
    let a = frame.pop_long()?;
    frame.push(Value::Long(op(a, shift as u32)));
    Ok(())
}

fn float_binary(frame: &mut Frame, op: impl FnOnce(f32, f32) -> f32) -> JvmResult<()> {
    let b = frame.pop_float()?;
    let a = frame.pop_float()?;
    frame.push(Value::Float(op(a, b)));
    Ok(())
}

fn double_binary(frame: &mut Frame, op: impl FnOnce(f64, f64) -> f64) -> JvmResult<()> {
    let b = frame.pop_double()?;
    let a = frame.pop_double()?;
    frame.push(Value::Double(op(a, b)));
    Ok(())
}

/// `fcmpl`/`fcmpg`/`dcmpl`/`dcmpg`: `nan` is the result when either
/// operand is NaN.
fn compare_floating<T: PartialOrd>(a: T, b: T, nan: i32) -> i32 {
    match a.partial_cmp(&b) {
        Some(Ordering::Less) => -1,
        Some(Ordering::Equal) => 0,
        Some(Ordering::Greater) => 1,
        None => nan,
    }
}

fn unsupported(opcode: Opcode) -> JvmError {
    JvmError::unsupported(format!("instruction {} is not supported", opcode.mnemonic()))
}

impl ExecutionContext<'_> {
    /// Runs the top frames until the stack is back at `base_depth`.
    ///
    /// # Returns
    ///
    /// The value returned by the frame at `base_depth`, or the unwind that
    /// ended it. Frames above `base_depth` are gone in every case.
    pub(crate) fn run(&mut self, base_depth: usize) -> Result<Option<Value>, Unwind> {
        loop {
            let result = match self.step() {
                Ok(Step::Next) => continue,
                Ok(Step::Return(value)) => self.finish_frame(base_depth, value),
                Err(unwind) => Err(unwind),
            };
            match result {
                Ok(Some(value)) => return Ok(value),
                Ok(None) => {}
                Err(Unwind::Exception) => match self.find_handler(base_depth) {
                    Ok(true) => {}
                    Ok(false) => return Err(Unwind::Exception),
                    Err(fatal) => {
                        self.unwind_to(base_depth);
                        return Err(fatal);
                    }
                },
                Err(fatal) => {
                    self.unwind_to(base_depth);
                    return Err(fatal);
                }
            }
        }
    }

    /// Pops a returning frame. `Some` carries the result once the stack is
    /// back at `base_depth`.
    fn finish_frame(
        &mut self,
        base_depth: usize,
        value: Option<Value>,
    ) -> Result<Option<Option<Value>>, Unwind> {
        let frame = self.stack_mut().pop_frame()?;
        if let Some(monitor) = frame.monitor {
            self.monitor_exit(monitor)?;
        }
        if self.stack().depth() <= base_depth {
            return Ok(Some(value));
        }
        if let Some(value) = value {
            self.current_frame()?.push(value);
        }
        Ok(None)
    }

    fn current_frame(&mut self) -> Result<&mut Frame, Unwind> {
        Ok(self.stack_mut().top_mut()?)
    }

    /// Transfers control to `pc + offset`, polling for a safepoint on
    /// backward branches.
    fn jump(&mut self, pc: usize, offset: i32) -> Result<(), Unwind> {
        let target = pc as i64 + offset as i64;
        if target < 0 {
            return Err(Unwind::Fatal(JvmError::class_format(format!(
                "branch from {} to {} leaves the method",
                pc, target
            ))));
        }
        self.current_frame()?.pc = target as usize;
        if offset <= 0 {
            self.safepoint_poll();
        }
        Ok(())
    }

    fn branch_if(&mut self, pc: usize, offset: i16, taken: bool) -> Result<(), Unwind> {
        if taken {
            self.jump(pc, offset as i32)?;
        }
        Ok(())
    }

    /// Maps array access failures to the Java exceptions they raise.
    fn array_error(&mut self, err: HeapError) -> Unwind {
        match err {
            HeapError::IndexOutOfBounds { index, length } => self.throw_new(
                names::ARRAY_INDEX_OUT_OF_BOUNDS_EXCEPTION,
                Some(&format!("Index {} out of bounds for length {}", index, length)),
            ),
            other => Unwind::from(other),
        }
    }

    fn array_load(&mut self) -> Result<(), Unwind> {
        let frame = self.current_frame()?;
        let index = frame.pop_int()?;
        let Some(array) = frame.pop_reference()? else {
            return Err(self.throw_null_pointer());
        };
        let loaded = self.vm().heap().lock().array_load(array, index);
        let value = loaded.map_err(|err| self.array_error(err))?;
        self.current_frame()?.push(value);
        Ok(())
    }

    fn array_store(&mut self) -> Result<(), Unwind> {
        let vm = self.vm();
        let frame = self.current_frame()?;
        let value = frame.pop()?;
        let index = frame.pop_int()?;
        let Some(array) = frame.pop_reference()? else {
            return Err(self.throw_null_pointer());
        };
        if let Value::Reference(Some(element)) = value {
            self.check_array_store(array, element)?;
        }
        let stored = vm.heap().lock().array_store(array, index, value);
        stored.map_err(|err| self.array_error(err))
    }

    /// `aastore` type check.
    fn check_array_store(&mut self, array: ObjectRef, element: ObjectRef) -> Result<(), Unwind> {
        let vm = self.vm();
        let (array_class, element_class) = {
            let heap = vm.heap().lock();
            (heap.class_of(array)?, heap.class_of(element)?)
        };
        let array_class = vm.loader().get(array_class)?;
        let Some(ArrayComponent::Reference(component)) = array_class.as_array().map(|a| a.component) else {
            return Ok(());
        };
        if vm.loader().is_assignable(element_class, component)? {
            return Ok(());
        }
        let name = names::to_binary(vm.loader().get(element_class)?.name());
        Err(self.throw_new(names::ARRAY_STORE_EXCEPTION, Some(&name)))
    }

    fn new_array(&mut self, class: &Arc<ClassDescriptor>, count: i32) -> Result<ObjectRef, Unwind> {
        if count < 0 {
            return Err(self.throw_new(
                names::NEGATIVE_ARRAY_SIZE_EXCEPTION,
                Some(&count.to_string()),
            ));
        }
        let element = class.element_type().ok_or_else(|| {
            Unwind::Fatal(JvmError::internal(format!("{} is not an array class", class.name())))
        })?;
        self.allocate(ObjectShape::Array {
            class: class.id(),
            element,
            length: count as u32,
        })
    }

    /// Allocates nested arrays for `multianewarray`; `counts` starts with
    /// the outermost dimension.
    fn new_multi_array(&mut self, class: &Arc<ClassDescriptor>, counts: &[i32]) -> Result<ObjectRef, Unwind> {
        let vm = self.vm();
        let outer = self.new_array(class, counts[0])?;
        let component = match class.as_array().map(|a| a.component) {
            Some(ArrayComponent::Reference(component)) if counts.len() > 1 => vm.loader().get(component)?,
            _ => return Ok(outer),
        };
        let mark = self.push_handle(Value::object(outer));
        for index in 0..counts[0] {
            let inner = match self.new_multi_array(&component, &counts[1..]) {
                Ok(inner) => inner,
                Err(unwind) => {
                    self.truncate_handles(mark);
                    return Err(unwind);
                }
            };
            if let Some(outer) = self.handle(mark).as_object() {
                vm.heap().lock().array_store(outer, index, Value::object(inner))?;
            }
        }
        let outer = self.handle(mark);
        self.truncate_handles(mark);
        outer
            .as_object()
            .ok_or_else(|| Unwind::Fatal(JvmError::internal("array handle was cleared")))
    }

    fn is_assignable_to(&self, object: ObjectRef, class: &ClassDescriptor) -> Result<bool, Unwind> {
        let vm = self.vm();
        let from = vm.heap().lock().class_of(object)?;
        Ok(vm.loader().is_assignable(from, class.id())?)
    }

    fn incompatible(&mut self, message: String) -> Unwind {
        self.raise(JvmError::new(ErrorKind::IncompatibleClassChange, message))
    }

    fn get_static(&mut self, index: u16) -> Result<(), Unwind> {
        let vm = self.vm();
        let field = self.resolve_field_ref(index)?;
        if !field.is_static() {
            return Err(self.incompatible(format!("Expected static field {}", field.name)));
        }
        let owner = vm.loader().get(field.owner)?;
        self.ensure_initialized(&owner)?;
        let storage = owner
            .static_storage()
            .ok_or_else(|| Unwind::Fatal(JvmError::internal("initialized class without statics")))?;
        let value = vm
            .heap()
            .lock()
            .read_slot(storage, field.slot, field.basic_type())?;
        self.current_frame()?.push(value);
        Ok(())
    }

    fn put_static(&mut self, index: u16) -> Result<(), Unwind> {
        let vm = self.vm();
        let field = self.resolve_field_ref(index)?;
        if !field.is_static() {
            return Err(self.incompatible(format!("Expected static field {}", field.name)));
        }
        let owner = vm.loader().get(field.owner)?;
        self.ensure_initialized(&owner)?;
        let value = narrow_field_value(self.current_frame()?.pop()?, field.basic_type());
        let storage = owner
            .static_storage()
            .ok_or_else(|| Unwind::Fatal(JvmError::internal("initialized class without statics")))?;
        vm.heap().lock().write_slot(storage, field.slot, value)?;
        Ok(())
    }

    fn get_field(&mut self, index: u16) -> Result<(), Unwind> {
        let vm = self.vm();
        let field = self.resolve_field_ref(index)?;
        if field.is_static() {
            return Err(self.incompatible(format!("Expected non-static field {}", field.name)));
        }
        let Some(object) = self.current_frame()?.pop_reference()? else {
            return Err(self.throw_null_pointer());
        };
        let value = vm
            .heap()
            .lock()
            .read_slot(object, field.slot, field.basic_type())?;
        self.current_frame()?.push(value);
        Ok(())
    }

    fn put_field(&mut self, index: u16) -> Result<(), Unwind> {
        let vm = self.vm();
        let field = self.resolve_field_ref(index)?;
        if field.is_static() {
            return Err(self.incompatible(format!("Expected non-static field {}", field.name)));
        }
        let frame = self.current_frame()?;
        let value = narrow_field_value(frame.pop()?, field.basic_type());
        let Some(object) = frame.pop_reference()? else {
            return Err(self.throw_null_pointer());
        };
        vm.heap().lock().write_slot(object, field.slot, value)?;
        Ok(())
    }

    fn new_instance(&mut self, index: u16) -> Result<(), Unwind> {
        let class = self.resolve_class_ref(index)?;
        if class.is_interface() || class.is_abstract() || class.is_array() {
            return Err(self.incompatible(format!(
                "cannot instantiate {}",
                names::to_binary(class.name())
            )));
        }
        self.ensure_initialized(&class)?;
        let object = self.allocate(ObjectShape::Instance {
            class: class.id(),
            slots: class.instance_slots(),
        })?;
        self.current_frame()?.push(Value::object(object));
        Ok(())
    }

    fn load_constant(&mut self, index: u16) -> Result<(), Unwind> {
        let class = self.current_frame()?.class().clone();
        let pool = class
            .constant_pool()
            .ok_or_else(|| Unwind::Fatal(JvmError::internal("array classes have no constant pool")))?;
        let value = match pool.loadable(index).map_err(JvmError::from)? {
            Loadable::Integer(v) => Value::Int(v),
            Loadable::Float(v) => Value::Float(v),
            Loadable::Long(v) => Value::Long(v),
            Loadable::Double(v) => Value::Double(v),
            Loadable::String(text) => Value::object(self.intern_string(text)?),
            Loadable::Class(name) => {
                return Err(self.raise(JvmError::unsupported(format!(
                    "class literal {} requires java.lang.Class",
                    names::to_binary(name)
                ))))
            }
        };
        self.current_frame()?.push(value);
        Ok(())
    }

    fn table_switch(&mut self, code: &[u8], pc: usize) -> Result<(), Unwind> {
        let base = (pc + 4) & !3;
        let default = i32_at(code, base)?;
        let low = i32_at(code, base + 4)?;
        let high = i32_at(code, base + 8)?;
        let key = self.current_frame()?.pop_int()?;
        let offset = if key < low || key > high {
            default
        } else {
            i32_at(code, base + 12 + 4 * (key as i64 - low as i64) as usize)?
        };
        self.jump(pc, offset)
    }

    fn lookup_switch(&mut self, code: &[u8], pc: usize) -> Result<(), Unwind> {
        let base = (pc + 4) & !3;
        let default = i32_at(code, base)?;
        let pairs = i32_at(code, base + 4)?.max(0) as usize;
        let key = self.current_frame()?.pop_int()?;
        let mut offset = default;
        for pair in 0..pairs {
            let at = base + 8 + pair * 8;
            if i32_at(code, at)? == key {
                offset = i32_at(code, at + 4)?;
                break;
            }
        }
        self.jump(pc, offset)
    }

    /// `wide` prefix: 16-bit local index (and 16-bit increment for `iinc`).
    fn wide(&mut self, code: &[u8], pc: usize) -> Result<(), Unwind> {
        let opcode = Opcode::from_byte(u8_at(code, pc + 1)?)
            .ok_or_else(|| Unwind::Fatal(JvmError::class_format("invalid opcode after wide")))?;
        let index = u16_at(code, pc + 2)? as usize;
        let frame = self.current_frame()?;
        match opcode {
            Opcode::Iinc => {
                let delta = i16_at(code, pc + 4)? as i32;
                let value = frame.load(index)?.as_int().unwrap_or(0);
                frame.store(index, Value::Int(value.wrapping_add(delta)))?;
                frame.pc = pc + 6;
                return Ok(());
            }
            Opcode::Iload | Opcode::Lload | Opcode::Fload | Opcode::Dload | Opcode::Aload => {
                let value = frame.load(index)?;
                frame.push(value);
            }
            Opcode::Istore | Opcode::Lstore | Opcode::Fstore | Opcode::Dstore | Opcode::Astore => {
                let value = frame.pop()?;
                frame.store(index, value)?;
            }
            other => return Err(self.raise(unsupported(other))),
        }
        self.current_frame()?.pc = pc + 4;
        Ok(())
    }

    /// Executes the instruction at the top frame's pc.
    fn step(&mut self) -> Result<Step, Unwind> {
        let frame = self.current_frame()?;
        let method = frame.method().clone();
        let code: &[u8] = match method.code.as_ref() {
            Some(code) => &code.code,
            None => {
                return Err(Unwind::Fatal(JvmError::internal(format!(
                    "{} has no bytecode",
                    method.qualified_name()
                ))))
            }
        };
        let pc = frame.pc;
        frame.instruction_pc = pc;
        let byte = u8_at(code, pc)?;
        let Some(opcode) = Opcode::from_byte(byte) else {
            return Err(self.raise(JvmError::class_format(format!(
                "invalid opcode {:#04x} at {} in {}",
                byte,
                pc,
                method.qualified_name()
            ))));
        };
        frame.pc = pc + 1 + opcode.operand_length().unwrap_or(0);

        match opcode {
            Opcode::Nop => {}

            // Constants
            Opcode::AconstNull => frame.push(Value::NULL),
            Opcode::IconstM1 => frame.push(Value::Int(-1)),
            Opcode::Iconst0 => frame.push(Value::Int(0)),
            Opcode::Iconst1 => frame.push(Value::Int(1)),
            Opcode::Iconst2 => frame.push(Value::Int(2)),
            Opcode::Iconst3 => frame.push(Value::Int(3)),
            Opcode::Iconst4 => frame.push(Value::Int(4)),
            Opcode::Iconst5 => frame.push(Value::Int(5)),
            Opcode::Lconst0 => frame.push(Value::Long(0)),
            Opcode::Lconst1 => frame.push(Value::Long(1)),
            Opcode::Fconst0 => frame.push(Value::Float(0.0)),
            Opcode::Fconst1 => frame.push(Value::Float(1.0)),
            Opcode::Fconst2 => frame.push(Value::Float(2.0)),
            Opcode::Dconst0 => frame.push(Value::Double(0.0)),
            Opcode::Dconst1 => frame.push(Value::Double(1.0)),
            Opcode::Bipush => frame.push(Value::Int(u8_at(code, pc + 1)? as i8 as i32)),
            Opcode::Sipush => frame.push(Value::Int(i16_at(code, pc + 1)? as i32)),
            Opcode::Ldc => self.load_constant(u8_at(code, pc + 1)? as u16)?,
            Opcode::LdcW | Opcode::Ldc2W => self.load_constant(u16_at(code, pc + 1)?)?,

            // Locals
            Opcode::Iload | Opcode::Lload | Opcode::Fload | Opcode::Dload | Opcode::Aload => {
                let value = frame.load(u8_at(code, pc + 1)? as usize)?;
                frame.push(value);
            }
            Opcode::Iload0 | Opcode::Lload0 | Opcode::Fload0 | Opcode::Dload0 | Opcode::Aload0 => {
                let value = frame.load(0)?;
                frame.push(value);
            }
            Opcode::Iload1 | Opcode::Lload1 | Opcode::Fload1 | Opcode::Dload1 | Opcode::Aload1 => {
                let value = frame.load(1)?;
                frame.push(value);
            }
            Opcode::Iload2 | Opcode::Lload2 | Opcode::Fload2 | Opcode::Dload2 | Opcode::Aload2 => {
                let value = frame.load(2)?;
                frame.push(value);
            }
            Opcode::Iload3 | Opcode::Lload3 | Opcode::Fload3 | Opcode::Dload3 | Opcode::Aload3 => {
                let value = frame.load(3)?;
                frame.push(value);
            }
            Opcode::Istore | Opcode::Lstore | Opcode::Fstore | Opcode::Dstore | Opcode::Astore => {
                let value = frame.pop()?;
                frame.store(u8_at(code, pc + 1)? as usize, value)?;
            }
            Opcode::Istore0 | Opcode::Lstore0 | Opcode::Fstore0 | Opcode::Dstore0 | Opcode::Astore0 => {
                let value = frame.pop()?;
                frame.store(0, value)?;
            }
            Opcode::Istore1 | Opcode::Lstore1 | Opcode::Fstore1 | Opcode::Dstore1 | Opcode::Astore1 => {
                let value = frame.pop()?;
                frame.store(1, value)?;
            }
            Opcode::Istore2 | Opcode::Lstore2 | Opcode::Fstore2 | Opcode::Dstore2 | Opcode::Astore2 => {
                let value = frame.pop()?;
                frame.store(2, value)?;
            }
            Opcode::Istore3 | Opcode::Lstore3 | Opcode::Fstore3 | Opcode::Dstore3 | Opcode::Astore3 => {
                let value = frame.pop()?;
                frame.store(3, value)?;
            }
            Opcode::Iinc => {
                let index = u8_at(code, pc + 1)? as usize;
                let delta = u8_at(code, pc + 2)? as i8 as i32;
                let value = frame.load(index)?.as_int().unwrap_or(0);
                frame.store(index, Value::Int(value.wrapping_add(delta)))?;
            }
            Opcode::Wide => self.wide(code, pc)?,

            // Arrays
            Opcode::Iaload
            | Opcode::Laload
            | Opcode::Faload
            | Opcode::Daload
            | Opcode::Aaload
            | Opcode::Baload
            | Opcode::Caload
            | Opcode::Saload => self.array_load()?,
            Opcode::Iastore
            | Opcode::Lastore
            | Opcode::Fastore
            | Opcode::Dastore
            | Opcode::Aastore
            | Opcode::Bastore
            | Opcode::Castore
            | Opcode::Sastore => self.array_store()?,
            Opcode::Arraylength => {
                let Some(array) = frame.pop_reference()? else {
                    return Err(self.throw_null_pointer());
                };
                let length = self.vm().heap().lock().array_length(array)?;
                self.current_frame()?.push(Value::Int(length as i32));
            }
            Opcode::Newarray => {
                let code_byte = u8_at(code, pc + 1)?;
                let element = BasicType::from_newarray_code(code_byte).ok_or_else(|| {
                    Unwind::Fatal(JvmError::class_format(format!("invalid newarray type {}", code_byte)))
                })?;
                let count = frame.pop_int()?;
                let class = self.vm().loader().primitive_array_class(element);
                let class = self.check(class)?;
                let array = self.new_array(&class, count)?;
                self.current_frame()?.push(Value::object(array));
            }
            Opcode::Anewarray => {
                let component = self.resolve_class_ref(u16_at(code, pc + 1)?)?;
                let class = self.vm().loader().array_class_of(&component);
                let class = self.check(class)?;
                let count = self.current_frame()?.pop_int()?;
                let array = self.new_array(&class, count)?;
                self.current_frame()?.push(Value::object(array));
            }
            Opcode::Multianewarray => {
                let class = self.resolve_class_ref(u16_at(code, pc + 1)?)?;
                let dimensions = u8_at(code, pc + 3)? as usize;
                let available = class.as_array().map(|a| a.dimensions as usize).unwrap_or(0);
                if dimensions == 0 || dimensions > available {
                    return Err(Unwind::Fatal(JvmError::class_format(format!(
                        "multianewarray of {} dimensions on {}",
                        dimensions,
                        class.name()
                    ))));
                }
                let frame = self.current_frame()?;
                let mut counts = vec![0i32; dimensions];
                for slot in counts.iter_mut().rev() {
                    *slot = frame.pop_int()?;
                }
                if let Some(negative) = counts.iter().find(|c| **c < 0) {
                    let message = negative.to_string();
                    return Err(self.throw_new(names::NEGATIVE_ARRAY_SIZE_EXCEPTION, Some(&message)));
                }
                let array = self.new_multi_array(&class, &counts)?;
                self.current_frame()?.push(Value::object(array));
            }

            // Operand stack
            Opcode::Pop => {
                frame.pop()?;
            }
            Opcode::Pop2 => {
                if !frame.pop()?.is_category2() {
                    frame.pop()?;
                }
            }
            Opcode::Dup => {
                let v = frame.peek(0)?;
                frame.push(v);
            }
            Opcode::DupX1 => {
                let v1 = frame.pop()?;
                let v2 = frame.pop()?;
                frame.push(v1);
                frame.push(v2);
                frame.push(v1);
            }
            Opcode::DupX2 => {
                let v1 = frame.pop()?;
                let v2 = frame.pop()?;
                if v2.is_category2() {
                    frame.push(v1);
                    frame.push(v2);
                } else {
                    let v3 = frame.pop()?;
                    frame.push(v1);
                    frame.push(v3);
                    frame.push(v2);
                }
                frame.push(v1);
            }
            Opcode::Dup2 => {
                let v1 = frame.pop()?;
                if v1.is_category2() {
                    frame.push(v1);
                    frame.push(v1);
                } else {
                    let v2 = frame.pop()?;
                    frame.push(v2);
                    frame.push(v1);
                    frame.push(v2);
                    frame.push(v1);
                }
            }
            Opcode::Dup2X1 => {
                let v1 = frame.pop()?;
                if v1.is_category2() {
                    let v2 = frame.pop()?;
                    frame.push(v1);
                    frame.push(v2);
                    frame.push(v1);
                } else {
                    let v2 = frame.pop()?;
                    let v3 = frame.pop()?;
                    frame.push(v2);
                    frame.push(v1);
                    frame.push(v3);
                    frame.push(v2);
                    frame.push(v1);
                }
            }
            Opcode::Dup2X2 => {
                let v1 = frame.pop()?;
                if v1.is_category2() {
                    let v2 = frame.pop()?;
                    if v2.is_category2() {
                        frame.push(v1);
                        frame.push(v2);
                    } else {
                        let v3 = frame.pop()?;
                        frame.push(v1);
                        frame.push(v3);
                        frame.push(v2);
                    }
                    frame.push(v1);
                } else {
                    let v2 = frame.pop()?;
                    let v3 = frame.pop()?;
                    if v3.is_category2() {
                        frame.push(v2);
                        frame.push(v1);
                        frame.push(v3);
                    } else {
                        let v4 = frame.pop()?;
                        frame.push(v2);
                        frame.push(v1);
                        frame.push(v4);
                        frame.push(v3);
                    }
                    frame.push(v2);
                    frame.push(v1);
                }
            }
            Opcode::Swap => {
                let v1 = frame.pop()?;
                let v2 = frame.pop()?;
                frame.push(v1);
                frame.push(v2);
            }

            // Arithmetic
            Opcode::Iadd => int_binary(frame, i32::wrapping_add)?,
            Opcode::Ladd => long_binary(frame, i64::wrapping_add)?,
            Opcode::Fadd => float_binary(frame, |a, b| a + b)?,
            Opcode::Dadd => double_binary(frame, |a, b| a + b)?,
            Opcode::Isub => int_binary(frame, i32::wrapping_sub)?,
            Opcode::Lsub => long_binary(frame, i64::wrapping_sub)?,
            Opcode::Fsub => float_binary(frame, |a, b| a - b)?,
            Opcode::Dsub => double_binary(frame, |a, b| a - b)?,
            Opcode::Imul => int_binary(frame, i32::wrapping_mul)?,
            Opcode::Lmul => long_binary(frame, i64::wrapping_mul)?,
            Opcode::Fmul => float_binary(frame, |a, b| a * b)?,
            Opcode::Dmul => double_binary(frame, |a, b| a * b)?,
            Opcode::Idiv | Opcode::Irem => {
                let b = frame.pop_int()?;
                let a = frame.pop_int()?;
                if b == 0 {
                    return Err(self.throw_new(names::ARITHMETIC_EXCEPTION, Some("/ by zero")));
                }
                let result = if opcode == Opcode::Idiv {
                    a.wrapping_div(b)
                } else {
                    a.wrapping_rem(b)
                };
                frame.push(Value::Int(result));
            }
            Opcode::Ldiv | Opcode::Lrem => {
                let b = frame.pop_long()?;
                let a = frame.pop_long()?;
                if b == 0 {
                    return Err(self.throw_new(names::ARITHMETIC_EXCEPTION, Some("/ by zero")));
                }
                let result = if opcode == Opcode::Ldiv {
                    a.wrapping_div(b)
                } else {
                    a.wrapping_rem(b)
                };
                frame.push(Value::Long(result));
            }
            Opcode::Fdiv => float_binary(frame, |a, b| a / b)?,
            Opcode::Ddiv => double_binary(frame, |a, b| a / b)?,
            Opcode::Frem => float_binary(frame, |a, b| a % b)?,
            Opcode::Drem => double_binary(frame, |a, b| a % b)?,
            Opcode::Ineg => {
                let v = frame.pop_int()?;
                frame.push(Value::Int(v.wrapping_neg()));
            }
            Opcode::Lneg => {
                let v = frame.pop_long()?;
                frame.push(Value::Long(v.wrapping_neg()));
            }
            Opcode::Fneg => {
                let v = frame.pop_float()?;
                frame.push(Value::Float(-v));
            }
            Opcode::Dneg => {
                let v = frame.pop_double()?;
                frame.push(Value::Double(-v));
            }
            Opcode::Ishl => int_binary(frame, |a, b| a.wrapping_shl(b as u32))?,
            Opcode::Ishr => int_binary(frame, |a, b| a.wrapping_shr(b as u32))?,
            Opcode::Iushr => int_binary(frame, |a, b| (a as u32).wrapping_shr(b as u32) as i32)?,
            Opcode::Lshl => long_shift(frame, i64::wrapping_shl)?,
            Opcode::Lshr => long_shift(frame, i64::wrapping_shr)?,
            Opcode::Lushr => long_shift(frame, |a, s| (a as u64).wrapping_shr(s) as i64)?,
            Opcode::Iand => int_binary(frame, |a, b| a & b)?,
            Opcode::Land => long_binary(frame, |a, b| a & b)?,
            Opcode::Ior => int_binary(frame, |a, b| a | b)?,
            Opcode::Lor => long_binary(frame, |a, b| a | b)?,
            Opcode::Ixor => int_binary(frame, |a, b| a ^ b)?,
            Opcode::Lxor => long_binary(frame, |a, b| a ^ b)?,

            // Conversions
            Opcode::I2l => {
                let v = frame.pop_int()?;
                frame.push(Value::Long(v as i64));
            }
            Opcode::I2f => {
                let v = frame.pop_int()?;
                frame.push(Value::Float(v as f32));
            }
            Opcode::I2d => {
                let v = frame.pop_int()?;
                frame.push(Value::Double(v as f64));
            }
            Opcode::L2i => {
                let v = frame.pop_long()?;
                frame.push(Value::Int(v as i32));
            }
            Opcode::L2f => {
                let v = frame.pop_long()?;
                frame.push(Value::Float(v as f32));
            }
            Opcode::L2d => {
                let v = frame.pop_long()?;
                frame.push(Value::Double(v as f64));
            }
            Opcode::F2i => {
                let v = frame.pop_float()?;
                frame.push(Value::Int(v as i32));
            }
            Opcode::F2l => {
                let v = frame.pop_float()?;
                frame.push(Value::Long(v as i64));
            }
            Opcode::F2d => {
                let v = frame.pop_float()?;
                frame.push(Value::Double(v as f64));
            }
            Opcode::D2i => {
                let v = frame.pop_double()?;
                frame.push(Value::Int(v as i32));
            }
            Opcode::D2l => {
                let v = frame.pop_double()?;
                frame.push(Value::Long(v as i64));
            }
            Opcode::D2f => {
                let v = frame.pop_double()?;
                frame.push(Value::Float(v as f32));
            }
            Opcode::I2b => {
                let v = frame.pop_int()?;
                frame.push(Value::Int(v as i8 as i32));
            }
            Opcode::I2c => {
                let v = frame.pop_int()?;
                frame.push(Value::Int(v as u16 as i32));
            }
            Opcode::I2s => {
                let v = frame.pop_int()?;
                frame.push(Value::Int(v as i16 as i32));
            }

            // Comparisons
            Opcode::Lcmp => {
                let b = frame.pop_long()?;
                let a = frame.pop_long()?;
                frame.push(Value::Int(a.cmp(&b) as i32));
            }
            Opcode::Fcmpl | Opcode::Fcmpg => {
                let b = frame.pop_float()?;
                let a = frame.pop_float()?;
                let nan = if opcode == Opcode::Fcmpl { -1 } else { 1 };
                frame.push(Value::Int(compare_floating(a, b, nan)));
            }
            Opcode::Dcmpl | Opcode::Dcmpg => {
                let b = frame.pop_double()?;
                let a = frame.pop_double()?;
                let nan = if opcode == Opcode::Dcmpl { -1 } else { 1 };
                frame.push(Value::Int(compare_floating(a, b, nan)));
            }

            // Branches
            Opcode::Ifeq
            | Opcode::Ifne
            | Opcode::Iflt
            | Opcode::Ifge
            | Opcode::Ifgt
            | Opcode::Ifle => {
                let offset = i16_at(code, pc + 1)?;
                let v = frame.pop_int()?;
                let taken = match opcode {
                    Opcode::Ifeq => v == 0,
                    Opcode::Ifne => v != 0,
                    Opcode::Iflt => v < 0,
                    Opcode::Ifge => v >= 0,
                    Opcode::Ifgt => v > 0,
                    _ => v <= 0,
                };
                self.branch_if(pc, offset, taken)?;
            }
            Opcode::IfIcmpeq
            | Opcode::IfIcmpne
            | Opcode::IfIcmplt
            | Opcode::IfIcmpge
            | Opcode::IfIcmpgt
            | Opcode::IfIcmple => {
                let offset = i16_at(code, pc + 1)?;
                let b = frame.pop_int()?;
                let a = frame.pop_int()?;
                let taken = match opcode {
                    Opcode::IfIcmpeq => a == b,
                    Opcode::IfIcmpne => a != b,
                    Opcode::IfIcmplt => a < b,
                    Opcode::IfIcmpge => a >= b,
                    Opcode::IfIcmpgt => a > b,
                    _ => a <= b,
                };
                self.branch_if(pc, offset, taken)?;
            }
            Opcode::IfAcmpeq | Opcode::IfAcmpne => {
                let offset = i16_at(code, pc + 1)?;
                let b = frame.pop_reference()?;
                let a = frame.pop_reference()?;
                let taken = (a == b) == (opcode == Opcode::IfAcmpeq);
                self.branch_if(pc, offset, taken)?;
            }
            Opcode::Ifnull | Opcode::Ifnonnull => {
                let offset = i16_at(code, pc + 1)?;
                let v = frame.pop_reference()?;
                let taken = v.is_none() == (opcode == Opcode::Ifnull);
                self.branch_if(pc, offset, taken)?;
            }
            Opcode::Goto => self.jump(pc, i16_at(code, pc + 1)? as i32)?,
            Opcode::GotoW => self.jump(pc, i32_at(code, pc + 1)?)?,
            Opcode::Tableswitch => self.table_switch(code, pc)?,
            Opcode::Lookupswitch => self.lookup_switch(code, pc)?,
            Opcode::Jsr | Opcode::JsrW | Opcode::Ret | Opcode::Invokedynamic => {
                return Err(self.raise(unsupported(opcode)));
            }

            // Returns
            Opcode::Ireturn
            | Opcode::Lreturn
            | Opcode::Freturn
            | Opcode::Dreturn
            | Opcode::Areturn => {
                let value = frame.pop()?;
                frame.return_value = Some(value);
                return Ok(Step::Return(Some(value)));
            }
            Opcode::Return => return Ok(Step::Return(None)),

            // Fields
            Opcode::Getstatic => self.get_static(u16_at(code, pc + 1)?)?,
            Opcode::Putstatic => self.put_static(u16_at(code, pc + 1)?)?,
            Opcode::Getfield => self.get_field(u16_at(code, pc + 1)?)?,
            Opcode::Putfield => self.put_field(u16_at(code, pc + 1)?)?,

            // Invocation
            Opcode::Invokevirtual => {
                self.invoke_instruction(InvokeKind::Virtual, u16_at(code, pc + 1)?)?
            }
            Opcode::Invokespecial => {
                self.invoke_instruction(InvokeKind::Special, u16_at(code, pc + 1)?)?
            }
            Opcode::Invokestatic => {
                self.invoke_instruction(InvokeKind::Static, u16_at(code, pc + 1)?)?
            }
            Opcode::Invokeinterface => {
                self.invoke_instruction(InvokeKind::Interface, u16_at(code, pc + 1)?)?
            }

            // Objects
            Opcode::New => self.new_instance(u16_at(code, pc + 1)?)?,
            Opcode::Athrow => {
                let Some(exception) = frame.pop_reference()? else {
                    return Err(self.throw_null_pointer());
                };
                self.stack_mut().set_pending_exception(exception);
                return Err(Unwind::Exception);
            }
            Opcode::Checkcast => {
                let index = u16_at(code, pc + 1)?;
                if let Some(object) = frame.peek(0)?.as_object() {
                    let class = self.resolve_class_ref(index)?;
                    if !self.is_assignable_to(object, &class)? {
                        let vm = self.vm();
                        let from = vm.heap().lock().class_of(object)?;
                        let message = format!(
                            "class {} cannot be cast to class {}",
                            names::to_binary(vm.loader().get(from)?.name()),
                            names::to_binary(class.name())
                        );
                        return Err(self.throw_new(names::CLASS_CAST_EXCEPTION, Some(&message)));
                    }
                }
            }
            Opcode::Instanceof => {
                let index = u16_at(code, pc + 1)?;
                let result = match frame.pop_reference()? {
                    Some(object) => {
                        let class = self.resolve_class_ref(index)?;
                        self.is_assignable_to(object, &class)?
                    }
                    None => false,
                };
                self.current_frame()?.push(Value::Int(result as i32));
            }
            Opcode::Monitorenter => {
                let Some(object) = frame.pop_reference()? else {
                    return Err(self.throw_null_pointer());
                };
                self.monitor_enter(object);
            }
            Opcode::Monitorexit => {
                let Some(object) = frame.pop_reference()? else {
                    return Err(self.throw_null_pointer());
                };
                self.monitor_exit(object)?;
            }
        }
        Ok(Step::Next)
    }
}

/// `boolean` stores keep only the low bit.
fn narrow_field_value(value: Value, ty: BasicType) -> Value {
    match (ty, value) {
        (BasicType::Boolean, Value::Int(v)) => Value::Int(v & 1),
        (BasicType::Byte, Value::Int(v)) => Value::Int(v as i8 as i32),
        (BasicType::Char, Value::Int(v)) => Value::Int(v as u16 as i32),
        (BasicType::Short, Value::Int(v)) => Value::Int(v as i16 as i32),
        _ => value,
    }
}
