//! Call frames and the per-thread frame stack

use std::sync::Arc;

use class_loader::{ClassDescriptor, MethodInfo};
use core_types::{JavaThreadId, JvmError, JvmResult, ObjectRef, Value};
use memory_manager::RootSet;

/// Activation record of one method invocation
///
/// Bytecode frames index locals by JVM slot number (a `long` at slot `n`
/// also reserves `n + 1`). Native frames hold one local per argument,
/// receiver first. The operand stack holds one entry per value of either
/// category.
#[derive(Debug, Clone)]
pub struct Frame {
    method: Arc<MethodInfo>,
    class: Arc<ClassDescriptor>,
    pub(crate) locals: Vec<Value>,
    pub(crate) operands: Vec<Value>,
    /// Next instruction
    pub(crate) pc: usize,
    /// Instruction being executed, used for handler lookup
    pub(crate) instruction_pc: usize,
    pub(crate) return_value: Option<Value>,
    /// Monitor held on behalf of a synchronized method
    pub(crate) monitor: Option<ObjectRef>,
}

impl Frame {
    /// Creates a bytecode frame, spreading `args` over the parameter slots.
    pub fn new(method: Arc<MethodInfo>, class: Arc<ClassDescriptor>, args: Vec<Value>) -> Self {
        let (max_locals, max_stack) = method
            .code
            .as_ref()
            .map(|code| (code.max_locals as usize, code.max_stack as usize))
            .unwrap_or((0, 0));
        let mut locals = vec![Value::default(); max_locals.max(method.argument_slots())];
        let mut slot = 0;
        for value in args {
            let width = if value.is_category2() { 2 } else { 1 };
            if slot < locals.len() {
                locals[slot] = value;
            }
            slot += width;
        }
        Frame {
            method,
            class,
            locals,
            operands: Vec::with_capacity(max_stack),
            pc: 0,
            instruction_pc: 0,
            return_value: None,
            monitor: None,
        }
    }

    /// Creates a native frame whose locals are the arguments.
    pub fn native(method: Arc<MethodInfo>, class: Arc<ClassDescriptor>, args: Vec<Value>) -> Self {
        Frame {
            method,
            class,
            locals: args,
            operands: Vec::new(),
            pc: 0,
            instruction_pc: 0,
            return_value: None,
            monitor: None,
        }
    }

    /// Method executing in this frame.
    pub fn method(&self) -> &Arc<MethodInfo> {
        &self.method
    }

    /// Class declaring the method.
    pub fn class(&self) -> &Arc<ClassDescriptor> {
        &self.class
    }

    /// Local variables.
    pub fn locals(&self) -> &[Value] {
        &self.locals
    }

    /// Operand stack, bottom first.
    pub fn operands(&self) -> &[Value] {
        &self.operands
    }

    /// Pc of the instruction currently executing.
    pub fn pc(&self) -> usize {
        self.instruction_pc
    }

    /// Value recorded by the last return instruction of this frame.
    pub fn return_value(&self) -> Option<Value> {
        self.return_value
    }

    /// Returns true for frames of native methods.
    pub fn is_native(&self) -> bool {
        self.method.is_native()
    }

    fn underflow(&self) -> JvmError {
        JvmError::internal(format!(
            "operand stack underflow in {} at pc {}",
            self.method.qualified_name(),
            self.instruction_pc
        ))
    }

    #[inline]
    pub(crate) fn push(&mut self, value: Value) {
        self.operands.push(value);
    }

    #[inline]
    pub(crate) fn pop(&mut self) -> JvmResult<Value> {
        match self.operands.pop() {
            Some(value) => Ok(value),
            None => Err(self.underflow()),
        }
    }

    pub(crate) fn peek(&self, depth: usize) -> JvmResult<Value> {
        self.operands
            .len()
            .checked_sub(depth + 1)
            .map(|i| self.operands[i])
            .ok_or_else(|| self.underflow())
    }

    fn type_error(&self, expected: &str, found: Value) -> JvmError {
        JvmError::internal(format!(
            "expected {} on the operand stack of {} at pc {}, found {:?}",
            expected,
            self.method.qualified_name(),
            self.instruction_pc,
            found
        ))
    }

    pub(crate) fn pop_int(&mut self) -> JvmResult<i32> {
        let value = self.pop()?;
        value.as_int().ok_or_else(|| self.type_error("int", value))
    }

    pub(crate) fn pop_long(&mut self) -> JvmResult<i64> {
        let value = self.pop()?;
        value.as_long().ok_or_else(|| self.type_error("long", value))
    }

    pub(crate) fn pop_float(&mut self) -> JvmResult<f32> {
        let value = self.pop()?;
        value.as_float().ok_or_else(|| self.type_error("float", value))
    }

    pub(crate) fn pop_double(&mut self) -> JvmResult<f64> {
        let value = self.pop()?;
        value.as_double().ok_or_else(|| self.type_error("double", value))
    }

    pub(crate) fn pop_reference(&mut self) -> JvmResult<Option<ObjectRef>> {
        let value = self.pop()?;
        value.as_reference().ok_or_else(|| self.type_error("reference", value))
    }

    /// Pops the `count` topmost values, returned bottom first.
    pub(crate) fn pop_args(&mut self, count: usize) -> JvmResult<Vec<Value>> {
        let split = self
            .operands
            .len()
            .checked_sub(count)
            .ok_or_else(|| self.underflow())?;
        Ok(self.operands.split_off(split))
    }

    pub(crate) fn load(&self, index: usize) -> JvmResult<Value> {
        self.locals.get(index).copied().ok_or_else(|| {
            JvmError::internal(format!(
                "local {} out of range in {}",
                index,
                self.method.qualified_name()
            ))
        })
    }

    pub(crate) fn store(&mut self, index: usize, value: Value) -> JvmResult<()> {
        let len = self.locals.len();
        match self.locals.get_mut(index) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(JvmError::internal(format!(
                "local {} out of range ({} locals) in {}",
                index,
                len,
                self.method.qualified_name()
            ))),
        }
    }
}

impl RootSet for Frame {
    fn visit_roots(&mut self, visitor: &mut dyn FnMut(&mut ObjectRef)) {
        self.locals.visit_roots(visitor);
        self.operands.visit_roots(visitor);
        if let Some(Value::Reference(Some(r))) = self.return_value.as_mut() {
            visitor(r);
        }
        if let Some(monitor) = self.monitor.as_mut() {
            visitor(monitor);
        }
    }
}

/// Frames of one Java thread, plus the references it holds outside frames
///
/// Everything reachable from here is a GC root: frame slots, the exception
/// being propagated, and the handle area natives and the interpreter use to
/// keep objects alive across allocations.
#[derive(Debug)]
pub struct FrameStack {
    thread: JavaThreadId,
    name: String,
    frames: Vec<Frame>,
    pending_exception: Option<ObjectRef>,
    handles: Vec<Value>,
}

impl FrameStack {
    /// Creates an empty stack for `thread`.
    pub fn new(thread: JavaThreadId, name: impl Into<String>) -> Self {
        FrameStack {
            thread,
            name: name.into(),
            frames: Vec::new(),
            pending_exception: None,
            handles: Vec::new(),
        }
    }

    /// Owning thread.
    pub fn thread_id(&self) -> JavaThreadId {
        self.thread
    }

    /// Thread name used in reports.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of active frames.
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Active frames, outermost first.
    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    /// Innermost frame.
    pub fn top(&self) -> Option<&Frame> {
        self.frames.last()
    }

    pub(crate) fn top_mut(&mut self) -> JvmResult<&mut Frame> {
        self.frames
            .last_mut()
            .ok_or_else(|| JvmError::internal("no active frame"))
    }

    pub(crate) fn push_frame(&mut self, frame: Frame) {
        self.frames.push(frame);
    }

    pub(crate) fn pop_frame(&mut self) -> JvmResult<Frame> {
        self.frames
            .pop()
            .ok_or_else(|| JvmError::internal("frame stack underflow"))
    }

    /// Exception currently propagating, if any.
    pub fn pending_exception(&self) -> Option<ObjectRef> {
        self.pending_exception
    }

    pub(crate) fn set_pending_exception(&mut self, exception: ObjectRef) {
        self.pending_exception = Some(exception);
    }

    pub(crate) fn take_pending_exception(&mut self) -> Option<ObjectRef> {
        self.pending_exception.take()
    }

    /// Roots `value` until the area is truncated below the returned mark.
    pub(crate) fn push_handle(&mut self, value: Value) -> usize {
        self.handles.push(value);
        self.handles.len() - 1
    }

    pub(crate) fn handle(&self, index: usize) -> Value {
        self.handles.get(index).copied().unwrap_or(Value::NULL)
    }

    pub(crate) fn set_handle(&mut self, index: usize, value: Value) {
        if let Some(slot) = self.handles.get_mut(index) {
            *slot = value;
        }
    }

    pub(crate) fn truncate_handles(&mut self, mark: usize) {
        self.handles.truncate(mark);
    }

    /// Number of live handles.
    pub fn handle_count(&self) -> usize {
        self.handles.len()
    }
}

impl RootSet for FrameStack {
    fn visit_roots(&mut self, visitor: &mut dyn FnMut(&mut ObjectRef)) {
        for frame in &mut self.frames {
            frame.visit_roots(visitor);
        }
        if let Some(exception) = self.pending_exception.as_mut() {
            visitor(exception);
        }
        self.handles.visit_roots(visitor);
    }
}
