//! Method invocation: resolution, dispatch selection and frame entry

use std::sync::Arc;

use class_loader::{names, ClassDescriptor, FieldInfo, MethodInfo};
use classfile::ClassAccess;
use core_types::{ErrorKind, JvmError, ObjectRef, Value};
use tracing::trace;

use crate::call_frame::Frame;
use crate::context::ResolvedMember;
use crate::exceptions::Unwind;
use crate::execution::ExecutionContext;
use crate::inline_cache::CallSite;
use crate::natives::NativeEnv;

/// The four `invoke*` instructions handled here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum InvokeKind {
    Virtual,
    Special,
    Static,
    Interface,
}

/// Result of entering a method.
#[derive(Debug)]
pub(crate) enum Entered {
    /// A bytecode frame was pushed; the dispatch loop runs it
    Frame,
    /// A native method already completed
    Returned(Option<Value>),
}

impl ExecutionContext<'_> {
    /// Invokes `method` and runs it to completion.
    ///
    /// `args` include the receiver for instance methods.
    pub fn call(&mut self, method: Arc<MethodInfo>, args: Vec<Value>) -> Result<Option<Value>, Unwind> {
        let base = self.stack().depth();
        match self.enter(method, args)? {
            Entered::Returned(value) => Ok(value),
            Entered::Frame => self.run(base),
        }
    }

    /// Calls an instance method on `receiver` through virtual dispatch.
    pub fn invoke_virtual(
        &mut self,
        receiver: ObjectRef,
        name: &str,
        descriptor: &str,
        args: &[Value],
    ) -> Result<Option<Value>, Unwind> {
        let vm = self.vm();
        let class_id = vm.heap().lock().class_of(receiver)?;
        let class = vm.loader().get(class_id)?;
        let method = match class.virtual_method(name, descriptor) {
            Some(method) => method.clone(),
            None => {
                let resolved = vm.loader().resolve_method(&class, name, descriptor);
                self.check(resolved)?
            }
        };
        let mut full = Vec::with_capacity(args.len() + 1);
        full.push(Value::object(receiver));
        full.extend_from_slice(args);
        self.call(method, full)
    }

    /// Resolves, initializes and calls a static method.
    pub fn invoke_static(
        &mut self,
        class_name: &str,
        name: &str,
        descriptor: &str,
        args: Vec<Value>,
    ) -> Result<Option<Value>, Unwind> {
        let vm = self.vm();
        let class = vm.loader().resolve(&names::to_internal(class_name));
        let class = self.check(class)?;
        self.ensure_initialized(&class)?;
        let method = vm.loader().resolve_method(&class, name, descriptor);
        let method = self.check(method)?;
        if !method.is_static() {
            return Err(self.raise(JvmError::new(
                ErrorKind::IncompatibleClassChange,
                format!("Expected static method '{}'", method.qualified_name()),
            )));
        }
        self.call(method, args)
    }

    /// Pushes a frame for `method`, or runs it directly if it is native.
    pub(crate) fn enter(&mut self, method: Arc<MethodInfo>, args: Vec<Value>) -> Result<Entered, Unwind> {
        let vm = self.vm();
        if method.is_abstract() {
            return Err(self.raise(JvmError::new(
                ErrorKind::AbstractMethod,
                method.qualified_name(),
            )));
        }
        if self.stack().depth() >= vm.config().max_stack_depth {
            trace!(depth = self.stack().depth(), "frame limit reached");
            return Err(self.throw_new(names::STACK_OVERFLOW_ERROR, None));
        }
        let class = vm.loader().get(method.owner)?;
        if method.is_native() {
            return self.invoke_native(method, class, args).map(Entered::Returned);
        }
        if method.code.is_none() {
            return Err(self.raise(JvmError::class_format(format!(
                "method {} has no Code attribute",
                method.qualified_name()
            ))));
        }
        let synchronized = method.is_synchronized();
        self.stack_mut().push_frame(Frame::new(method, class, args));
        if synchronized {
            if let Err(unwind) = self.lock_frame_monitor() {
                self.stack_mut().pop_frame()?;
                return Err(unwind);
            }
        }
        self.safepoint_poll();
        Ok(Entered::Frame)
    }

    /// Runs a native method inside its own frame.
    fn invoke_native(
        &mut self,
        method: Arc<MethodInfo>,
        class: Arc<ClassDescriptor>,
        args: Vec<Value>,
    ) -> Result<Option<Value>, Unwind> {
        let vm = self.vm();
        let Some(native) = vm
            .natives()
            .lookup(&method.owner_name, &method.name, &method.descriptor)
        else {
            return Err(self.raise(JvmError::new(
                ErrorKind::UnsatisfiedLink,
                method.qualified_name(),
            )));
        };
        let synchronized = method.is_synchronized();
        self.stack_mut().push_frame(Frame::native(method.clone(), class, args));
        if synchronized {
            if let Err(unwind) = self.lock_frame_monitor() {
                self.stack_mut().pop_frame()?;
                return Err(unwind);
            }
        }
        let result = native(&mut NativeEnv::new(self, method));
        let frame = self.stack_mut().pop_frame()?;
        if let Some(monitor) = frame.monitor {
            self.monitor_exit(monitor)?;
        }
        result
    }

    /// Object a synchronized method in the top frame locks: the receiver,
    /// or the static storage of the class for static methods.
    fn frame_lock_object(&self) -> Result<ObjectRef, Unwind> {
        let frame = self
            .stack()
            .top()
            .ok_or_else(|| Unwind::Fatal(JvmError::internal("no frame to synchronize")))?;
        let object = if frame.method().is_static() {
            frame.class().static_storage()
        } else {
            frame.locals().first().and_then(|v| v.as_object())
        };
        object.ok_or_else(|| {
            Unwind::Fatal(JvmError::internal(format!(
                "no lock object for {}",
                frame.method().qualified_name()
            )))
        })
    }

    fn lock_frame_monitor(&mut self) -> Result<(), Unwind> {
        let object = self.frame_lock_object()?;
        self.monitor_enter(object);
        // The wait may have moved the object.
        let object = self.frame_lock_object()?;
        self.stack_mut().top_mut()?.monitor = Some(object);
        Ok(())
    }

    fn current_class(&self) -> Result<Arc<ClassDescriptor>, Unwind> {
        self.stack()
            .top()
            .map(|f| f.class().clone())
            .ok_or_else(|| Unwind::Fatal(JvmError::internal("no current frame")))
    }

    /// Resolves the `CONSTANT_Class` entry `index` of the current class.
    pub(crate) fn resolve_class_ref(&mut self, index: u16) -> Result<Arc<ClassDescriptor>, Unwind> {
        let vm = self.vm();
        let caller = self.current_class()?;
        if let Some(ResolvedMember::Class(class)) = vm.cached_member(caller.id(), index) {
            return Ok(class);
        }
        let pool = caller
            .constant_pool()
            .ok_or_else(|| Unwind::Fatal(JvmError::internal("array classes have no constant pool")))?;
        let name = pool.class_name(index).map_err(JvmError::from);
        let name = self.check(name)?;
        let class = vm.loader().resolve(name);
        let class = self.check(class)?;
        vm.cache_member(caller.id(), index, ResolvedMember::Class(class.clone()));
        Ok(class)
    }

    /// Resolves the method reference `index` of the current class.
    ///
    /// A missing method raises `NoSuchMethodError` in the calling frame, so
    /// it ends the call but a handler for it in the caller still runs.
    pub(crate) fn resolve_method_ref(&mut self, index: u16) -> Result<Arc<MethodInfo>, Unwind> {
        let vm = self.vm();
        let caller = self.current_class()?;
        if let Some(ResolvedMember::Method(method)) = vm.cached_member(caller.id(), index) {
            return Ok(method);
        }
        let pool = caller
            .constant_pool()
            .ok_or_else(|| Unwind::Fatal(JvmError::internal("array classes have no constant pool")))?;
        let member = pool.member_ref(index).map_err(JvmError::from);
        let member = self.check(member)?;
        let owner = vm.loader().resolve(&member.class_name);
        let owner = self.check(owner)?;
        let method = if member.is_interface {
            vm.loader()
                .resolve_interface_method(&owner, &member.name, &member.descriptor)
        } else {
            vm.loader().resolve_method(&owner, &member.name, &member.descriptor)
        };
        let method = self.check(method)?;
        vm.cache_member(caller.id(), index, ResolvedMember::Method(method.clone()));
        Ok(method)
    }

    /// Resolves the field reference `index` of the current class.
    pub(crate) fn resolve_field_ref(&mut self, index: u16) -> Result<Arc<FieldInfo>, Unwind> {
        let vm = self.vm();
        let caller = self.current_class()?;
        if let Some(ResolvedMember::Field(field)) = vm.cached_member(caller.id(), index) {
            return Ok(field);
        }
        let pool = caller
            .constant_pool()
            .ok_or_else(|| Unwind::Fatal(JvmError::internal("array classes have no constant pool")))?;
        let member = pool.member_ref(index).map_err(JvmError::from);
        let member = self.check(member)?;
        let owner = vm.loader().resolve(&member.class_name);
        let owner = self.check(owner)?;
        let field = vm
            .loader()
            .resolve_field(&owner, &member.name, &member.descriptor);
        let field = self.check(field)?;
        vm.cache_member(caller.id(), index, ResolvedMember::Field(field.clone()));
        Ok(field)
    }

    /// Executes an `invoke*` instruction whose operands were decoded by the
    /// dispatch loop.
    pub(crate) fn invoke_instruction(&mut self, kind: InvokeKind, index: u16) -> Result<(), Unwind> {
        let vm = self.vm();
        let resolved = self.resolve_method_ref(index)?;

        if kind == InvokeKind::Static {
            if !resolved.is_static() {
                return Err(self.raise(JvmError::new(
                    ErrorKind::IncompatibleClassChange,
                    format!("Expected static method '{}'", resolved.qualified_name()),
                )));
            }
            let owner = vm.loader().get(resolved.owner)?;
            self.ensure_initialized(&owner)?;
        } else if resolved.is_static() {
            return Err(self.raise(JvmError::new(
                ErrorKind::IncompatibleClassChange,
                format!("Expecting non-static method '{}'", resolved.qualified_name()),
            )));
        }

        let frame = self.stack_mut().top_mut()?;
        let caller_method = frame.method().clone();
        let caller_class = frame.class().clone();
        let pc = frame.instruction_pc;
        let args = frame.pop_args(operand_count(&resolved))?;

        let target = match kind {
            InvokeKind::Static => resolved,
            InvokeKind::Special => {
                if args.first().map_or(true, |v| v.is_null()) {
                    return Err(self.throw_null_pointer());
                }
                self.select_special(&caller_class, &resolved)?
            }
            InvokeKind::Virtual | InvokeKind::Interface => {
                let Some(receiver) = args.first().and_then(|v| v.as_object()) else {
                    return Err(self.throw_null_pointer());
                };
                let receiver_id = vm.heap().lock().class_of(receiver)?;
                if !resolved.is_virtual() {
                    resolved
                } else {
                    let site = CallSite::new(&caller_method, pc);
                    let selected = vm.dispatch_cached(site, receiver_id, || {
                        let receiver_class = vm.loader().get(receiver_id).ok()?;
                        match kind {
                            InvokeKind::Interface => vm.loader().select_interface(
                                &receiver_class,
                                &resolved.name,
                                &resolved.descriptor,
                            ),
                            _ => Some(vm.loader().select_virtual(&receiver_class, &resolved)),
                        }
                    });
                    match selected {
                        Some(target) => target,
                        None => return Err(self.no_implementation(receiver_id, &resolved)),
                    }
                }
            }
        };

        match self.enter(target, args)? {
            Entered::Frame => {}
            Entered::Returned(Some(value)) => self.stack_mut().top_mut()?.push(value),
            Entered::Returned(None) => {}
        }
        Ok(())
    }

    /// `invokespecial` target: the resolved method, or for super calls from
    /// an `ACC_SUPER` class the override visible from its superclass.
    fn select_special(
        &mut self,
        caller: &ClassDescriptor,
        resolved: &Arc<MethodInfo>,
    ) -> Result<Arc<MethodInfo>, Unwind> {
        let vm = self.vm();
        if resolved.is_initializer() || resolved.is_private() {
            return Ok(resolved.clone());
        }
        let owner = vm.loader().get(resolved.owner)?;
        let super_call = caller.access().contains(ClassAccess::SUPER)
            && !caller.is_interface()
            && !owner.is_interface()
            && owner.id() != caller.id()
            && vm.loader().is_subclass_of(caller, owner.id());
        if !super_call {
            return Ok(resolved.clone());
        }
        let Some(super_id) = caller.super_class() else {
            return Ok(resolved.clone());
        };
        let super_class = vm.loader().get(super_id)?;
        Ok(super_class
            .virtual_method(&resolved.name, &resolved.descriptor)
            .cloned()
            .unwrap_or_else(|| resolved.clone()))
    }

    /// Error for a receiver with no implementation of `resolved`.
    fn no_implementation(&mut self, receiver: core_types::ClassId, resolved: &MethodInfo) -> Unwind {
        let vm = self.vm();
        let receiver_name = vm
            .loader()
            .get(receiver)
            .map(|c| names::to_binary(c.name()))
            .unwrap_or_default();
        let implements = vm.loader().is_assignable(receiver, resolved.owner).unwrap_or(false);
        if implements {
            self.raise(JvmError::new(
                ErrorKind::AbstractMethod,
                format!("Receiver class {} does not define or inherit an implementation of {}", receiver_name, resolved.qualified_name()),
            ))
        } else {
            self.raise(JvmError::new(
                ErrorKind::IncompatibleClassChange,
                format!(
                    "Class {} does not implement the requested interface {}",
                    receiver_name,
                    names::to_binary(&resolved.owner_name)
                ),
            ))
        }
    }
}

/// Operand stack entries an invocation consumes, receiver included.
fn operand_count(method: &MethodInfo) -> usize {
    method.signature.parameters.len() + usize::from(!method.is_static())
}
