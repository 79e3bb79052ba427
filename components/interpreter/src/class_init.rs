//! Static initialization driven by the interpreter
//!
//! The class loader arbitrates which thread runs `<clinit>`; this module
//! prepares static storage, initializes supertypes first and turns
//! initializer failures into `ExceptionInInitializerError`.

use std::sync::Arc;

use class_loader::{names, ClassDescriptor, InitAction};
use classfile::ConstantValue;
use core_types::{JvmError, Value};
use memory_manager::ObjectShape;
use tracing::{debug, warn};

use crate::exceptions::Unwind;
use crate::execution::ExecutionContext;

impl ExecutionContext<'_> {
    /// Initializes `class` if it is not initialized yet.
    ///
    /// Blocks while another thread runs the initializer. A class whose
    /// initialization failed earlier raises `NoClassDefFoundError`.
    pub fn ensure_initialized(&mut self, class: &Arc<ClassDescriptor>) -> Result<(), Unwind> {
        if class.is_initialized() {
            return Ok(());
        }
        let thread = self.thread_id();
        let mut action = class.begin_initialization(thread);
        loop {
            match self.check(action)? {
                InitAction::Ready => return Ok(()),
                InitAction::Proceed => return self.initialize(class),
                InitAction::Wait => {
                    debug!(class = class.name(), thread = thread.0, "waiting for initializer");
                    action = self.blocking(|| class.wait_for_initialization(thread));
                }
            }
        }
    }

    fn initialize(&mut self, class: &Arc<ClassDescriptor>) -> Result<(), Unwind> {
        match self.run_initializers(class) {
            Ok(()) => class.complete_initialization().map_err(Unwind::Fatal),
            Err(Unwind::Exception) => {
                let pending = self.stack().pending_exception();
                let reason = match pending {
                    Some(exception) => {
                        let class_id = self.vm().heap().lock().class_of(exception)?;
                        names::to_binary(self.vm().loader().get(class_id)?.name())
                    }
                    None => "unknown exception".to_string(),
                };
                class.fail_initialization(&reason).map_err(Unwind::Fatal)?;
                match pending {
                    Some(exception) if self.is_instance_of(exception, names::ERROR)? => {
                        Err(Unwind::Exception)
                    }
                    _ => Err(self.wrap_pending(names::EXCEPTION_IN_INITIALIZER_ERROR)),
                }
            }
            Err(Unwind::Fatal(err)) => {
                if let Err(state) = class.fail_initialization(&err.message) {
                    warn!(class = class.name(), error = %state, "could not record initialization failure");
                }
                Err(Unwind::Fatal(err))
            }
        }
    }

    /// Static storage, supertypes, then `<clinit>`.
    fn run_initializers(&mut self, class: &Arc<ClassDescriptor>) -> Result<(), Unwind> {
        let vm = self.vm();
        self.prepare_statics(class)?;
        if !class.is_interface() {
            if let Some(super_id) = class.super_class() {
                let super_class = vm.loader().get(super_id)?;
                self.ensure_initialized(&super_class)?;
            }
        }
        for &iface in &class.linkage().interfaces {
            let iface = vm.loader().get(iface)?;
            self.ensure_initialized(&iface)?;
        }
        if let Some(clinit) = class.declared_method(names::CLASS_INITIALIZER, "()V") {
            if !clinit.is_static() {
                return Err(self.raise(JvmError::class_format(format!(
                    "{} must be static",
                    clinit.qualified_name()
                ))));
            }
            self.call(clinit.clone(), Vec::new())?;
        }
        Ok(())
    }

    /// Allocates the static storage of `class` and applies `ConstantValue`
    /// attributes.
    fn prepare_statics(&mut self, class: &Arc<ClassDescriptor>) -> Result<(), Unwind> {
        let vm = self.vm();
        if class.static_storage().is_none() {
            let storage = self.allocate(ObjectShape::Statics {
                class: class.id(),
                slots: class.static_slots(),
            })?;
            class.set_static_storage(storage);
        }
        for field in class.fields().iter().filter(|f| f.is_static()) {
            let Some(constant) = &field.constant_value else {
                continue;
            };
            let value = match constant {
                ConstantValue::Int(v) => Value::Int(*v),
                ConstantValue::Long(v) => Value::Long(*v),
                ConstantValue::Float(v) => Value::Float(*v),
                ConstantValue::Double(v) => Value::Double(*v),
                ConstantValue::String(text) => Value::object(self.intern_string(text)?),
            };
            let storage = class
                .static_storage()
                .ok_or_else(|| Unwind::Fatal(JvmError::internal("static storage vanished")))?;
            vm.heap().lock().write_slot(storage, field.slot, value)?;
        }
        Ok(())
    }
}
