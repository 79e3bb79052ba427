//! Java exceptions: creation, handler search and the uncaught report
//!
//! A thrown exception lives in the frame stack's pending slot while it
//! propagates; Rust code only carries the [`Unwind::Exception`] marker. Fatal
//! VM conditions travel as [`Unwind::Fatal`] and are never visible to Java
//! handlers.

use class_loader::names;
use core_types::{BasicType, JvmError, JvmResult, ObjectRef, Value};
use memory_manager::{HeapError, ObjectShape};
use tracing::{debug, trace, warn};

use crate::execution::ExecutionContext;
use crate::thread::ThreadOutcome;

/// Abrupt completion of interpreted or native code.
#[derive(Debug, Clone, PartialEq)]
pub enum Unwind {
    /// A Java exception is pending on the current thread
    Exception,
    /// The thread cannot continue
    Fatal(JvmError),
}

impl From<JvmError> for Unwind {
    fn from(err: JvmError) -> Self {
        Unwind::Fatal(err)
    }
}

impl From<HeapError> for Unwind {
    fn from(err: HeapError) -> Self {
        Unwind::Fatal(err.into())
    }
}

/// Descriptor of `Throwable.detailMessage`.
const MESSAGE_FIELD: (&str, &str) = ("detailMessage", "Ljava/lang/String;");
/// Descriptor of `Throwable.cause`.
const CAUSE_FIELD: (&str, &str) = ("cause", "Ljava/lang/Throwable;");
/// Longest `Caused by:` chain printed before giving up on cycles.
const MAX_CAUSE_DEPTH: usize = 32;

impl ExecutionContext<'_> {
    /// Creates an exception of class `class_name` and makes it pending.
    ///
    /// Always returns an `Unwind`: `Exception` once something is pending
    /// (the requested throwable, or whatever went wrong creating it), or
    /// `Fatal` if the throwable class cannot be used at all.
    pub fn throw_new(&mut self, class_name: &str, message: Option<&str>) -> Unwind {
        match self.create_throwable(class_name, message, None) {
            Ok(exception) => {
                trace!(class = class_name, ?message, "throwing");
                self.stack_mut().set_pending_exception(exception);
                Unwind::Exception
            }
            Err(unwind) => unwind,
        }
    }

    /// Throws `NullPointerException`.
    pub fn throw_null_pointer(&mut self) -> Unwind {
        self.throw_new(names::NULL_POINTER_EXCEPTION, None)
    }

    /// Turns a VM error into the Java throwable its kind maps to, or into a
    /// fatal unwind when the kind has none.
    pub fn raise(&mut self, err: JvmError) -> Unwind {
        match err.kind.throwable_class() {
            Some(class_name) => {
                debug!(error = %err, "raising as {}", class_name);
                self.throw_new(class_name, Some(&err.message))
            }
            None => Unwind::Fatal(err),
        }
    }

    /// Converts a VM result, raising its error as a Java throwable.
    pub fn check<T>(&mut self, result: JvmResult<T>) -> Result<T, Unwind> {
        result.map_err(|err| self.raise(err))
    }

    /// Allocates a throwable of `class_name` with its message and cause
    /// fields filled in directly, without running a constructor.
    ///
    /// # Arguments
    ///
    /// * `class_name` - Internal name of a `Throwable` subclass
    /// * `message` - `detailMessage`, or `None` for null
    /// * `cause` - Handle index holding the cause, if any
    pub(crate) fn create_throwable(
        &mut self,
        class_name: &str,
        message: Option<&str>,
        cause: Option<usize>,
    ) -> Result<ObjectRef, Unwind> {
        let vm = self.vm();
        let class = vm.loader().resolve(class_name).map_err(Unwind::Fatal)?;
        let throwable = vm.loader().resolve(names::THROWABLE).map_err(Unwind::Fatal)?;
        let slot_of = |(name, descriptor): (&str, &str)| {
            throwable
                .declared_field(name, descriptor)
                .map(|f| f.slot)
                .ok_or_else(|| {
                    Unwind::Fatal(JvmError::linkage(format!(
                        "java.lang.Throwable has no field {} {}",
                        name, descriptor
                    )))
                })
        };
        let message_slot = slot_of(MESSAGE_FIELD)?;
        let cause_slot = slot_of(CAUSE_FIELD)?;
        self.ensure_initialized(&class)?;

        let mark = self.stack().handle_count();
        let message_value = match message {
            Some(text) => Value::object(self.new_string(text)?),
            None => Value::NULL,
        };
        self.push_handle(message_value);
        let exception = self.allocate(ObjectShape::Instance {
            class: class.id(),
            slots: class.instance_slots(),
        });
        let message_value = self.handle(mark);
        let cause_value = cause.map(|index| self.handle(index)).unwrap_or(Value::NULL);
        self.truncate_handles(mark);
        let exception = exception?;

        let mut heap = vm.heap().lock();
        heap.write_slot(exception, message_slot, message_value)?;
        heap.write_slot(exception, cause_slot, cause_value)?;
        Ok(exception)
    }

    /// Replaces the pending exception with a new `class_name` throwable
    /// whose cause is the old one.
    pub(crate) fn wrap_pending(&mut self, class_name: &str) -> Unwind {
        let Some(cause) = self.stack_mut().take_pending_exception() else {
            return self.throw_new(class_name, None);
        };
        let mark = self.push_handle(Value::object(cause));
        let wrapped = self.create_throwable(class_name, None, Some(mark));
        self.truncate_handles(mark);
        match wrapped {
            Ok(exception) => {
                self.stack_mut().set_pending_exception(exception);
                Unwind::Exception
            }
            Err(unwind) => unwind,
        }
    }

    /// Returns true if `object` is an instance of the class named
    /// `class_name` (or a subclass of it).
    pub(crate) fn is_instance_of(&self, object: ObjectRef, class_name: &str) -> Result<bool, Unwind> {
        let vm = self.vm();
        let Some(target) = vm.loader().lookup(class_name) else {
            return Ok(false);
        };
        let class = vm.heap().lock().class_of(object)?;
        Ok(vm.loader().is_assignable(class, target.id())?)
    }

    /// Searches for a handler of the pending exception, popping frames above
    /// `base_depth` that have none.
    ///
    /// # Returns
    ///
    /// `true` if a handler was found; its frame is on top with the exception
    /// as the only operand and `pc` at the handler.
    pub(crate) fn find_handler(&mut self, base_depth: usize) -> Result<bool, Unwind> {
        let vm = self.vm();
        let exception = self
            .stack()
            .pending_exception()
            .ok_or_else(|| Unwind::Fatal(JvmError::internal("unwinding without a pending exception")))?;
        let exception_class = vm.heap().lock().class_of(exception)?;

        while self.stack().depth() > base_depth {
            let frame = self.stack_mut().top_mut()?;
            let pc = frame.instruction_pc;
            let method = frame.method().clone();
            let class = frame.class().clone();
            let entries = method
                .code
                .as_ref()
                .map(|code| code.exception_table.as_slice())
                .unwrap_or(&[]);

            let mut handler = None;
            for entry in entries.iter().filter(|e| e.covers(pc)) {
                let matches = match entry.catch_type.as_deref() {
                    None => true,
                    Some(catch_type) => vm
                        .loader()
                        .resolve(catch_type)
                        .and_then(|c| vm.loader().is_assignable(exception_class, c.id()))
                        .unwrap_or_else(|err| {
                            debug!(error = %err, catch_type, "skipping unresolvable handler");
                            false
                        }),
                };
                if matches {
                    handler = Some(entry.handler_pc as usize);
                    break;
                }
            }

            if let Some(handler_pc) = handler {
                trace!(
                    method = %method.qualified_name(),
                    pc,
                    handler_pc,
                    class = class.name(),
                    "exception caught"
                );
                let exception = self
                    .stack_mut()
                    .take_pending_exception()
                    .unwrap_or(exception);
                let frame = self.stack_mut().top_mut()?;
                frame.operands.clear();
                frame.push(Value::object(exception));
                frame.pc = handler_pc;
                return Ok(true);
            }

            let frame = self.stack_mut().pop_frame()?;
            if let Some(monitor) = frame.monitor {
                self.release_monitor(monitor);
            }
        }
        Ok(false)
    }

    /// Pops every frame above `base_depth`, releasing monitors of
    /// synchronized methods.
    pub(crate) fn unwind_to(&mut self, base_depth: usize) {
        while self.stack().depth() > base_depth {
            match self.stack_mut().pop_frame() {
                Ok(frame) => {
                    if let Some(monitor) = frame.monitor {
                        self.release_monitor(monitor);
                    }
                }
                Err(_) => break,
            }
        }
    }

    fn release_monitor(&mut self, monitor: ObjectRef) {
        let thread = self.thread_id();
        if !self.vm().monitors().exit(monitor, thread) {
            debug!(thread = thread.0, "frame monitor already released");
        }
    }

    /// Reads a reference field of `Throwable` from `exception`.
    fn throwable_field(&self, exception: ObjectRef, field: (&str, &str)) -> Result<Option<ObjectRef>, Unwind> {
        let vm = self.vm();
        let throwable = vm.loader().resolve(names::THROWABLE)?;
        let Some(info) = throwable.declared_field(field.0, field.1) else {
            return Ok(None);
        };
        let value = vm
            .heap()
            .lock()
            .read_slot(exception, info.slot, BasicType::Reference)?;
        Ok(value.as_object())
    }

    /// `detailMessage` of a throwable as Rust text.
    pub(crate) fn exception_message(&self, exception: ObjectRef) -> Result<Option<String>, Unwind> {
        match self.throwable_field(exception, MESSAGE_FIELD)? {
            Some(message) => self.string_value(message).map(Some),
            None => Ok(None),
        }
    }

    /// `toString()` of the throwable in handle `index`, falling back to
    /// `class: message` if the Java method fails.
    fn describe_exception(&mut self, index: usize) -> Result<String, Unwind> {
        let Some(exception) = self.handle(index).as_object() else {
            return Ok("null".to_string());
        };
        match self.invoke_virtual(exception, "toString", "()Ljava/lang/String;", &[]) {
            Ok(Some(Value::Reference(Some(text)))) => return self.string_value(text),
            Ok(_) => {}
            Err(Unwind::Exception) => {
                self.stack_mut().take_pending_exception();
            }
            Err(fatal) => return Err(fatal),
        }
        let exception = self.handle(index).as_object().unwrap_or(exception);
        let class = self.vm().heap().lock().class_of(exception)?;
        let name = names::to_binary(self.vm().loader().get(class)?.name());
        Ok(match self.exception_message(exception)? {
            Some(message) => format!("{}: {}", name, message),
            None => name,
        })
    }

    /// Lines describing the throwable in handle `index` and its causes:
    /// its `toString()`, then one `Caused by:` line per cause.
    pub(crate) fn exception_lines(&mut self, index: usize) -> Result<Vec<String>, Unwind> {
        let mark = self.stack().handle_count();
        let mut lines = vec![self.describe_exception(index)?];
        let mut current = index;
        while lines.len() <= MAX_CAUSE_DEPTH {
            let Some(exception) = self.handle(current).as_object() else {
                break;
            };
            let cause = match self.throwable_field(exception, CAUSE_FIELD)? {
                Some(cause) if cause != exception => cause,
                _ => break,
            };
            current = self.push_handle(Value::object(cause));
            let text = self.describe_exception(current)?;
            lines.push(format!("Caused by: {}", text));
        }
        self.truncate_handles(mark);
        Ok(lines)
    }

    /// Ends the thread with the pending exception: prints
    /// `Exception in thread "<name>" <toString()>` with its causes to the
    /// error sink and builds the outcome.
    pub(crate) fn report_uncaught(&mut self) -> ThreadOutcome {
        let Some(exception) = self.stack_mut().take_pending_exception() else {
            return ThreadOutcome::Failed(JvmError::internal(
                "thread ended by an exception that is no longer pending",
            ));
        };
        let mark = self.push_handle(Value::object(exception));
        let outcome = self.uncaught_outcome(mark);
        self.truncate_handles(mark);
        outcome.unwrap_or_else(|unwind| match unwind {
            Unwind::Fatal(err) => ThreadOutcome::Failed(err),
            Unwind::Exception => ThreadOutcome::Failed(JvmError::internal(
                "exception thrown while reporting an uncaught exception",
            )),
        })
    }

    fn uncaught_outcome(&mut self, index: usize) -> Result<ThreadOutcome, Unwind> {
        let vm = self.vm();
        let exception = self.handle(index).as_object().ok_or_else(|| {
            Unwind::Fatal(JvmError::internal("uncaught exception handle was cleared"))
        })?;
        let class = vm.heap().lock().class_of(exception)?;
        let class_name = names::to_binary(vm.loader().get(class)?.name());
        let message = self.exception_message(exception)?;

        let lines = self.exception_lines(index)?;
        let thread_name = self.stack().name().to_string();
        let stderr = &vm.config().stderr;
        let mut lines = lines.into_iter();
        if let Some(first) = lines.next() {
            stderr.write_str(&format!("Exception in thread \"{}\" {}\n", thread_name, first));
        }
        for line in lines {
            stderr.write_str(&format!("{}\n", line));
        }
        stderr.flush();
        warn!(thread = %thread_name, class = %class_name, ?message, "uncaught exception");
        Ok(ThreadOutcome::UncaughtException { class_name, message })
    }
}
