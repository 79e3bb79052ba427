//! Logical Java threads
//!
//! A [`ThreadContext`] owns one frame stack, attaches it to the VM for the
//! duration of a run and turns the way the run ended into a
//! [`ThreadOutcome`].

use std::fmt;
use std::sync::Arc;

use class_loader::names;
use core_types::{BasicType, JavaThreadId, JvmError, Value};
use memory_manager::ObjectShape;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::call_frame::FrameStack;
use crate::context::VmContext;
use crate::exceptions::Unwind;
use crate::execution::ExecutionContext;

/// How a thread ended.
#[derive(Debug, Clone, PartialEq)]
pub enum ThreadOutcome {
    /// The entry method returned
    Completed {
        /// Return value, `None` for `void`
        result: Option<Value>,
    },
    /// An exception reached the bottom of the stack
    UncaughtException {
        /// Binary name of the exception class (`java.lang.ArithmeticException`)
        class_name: String,
        /// `detailMessage` of the exception
        message: Option<String>,
    },
    /// The VM could not continue (out of memory, internal error, missing
    /// entry method)
    Failed(JvmError),
}

impl ThreadOutcome {
    /// Process exit status for this outcome: 0 on completion, 1 otherwise.
    pub fn exit_code(&self) -> i32 {
        match self {
            ThreadOutcome::Completed { .. } => 0,
            ThreadOutcome::UncaughtException { .. } | ThreadOutcome::Failed(_) => 1,
        }
    }

    /// Returns true if the entry method returned normally.
    pub fn is_completed(&self) -> bool {
        matches!(self, ThreadOutcome::Completed { .. })
    }

    /// Return value of a completed run.
    pub fn result(&self) -> Option<Value> {
        match self {
            ThreadOutcome::Completed { result } => *result,
            _ => None,
        }
    }
}

impl fmt::Display for ThreadOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ThreadOutcome::Completed { result: None } => write!(f, "completed"),
            ThreadOutcome::Completed { result: Some(value) } => write!(f, "completed with {:?}", value),
            ThreadOutcome::UncaughtException {
                class_name,
                message: Some(message),
            } => write!(f, "uncaught {}: {}", class_name, message),
            ThreadOutcome::UncaughtException { class_name, .. } => write!(f, "uncaught {}", class_name),
            ThreadOutcome::Failed(err) => write!(f, "failed: {}", err),
        }
    }
}

/// One logical Java thread.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use class_loader::{BootstrapResolver, InMemoryResolver};
/// use classfile::{ClassAccess, ClassWriter, MethodAccess, Opcode};
/// use core_types::Value;
/// use interpreter::{ThreadContext, VmConfig, VmContext};
///
/// let mut class = ClassWriter::new("demo/Answer", Some("java/lang/Object"), ClassAccess::PUBLIC);
/// class
///     .add_method(MethodAccess::PUBLIC | MethodAccess::STATIC, "get", "()I", |c| {
///         c.iconst(42).op(Opcode::Ireturn);
///     })
///     .unwrap();
/// let resolver = InMemoryResolver::new().with_class("demo/Answer", class.to_bytes());
/// let vm = Arc::new(VmContext::new(VmConfig::default(), BootstrapResolver::new(resolver)).unwrap());
///
/// let thread = ThreadContext::new(vm, "main");
/// let outcome = thread.invoke_static("demo.Answer", "get", "()I", Vec::new());
/// assert_eq!(outcome.result(), Some(Value::Int(42)));
/// ```
pub struct ThreadContext {
    vm: Arc<VmContext>,
    id: JavaThreadId,
    name: String,
    stack: Arc<Mutex<FrameStack>>,
}

impl ThreadContext {
    /// Creates a thread of `vm` named `name`. Nothing runs until
    /// [`ThreadContext::start`] or [`ThreadContext::invoke_static`].
    pub fn new(vm: Arc<VmContext>, name: impl Into<String>) -> Self {
        let name = name.into();
        let id = vm.next_thread_id();
        let stack = Arc::new(Mutex::new(FrameStack::new(id, name.clone())));
        ThreadContext { vm, id, name, stack }
    }

    /// Thread identity.
    pub fn id(&self) -> JavaThreadId {
        self.id
    }

    /// Thread name, as printed in uncaught-exception reports.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Runs `public static void main(String[])` of `class_name`.
    ///
    /// `class_name` may use `.` or `/` as package separator. Blocks until
    /// the thread ends.
    pub fn start(&self, class_name: &str, args: &[String]) -> ThreadOutcome {
        let class_name = names::to_internal(class_name);
        info!(thread = %self.name, class = %class_name, "starting main");
        self.run_attached(|ctx| {
            let vm = ctx.vm();
            let class = vm.loader().resolve(&class_name);
            let class = ctx.check(class)?;
            let main = class
                .declared_method("main", names::MAIN_DESCRIPTOR)
                .filter(|m| m.is_static())
                .cloned()
                .ok_or_else(|| {
                    Unwind::Fatal(JvmError::no_such_method(format!(
                        "static main{} not found in {}",
                        names::MAIN_DESCRIPTOR,
                        names::to_binary(&class_name)
                    )))
                })?;
            ctx.ensure_initialized(&class)?;
            let arguments = ctx.string_array(args)?;
            ctx.call(main, vec![arguments])
        })
    }

    /// Runs any static method with explicit arguments.
    pub fn invoke_static(
        &self,
        class_name: &str,
        method: &str,
        descriptor: &str,
        args: Vec<Value>,
    ) -> ThreadOutcome {
        debug!(thread = %self.name, class = class_name, method, descriptor, "invoking static entry");
        self.run_attached(|ctx| ctx.invoke_static(class_name, method, descriptor, args))
    }

    fn run_attached(
        &self,
        body: impl FnOnce(&mut ExecutionContext<'_>) -> Result<Option<Value>, Unwind>,
    ) -> ThreadOutcome {
        self.vm.register_thread(self.id, self.stack.clone());
        let outcome = {
            let mut ctx = ExecutionContext::attach(&self.vm, &self.stack);
            match body(&mut ctx) {
                Ok(result) => ThreadOutcome::Completed { result },
                Err(Unwind::Exception) => ctx.report_uncaught(),
                Err(Unwind::Fatal(err)) => {
                    warn!(thread = %self.name, error = %err, "thread failed");
                    ThreadOutcome::Failed(err)
                }
            }
        };
        let released = self.vm.monitors().release_all(self.id);
        if released > 0 {
            debug!(thread = %self.name, released, "released monitors of finished thread");
        }
        self.vm.unregister_thread(self.id);
        info!(thread = %self.name, %outcome, "thread finished");
        outcome
    }
}

impl fmt::Debug for ThreadContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadContext")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish()
    }
}

impl ExecutionContext<'_> {
    /// Builds a `String[]` holding `items`.
    pub(crate) fn string_array(&mut self, items: &[String]) -> Result<Value, Unwind> {
        let vm = self.vm();
        let class = vm.loader().array_class_of(vm.string_class());
        let class = self.check(class)?;
        let array = self.allocate(ObjectShape::Array {
            class: class.id(),
            element: BasicType::Reference,
            length: items.len() as u32,
        })?;
        let mark = self.push_handle(Value::object(array));
        let filled = self.fill_string_array(mark, items);
        let array = self.handle(mark);
        self.truncate_handles(mark);
        filled.map(|()| array)
    }

    fn fill_string_array(&mut self, mark: usize, items: &[String]) -> Result<(), Unwind> {
        for (index, item) in items.iter().enumerate() {
            let string = self.new_string(item)?;
            let array = self
                .handle(mark)
                .as_object()
                .ok_or_else(|| Unwind::Fatal(JvmError::internal("argument array handle was cleared")))?;
            self.vm()
                .heap()
                .lock()
                .array_store(array, index as i32, Value::object(string))?;
        }
        Ok(())
    }
}
