//! Native method bridge.
//!
//! Natives are Rust closures bound by (class, name, descriptor). The
//! interpreter pushes a native frame whose locals are the arguments, so
//! they stay rooted while the native allocates; natives read arguments back
//! through [`NativeEnv`] after every allocation instead of keeping raw
//! handles across it.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use class_loader::{ClassLoader, MethodInfo};
use core_types::{JvmError, ObjectRef, Value};
use memory_manager::{Heap, ObjectShape};
use parking_lot::{MutexGuard, RwLock};
use tracing::trace;

use crate::builtins;
use crate::config::OutputSink;
use crate::context::VmContext;
use crate::exceptions::Unwind;
use crate::execution::ExecutionContext;

/// Result of a native method: the return value (`None` for `void`) or an
/// unwind.
pub type NativeResult = Result<Option<Value>, Unwind>;

/// A native method implementation.
pub type NativeFn = Arc<dyn Fn(&mut NativeEnv<'_, '_>) -> NativeResult + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct NativeKey {
    class: String,
    name: String,
    descriptor: String,
}

impl NativeKey {
    fn new(class: &str, name: &str, descriptor: &str) -> Self {
        NativeKey {
            class: class.to_string(),
            name: name.to_string(),
            descriptor: descriptor.to_string(),
        }
    }
}

/// Bindings from native method identity to implementation.
///
/// # Examples
///
/// ```
/// use core_types::Value;
/// use interpreter::NativeRegistry;
///
/// let registry = NativeRegistry::new();
/// registry.register("demo/Clock", "ticks", "()I", |_env| Ok(Some(Value::Int(42))));
/// assert!(registry.contains("demo/Clock", "ticks", "()I"));
/// assert!(!registry.contains("demo/Clock", "ticks", "()J"));
/// ```
#[derive(Default)]
pub struct NativeRegistry {
    bindings: RwLock<HashMap<NativeKey, NativeFn>>,
}

impl NativeRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding the runtime-class natives.
    pub fn with_defaults() -> Self {
        let registry = Self::new();
        builtins::register_defaults(&registry);
        registry
    }

    /// Binds `class.name descriptor` to `native`, replacing any previous
    /// binding.
    ///
    /// # Arguments
    ///
    /// * `class` - Internal name of the declaring class (`a/b/C`)
    /// * `name` - Method name
    /// * `descriptor` - Method descriptor
    /// * `native` - Implementation
    pub fn register<F>(&self, class: &str, name: &str, descriptor: &str, native: F)
    where
        F: Fn(&mut NativeEnv<'_, '_>) -> NativeResult + Send + Sync + 'static,
    {
        trace!(class, name, descriptor, "native registered");
        self.bindings
            .write()
            .insert(NativeKey::new(class, name, descriptor), Arc::new(native));
    }

    /// Implementation bound to the method, if any.
    pub fn lookup(&self, class: &str, name: &str, descriptor: &str) -> Option<NativeFn> {
        self.bindings
            .read()
            .get(&NativeKey::new(class, name, descriptor))
            .cloned()
    }

    /// Returns true if the method has a binding.
    pub fn contains(&self, class: &str, name: &str, descriptor: &str) -> bool {
        self.bindings
            .read()
            .contains_key(&NativeKey::new(class, name, descriptor))
    }

    /// Number of bindings.
    pub fn len(&self) -> usize {
        self.bindings.read().len()
    }

    /// Returns true if nothing is bound.
    pub fn is_empty(&self) -> bool {
        self.bindings.read().is_empty()
    }
}

impl fmt::Debug for NativeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeRegistry")
            .field("bindings", &self.len())
            .finish()
    }
}

/// What a native method sees of the VM while it runs.
pub struct NativeEnv<'a, 't> {
    ctx: &'a mut ExecutionContext<'t>,
    method: Arc<MethodInfo>,
}

impl<'a, 't> NativeEnv<'a, 't> {
    pub(crate) fn new(ctx: &'a mut ExecutionContext<'t>, method: Arc<MethodInfo>) -> Self {
        NativeEnv { ctx, method }
    }

    /// The native method being executed.
    pub fn method(&self) -> &MethodInfo {
        &self.method
    }

    /// The shared VM state.
    pub fn vm(&self) -> &'t VmContext {
        self.ctx.vm()
    }

    /// The class loader.
    pub fn loader(&self) -> &'t ClassLoader {
        self.ctx.vm().loader()
    }

    /// Locks the heap. Release the guard before allocating or calling back
    /// into Java.
    pub fn heap(&self) -> MutexGuard<'t, Heap> {
        self.ctx.vm().heap().lock()
    }

    /// Sink behind `System.out`.
    pub fn stdout(&self) -> &'t OutputSink {
        &self.ctx.vm().config().stdout
    }

    /// Sink behind `System.err`.
    pub fn stderr(&self) -> &'t OutputSink {
        &self.ctx.vm().config().stderr
    }

    /// The running thread.
    pub fn context(&mut self) -> &mut ExecutionContext<'t> {
        &mut *self.ctx
    }

    /// Number of arguments, receiver included.
    pub fn arg_count(&self) -> usize {
        self.ctx.stack().top().map(|f| f.locals().len()).unwrap_or(0)
    }

    /// Argument `index` (the receiver is argument 0 of instance methods).
    pub fn arg(&self, index: usize) -> Result<Value, Unwind> {
        self.ctx
            .stack()
            .top()
            .and_then(|frame| frame.locals().get(index).copied())
            .ok_or_else(|| {
                Unwind::Fatal(JvmError::internal(format!(
                    "native {} has no argument {}",
                    self.method.qualified_name(),
                    index
                )))
            })
    }

    fn mistyped(&self, index: usize, expected: &str) -> Unwind {
        Unwind::Fatal(JvmError::internal(format!(
            "argument {} of {} is not {}",
            index,
            self.method.qualified_name(),
            expected
        )))
    }

    /// `int`-like argument (`int`, `char`, `boolean`, ...).
    pub fn int_arg(&self, index: usize) -> Result<i32, Unwind> {
        self.arg(index)?.as_int().ok_or_else(|| self.mistyped(index, "an int"))
    }

    /// `long` argument.
    pub fn long_arg(&self, index: usize) -> Result<i64, Unwind> {
        self.arg(index)?.as_long().ok_or_else(|| self.mistyped(index, "a long"))
    }

    /// `float` argument.
    pub fn float_arg(&self, index: usize) -> Result<f32, Unwind> {
        self.arg(index)?.as_float().ok_or_else(|| self.mistyped(index, "a float"))
    }

    /// `double` argument.
    pub fn double_arg(&self, index: usize) -> Result<f64, Unwind> {
        self.arg(index)?.as_double().ok_or_else(|| self.mistyped(index, "a double"))
    }

    /// Reference argument, `None` for null.
    pub fn object_arg(&self, index: usize) -> Result<Option<ObjectRef>, Unwind> {
        self.arg(index)?
            .as_reference()
            .ok_or_else(|| self.mistyped(index, "a reference"))
    }

    /// Non-null reference argument; throws `NullPointerException` for null.
    pub fn non_null_arg(&mut self, index: usize) -> Result<ObjectRef, Unwind> {
        match self.object_arg(index)? {
            Some(obj) => Ok(obj),
            None => Err(self.ctx.throw_null_pointer()),
        }
    }

    /// The receiver of an instance native.
    pub fn this(&mut self) -> Result<ObjectRef, Unwind> {
        self.non_null_arg(0)
    }

    /// Allocates an object.
    pub fn allocate(&mut self, shape: ObjectShape) -> Result<ObjectRef, Unwind> {
        self.ctx.allocate(shape)
    }

    /// Allocates a `String`.
    pub fn new_string(&mut self, text: &str) -> Result<ObjectRef, Unwind> {
        self.ctx.new_string(text)
    }

    /// Allocates a `String` from UTF-16 code units.
    pub fn new_string_from_units(&mut self, units: &[u16]) -> Result<ObjectRef, Unwind> {
        self.ctx.new_string_from_units(units)
    }

    /// Canonical `String` for `text`.
    pub fn intern(&mut self, text: &str) -> Result<ObjectRef, Unwind> {
        self.ctx.intern_string(text)
    }

    /// Contents of a `String`.
    pub fn string_value(&self, string: ObjectRef) -> Result<String, Unwind> {
        self.ctx.string_value(string)
    }

    /// UTF-16 contents of a `String`.
    pub fn string_units(&self, string: ObjectRef) -> Result<Vec<u16>, Unwind> {
        self.ctx.string_units(string)
    }

    /// Creates and throws `class_name` with `message`.
    pub fn throw_new(&mut self, class_name: &str, message: Option<&str>) -> Unwind {
        self.ctx.throw_new(class_name, message)
    }

    /// Calls an instance method through virtual dispatch.
    pub fn invoke_virtual(
        &mut self,
        receiver: ObjectRef,
        name: &str,
        descriptor: &str,
        args: &[Value],
    ) -> NativeResult {
        self.ctx.invoke_virtual(receiver, name, descriptor, args)
    }

    /// Runs a stop-the-world collection.
    pub fn collect_garbage(&mut self) -> Result<(), Unwind> {
        self.ctx.collect_garbage().map(|_| ())
    }
}
