//! Embedding bridge
//!
//! [`JavaVm`] is the handle an embedder holds: create a VM from a
//! [`VmConfig`], run `main` on a new thread, destroy the VM.

use std::sync::Arc;
use std::thread::JoinHandle;

use class_loader::{BootstrapResolver, ClassLoader, Classpath, ClasspathResolver};
use core_types::{ErrorKind, JvmError, JvmResult, Value};
use memory_manager::{CollectionTicket, GcStats};
use tracing::{debug, info, warn};

use crate::config::VmConfig;
use crate::context::VmContext;
use crate::natives::{NativeEnv, NativeResult};
use crate::thread::{ThreadContext, ThreadOutcome};

/// JNI-style result codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum StatusCode {
    /// Success
    Ok = 0,
    /// Unknown error
    Err = -1,
    /// Thread detached from the VM
    Detached = -2,
    /// Unsupported version or feature
    Version = -3,
    /// Not enough memory
    NoMem = -4,
    /// VM already created
    Exist = -5,
    /// Invalid arguments
    Inval = -6,
}

impl StatusCode {
    /// Numeric code.
    pub fn code(self) -> i32 {
        self as i32
    }
}

impl From<&JvmError> for StatusCode {
    fn from(err: &JvmError) -> Self {
        match err.kind {
            ErrorKind::OutOfMemory => StatusCode::NoMem,
            ErrorKind::Unsupported => StatusCode::Version,
            _ => StatusCode::Err,
        }
    }
}

impl From<&ThreadOutcome> for StatusCode {
    fn from(outcome: &ThreadOutcome) -> Self {
        match outcome {
            ThreadOutcome::Completed { .. } => StatusCode::Ok,
            ThreadOutcome::UncaughtException { .. } => StatusCode::Err,
            ThreadOutcome::Failed(err) => StatusCode::from(err),
        }
    }
}

/// A Java virtual machine.
///
/// # Examples
///
/// ```
/// use class_loader::{BootstrapResolver, InMemoryResolver};
/// use classfile::{ClassAccess, ClassWriter, MethodAccess, Opcode};
/// use interpreter::{JavaVm, OutputSink, VmConfig};
///
/// let mut hello = ClassWriter::new("demo/Hello", Some("java/lang/Object"), ClassAccess::PUBLIC);
/// hello
///     .add_method(
///         MethodAccess::PUBLIC | MethodAccess::STATIC,
///         "main",
///         "([Ljava/lang/String;)V",
///         |c| {
///             c.getstatic("java/lang/System", "out", "Ljava/io/PrintStream;")
///                 .ldc_string("hello")
///                 .invokevirtual("java/io/PrintStream", "println", "(Ljava/lang/String;)V")
///                 .op(Opcode::Return);
///         },
///     )
///     .unwrap();
///
/// let stdout = OutputSink::buffer();
/// let config = VmConfig::default().with_stdout(stdout.clone());
/// let resolver = InMemoryResolver::new().with_class("demo/Hello", hello.to_bytes());
/// let vm = JavaVm::with_resolver(config, BootstrapResolver::new(resolver)).unwrap();
///
/// let outcome = vm.start_main_thread("demo.Hello", &[]);
/// assert_eq!(outcome.exit_code(), 0);
/// assert_eq!(stdout.contents().unwrap(), "hello\n");
/// vm.destroy();
/// ```
#[derive(Debug)]
pub struct JavaVm {
    context: Arc<VmContext>,
}

impl JavaVm {
    /// Creates a VM reading classes from `config.classpath`, with the
    /// runtime classes synthesized unless `bootstrap_classes` is off.
    ///
    /// # Returns
    ///
    /// An error if `java/lang/Object` or `java/lang/String` cannot be
    /// loaded and linked.
    pub fn create(config: VmConfig) -> JvmResult<Self> {
        let classpath = Classpath::parse(&config.classpath);
        debug!(entries = classpath.len(), "classpath parsed");
        if config.bootstrap_classes {
            Self::with_resolver(config, BootstrapResolver::new(classpath))
        } else {
            Self::with_resolver(config, classpath)
        }
    }

    /// Creates a VM over an explicit resolver; `config.classpath` is
    /// ignored.
    pub fn with_resolver(config: VmConfig, resolver: impl ClasspathResolver + 'static) -> JvmResult<Self> {
        if config.max_stack_depth == 0 {
            return Err(JvmError::new(ErrorKind::Internal, "max_stack_depth must be positive"));
        }
        let context = VmContext::new(config, resolver)?;
        Ok(JavaVm {
            context: Arc::new(context),
        })
    }

    /// State shared by the threads of this VM.
    pub fn context(&self) -> &Arc<VmContext> {
        &self.context
    }

    /// The class loader.
    pub fn loader(&self) -> &ClassLoader {
        self.context.loader()
    }

    /// Binds a host function to a `native` method.
    pub fn register_native<F>(&self, class: &str, name: &str, descriptor: &str, native: F)
    where
        F: Fn(&mut NativeEnv<'_, '_>) -> NativeResult + Send + Sync + 'static,
    {
        self.context.natives().register(class, name, descriptor, native);
    }

    /// Runs `main` of `class_name` on a new thread named `main` and waits
    /// for it.
    pub fn start_main_thread(&self, class_name: &str, args: &[String]) -> ThreadOutcome {
        match self.spawn_main_thread(class_name, args) {
            Ok(handle) => join(handle),
            Err(err) => ThreadOutcome::Failed(err),
        }
    }

    /// Starts `main` of `class_name` on a new thread named `main`.
    pub fn spawn_main_thread(&self, class_name: &str, args: &[String]) -> JvmResult<JoinHandle<ThreadOutcome>> {
        self.spawn_thread("main", class_name, args)
    }

    /// Starts `main` of `class_name` on a new OS thread.
    pub fn spawn_thread(
        &self,
        thread_name: &str,
        class_name: &str,
        args: &[String],
    ) -> JvmResult<JoinHandle<ThreadOutcome>> {
        let thread = ThreadContext::new(self.context.clone(), thread_name);
        let class_name = class_name.to_string();
        let args = args.to_vec();
        std::thread::Builder::new()
            .name(thread_name.to_string())
            .stack_size(self.context.config().thread_stack_size)
            .spawn(move || thread.start(&class_name, &args))
            .map_err(|err| {
                JvmError::new(
                    ErrorKind::Io,
                    format!("cannot start thread {}: {}", thread_name, err),
                )
            })
    }

    /// Runs a static method on the calling thread.
    pub fn invoke_static(
        &self,
        class_name: &str,
        method: &str,
        descriptor: &str,
        args: Vec<Value>,
    ) -> ThreadOutcome {
        ThreadContext::new(self.context.clone(), "main").invoke_static(class_name, method, descriptor, args)
    }

    /// Runs a full collection from outside any Java thread, waiting for
    /// running threads to reach a safepoint.
    pub fn collect_garbage(&self) -> JvmResult<()> {
        let safepoint = self.context.safepoint();
        if safepoint.begin_collection(false) == CollectionTicket::Busy {
            return Ok(());
        }
        let result = self.context.collect_stopped(None);
        safepoint.end_collection();
        result
    }

    /// Heap occupancy and collection counters.
    pub fn heap_stats(&self) -> GcStats {
        self.context.heap_stats()
    }

    /// Shuts the VM down. Threads still running keep their own reference to
    /// the shared state until they finish.
    pub fn destroy(self) {
        let threads = self.context.thread_count();
        if threads > 0 {
            warn!(threads, "destroying VM with attached threads");
        }
        info!(
            classes = self.context.loader().loaded_count(),
            collections = self.context.heap_stats().collections,
            "virtual machine destroyed"
        );
    }
}

fn join(handle: JoinHandle<ThreadOutcome>) -> ThreadOutcome {
    handle
        .join()
        .unwrap_or_else(|_| ThreadOutcome::Failed(JvmError::internal("thread panicked")))
}
