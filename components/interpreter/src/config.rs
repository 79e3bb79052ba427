//! VM configuration and console sinks.

use std::fmt;
use std::io::Write;
use std::sync::Arc;

use memory_manager::DEFAULT_SEMISPACE_SIZE;
use parking_lot::Mutex;
use tracing::debug;

/// Default frame limit per thread
pub const DEFAULT_MAX_STACK_DEPTH: usize = 1024;
/// Default number of safepoint polls between interpreter-lock hand-offs
pub const DEFAULT_TIME_SLICE: u32 = 10_000;
/// Default native stack size of threads started by the VM
pub const DEFAULT_THREAD_STACK_SIZE: usize = 16 * 1024 * 1024;

/// Destination of `System.out` / `System.err` output.
#[derive(Clone, Default)]
pub enum OutputSink {
    /// The process standard output
    #[default]
    Stdout,
    /// The process standard error
    Stderr,
    /// An in-memory buffer, shared with the embedder
    Buffer(Arc<Mutex<Vec<u8>>>),
    /// Output is dropped
    Discard,
}

impl OutputSink {
    /// Creates a sink writing to a fresh shared buffer.
    pub fn buffer() -> Self {
        OutputSink::Buffer(Arc::new(Mutex::new(Vec::new())))
    }

    /// Writes `text` to the sink.
    ///
    /// Console write failures are logged and otherwise ignored, as
    /// `PrintStream` does.
    pub fn write_str(&self, text: &str) {
        let result = match self {
            OutputSink::Stdout => std::io::stdout().lock().write_all(text.as_bytes()),
            OutputSink::Stderr => std::io::stderr().lock().write_all(text.as_bytes()),
            OutputSink::Buffer(buffer) => {
                buffer.lock().extend_from_slice(text.as_bytes());
                Ok(())
            }
            OutputSink::Discard => Ok(()),
        };
        if let Err(err) = result {
            debug!(error = %err, "console write failed");
        }
    }

    /// Flushes process streams.
    pub fn flush(&self) {
        let result = match self {
            OutputSink::Stdout => std::io::stdout().flush(),
            OutputSink::Stderr => std::io::stderr().flush(),
            OutputSink::Buffer(_) | OutputSink::Discard => Ok(()),
        };
        if let Err(err) = result {
            debug!(error = %err, "console flush failed");
        }
    }

    /// Buffered text so far; `None` for process streams.
    pub fn contents(&self) -> Option<String> {
        match self {
            OutputSink::Buffer(buffer) => Some(String::from_utf8_lossy(&buffer.lock()).into_owned()),
            _ => None,
        }
    }
}

impl fmt::Debug for OutputSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputSink::Stdout => f.write_str("Stdout"),
            OutputSink::Stderr => f.write_str("Stderr"),
            OutputSink::Buffer(buffer) => write!(f, "Buffer({} bytes)", buffer.lock().len()),
            OutputSink::Discard => f.write_str("Discard"),
        }
    }
}

/// Configuration of one [`JavaVm`](crate::JavaVm).
///
/// # Examples
///
/// ```
/// use interpreter::{OutputSink, VmConfig};
///
/// let config = VmConfig::default()
///     .with_classpath("build/classes")
///     .with_heap_size(1 << 20)
///     .with_max_stack_depth(256)
///     .with_stdout(OutputSink::buffer());
/// assert_eq!(config.max_stack_depth, 256);
/// assert_eq!(config.classpath, "build/classes");
/// ```
#[derive(Debug, Clone)]
pub struct VmConfig {
    /// Size of each heap semispace in bytes
    pub heap_size: usize,
    /// Classpath string (`dir:lib.jar` on Unix)
    pub classpath: String,
    /// Frames per thread before `StackOverflowError`
    pub max_stack_depth: usize,
    /// Sink behind `System.out`
    pub stdout: OutputSink,
    /// Sink behind `System.err` and uncaught-exception reports
    pub stderr: OutputSink,
    /// Safepoint polls between hand-offs of the interpreter lock
    pub time_slice: u32,
    /// Native stack size of VM-started threads
    pub thread_stack_size: usize,
    /// Synthesize runtime classes the classpath does not supply
    pub bootstrap_classes: bool,
}

impl VmConfig {
    /// Creates the default configuration.
    pub fn new() -> Self {
        VmConfig {
            heap_size: DEFAULT_SEMISPACE_SIZE,
            classpath: String::new(),
            max_stack_depth: DEFAULT_MAX_STACK_DEPTH,
            stdout: OutputSink::Stdout,
            stderr: OutputSink::Stderr,
            time_slice: DEFAULT_TIME_SLICE,
            thread_stack_size: DEFAULT_THREAD_STACK_SIZE,
            bootstrap_classes: true,
        }
    }

    /// Sets the semispace size.
    pub fn with_heap_size(mut self, bytes: usize) -> Self {
        self.heap_size = bytes;
        self
    }

    /// Sets the classpath string.
    pub fn with_classpath(mut self, classpath: impl Into<String>) -> Self {
        self.classpath = classpath.into();
        self
    }

    /// Sets the frame limit.
    pub fn with_max_stack_depth(mut self, depth: usize) -> Self {
        self.max_stack_depth = depth.max(1);
        self
    }

    /// Sets the `System.out` sink.
    pub fn with_stdout(mut self, sink: OutputSink) -> Self {
        self.stdout = sink;
        self
    }

    /// Sets the `System.err` sink.
    pub fn with_stderr(mut self, sink: OutputSink) -> Self {
        self.stderr = sink;
        self
    }

    /// Sets the interpreter-lock time slice.
    pub fn with_time_slice(mut self, polls: u32) -> Self {
        self.time_slice = polls.max(1);
        self
    }

    /// Sets the native stack size of VM-started threads.
    pub fn with_thread_stack_size(mut self, bytes: usize) -> Self {
        self.thread_stack_size = bytes;
        self
    }

    /// Enables or disables synthesized runtime classes.
    pub fn with_bootstrap_classes(mut self, enabled: bool) -> Self {
        self.bootstrap_classes = enabled;
        self
    }
}

impl Default for VmConfig {
    fn default() -> Self {
        Self::new()
    }
}
