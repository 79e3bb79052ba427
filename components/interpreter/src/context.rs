//! State shared by every thread of one VM
//!
//! The class loader, heap, safepoint coordinator, native registry, intern
//! table, monitor table, thread registry and call-site caches all live in
//! one [`VmContext`], shared through `Arc` by the embedding handle and every
//! running thread.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use class_loader::{names, ClassDescriptor, ClassLoader, ClasspathResolver, FieldInfo, MethodInfo};
use core_types::{ClassId, JavaThreadId, JvmError, JvmResult};
use memory_manager::{GcStats, Heap, SafepointCoordinator};
use parking_lot::{Mutex, MutexGuard, RwLock};
use tracing::{debug, info};

use crate::call_frame::FrameStack;
use crate::config::VmConfig;
use crate::inline_cache::{CallSite, InlineCache};
use crate::monitors::MonitorTable;
use crate::natives::NativeRegistry;
use crate::strings::InternTable;

/// A constant-pool reference resolved once and reused.
#[derive(Debug, Clone)]
pub(crate) enum ResolvedMember {
    Class(Arc<ClassDescriptor>),
    Method(Arc<MethodInfo>),
    Field(Arc<FieldInfo>),
}

/// Per-VM shared state.
pub struct VmContext {
    config: VmConfig,
    loader: ClassLoader,
    heap: Mutex<Heap>,
    safepoint: SafepointCoordinator,
    natives: NativeRegistry,
    interned: Mutex<InternTable>,
    monitors: MonitorTable,
    threads: Mutex<HashMap<JavaThreadId, Arc<Mutex<FrameStack>>>>,
    next_thread: AtomicU64,
    /// Serializes Java execution unless the `threaded` feature is enabled
    gil: Option<Mutex<()>>,
    members: RwLock<HashMap<(ClassId, u16), ResolvedMember>>,
    call_sites: Mutex<HashMap<CallSite, InlineCache>>,
    string_class: Arc<ClassDescriptor>,
    string_value_slot: u32,
    char_array_class: Arc<ClassDescriptor>,
    started: Instant,
}

impl VmContext {
    /// Creates the shared state and loads the classes the interpreter
    /// depends on.
    ///
    /// # Returns
    ///
    /// The loading or linking error of `java/lang/Object`, `java/lang/String`
    /// or `char[]` if any of them is unusable.
    pub fn new(config: VmConfig, resolver: impl ClasspathResolver + 'static) -> JvmResult<Self> {
        let loader = ClassLoader::new(resolver);
        loader.resolve(names::OBJECT)?;
        let string_class = loader.resolve(names::STRING)?;
        let string_value_slot = string_class
            .declared_field("value", "[C")
            .filter(|f| !f.is_static())
            .map(|f| f.slot)
            .ok_or_else(|| JvmError::linkage("java.lang.String has no char[] value field"))?;
        let char_array_class = loader.resolve("[C")?;

        let gil = if cfg!(feature = "threaded") {
            None
        } else {
            Some(Mutex::new(()))
        };
        info!(
            heap = config.heap_size,
            threaded = gil.is_none(),
            "virtual machine created"
        );
        Ok(VmContext {
            heap: Mutex::new(Heap::new(config.heap_size)),
            config,
            loader,
            safepoint: SafepointCoordinator::new(),
            natives: NativeRegistry::with_defaults(),
            interned: Mutex::new(InternTable::new()),
            monitors: MonitorTable::new(),
            threads: Mutex::new(HashMap::new()),
            next_thread: AtomicU64::new(1),
            gil,
            members: RwLock::new(HashMap::new()),
            call_sites: Mutex::new(HashMap::new()),
            string_class,
            string_value_slot,
            char_array_class,
            started: Instant::now(),
        })
    }

    /// Configuration the VM was created with.
    pub fn config(&self) -> &VmConfig {
        &self.config
    }

    /// The class loader.
    pub fn loader(&self) -> &ClassLoader {
        &self.loader
    }

    /// The object heap.
    ///
    /// Never hold this lock across a safepoint poll or a blocking wait.
    pub fn heap(&self) -> &Mutex<Heap> {
        &self.heap
    }

    /// Heap statistics.
    pub fn heap_stats(&self) -> GcStats {
        self.heap.lock().stats()
    }

    /// Stop-the-world coordinator.
    pub fn safepoint(&self) -> &SafepointCoordinator {
        &self.safepoint
    }

    /// Native method bindings.
    pub fn natives(&self) -> &NativeRegistry {
        &self.natives
    }

    /// Monitor table.
    pub fn monitors(&self) -> &MonitorTable {
        &self.monitors
    }

    pub(crate) fn interned(&self) -> &Mutex<InternTable> {
        &self.interned
    }

    /// Number of interned strings.
    pub fn interned_count(&self) -> usize {
        self.interned.lock().len()
    }

    pub(crate) fn string_class(&self) -> &Arc<ClassDescriptor> {
        &self.string_class
    }

    pub(crate) fn string_value_slot(&self) -> u32 {
        self.string_value_slot
    }

    pub(crate) fn char_array_class(&self) -> &Arc<ClassDescriptor> {
        &self.char_array_class
    }

    /// Nanoseconds since the VM was created.
    pub fn uptime_nanos(&self) -> i64 {
        self.started.elapsed().as_nanos() as i64
    }

    /// Allocates a thread id.
    pub fn next_thread_id(&self) -> JavaThreadId {
        JavaThreadId(self.next_thread.fetch_add(1, Ordering::Relaxed))
    }

    pub(crate) fn register_thread(&self, id: JavaThreadId, stack: Arc<Mutex<FrameStack>>) {
        self.safepoint.register();
        self.threads.lock().insert(id, stack);
        debug!(thread = id.0, "thread attached");
    }

    pub(crate) fn unregister_thread(&self, id: JavaThreadId) {
        self.threads.lock().remove(&id);
        self.safepoint.unregister();
        debug!(thread = id.0, "thread detached");
    }

    /// Number of attached Java threads.
    pub fn thread_count(&self) -> usize {
        self.threads.lock().len()
    }

    /// Frame stacks of every attached thread except `except`.
    pub(crate) fn thread_stacks(&self, except: Option<JavaThreadId>) -> Vec<Arc<Mutex<FrameStack>>> {
        self.threads
            .lock()
            .iter()
            .filter(|(id, _)| Some(**id) != except)
            .map(|(_, stack)| stack.clone())
            .collect()
    }

    /// Takes the global interpreter lock; `None` in threaded builds.
    pub(crate) fn lock_gil(&self) -> Option<MutexGuard<'_, ()>> {
        self.gil.as_ref().map(|gil| gil.lock())
    }

    /// Returns true if Java threads share one interpreter lock.
    pub fn uses_interpreter_lock(&self) -> bool {
        self.gil.is_some()
    }

    pub(crate) fn cached_member(&self, class: ClassId, index: u16) -> Option<ResolvedMember> {
        self.members.read().get(&(class, index)).cloned()
    }

    pub(crate) fn cache_member(&self, class: ClassId, index: u16, member: ResolvedMember) {
        self.members.write().insert((class, index), member);
    }

    /// Selects through the inline cache of `site`, filling it with `select`
    /// on a miss.
    pub(crate) fn dispatch_cached(
        &self,
        site: CallSite,
        receiver: ClassId,
        select: impl FnOnce() -> Option<Arc<MethodInfo>>,
    ) -> Option<Arc<MethodInfo>> {
        if let Some(target) = self.call_sites.lock().get(&site).and_then(|c| c.lookup(receiver)) {
            return Some(target);
        }
        let target = select()?;
        self.call_sites
            .lock()
            .entry(site)
            .or_default()
            .update(receiver, target.clone());
        Some(target)
    }

    /// Number of call sites with an inline cache.
    pub fn call_site_count(&self) -> usize {
        self.call_sites.lock().len()
    }
}

impl fmt::Debug for VmContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VmContext")
            .field("config", &self.config)
            .field("loaded_classes", &self.loader.loaded_count())
            .field("threads", &self.thread_count())
            .finish()
    }
}
