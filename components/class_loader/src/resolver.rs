//! Sources of class-file bytes.
//!
//! A [`ClasspathResolver`] maps an internal class name (`a/b/C`) to the raw
//! bytes of its class file. The loader never touches the filesystem itself.

use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::io::{ErrorKind as IoErrorKind, Read};
use std::path::{Path, PathBuf};

use core_types::{JvmError, JvmResult};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, warn};
use zip::result::ZipError;
use zip::ZipArchive;

/// Supplies class-file bytes by internal class name.
pub trait ClasspathResolver: Send + Sync + fmt::Debug {
    /// Returns the bytes of `name`, `Ok(None)` if this resolver does not
    /// have it, or an error if the source exists but cannot be read.
    fn find_class(&self, name: &str) -> JvmResult<Option<Vec<u8>>>;
}

impl<T: ClasspathResolver + ?Sized> ClasspathResolver for Box<T> {
    fn find_class(&self, name: &str) -> JvmResult<Option<Vec<u8>>> {
        (**self).find_class(name)
    }
}

impl<T: ClasspathResolver + ?Sized> ClasspathResolver for std::sync::Arc<T> {
    fn find_class(&self, name: &str) -> JvmResult<Option<Vec<u8>>> {
        (**self).find_class(name)
    }
}

/// Relative path of the class file for `name`.
fn class_file_path(name: &str) -> Option<String> {
    if name.is_empty() || name.starts_with('[') || name.contains("..") || name.starts_with('/') {
        return None;
    }
    Some(format!("{}.class", name))
}

/// Resolves classes from a directory tree (`a/b/C` → `root/a/b/C.class`).
#[derive(Debug, Clone)]
pub struct DirectoryResolver {
    root: PathBuf,
}

impl DirectoryResolver {
    /// Creates a resolver rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        DirectoryResolver { root: root.into() }
    }

    /// Root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl ClasspathResolver for DirectoryResolver {
    fn find_class(&self, name: &str) -> JvmResult<Option<Vec<u8>>> {
        let Some(relative) = class_file_path(name) else {
            return Ok(None);
        };
        let path = self.root.join(relative);
        match std::fs::read(&path) {
            Ok(bytes) => {
                debug!(class = name, path = %path.display(), "found class file");
                Ok(Some(bytes))
            }
            Err(err) if err.kind() == IoErrorKind::NotFound => Ok(None),
            Err(err) => Err(JvmError::from(err)),
        }
    }
}

enum ArchiveState {
    Unopened,
    Open(ZipArchive<File>),
    Unavailable,
}

/// Resolves classes from a zip/jar archive.
///
/// The archive is opened on first use. An archive that cannot be opened
/// behaves like an empty classpath entry.
pub struct JarResolver {
    path: PathBuf,
    archive: Mutex<ArchiveState>,
}

impl JarResolver {
    /// Creates a resolver for the archive at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        JarResolver {
            path: path.into(),
            archive: Mutex::new(ArchiveState::Unopened),
        }
    }

    /// Opens the archive immediately, failing if it is unreadable.
    pub fn open(path: impl Into<PathBuf>) -> JvmResult<Self> {
        let path = path.into();
        let archive = open_archive(&path)?;
        Ok(JarResolver {
            path,
            archive: Mutex::new(ArchiveState::Open(archive)),
        })
    }

    /// Archive path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn open_archive(path: &Path) -> JvmResult<ZipArchive<File>> {
    let file = File::open(path)?;
    ZipArchive::new(file).map_err(|err| {
        JvmError::new(
            core_types::ErrorKind::Io,
            format!("cannot open archive {}: {}", path.display(), err),
        )
    })
}

impl fmt::Debug for JarResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JarResolver")
            .field("path", &self.path)
            .finish()
    }
}

impl ClasspathResolver for JarResolver {
    fn find_class(&self, name: &str) -> JvmResult<Option<Vec<u8>>> {
        let Some(entry) = class_file_path(name) else {
            return Ok(None);
        };
        let mut state = self.archive.lock();
        if let ArchiveState::Unopened = *state {
            *state = match open_archive(&self.path) {
                Ok(archive) => ArchiveState::Open(archive),
                Err(err) => {
                    warn!(path = %self.path.display(), error = %err, "ignoring classpath archive");
                    ArchiveState::Unavailable
                }
            };
        }
        let ArchiveState::Open(archive) = &mut *state else {
            return Ok(None);
        };

        let mut file = match archive.by_name(&entry) {
            Ok(file) => file,
            Err(ZipError::FileNotFound) => return Ok(None),
            Err(err) => {
                return Err(JvmError::new(
                    core_types::ErrorKind::Io,
                    format!("{}!{}: {}", self.path.display(), entry, err),
                ))
            }
        };
        let mut bytes = Vec::with_capacity(file.size() as usize);
        file.read_to_end(&mut bytes)?;
        debug!(class = name, archive = %self.path.display(), "found class file");
        Ok(Some(bytes))
    }
}

/// Resolves classes from an in-memory map.
///
/// # Examples
///
/// ```
/// use class_loader::{ClasspathResolver, InMemoryResolver};
///
/// let resolver = InMemoryResolver::new();
/// resolver.insert("demo/Main", vec![0xCA, 0xFE, 0xBA, 0xBE]);
/// assert!(resolver.find_class("demo/Main").unwrap().is_some());
/// assert!(resolver.find_class("demo/Other").unwrap().is_none());
/// ```
#[derive(Debug, Default)]
pub struct InMemoryResolver {
    classes: RwLock<HashMap<String, Vec<u8>>>,
}

impl InMemoryResolver {
    /// Creates an empty resolver.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces the bytes for `name`.
    pub fn insert(&self, name: impl Into<String>, bytes: Vec<u8>) {
        self.classes.write().insert(name.into(), bytes);
    }

    /// Builder-style [`InMemoryResolver::insert`].
    pub fn with_class(self, name: impl Into<String>, bytes: Vec<u8>) -> Self {
        self.insert(name, bytes);
        self
    }

    /// Number of classes held.
    pub fn len(&self) -> usize {
        self.classes.read().len()
    }

    /// Returns true if no class is held.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ClasspathResolver for InMemoryResolver {
    fn find_class(&self, name: &str) -> JvmResult<Option<Vec<u8>>> {
        Ok(self.classes.read().get(name).cloned())
    }
}

/// Ordered list of resolvers; the first one that has a class wins.
#[derive(Debug, Default)]
pub struct Classpath {
    entries: Vec<Box<dyn ClasspathResolver>>,
}

impl Classpath {
    /// Creates an empty classpath.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a classpath string using the platform separator (`:` on Unix,
    /// `;` on Windows). Entries ending in `.jar` or `.zip` are archives,
    /// everything else is a directory. Empty entries are skipped.
    pub fn parse(classpath: &str) -> Self {
        let mut cp = Classpath::new();
        for entry in std::env::split_paths(classpath) {
            if entry.as_os_str().is_empty() {
                continue;
            }
            let is_archive = entry
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| e.eq_ignore_ascii_case("jar") || e.eq_ignore_ascii_case("zip"))
                .unwrap_or(false);
            if is_archive {
                cp.push(JarResolver::new(entry));
            } else {
                cp.push(DirectoryResolver::new(entry));
            }
        }
        cp
    }

    /// Appends a resolver.
    pub fn push(&mut self, resolver: impl ClasspathResolver + 'static) -> &mut Self {
        self.entries.push(Box::new(resolver));
        self
    }

    /// Builder-style [`Classpath::push`].
    pub fn with(mut self, resolver: impl ClasspathResolver + 'static) -> Self {
        self.push(resolver);
        self
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if there are no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl ClasspathResolver for Classpath {
    fn find_class(&self, name: &str) -> JvmResult<Option<Vec<u8>>> {
        for entry in &self.entries {
            if let Some(bytes) = entry.find_class(name)? {
                return Ok(Some(bytes));
            }
        }
        Ok(None)
    }
}
