//! Integration test suite for the Corten JVM
//!
//! Helpers shared by the cross-component tests: assemble classes with
//! `ClassWriter`, lay them out as classpath directories or jars, and run
//! them on a VM whose console is captured.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use class_loader::{BootstrapResolver, InMemoryResolver};
use classfile::{ClassAccess, ClassWriter, FieldAccess, MethodAccess, Opcode};
use core_types::{BasicType, JvmResult};
use interpreter::{JavaVm, OutputSink, VmConfig};
use tempfile::TempDir;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Re-export components for test convenience
pub mod components {
    pub use class_loader;
    pub use classfile;
    pub use core_types;
    pub use interpreter;
    pub use memory_manager;
}

pub const PUBLIC_STATIC: MethodAccess = MethodAccess::PUBLIC.union(MethodAccess::STATIC);
pub const MAIN_DESCRIPTOR: &str = "([Ljava/lang/String;)V";
pub const OBJECT: &str = "java/lang/Object";

/// A public class with the given superclass.
pub fn public_class(name: &str, super_class: &str) -> ClassWriter {
    ClassWriter::new(name, Some(super_class), ClassAccess::PUBLIC | ClassAccess::SUPER)
}

/// Adds `<init>()V` chaining to the superclass constructor.
pub fn add_default_constructor(writer: &mut ClassWriter, super_class: &str) -> classfile::error::Result<()> {
    writer.add_method(MethodAccess::PUBLIC, "<init>", "()V", |c| {
        c.aload(0)
            .invokespecial(super_class, "<init>", "()V")
            .op(Opcode::Return);
    })?;
    Ok(())
}

/// `demo/Node { int value; Node next; }` with a two-argument constructor.
pub fn node_class() -> classfile::error::Result<ClassWriter> {
    let mut node = public_class("demo/Node", OBJECT);
    node.add_field(FieldAccess::PUBLIC, "value", "I")
        .add_field(FieldAccess::PUBLIC, "next", "Ldemo/Node;");
    node.add_method(MethodAccess::PUBLIC, "<init>", "(ILdemo/Node;)V", |c| {
        c.aload(0).invokespecial(OBJECT, "<init>", "()V");
        c.aload(0).iload(1).putfield("demo/Node", "value", "I");
        c.aload(0).aload(2).putfield("demo/Node", "next", "Ldemo/Node;");
        c.op(Opcode::Return);
    })?;
    Ok(node)
}

/// Builds a list one node per frame, churns garbage at the bottom of the
/// recursion and sums the list afterwards. `main` prints the sum for a
/// fifty node list.
pub fn chain_class() -> classfile::error::Result<ClassWriter> {
    let mut chain = public_class("demo/Chain", OBJECT);
    chain
        .add_method(PUBLIC_STATIC, "churn", "()V", |c| {
            let (top, done) = (c.new_label(), c.new_label());
            c.iconst(0).istore(0);
            c.bind(top).iload(0).iconst(2000).branch(Opcode::IfIcmpge, done);
            c.iconst(64).newarray(BasicType::Int).op(Opcode::Pop);
            c.iinc(0, 1).goto(top);
            c.bind(done).op(Opcode::Return);
        })?;
    chain
        .add_method(PUBLIC_STATIC, "sum", "(Ldemo/Node;)I", |c| {
            let (top, done) = (c.new_label(), c.new_label());
            c.iconst(0).istore(1);
            c.bind(top).aload(0).branch(Opcode::Ifnull, done);
            c.iload(1)
                .aload(0)
                .getfield("demo/Node", "value", "I")
                .op(Opcode::Iadd)
                .istore(1);
            c.aload(0).getfield("demo/Node", "next", "Ldemo/Node;").astore(0);
            c.goto(top);
            c.bind(done).iload(1).op(Opcode::Ireturn);
        })?;
    chain
        .add_method(PUBLIC_STATIC, "build", "(Ldemo/Node;I)I", |c| {
            let recurse = c.new_label();
            c.iload(1).branch(Opcode::Ifne, recurse);
            c.invokestatic("demo/Chain", "churn", "()V")
                .aload(0)
                .invokestatic("demo/Chain", "sum", "(Ldemo/Node;)I")
                .op(Opcode::Ireturn);
            c.bind(recurse)
                .new_object("demo/Node")
                .op(Opcode::Dup)
                .iload(1)
                .aload(0)
                .invokespecial("demo/Node", "<init>", "(ILdemo/Node;)V")
                .iload(1)
                .iconst(1)
                .op(Opcode::Isub)
                .invokestatic("demo/Chain", "build", "(Ldemo/Node;I)I")
                .op(Opcode::Ireturn);
        })?;
    chain.add_method(PUBLIC_STATIC, "main", MAIN_DESCRIPTOR, |c| {
        c.getstatic("java/lang/System", "out", "Ljava/io/PrintStream;")
            .op(Opcode::AconstNull)
            .iconst(50)
            .invokestatic("demo/Chain", "build", "(Ldemo/Node;I)I")
            .invokevirtual("java/io/PrintStream", "println", "(I)V")
            .op(Opcode::Return);
    })?;
    Ok(chain)
}

/// Console sinks of a VM under test.
#[derive(Debug, Clone)]
pub struct Console {
    pub stdout: OutputSink,
    pub stderr: OutputSink,
}

impl Console {
    /// A configuration whose `System.out` and `System.err` go to the
    /// returned buffers.
    pub fn captured() -> (VmConfig, Console) {
        let console = Console {
            stdout: OutputSink::buffer(),
            stderr: OutputSink::buffer(),
        };
        let config = VmConfig::new()
            .with_stdout(console.stdout.clone())
            .with_stderr(console.stderr.clone());
        (config, console)
    }

    pub fn stdout_text(&self) -> String {
        self.stdout.contents().unwrap_or_default()
    }

    pub fn stderr_text(&self) -> String {
        self.stderr.contents().unwrap_or_default()
    }
}

/// A VM over `classes` plus the runtime classes, with captured console.
pub fn vm_with_classes(
    classes: &[&ClassWriter],
    configure: impl FnOnce(VmConfig) -> VmConfig,
) -> JvmResult<(JavaVm, Console)> {
    let resolver = InMemoryResolver::new();
    for writer in classes {
        resolver.insert(writer.name(), writer.to_bytes());
    }
    let (config, console) = Console::captured();
    let vm = JavaVm::with_resolver(configure(config), BootstrapResolver::new(resolver))?;
    Ok((vm, console))
}

/// Classpath entries written to a temporary directory, in search order.
#[derive(Debug)]
pub struct ClasspathFixture {
    root: TempDir,
    entries: Vec<PathBuf>,
}

impl ClasspathFixture {
    pub fn new() -> io::Result<Self> {
        Ok(ClasspathFixture {
            root: tempfile::tempdir()?,
            entries: Vec::new(),
        })
    }

    /// Appends a directory entry holding `classes` as `<name>.class` files.
    pub fn directory(&mut self, entry: &str, classes: &[&ClassWriter]) -> io::Result<&mut Self> {
        let base = self.root.path().join(entry);
        for writer in classes {
            let path = base.join(format!("{}.class", writer.name()));
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(path, writer.to_bytes())?;
        }
        fs::create_dir_all(&base)?;
        self.entries.push(base);
        Ok(self)
    }

    /// Appends a jar entry holding `classes`, deflated.
    pub fn jar(&mut self, entry: &str, classes: &[&ClassWriter]) -> io::Result<&mut Self> {
        let path = self.root.path().join(entry);
        write_jar(&path, classes)?;
        self.entries.push(path);
        Ok(self)
    }

    /// The entries joined with the platform path separator.
    pub fn classpath(&self) -> io::Result<String> {
        let joined = std::env::join_paths(&self.entries)
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidInput, err))?;
        joined
            .into_string()
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "classpath is not UTF-8"))
    }
}

fn write_jar(path: &Path, classes: &[&ClassWriter]) -> io::Result<()> {
    let mut zip = ZipWriter::new(fs::File::create(path)?);
    for writer in classes {
        let options = FileOptions::default().compression_method(CompressionMethod::Deflated);
        zip.start_file(format!("{}.class", writer.name()), options)?;
        zip.write_all(&writer.to_bytes())?;
    }
    zip.finish()?;
    Ok(())
}
