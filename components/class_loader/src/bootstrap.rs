//! Minimal runtime classes synthesized when the classpath lacks them.
//!
//! The classes are assembled with [`ClassWriter`] and go through the normal
//! parse/link path, so they behave exactly like classes read from disk.
//! Methods that need the host (hashing, string building, console output)
//! are declared `native` and bound by the interpreter's native registry.

use classfile::{ClassAccess, ClassWriter, FieldAccess, MethodAccess, Opcode};
use core_types::{BasicType, JvmResult};
use tracing::debug;

use crate::names;
use crate::resolver::ClasspathResolver;

const PUBLIC: MethodAccess = MethodAccess::PUBLIC;
const PUBLIC_STATIC: MethodAccess = MethodAccess::PUBLIC.union(MethodAccess::STATIC);
const PUBLIC_INTERFACE: ClassAccess = ClassAccess::PUBLIC.union(ClassAccess::INTERFACE);

const STRING_DESC: &str = "Ljava/lang/String;";
const THROWABLE_DESC: &str = "Ljava/lang/Throwable;";

/// Throwable classes the VM raises or wraps, with their superclass.
const THROWABLES: &[(&str, &str)] = &[
    (names::EXCEPTION, names::THROWABLE),
    (names::ERROR, names::THROWABLE),
    (names::RUNTIME_EXCEPTION, names::EXCEPTION),
    ("java/lang/InterruptedException", names::EXCEPTION),
    (names::CLONE_NOT_SUPPORTED_EXCEPTION, names::EXCEPTION),
    (names::NULL_POINTER_EXCEPTION, names::RUNTIME_EXCEPTION),
    (names::ARITHMETIC_EXCEPTION, names::RUNTIME_EXCEPTION),
    ("java/lang/IndexOutOfBoundsException", names::RUNTIME_EXCEPTION),
    (
        names::ARRAY_INDEX_OUT_OF_BOUNDS_EXCEPTION,
        "java/lang/IndexOutOfBoundsException",
    ),
    (names::NEGATIVE_ARRAY_SIZE_EXCEPTION, names::RUNTIME_EXCEPTION),
    (names::CLASS_CAST_EXCEPTION, names::RUNTIME_EXCEPTION),
    (names::ARRAY_STORE_EXCEPTION, names::RUNTIME_EXCEPTION),
    (names::ILLEGAL_ARGUMENT_EXCEPTION, names::RUNTIME_EXCEPTION),
    ("java/lang/IllegalStateException", names::RUNTIME_EXCEPTION),
    (names::ILLEGAL_MONITOR_STATE_EXCEPTION, names::RUNTIME_EXCEPTION),
    (names::UNSUPPORTED_OPERATION_EXCEPTION, names::RUNTIME_EXCEPTION),
    ("java/lang/LinkageError", names::ERROR),
    (names::NO_CLASS_DEF_FOUND_ERROR, "java/lang/LinkageError"),
    ("java/lang/ClassFormatError", "java/lang/LinkageError"),
    ("java/lang/ClassCircularityError", "java/lang/LinkageError"),
    ("java/lang/UnsatisfiedLinkError", "java/lang/LinkageError"),
    (names::EXCEPTION_IN_INITIALIZER_ERROR, "java/lang/LinkageError"),
    ("java/lang/IncompatibleClassChangeError", "java/lang/LinkageError"),
    ("java/lang/NoSuchMethodError", "java/lang/IncompatibleClassChangeError"),
    ("java/lang/NoSuchFieldError", "java/lang/IncompatibleClassChangeError"),
    ("java/lang/AbstractMethodError", "java/lang/IncompatibleClassChangeError"),
    ("java/lang/VirtualMachineError", names::ERROR),
    (names::OUT_OF_MEMORY_ERROR, "java/lang/VirtualMachineError"),
    (names::STACK_OVERFLOW_ERROR, "java/lang/VirtualMachineError"),
];

/// Primitive overloads of `print`/`println`/`valueOf`/`append`.
const PRIMITIVE_OVERLOADS: &[(&str, BasicType)] = &[
    ("I", BasicType::Int),
    ("J", BasicType::Long),
    ("C", BasicType::Char),
    ("Z", BasicType::Boolean),
    ("F", BasicType::Float),
    ("D", BasicType::Double),
];

/// Returns true if `name` can be synthesized.
pub fn is_bootstrap_class(name: &str) -> bool {
    matches!(
        name,
        names::OBJECT
            | names::STRING
            | names::STRING_BUILDER
            | names::SYSTEM
            | names::PRINT_STREAM
            | names::CLONEABLE
            | names::SERIALIZABLE
            | names::THROWABLE
    ) || THROWABLES.iter().any(|(n, _)| *n == name)
}

/// Assembles the bytes of bootstrap class `name`, if it is one.
pub fn synthesize(name: &str) -> JvmResult<Option<Vec<u8>>> {
    let writer = match name {
        names::OBJECT => object()?,
        names::STRING => string()?,
        names::STRING_BUILDER => string_builder()?,
        names::SYSTEM => system()?,
        names::PRINT_STREAM => print_stream()?,
        names::CLONEABLE | names::SERIALIZABLE => {
            ClassWriter::new(name, Some(names::OBJECT), PUBLIC_INTERFACE)
        }
        names::THROWABLE => throwable()?,
        _ => match THROWABLES.iter().find(|(n, _)| *n == name) {
            Some((name, super_name)) => throwable_subclass(name, super_name)?,
            None => return Ok(None),
        },
    };
    debug!(class = name, "synthesized bootstrap class");
    Ok(Some(writer.to_bytes()))
}

fn object() -> JvmResult<ClassWriter> {
    let mut w = ClassWriter::new(names::OBJECT, None, ClassAccess::PUBLIC);
    w.source_file("Object.java");
    w.add_method(PUBLIC, names::CONSTRUCTOR, "()V", |c| {
        c.op(Opcode::Return);
    })?;
    w.add_method(PUBLIC, "equals", "(Ljava/lang/Object;)Z", |c| {
        let different = c.new_label();
        c.aload(0).aload(1).branch(Opcode::IfAcmpne, different);
        c.iconst(1).op(Opcode::Ireturn);
        c.bind(different).iconst(0).op(Opcode::Ireturn);
    })?;
    w.add_native_method(PUBLIC, "hashCode", "()I");
    w.add_native_method(PUBLIC, "toString", "()Ljava/lang/String;");
    w.add_native_method(MethodAccess::PROTECTED, "clone", "()Ljava/lang/Object;");
    Ok(w)
}

fn string() -> JvmResult<ClassWriter> {
    let mut w = ClassWriter::new(
        names::STRING,
        Some(names::OBJECT),
        ClassAccess::PUBLIC | ClassAccess::FINAL | ClassAccess::SUPER,
    );
    w.source_file("String.java");
    w.add_interface(names::SERIALIZABLE);
    w.add_field(FieldAccess::PRIVATE | FieldAccess::FINAL, "value", "[C");
    w.add_method(PUBLIC, names::CONSTRUCTOR, "()V", |c| {
        c.aload(0)
            .invokespecial(names::OBJECT, names::CONSTRUCTOR, "()V")
            .aload(0)
            .iconst(0)
            .newarray(BasicType::Char)
            .putfield(names::STRING, "value", "[C")
            .op(Opcode::Return);
    })?;
    w.add_native_method(PUBLIC, names::CONSTRUCTOR, "([C)V");
    w.add_method(PUBLIC, "length", "()I", |c| {
        c.aload(0)
            .getfield(names::STRING, "value", "[C")
            .op(Opcode::Arraylength)
            .op(Opcode::Ireturn);
    })?;
    w.add_method(PUBLIC, "isEmpty", "()Z", |c| {
        let non_empty = c.new_label();
        c.aload(0)
            .invokevirtual(names::STRING, "length", "()I")
            .branch(Opcode::Ifne, non_empty)
            .iconst(1)
            .op(Opcode::Ireturn);
        c.bind(non_empty).iconst(0).op(Opcode::Ireturn);
    })?;
    w.add_method(PUBLIC, "charAt", "(I)C", |c| {
        c.aload(0)
            .getfield(names::STRING, "value", "[C")
            .iload(1)
            .op(Opcode::Caload)
            .op(Opcode::Ireturn);
    })?;
    w.add_method(PUBLIC, "toString", "()Ljava/lang/String;", |c| {
        c.aload(0).op(Opcode::Areturn);
    })?;
    w.add_native_method(PUBLIC, "equals", "(Ljava/lang/Object;)Z");
    w.add_native_method(PUBLIC, "hashCode", "()I");
    w.add_native_method(PUBLIC, "intern", "()Ljava/lang/String;");
    w.add_native_method(PUBLIC, "concat", "(Ljava/lang/String;)Ljava/lang/String;");
    for (code, _) in PRIMITIVE_OVERLOADS {
        w.add_native_method(PUBLIC_STATIC, "valueOf", &format!("({})Ljava/lang/String;", code));
    }
    w.add_native_method(
        PUBLIC_STATIC,
        "valueOf",
        "(Ljava/lang/Object;)Ljava/lang/String;",
    );
    Ok(w)
}

fn string_builder() -> JvmResult<ClassWriter> {
    const SB: &str = names::STRING_BUILDER;
    let mut w = ClassWriter::new(
        SB,
        Some(names::OBJECT),
        ClassAccess::PUBLIC | ClassAccess::FINAL | ClassAccess::SUPER,
    );
    w.source_file("StringBuilder.java");
    w.add_field(FieldAccess::PRIVATE, "value", STRING_DESC);
    w.add_method(PUBLIC, names::CONSTRUCTOR, "()V", |c| {
        c.aload(0)
            .invokespecial(names::OBJECT, names::CONSTRUCTOR, "()V")
            .aload(0)
            .ldc_string("")
            .putfield(SB, "value", STRING_DESC)
            .op(Opcode::Return);
    })?;
    w.add_method(PUBLIC, names::CONSTRUCTOR, "(Ljava/lang/String;)V", |c| {
        c.aload(0)
            .invokespecial(names::OBJECT, names::CONSTRUCTOR, "()V")
            .aload(0)
            .aload(1)
            .invokestatic(names::STRING, "valueOf", "(Ljava/lang/Object;)Ljava/lang/String;")
            .putfield(SB, "value", STRING_DESC)
            .op(Opcode::Return);
    })?;

    let overloads = PRIMITIVE_OVERLOADS
        .iter()
        .map(|(code, ty)| (code.to_string(), *ty))
        .chain([
            (STRING_DESC.to_string(), BasicType::Reference),
            ("Ljava/lang/Object;".to_string(), BasicType::Reference),
        ]);
    for (code, ty) in overloads {
        let value_of_arg = if ty == BasicType::Reference {
            "Ljava/lang/Object;"
        } else {
            code.as_str()
        };
        let value_of = format!("({})Ljava/lang/String;", value_of_arg);
        w.add_method(
            PUBLIC,
            "append",
            &format!("({})Ljava/lang/StringBuilder;", code),
            |c| {
                c.aload(0).aload(0).getfield(SB, "value", STRING_DESC);
                load_argument(c, ty, 1);
                c.invokestatic(names::STRING, "valueOf", &value_of)
                    .invokevirtual(names::STRING, "concat", "(Ljava/lang/String;)Ljava/lang/String;")
                    .putfield(SB, "value", STRING_DESC)
                    .aload(0)
                    .op(Opcode::Areturn);
            },
        )?;
    }
    w.add_method(PUBLIC, "length", "()I", |c| {
        c.aload(0)
            .getfield(SB, "value", STRING_DESC)
            .invokevirtual(names::STRING, "length", "()I")
            .op(Opcode::Ireturn);
    })?;
    w.add_method(PUBLIC, "toString", "()Ljava/lang/String;", |c| {
        c.aload(0)
            .getfield(SB, "value", STRING_DESC)
            .op(Opcode::Areturn);
    })?;
    Ok(w)
}

fn load_argument(c: &mut classfile::CodeBuilder<'_>, ty: BasicType, slot: u16) {
    match ty {
        BasicType::Long => c.lload(slot),
        BasicType::Float => c.fload(slot),
        BasicType::Double => c.dload(slot),
        BasicType::Reference => c.aload(slot),
        _ => c.iload(slot),
    };
}

fn system() -> JvmResult<ClassWriter> {
    const PS: &str = "Ljava/io/PrintStream;";
    let mut w = ClassWriter::new(
        names::SYSTEM,
        Some(names::OBJECT),
        ClassAccess::PUBLIC | ClassAccess::FINAL | ClassAccess::SUPER,
    );
    w.source_file("System.java");
    let stream = FieldAccess::PUBLIC | FieldAccess::STATIC | FieldAccess::FINAL;
    w.add_field(stream, "out", PS);
    w.add_field(stream, "err", PS);
    w.add_method(MethodAccess::STATIC, names::CLASS_INITIALIZER, "()V", |c| {
        for (fd, field) in [(1, "out"), (2, "err")] {
            c.new_object(names::PRINT_STREAM)
                .op(Opcode::Dup)
                .iconst(fd)
                .invokespecial(names::PRINT_STREAM, names::CONSTRUCTOR, "(I)V")
                .putstatic(names::SYSTEM, field, PS);
        }
        c.op(Opcode::Return);
    })?;
    w.add_native_method(
        PUBLIC_STATIC,
        "arraycopy",
        "(Ljava/lang/Object;ILjava/lang/Object;II)V",
    );
    w.add_native_method(PUBLIC_STATIC, "identityHashCode", "(Ljava/lang/Object;)I");
    w.add_native_method(PUBLIC_STATIC, "currentTimeMillis", "()J");
    w.add_native_method(PUBLIC_STATIC, "nanoTime", "()J");
    w.add_native_method(PUBLIC_STATIC, "gc", "()V");
    Ok(w)
}

fn print_stream() -> JvmResult<ClassWriter> {
    let mut w = ClassWriter::new(
        names::PRINT_STREAM,
        Some(names::OBJECT),
        ClassAccess::PUBLIC | ClassAccess::SUPER,
    );
    w.source_file("PrintStream.java");
    w.add_field(FieldAccess::PRIVATE | FieldAccess::FINAL, "fd", "I");
    w.add_method(PUBLIC, names::CONSTRUCTOR, "(I)V", |c| {
        c.aload(0)
            .invokespecial(names::OBJECT, names::CONSTRUCTOR, "()V")
            .aload(0)
            .iload(1)
            .putfield(names::PRINT_STREAM, "fd", "I")
            .op(Opcode::Return);
    })?;
    w.add_native_method(PUBLIC, "println", "()V");
    let arguments = PRIMITIVE_OVERLOADS
        .iter()
        .map(|(code, _)| *code)
        .chain([STRING_DESC, "Ljava/lang/Object;"]);
    for code in arguments {
        w.add_native_method(PUBLIC, "print", &format!("({})V", code));
        w.add_native_method(PUBLIC, "println", &format!("({})V", code));
    }
    w.add_native_method(PUBLIC, "flush", "()V");
    Ok(w)
}

fn throwable() -> JvmResult<ClassWriter> {
    const T: &str = names::THROWABLE;
    let mut w = ClassWriter::new(T, Some(names::OBJECT), ClassAccess::PUBLIC | ClassAccess::SUPER);
    w.source_file("Throwable.java");
    w.add_interface(names::SERIALIZABLE);
    w.add_field(FieldAccess::PRIVATE, "detailMessage", STRING_DESC);
    w.add_field(FieldAccess::PRIVATE, "cause", THROWABLE_DESC);

    w.add_method(PUBLIC, names::CONSTRUCTOR, "()V", |c| {
        c.aload(0)
            .invokespecial(names::OBJECT, names::CONSTRUCTOR, "()V")
            .op(Opcode::Return);
    })?;
    w.add_method(PUBLIC, names::CONSTRUCTOR, "(Ljava/lang/String;)V", |c| {
        c.aload(0)
            .invokespecial(names::OBJECT, names::CONSTRUCTOR, "()V")
            .aload(0)
            .aload(1)
            .putfield(T, "detailMessage", STRING_DESC)
            .op(Opcode::Return);
    })?;
    w.add_method(
        PUBLIC,
        names::CONSTRUCTOR,
        "(Ljava/lang/String;Ljava/lang/Throwable;)V",
        |c| {
            c.aload(0)
                .invokespecial(names::OBJECT, names::CONSTRUCTOR, "()V")
                .aload(0)
                .aload(1)
                .putfield(T, "detailMessage", STRING_DESC)
                .aload(0)
                .aload(2)
                .putfield(T, "cause", THROWABLE_DESC)
                .op(Opcode::Return);
        },
    )?;
    w.add_method(PUBLIC, names::CONSTRUCTOR, "(Ljava/lang/Throwable;)V", |c| {
        let done = c.new_label();
        c.aload(0)
            .invokespecial(names::OBJECT, names::CONSTRUCTOR, "()V")
            .aload(0)
            .aload(1)
            .putfield(T, "cause", THROWABLE_DESC)
            .aload(1)
            .branch(Opcode::Ifnull, done)
            .aload(0)
            .aload(1)
            .invokevirtual(T, "toString", "()Ljava/lang/String;")
            .putfield(T, "detailMessage", STRING_DESC);
        c.bind(done).op(Opcode::Return);
    })?;
    w.add_method(PUBLIC, "getMessage", "()Ljava/lang/String;", |c| {
        c.aload(0)
            .getfield(T, "detailMessage", STRING_DESC)
            .op(Opcode::Areturn);
    })?;
    w.add_method(PUBLIC, "getLocalizedMessage", "()Ljava/lang/String;", |c| {
        c.aload(0)
            .invokevirtual(T, "getMessage", "()Ljava/lang/String;")
            .op(Opcode::Areturn);
    })?;
    w.add_method(PUBLIC, "getCause", "()Ljava/lang/Throwable;", |c| {
        c.aload(0)
            .getfield(T, "cause", THROWABLE_DESC)
            .op(Opcode::Areturn);
    })?;
    w.add_method(
        PUBLIC,
        "initCause",
        "(Ljava/lang/Throwable;)Ljava/lang/Throwable;",
        |c| {
            c.aload(0)
                .aload(1)
                .putfield(T, "cause", THROWABLE_DESC)
                .aload(0)
                .op(Opcode::Areturn);
        },
    )?;
    w.add_native_method(PUBLIC, "toString", "()Ljava/lang/String;");
    w.add_native_method(PUBLIC, "printStackTrace", "()V");
    Ok(w)
}

/// A throwable subclass with the four standard constructors.
fn throwable_subclass(name: &str, super_name: &str) -> JvmResult<ClassWriter> {
    let mut w = ClassWriter::new(name, Some(super_name), ClassAccess::PUBLIC | ClassAccess::SUPER);
    let constructors: [(&str, &[BasicType]); 4] = [
        ("()V", &[]),
        ("(Ljava/lang/String;)V", &[BasicType::Reference]),
        (
            "(Ljava/lang/String;Ljava/lang/Throwable;)V",
            &[BasicType::Reference, BasicType::Reference],
        ),
        ("(Ljava/lang/Throwable;)V", &[BasicType::Reference]),
    ];
    for (descriptor, args) in constructors {
        w.add_method(PUBLIC, names::CONSTRUCTOR, descriptor, |c| {
            c.aload(0);
            for slot in 1..=args.len() as u16 {
                c.aload(slot);
            }
            c.invokespecial(super_name, names::CONSTRUCTOR, descriptor)
                .op(Opcode::Return);
        })?;
    }
    Ok(w)
}

/// Wraps a resolver and supplies bootstrap classes it does not have.
#[derive(Debug)]
pub struct BootstrapResolver<R> {
    inner: R,
}

impl<R: ClasspathResolver> BootstrapResolver<R> {
    /// Wraps `inner`.
    pub fn new(inner: R) -> Self {
        BootstrapResolver { inner }
    }

    /// The wrapped resolver.
    pub fn inner(&self) -> &R {
        &self.inner
    }
}

impl<R: ClasspathResolver> ClasspathResolver for BootstrapResolver<R> {
    fn find_class(&self, name: &str) -> JvmResult<Option<Vec<u8>>> {
        match self.inner.find_class(name)? {
            Some(bytes) => Ok(Some(bytes)),
            None => synthesize(name),
        }
    }
}
