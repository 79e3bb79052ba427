//! Integration tests: small programs assembled with `ClassWriter` and run
//! end to end through `JavaVm`

#[path = "../common/mod.rs"]
mod common;

use classfile::{ConstantValue, FieldAccess, MethodAccess, Opcode};
use core_types::{BasicType, ErrorKind, Value};
use interpreter::{StatusCode, ThreadOutcome};

use common::{class, default_constructor, Program, MAIN, PUBLIC, PUBLIC_STATIC};

const PRINT_STREAM: &str = "java/io/PrintStream";
const OUT: (&str, &str, &str) = ("java/lang/System", "out", "Ljava/io/PrintStream;");

/// A class with one static method `run` of descriptor `descriptor`.
fn single_method(
    name: &str,
    descriptor: &str,
    build: impl FnOnce(&mut classfile::CodeBuilder<'_>),
) -> classfile::ClassWriter {
    let mut writer = class(name);
    writer.add_method(PUBLIC_STATIC, "run", descriptor, build).unwrap();
    writer
}

// ============================================================================
// Console output
// ============================================================================

#[test]
fn test_hello_world() {
    let hello = {
        let mut w = class("demo/Hello");
        w.add_method(PUBLIC_STATIC, "main", MAIN, |c| {
            c.getstatic(OUT.0, OUT.1, OUT.2)
                .ldc_string("Hello, World!")
                .invokevirtual(PRINT_STREAM, "println", "(Ljava/lang/String;)V")
                .op(Opcode::Return);
        })
        .unwrap();
        w
    };
    let run = Program::new().with("demo/Hello", &hello).run_main("demo.Hello");
    assert_eq!(run.outcome, ThreadOutcome::Completed { result: None });
    assert_eq!(run.stdout, "Hello, World!\n");
    assert_eq!(run.stderr, "");
}

#[test]
fn test_println_primitive_overloads() {
    let w = single_method("demo/Print", "()V", |c| {
        c.getstatic(OUT.0, OUT.1, OUT.2)
            .iconst(-42)
            .invokevirtual(PRINT_STREAM, "println", "(I)V");
        c.getstatic(OUT.0, OUT.1, OUT.2)
            .lconst(1_234_567_890_123)
            .invokevirtual(PRINT_STREAM, "println", "(J)V");
        c.getstatic(OUT.0, OUT.1, OUT.2)
            .dconst(2.5)
            .invokevirtual(PRINT_STREAM, "println", "(D)V");
        c.getstatic(OUT.0, OUT.1, OUT.2)
            .iconst(65)
            .invokevirtual(PRINT_STREAM, "println", "(C)V");
        c.getstatic(OUT.0, OUT.1, OUT.2)
            .iconst(1)
            .invokevirtual(PRINT_STREAM, "println", "(Z)V");
        c.getstatic(OUT.0, OUT.1, OUT.2)
            .ldc_string("no newline")
            .invokevirtual(PRINT_STREAM, "print", "(Ljava/lang/String;)V");
        c.op(Opcode::Return);
    });
    let run = Program::new().with("demo/Print", &w).invoke("demo.Print", "run", "()V", vec![]);
    assert!(run.outcome.is_completed(), "{:?}", run.outcome);
    assert_eq!(run.stdout, "-42\n1234567890123\n2.5\nA\ntrue\nno newline");
}

#[test]
fn test_system_err_goes_to_error_sink() {
    let w = single_method("demo/Err", "()V", |c| {
        c.getstatic("java/lang/System", "err", "Ljava/io/PrintStream;")
            .ldc_string("warning")
            .invokevirtual(PRINT_STREAM, "println", "(Ljava/lang/String;)V")
            .op(Opcode::Return);
    });
    let run = Program::new().with("demo/Err", &w).invoke("demo.Err", "run", "()V", vec![]);
    assert_eq!(run.stdout, "");
    assert_eq!(run.stderr, "warning\n");
}

// ============================================================================
// Arithmetic and control flow
// ============================================================================

#[test]
fn test_int_arithmetic() {
    // 7 * 6 - 10 / 3 + 17 % 5
    let w = single_method("demo/Arith", "()I", |c| {
        c.iconst(7)
            .iconst(6)
            .op(Opcode::Imul)
            .iconst(10)
            .iconst(3)
            .op(Opcode::Idiv)
            .op(Opcode::Isub)
            .iconst(17)
            .iconst(5)
            .op(Opcode::Irem)
            .op(Opcode::Iadd)
            .op(Opcode::Ireturn);
    });
    let run = Program::new().with("demo/Arith", &w).invoke("demo.Arith", "run", "()I", vec![]);
    assert_eq!(run.int(), 41);
}

#[test]
fn test_counting_loop() {
    // int sum = 0; for (int i = 1; i <= 100; i++) sum += i;
    let w = single_method("demo/Loop", "()I", |c| {
        let top = c.new_label();
        let done = c.new_label();
        c.iconst(0).istore(0).iconst(1).istore(1);
        c.bind(top)
            .iload(1)
            .iconst(100)
            .branch(Opcode::IfIcmpgt, done)
            .iload(0)
            .iload(1)
            .op(Opcode::Iadd)
            .istore(0)
            .iinc(1, 1)
            .goto(top);
        c.bind(done).iload(0).op(Opcode::Ireturn);
    });
    let run = Program::new().with("demo/Loop", &w).invoke("demo.Loop", "run", "()I", vec![]);
    assert_eq!(run.int(), 5050);
}

#[test]
fn test_long_factorial() {
    let w = single_method("demo/Fact", "()J", |c| {
        let top = c.new_label();
        let done = c.new_label();
        c.lconst(1).lstore(0).iconst(1).istore(2);
        c.bind(top)
            .iload(2)
            .iconst(20)
            .branch(Opcode::IfIcmpgt, done)
            .lload(0)
            .iload(2)
            .op(Opcode::I2l)
            .op(Opcode::Lmul)
            .lstore(0)
            .iinc(2, 1)
            .goto(top);
        c.bind(done).lload(0).op(Opcode::Lreturn);
    });
    let run = Program::new().with("demo/Fact", &w).invoke("demo.Fact", "run", "()J", vec![]);
    assert_eq!(run.long(), 2_432_902_008_176_640_000);
}

#[test]
fn test_double_argument_and_result() {
    let w = single_method("demo/Scale", "(D)D", |c| {
        c.dload(0).dconst(4.0).op(Opcode::Dmul).op(Opcode::Dreturn);
    });
    let run = Program::new()
        .with("demo/Scale", &w)
        .invoke("demo.Scale", "run", "(D)D", vec![Value::Double(1.5)]);
    assert_eq!(run.double(), 6.0);
}

#[test]
fn test_int_overflow_wraps() {
    let mut w = class("demo/Wrap");
    w.add_method(PUBLIC_STATIC, "overflow", "()I", |c| {
        c.iconst(i32::MAX).iconst(1).op(Opcode::Iadd).op(Opcode::Ireturn);
    })
    .unwrap();
    w.add_method(PUBLIC_STATIC, "minOverMinusOne", "()I", |c| {
        c.iconst(i32::MIN).iconst(-1).op(Opcode::Idiv).op(Opcode::Ireturn);
    })
    .unwrap();
    w.add_method(PUBLIC_STATIC, "negativeRemainder", "()I", |c| {
        c.iconst(-7).iconst(3).op(Opcode::Irem).op(Opcode::Ireturn);
    })
    .unwrap();

    let (vm, _, _) = Program::new().with("demo/Wrap", &w).vm();
    let call = |name: &str| vm.invoke_static("demo.Wrap", name, "()I", vec![]).result();
    assert_eq!(call("overflow"), Some(Value::Int(i32::MIN)));
    assert_eq!(call("minOverMinusOne"), Some(Value::Int(i32::MIN)));
    assert_eq!(call("negativeRemainder"), Some(Value::Int(-1)));
}

#[test]
fn test_shifts_mask_their_distance() {
    let mut w = class("demo/Shift");
    w.add_method(PUBLIC_STATIC, "ushr", "()I", |c| {
        c.iconst(-16).iconst(28).op(Opcode::Iushr).op(Opcode::Ireturn);
    })
    .unwrap();
    w.add_method(PUBLIC_STATIC, "shr", "()I", |c| {
        c.iconst(-16).iconst(2).op(Opcode::Ishr).op(Opcode::Ireturn);
    })
    .unwrap();
    w.add_method(PUBLIC_STATIC, "shl", "()I", |c| {
        c.iconst(1).iconst(33).op(Opcode::Ishl).op(Opcode::Ireturn);
    })
    .unwrap();
    w.add_method(PUBLIC_STATIC, "lshl", "()J", |c| {
        c.lconst(1).iconst(65).op(Opcode::Lshl).op(Opcode::Lreturn);
    })
    .unwrap();

    let (vm, _, _) = Program::new().with("demo/Shift", &w).vm();
    assert_eq!(vm.invoke_static("demo.Shift", "ushr", "()I", vec![]).result(), Some(Value::Int(15)));
    assert_eq!(vm.invoke_static("demo.Shift", "shr", "()I", vec![]).result(), Some(Value::Int(-4)));
    assert_eq!(vm.invoke_static("demo.Shift", "shl", "()I", vec![]).result(), Some(Value::Int(2)));
    assert_eq!(vm.invoke_static("demo.Shift", "lshl", "()J", vec![]).result(), Some(Value::Long(2)));
}

#[test]
fn test_conversions() {
    let mut w = class("demo/Convert");
    w.add_method(PUBLIC_STATIC, "truncate", "()I", |c| {
        c.dconst(3.99).op(Opcode::D2i).op(Opcode::Ireturn);
    })
    .unwrap();
    w.add_method(PUBLIC_STATIC, "nanToInt", "()I", |c| {
        c.dconst(0.0)
            .dconst(0.0)
            .op(Opcode::Ddiv)
            .op(Opcode::D2i)
            .op(Opcode::Ireturn);
    })
    .unwrap();
    w.add_method(PUBLIC_STATIC, "toByte", "()I", |c| {
        c.iconst(200).op(Opcode::I2b).op(Opcode::Ireturn);
    })
    .unwrap();
    w.add_method(PUBLIC_STATIC, "toChar", "()I", |c| {
        c.iconst(-1).op(Opcode::I2c).op(Opcode::Ireturn);
    })
    .unwrap();
    w.add_method(PUBLIC_STATIC, "saturate", "()J", |c| {
        c.dconst(1e20).op(Opcode::D2l).op(Opcode::Lreturn);
    })
    .unwrap();
    w.add_method(PUBLIC_STATIC, "lowWord", "()I", |c| {
        c.lconst(0x1_0000_0005).op(Opcode::L2i).op(Opcode::Ireturn);
    })
    .unwrap();

    let (vm, _, _) = Program::new().with("demo/Convert", &w).vm();
    let int = |name: &str| vm.invoke_static("demo.Convert", name, "()I", vec![]).result();
    assert_eq!(int("truncate"), Some(Value::Int(3)));
    assert_eq!(int("nanToInt"), Some(Value::Int(0)));
    assert_eq!(int("toByte"), Some(Value::Int(-56)));
    assert_eq!(int("toChar"), Some(Value::Int(65535)));
    assert_eq!(int("lowWord"), Some(Value::Int(5)));
    assert_eq!(
        vm.invoke_static("demo.Convert", "saturate", "()J", vec![]).result(),
        Some(Value::Long(i64::MAX))
    );
}

#[test]
fn test_floating_comparison_with_nan() {
    // dcmpl yields -1 on NaN, dcmpg yields 1
    let w = single_method("demo/Nan", "()I", |c| {
        c.dconst(0.0).dconst(0.0).op(Opcode::Ddiv).dstore(0);
        c.dload(0).dconst(1.0).op(Opcode::Dcmpl).iconst(10).op(Opcode::Imul);
        c.dload(0).dconst(1.0).op(Opcode::Dcmpg);
        c.op(Opcode::Iadd).op(Opcode::Ireturn);
    });
    let run = Program::new().with("demo/Nan", &w).invoke("demo.Nan", "run", "()I", vec![]);
    assert_eq!(run.int(), -9);
}

#[test]
fn test_long_compare() {
    let w = single_method("demo/Cmp", "()I", |c| {
        c.lconst(5).lconst(3).op(Opcode::Lcmp).op(Opcode::Ireturn);
    });
    let run = Program::new().with("demo/Cmp", &w).invoke("demo.Cmp", "run", "()I", vec![]);
    assert_eq!(run.int(), 1);
}

#[test]
fn test_tableswitch() {
    let w = single_method("demo/Table", "(I)I", |c| {
        let cases = [c.new_label(), c.new_label(), c.new_label()];
        let default = c.new_label();
        c.iload(0).tableswitch(0, default, &cases);
        for (label, result) in cases.iter().zip([10, 20, 30]) {
            c.bind(*label).iconst(result).op(Opcode::Ireturn);
        }
        c.bind(default).iconst(-1).op(Opcode::Ireturn);
    });
    let (vm, _, _) = Program::new().with("demo/Table", &w).vm();
    for (input, expected) in [(0, 10), (1, 20), (2, 30), (3, -1), (-1, -1)] {
        let outcome = vm.invoke_static("demo.Table", "run", "(I)I", vec![Value::Int(input)]);
        assert_eq!(outcome.result(), Some(Value::Int(expected)), "input {}", input);
    }
}

#[test]
fn test_lookupswitch() {
    let w = single_method("demo/Lookup", "(I)I", |c| {
        let a = c.new_label();
        let b = c.new_label();
        let d = c.new_label();
        let default = c.new_label();
        c.iload(0).lookupswitch(default, &[(100, b), (-5, a), (7, d)]);
        c.bind(a).iconst(1).op(Opcode::Ireturn);
        c.bind(b).iconst(2).op(Opcode::Ireturn);
        c.bind(d).iconst(3).op(Opcode::Ireturn);
        c.bind(default).iconst(0).op(Opcode::Ireturn);
    });
    let (vm, _, _) = Program::new().with("demo/Lookup", &w).vm();
    for (input, expected) in [(-5, 1), (100, 2), (7, 3), (8, 0)] {
        let outcome = vm.invoke_static("demo.Lookup", "run", "(I)I", vec![Value::Int(input)]);
        assert_eq!(outcome.result(), Some(Value::Int(expected)), "input {}", input);
    }
}

// ============================================================================
// Objects, fields and static initialization
// ============================================================================

#[test]
fn test_instance_fields() {
    let mut counter = class("demo/Counter");
    counter.add_field(FieldAccess::PRIVATE, "count", "I");
    default_constructor(&mut counter, common::OBJECT);
    counter
        .add_method(PUBLIC, "increment", "()V", |c| {
            c.aload(0)
                .op(Opcode::Dup)
                .getfield("demo/Counter", "count", "I")
                .iconst(1)
                .op(Opcode::Iadd)
                .putfield("demo/Counter", "count", "I")
                .op(Opcode::Return);
        })
        .unwrap();
    counter
        .add_method(PUBLIC, "get", "()I", |c| {
            c.aload(0).getfield("demo/Counter", "count", "I").op(Opcode::Ireturn);
        })
        .unwrap();

    let main = single_method("demo/UseCounter", "()I", |c| {
        c.new_object("demo/Counter")
            .op(Opcode::Dup)
            .invokespecial("demo/Counter", "<init>", "()V")
            .astore(0);
        for _ in 0..3 {
            c.aload(0).invokevirtual("demo/Counter", "increment", "()V");
        }
        c.aload(0).invokevirtual("demo/Counter", "get", "()I").op(Opcode::Ireturn);
    });

    let run = Program::new()
        .with("demo/Counter", &counter)
        .with("demo/UseCounter", &main)
        .invoke("demo.UseCounter", "run", "()I", vec![]);
    assert_eq!(run.int(), 3);
}

#[test]
fn test_wide_fields_keep_their_values() {
    let mut holder = class("demo/Wide");
    holder.add_field(FieldAccess::PUBLIC, "big", "J");
    holder.add_field(FieldAccess::PUBLIC, "ratio", "D");
    default_constructor(&mut holder, common::OBJECT);
    holder
        .add_method(PUBLIC_STATIC, "run", "()D", |c| {
            c.new_object("demo/Wide")
                .op(Opcode::Dup)
                .invokespecial("demo/Wide", "<init>", "()V")
                .astore(0);
            c.aload(0).lconst(1 << 40).putfield("demo/Wide", "big", "J");
            c.aload(0).dconst(0.25).putfield("demo/Wide", "ratio", "D");
            c.aload(0)
                .getfield("demo/Wide", "big", "J")
                .op(Opcode::L2d)
                .aload(0)
                .getfield("demo/Wide", "ratio", "D")
                .op(Opcode::Dmul)
                .op(Opcode::Dreturn);
        })
        .unwrap();
    let run = Program::new().with("demo/Wide", &holder).invoke("demo.Wide", "run", "()D", vec![]);
    assert_eq!(run.double(), (1u64 << 38) as f64);
}

#[test]
fn test_static_initializer_and_constant_value() {
    let mut config = class("demo/Config");
    config.add_field(FieldAccess::PUBLIC | FieldAccess::STATIC, "VALUE", "I");
    config.add_constant_field(
        FieldAccess::PUBLIC | FieldAccess::FINAL,
        "ANSWER",
        "I",
        ConstantValue::Int(42),
    );
    config
        .add_method(MethodAccess::STATIC, "<clinit>", "()V", |c| {
            c.iconst(7).putstatic("demo/Config", "VALUE", "I").op(Opcode::Return);
        })
        .unwrap();
    let main = single_method("demo/ReadConfig", "()I", |c| {
        c.getstatic("demo/Config", "VALUE", "I")
            .getstatic("demo/Config", "ANSWER", "I")
            .op(Opcode::Iadd)
            .op(Opcode::Ireturn);
    });
    let run = Program::new()
        .with("demo/Config", &config)
        .with("demo/ReadConfig", &main)
        .invoke("demo.ReadConfig", "run", "()I", vec![]);
    assert_eq!(run.int(), 49);
}

#[test]
fn test_superclass_initialized_first() {
    // Child.<clinit> reads the value Parent.<clinit> stored
    let mut parent = class("demo/Parent");
    parent.add_field(FieldAccess::PUBLIC | FieldAccess::STATIC, "BASE", "I");
    parent
        .add_method(MethodAccess::STATIC, "<clinit>", "()V", |c| {
            c.iconst(100).putstatic("demo/Parent", "BASE", "I").op(Opcode::Return);
        })
        .unwrap();
    let mut child = common::class_extending("demo/Child", "demo/Parent");
    child.add_field(FieldAccess::PUBLIC | FieldAccess::STATIC, "DERIVED", "I");
    child
        .add_method(MethodAccess::STATIC, "<clinit>", "()V", |c| {
            c.getstatic("demo/Parent", "BASE", "I")
                .iconst(1)
                .op(Opcode::Iadd)
                .putstatic("demo/Child", "DERIVED", "I")
                .op(Opcode::Return);
        })
        .unwrap();
    let main = single_method("demo/ReadChild", "()I", |c| {
        c.getstatic("demo/Child", "DERIVED", "I").op(Opcode::Ireturn);
    });
    let run = Program::new()
        .with("demo/Parent", &parent)
        .with("demo/Child", &child)
        .with("demo/ReadChild", &main)
        .invoke("demo.ReadChild", "run", "()I", vec![]);
    assert_eq!(run.int(), 101);
}

// ============================================================================
// Strings
// ============================================================================

#[test]
fn test_string_concat_and_length() {
    let w = single_method("demo/Concat", "()I", |c| {
        c.ldc_string("abc")
            .ldc_string("def")
            .invokevirtual("java/lang/String", "concat", "(Ljava/lang/String;)Ljava/lang/String;")
            .invokevirtual("java/lang/String", "length", "()I")
            .op(Opcode::Ireturn);
    });
    let run = Program::new().with("demo/Concat", &w).invoke("demo.Concat", "run", "()I", vec![]);
    assert_eq!(run.int(), 6);
}

#[test]
fn test_string_hash_code() {
    let w = single_method("demo/Hash", "()I", |c| {
        c.ldc_string("hello")
            .invokevirtual("java/lang/String", "hashCode", "()I")
            .op(Opcode::Ireturn);
    });
    let run = Program::new().with("demo/Hash", &w).invoke("demo.Hash", "run", "()I", vec![]);
    assert_eq!(run.int(), 99_162_322);
}

#[test]
fn test_literals_are_interned() {
    // "ab" == "ab" by identity; "a".concat("b") only by equals
    let w = single_method("demo/Intern", "()I", |c| {
        let different = c.new_label();
        c.ldc_string("ab").ldc_string("ab").branch(Opcode::IfAcmpne, different);
        c.ldc_string("a")
            .ldc_string("b")
            .invokevirtual("java/lang/String", "concat", "(Ljava/lang/String;)Ljava/lang/String;")
            .astore(0);
        c.aload(0)
            .ldc_string("ab")
            .invokevirtual("java/lang/String", "equals", "(Ljava/lang/Object;)Z")
            .iconst(10)
            .op(Opcode::Imul);
        c.aload(0)
            .invokevirtual("java/lang/String", "intern", "()Ljava/lang/String;")
            .ldc_string("ab");
        let same = c.new_label();
        c.branch(Opcode::IfAcmpeq, same).op(Opcode::Ireturn);
        c.bind(same).iconst(1).op(Opcode::Iadd).op(Opcode::Ireturn);
        c.bind(different).iconst(-1).op(Opcode::Ireturn);
    });
    let run = Program::new().with("demo/Intern", &w).invoke("demo.Intern", "run", "()I", vec![]);
    assert_eq!(run.int(), 11);
}

#[test]
fn test_string_builder() {
    const SB: &str = "java/lang/StringBuilder";
    let w = single_method("demo/Build", "()V", |c| {
        c.new_object(SB)
            .op(Opcode::Dup)
            .invokespecial(SB, "<init>", "()V")
            .ldc_string("x=")
            .invokevirtual(SB, "append", "(Ljava/lang/String;)Ljava/lang/StringBuilder;")
            .iconst(5)
            .invokevirtual(SB, "append", "(I)Ljava/lang/StringBuilder;")
            .ldc_string(", ok=")
            .invokevirtual(SB, "append", "(Ljava/lang/String;)Ljava/lang/StringBuilder;")
            .iconst(0)
            .invokevirtual(SB, "append", "(Z)Ljava/lang/StringBuilder;")
            .invokevirtual(SB, "toString", "()Ljava/lang/String;")
            .astore(0);
        c.getstatic(OUT.0, OUT.1, OUT.2)
            .aload(0)
            .invokevirtual(PRINT_STREAM, "println", "(Ljava/lang/String;)V")
            .op(Opcode::Return);
    });
    let run = Program::new().with("demo/Build", &w).invoke("demo.Build", "run", "()V", vec![]);
    assert_eq!(run.stdout, "x=5, ok=false\n");
}

#[test]
fn test_main_receives_arguments() {
    let w = {
        let mut w = class("demo/Args");
        w.add_method(PUBLIC_STATIC, "main", MAIN, |c| {
            c.getstatic(OUT.0, OUT.1, OUT.2)
                .aload(0)
                .iconst(1)
                .op(Opcode::Aaload)
                .invokevirtual(PRINT_STREAM, "println", "(Ljava/lang/String;)V");
            c.getstatic(OUT.0, OUT.1, OUT.2)
                .aload(0)
                .op(Opcode::Arraylength)
                .invokevirtual(PRINT_STREAM, "println", "(I)V")
                .op(Opcode::Return);
        })
        .unwrap();
        w
    };
    let (vm, stdout, _) = Program::new().with("demo/Args", &w).vm();
    let args = vec!["first".to_string(), "second".to_string()];
    let outcome = vm.start_main_thread("demo/Args", &args);
    assert_eq!(outcome.exit_code(), 0);
    assert_eq!(stdout.contents().unwrap(), "second\n2\n");
}

// ============================================================================
// Memory management
// ============================================================================

/// `static int build(int n)`: keeps a small array per level alive across
/// the recursive call and drops a large one.
fn deep_allocator() -> classfile::ClassWriter {
    let mut w = class("demo/Deep");
    w.add_method(PUBLIC_STATIC, "build", "(I)I", |c| {
        let recurse = c.new_label();
        c.iload(0).branch(Opcode::Ifne, recurse).iconst(0).op(Opcode::Ireturn);
        c.bind(recurse)
            .iconst(16)
            .newarray(BasicType::Int)
            .astore(1)
            .aload(1)
            .iconst(0)
            .iload(0)
            .op(Opcode::Iastore);
        c.iconst(256).newarray(BasicType::Int).op(Opcode::Pop);
        c.iload(0)
            .iconst(1)
            .op(Opcode::Isub)
            .invokestatic("demo/Deep", "build", "(I)I")
            .istore(2);
        c.iload(2)
            .aload(1)
            .iconst(0)
            .op(Opcode::Iaload)
            .op(Opcode::Iadd)
            .op(Opcode::Ireturn);
    })
    .unwrap();
    w
}

#[test]
fn test_collection_during_deep_recursion() {
    let (vm, _, _) = Program::new()
        .with("demo/Deep", &deep_allocator())
        .configure(|c| c.with_heap_size(64 * 1024))
        .vm();
    let outcome = vm.invoke_static("demo.Deep", "build", "(I)I", vec![Value::Int(200)]);
    assert_eq!(outcome.result(), Some(Value::Int(20_100)));
    assert!(vm.heap_stats().collections > 0);
}

#[test]
fn test_system_gc_collects() {
    let w = single_method("demo/Gc", "()V", |c| {
        c.invokestatic("java/lang/System", "gc", "()V").op(Opcode::Return);
    });
    let (vm, _, _) = Program::new().with("demo/Gc", &w).vm();
    let before = vm.heap_stats().collections;
    assert!(vm.invoke_static("demo.Gc", "run", "()V", vec![]).is_completed());
    assert!(vm.heap_stats().collections > before);
}

#[test]
fn test_out_of_memory_fails_the_thread() {
    let w = single_method("demo/Hog", "()V", |c| {
        c.iconst(1_000_000)
            .newarray(BasicType::Long)
            .op(Opcode::Pop)
            .op(Opcode::Return);
    });
    let run = Program::new()
        .with("demo/Hog", &w)
        .configure(|c| c.with_heap_size(64 * 1024))
        .invoke("demo.Hog", "run", "()V", vec![]);
    match &run.outcome {
        ThreadOutcome::Failed(err) => assert_eq!(err.kind, ErrorKind::OutOfMemory),
        other => panic!("expected out of memory, got {:?}", other),
    }
    assert_eq!(StatusCode::from(&run.outcome), StatusCode::NoMem);
    assert_eq!(run.outcome.exit_code(), 1);
}

// ============================================================================
// Monitors
// ============================================================================

#[test]
fn test_reentrant_monitor() {
    let w = single_method("demo/Lock", "()I", |c| {
        c.new_object(common::OBJECT)
            .op(Opcode::Dup)
            .invokespecial(common::OBJECT, "<init>", "()V")
            .astore(0);
        c.aload(0).op(Opcode::Monitorenter);
        c.aload(0).op(Opcode::Monitorenter);
        c.aload(0).op(Opcode::Monitorexit);
        c.aload(0).op(Opcode::Monitorexit);
        c.iconst(1).op(Opcode::Ireturn);
    });
    let run = Program::new().with("demo/Lock", &w).invoke("demo.Lock", "run", "()I", vec![]);
    assert_eq!(run.int(), 1);
}

#[test]
fn test_synchronized_static_method() {
    let mut w = class("demo/Sync");
    w.add_method(PUBLIC_STATIC | MethodAccess::SYNCHRONIZED, "locked", "()I", |c| {
        c.iconst(5).op(Opcode::Ireturn);
    })
    .unwrap();
    w.add_method(PUBLIC_STATIC, "run", "()I", |c| {
        c.invokestatic("demo/Sync", "locked", "()I")
            .invokestatic("demo/Sync", "locked", "()I")
            .op(Opcode::Iadd)
            .op(Opcode::Ireturn);
    })
    .unwrap();
    let run = Program::new().with("demo/Sync", &w).invoke("demo.Sync", "run", "()I", vec![]);
    assert_eq!(run.int(), 10);
}

#[test]
fn test_monitor_exit_without_owner() {
    let w = single_method("demo/Unlock", "()V", |c| {
        c.new_object(common::OBJECT)
            .op(Opcode::Dup)
            .invokespecial(common::OBJECT, "<init>", "()V")
            .op(Opcode::Monitorexit)
            .op(Opcode::Return);
    });
    let run = Program::new().with("demo/Unlock", &w).invoke("demo.Unlock", "run", "()V", vec![]);
    assert_eq!(run.uncaught(), "java.lang.IllegalMonitorStateException");
}
