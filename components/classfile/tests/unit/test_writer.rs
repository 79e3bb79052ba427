//! Tests for ClassWriter and CodeBuilder

use classfile::{ClassAccess, ClassFile, ClassWriter, MethodAccess, Opcode};
use core_types::BasicType;

fn method_code(bytes: &[u8], name: &str) -> Vec<u8> {
    let class = ClassFile::parse(bytes).unwrap();
    class
        .methods
        .iter()
        .find(|m| m.name == name)
        .and_then(|m| m.code.clone())
        .unwrap()
        .code
}

#[test]
fn test_iconst_encodings() {
    let mut w = ClassWriter::new("A", Some("java/lang/Object"), ClassAccess::PUBLIC);
    w.add_method(MethodAccess::STATIC, "f", "()V", |c| {
        c.iconst(-1)
            .iconst(5)
            .iconst(100)
            .iconst(1000)
            .iconst(100_000)
            .op(Opcode::Return);
    })
    .unwrap();
    let code = method_code(&w.to_bytes(), "f");
    assert_eq!(code[0], Opcode::IconstM1 as u8);
    assert_eq!(code[1], Opcode::Iconst5 as u8);
    assert_eq!(&code[2..4], &[Opcode::Bipush as u8, 100]);
    assert_eq!(&code[4..7], &[Opcode::Sipush as u8, 0x03, 0xE8]);
    assert_eq!(code[7], Opcode::Ldc as u8);
}

#[test]
fn test_wide_local_access() {
    let mut w = ClassWriter::new("A", Some("java/lang/Object"), ClassAccess::PUBLIC);
    w.add_method(MethodAccess::STATIC, "f", "()V", |c| {
        c.iconst(0).istore(300).iinc(300, 1000).op(Opcode::Return);
    })
    .unwrap();
    let code = method_code(&w.to_bytes(), "f");
    assert_eq!(&code[1..5], &[Opcode::Wide as u8, Opcode::Istore as u8, 0x01, 0x2C]);
    assert_eq!(code[5], Opcode::Wide as u8);
    assert_eq!(code[6], Opcode::Iinc as u8);
}

#[test]
fn test_exception_table_written() {
    let mut w = ClassWriter::new("A", Some("java/lang/Object"), ClassAccess::PUBLIC);
    w.add_method(MethodAccess::STATIC, "f", "()I", |c| {
        let start = c.new_label();
        let end = c.new_label();
        let handler = c.new_label();
        c.bind(start).iconst(1).iconst(0).op(Opcode::Idiv);
        c.bind(end).op(Opcode::Ireturn);
        c.bind(handler).op(Opcode::Pop).iconst(-1).op(Opcode::Ireturn);
        c.try_catch(start, end, handler, Some("java/lang/ArithmeticException"));
    })
    .unwrap();
    let class = ClassFile::parse(&w.to_bytes()).unwrap();
    let code = class.methods[0].code.as_ref().unwrap();
    assert_eq!(code.exception_table.len(), 1);
    let entry = &code.exception_table[0];
    assert_eq!((entry.start_pc, entry.end_pc, entry.handler_pc), (0, 3, 4));
    assert_eq!(
        entry.catch_type.as_deref(),
        Some("java/lang/ArithmeticException")
    );
    assert!(entry.covers(2));
    assert!(!entry.covers(3));
}

#[test]
fn test_invokeinterface_count() {
    let mut w = ClassWriter::new("A", Some("java/lang/Object"), ClassAccess::PUBLIC);
    w.add_method(MethodAccess::STATIC, "f", "(Ljava/util/List;)V", |c| {
        c.aload(0)
            .lconst(0)
            .invokeinterface("java/util/List", "at", "(J)V")
            .op(Opcode::Return);
    })
    .unwrap();
    let code = method_code(&w.to_bytes(), "f");
    assert_eq!(code[2], Opcode::Invokeinterface as u8);
    assert_eq!(code[5], 3);
    assert_eq!(code[6], 0);
}

#[test]
fn test_newarray_codes() {
    let mut w = ClassWriter::new("A", Some("java/lang/Object"), ClassAccess::PUBLIC);
    w.add_method(MethodAccess::STATIC, "f", "()V", |c| {
        c.iconst(3)
            .newarray(BasicType::Int)
            .op(Opcode::Pop)
            .op(Opcode::Return);
    })
    .unwrap();
    let code = method_code(&w.to_bytes(), "f");
    assert_eq!(&code[1..3], &[Opcode::Newarray as u8, 10]);
}

#[test]
fn test_lookupswitch_sorted() {
    let mut w = ClassWriter::new("A", Some("java/lang/Object"), ClassAccess::PUBLIC);
    w.add_method(MethodAccess::STATIC, "f", "(I)I", |c| {
        let d = c.new_label();
        let a = c.new_label();
        let b = c.new_label();
        c.iload(0).lookupswitch(d, &[(50, b), (-3, a)]);
        c.bind(a).iconst(1).op(Opcode::Ireturn);
        c.bind(b).iconst(2).op(Opcode::Ireturn);
        c.bind(d).iconst(0).op(Opcode::Ireturn);
    })
    .unwrap();
    let code = method_code(&w.to_bytes(), "f");
    // iload_0, lookupswitch at 1, padding to 4, default, npairs, pairs
    let npairs = i32::from_be_bytes([code[8], code[9], code[10], code[11]]);
    assert_eq!(npairs, 2);
    let first_key = i32::from_be_bytes([code[12], code[13], code[14], code[15]]);
    assert_eq!(first_key, -3);
}
