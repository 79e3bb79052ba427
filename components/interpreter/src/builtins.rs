//! Host implementations of the runtime-class natives
//!
//! `java/lang/Object`, `String`, `System`, `Throwable` and
//! `java/io/PrintStream` declare their host-dependent methods `native`;
//! this module binds them. Natives that allocate or call back into Java
//! re-read their arguments afterwards, since a collection may move them.

use std::time::{SystemTime, UNIX_EPOCH};

use class_loader::{names, ArrayComponent};
use core_types::{BasicType, ObjectRef, Value};
use memory_manager::{HeapError, ObjectShape};

use crate::config::OutputSink;
use crate::exceptions::Unwind;
use crate::natives::{NativeEnv, NativeRegistry, NativeResult};
use crate::strings::{format_primitive, java_hash};

const OBJECT_DESC: &str = "Ljava/lang/Object;";
const STRING_DESC: &str = "Ljava/lang/String;";
const TO_STRING: (&str, &str) = ("toString", "()Ljava/lang/String;");

/// Primitive overloads shared by `print`, `println` and `valueOf`.
const PRIMITIVES: &[(&str, BasicType)] = &[
    ("I", BasicType::Int),
    ("J", BasicType::Long),
    ("C", BasicType::Char),
    ("Z", BasicType::Boolean),
    ("F", BasicType::Float),
    ("D", BasicType::Double),
];

/// Binds every runtime-class native into `registry`.
pub fn register_defaults(registry: &NativeRegistry) {
    register_object(registry);
    register_string(registry);
    register_system(registry);
    register_print_stream(registry);
    register_throwable(registry);
}

fn string_result(env: &mut NativeEnv<'_, '_>, text: &str) -> NativeResult {
    Ok(Some(Value::object(env.new_string(text)?)))
}

fn boolean(value: bool) -> NativeResult {
    Ok(Some(Value::Int(value as i32)))
}

/// Binary name (`java.lang.String`) of the class of `object`.
fn class_name_of(env: &NativeEnv<'_, '_>, object: ObjectRef) -> Result<String, Unwind> {
    let class = env.heap().class_of(object)?;
    Ok(names::to_binary(env.loader().get(class)?.name()))
}

/// `String.valueOf(Object)`: `"null"` or the result of `toString()`.
fn object_text(env: &mut NativeEnv<'_, '_>, object: Option<ObjectRef>) -> Result<String, Unwind> {
    let Some(object) = object else {
        return Ok("null".to_string());
    };
    match env.invoke_virtual(object, TO_STRING.0, TO_STRING.1, &[])? {
        Some(Value::Reference(Some(text))) => env.string_value(text),
        _ => Ok("null".to_string()),
    }
}

fn register_object(registry: &NativeRegistry) {
    registry.register(names::OBJECT, "hashCode", "()I", |env| {
        let this = env.this()?;
        let hash = env.heap().identity_hash(this)?;
        Ok(Some(Value::Int(hash)))
    });
    registry.register(names::OBJECT, TO_STRING.0, TO_STRING.1, |env| {
        let this = env.this()?;
        let name = class_name_of(env, this)?;
        let hash = env
            .invoke_virtual(this, "hashCode", "()I", &[])?
            .and_then(|v| v.as_int())
            .unwrap_or(0);
        string_result(env, &format!("{}@{:x}", name, hash as u32))
    });
    registry.register(names::OBJECT, "clone", "()Ljava/lang/Object;", object_clone);
}

/// Arrays always clone; instances must implement `Cloneable`.
fn object_clone(env: &mut NativeEnv<'_, '_>) -> NativeResult {
    let this = env.this()?;
    let loader = env.loader();
    let class = loader.get(env.heap().class_of(this)?)?;
    if !class.is_array() {
        let cloneable = loader.resolve(names::CLONEABLE)?;
        if !loader.is_assignable(class.id(), cloneable.id())? {
            let name = names::to_binary(class.name());
            return Err(env.throw_new(names::CLONE_NOT_SUPPORTED_EXCEPTION, Some(&name)));
        }
    }
    let copy = env.context().allocate_with(|heap, stack| {
        let receiver = stack
            .top()
            .and_then(|frame| frame.locals().first())
            .and_then(|value| value.as_object())
            .ok_or(HeapError::InvalidReference(0))?;
        heap.try_clone_object(receiver)
    })?;
    Ok(Some(Value::object(copy)))
}

fn register_string(registry: &NativeRegistry) {
    registry.register(names::STRING, names::CONSTRUCTOR, "([C)V", |env| {
        let vm = env.vm();
        let source = env.non_null_arg(1)?;
        let units = env.heap().read_chars(source)?;
        let copy = env.allocate(ObjectShape::Array {
            class: vm.char_array_class().id(),
            element: BasicType::Char,
            length: units.len() as u32,
        })?;
        let this = env.this()?;
        let mut heap = env.heap();
        heap.write_chars(copy, &units)?;
        heap.write_slot(this, vm.string_value_slot(), Value::object(copy))?;
        Ok(None)
    });
    registry.register(names::STRING, "equals", "(Ljava/lang/Object;)Z", |env| {
        let this = env.this()?;
        let Some(other) = env.object_arg(1)? else {
            return boolean(false);
        };
        if other == this {
            return boolean(true);
        }
        if env.heap().class_of(other)? != env.vm().string_class().id() {
            return boolean(false);
        }
        boolean(env.string_units(this)? == env.string_units(other)?)
    });
    registry.register(names::STRING, "hashCode", "()I", |env| {
        let this = env.this()?;
        Ok(Some(Value::Int(java_hash(&env.string_units(this)?))))
    });
    registry.register(names::STRING, "intern", "()Ljava/lang/String;", |env| {
        let this = env.this()?;
        let text = env.string_value(this)?;
        let canonical = env.vm().interned().lock().insert(&text, this);
        Ok(Some(Value::object(canonical)))
    });
    registry.register(
        names::STRING,
        "concat",
        "(Ljava/lang/String;)Ljava/lang/String;",
        |env| {
            let this = env.this()?;
            let other = env.non_null_arg(1)?;
            let tail = env.string_units(other)?;
            if tail.is_empty() {
                return Ok(Some(Value::object(this)));
            }
            let mut units = env.string_units(this)?;
            units.extend_from_slice(&tail);
            Ok(Some(Value::object(env.new_string_from_units(&units)?)))
        },
    );
    for &(code, ty) in PRIMITIVES {
        registry.register(
            names::STRING,
            "valueOf",
            &format!("({}){}", code, STRING_DESC),
            move |env| {
                let text = format_primitive(env.arg(0)?, ty);
                string_result(env, &text)
            },
        );
    }
    registry.register(
        names::STRING,
        "valueOf",
        &format!("({}){}", OBJECT_DESC, STRING_DESC),
        |env| {
            let object = env.object_arg(0)?;
            let text = object_text(env, object)?;
            string_result(env, &text)
        },
    );
}

fn register_system(registry: &NativeRegistry) {
    registry.register(
        names::SYSTEM,
        "arraycopy",
        "(Ljava/lang/Object;ILjava/lang/Object;II)V",
        array_copy,
    );
    registry.register(names::SYSTEM, "identityHashCode", "(Ljava/lang/Object;)I", |env| {
        let hash = match env.object_arg(0)? {
            Some(object) => env.heap().identity_hash(object)?,
            None => 0,
        };
        Ok(Some(Value::Int(hash)))
    });
    registry.register(names::SYSTEM, "currentTimeMillis", "()J", |_env| {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0);
        Ok(Some(Value::Long(millis)))
    });
    registry.register(names::SYSTEM, "nanoTime", "()J", |env| {
        Ok(Some(Value::Long(env.vm().uptime_nanos())))
    });
    registry.register(names::SYSTEM, "gc", "()V", |env| {
        env.collect_garbage()?;
        Ok(None)
    });
}

/// `System.arraycopy(src, srcPos, dest, destPos, length)`
fn array_copy(env: &mut NativeEnv<'_, '_>) -> NativeResult {
    let src = env.non_null_arg(0)?;
    let src_pos = env.int_arg(1)?;
    let dst = env.non_null_arg(2)?;
    let dst_pos = env.int_arg(3)?;
    let length = env.int_arg(4)?;

    let loader = env.loader();
    let (src_class, dst_class) = {
        let heap = env.heap();
        (heap.class_of(src)?, heap.class_of(dst)?)
    };
    let src_class = loader.get(src_class)?;
    let dst_class = loader.get(dst_class)?;
    let (Some(src_array), Some(dst_array)) = (src_class.as_array(), dst_class.as_array()) else {
        let (role, culprit) = if src_class.is_array() {
            ("destination", &dst_class)
        } else {
            ("source", &src_class)
        };
        let message = format!(
            "arraycopy: {} type {} is not an array",
            role,
            names::to_binary(culprit.name())
        );
        return Err(env.throw_new(names::ARRAY_STORE_EXCEPTION, Some(&message)));
    };
    if src_array.element != dst_array.element {
        let message = format!(
            "arraycopy: type mismatch: can not copy {} into {}",
            names::to_binary(src_class.name()),
            names::to_binary(dst_class.name())
        );
        return Err(env.throw_new(names::ARRAY_STORE_EXCEPTION, Some(&message)));
    }

    let (src_len, dst_len) = {
        let heap = env.heap();
        (heap.array_length(src)? as i64, heap.array_length(dst)? as i64)
    };
    let bounds_error = if src_pos < 0 {
        Some(format!("arraycopy: source index {} out of bounds for length {}", src_pos, src_len))
    } else if dst_pos < 0 {
        Some(format!("arraycopy: destination index {} out of bounds for length {}", dst_pos, dst_len))
    } else if length < 0 {
        Some(format!("arraycopy: length {} is negative", length))
    } else if src_pos as i64 + length as i64 > src_len {
        Some(format!(
            "arraycopy: last source index {} out of bounds for length {}",
            src_pos as i64 + length as i64,
            src_len
        ))
    } else if dst_pos as i64 + length as i64 > dst_len {
        Some(format!(
            "arraycopy: last destination index {} out of bounds for length {}",
            dst_pos as i64 + length as i64,
            dst_len
        ))
    } else {
        None
    };
    if let Some(message) = bounds_error {
        return Err(env.throw_new(names::ARRAY_INDEX_OUT_OF_BOUNDS_EXCEPTION, Some(&message)));
    }

    let target = match (src_array.component, dst_array.component) {
        (ArrayComponent::Reference(from), ArrayComponent::Reference(to))
            if !loader.is_assignable(from, to)? =>
        {
            to
        }
        _ => {
            env.heap().array_copy(src, src_pos, dst, dst_pos, length)?;
            return Ok(None);
        }
    };
    for offset in 0..length {
        let mut heap = env.heap();
        let value = heap.array_load(src, src_pos + offset)?;
        if let Some(element) = value.as_object() {
            let element_class = heap.class_of(element)?;
            if !loader.is_assignable(element_class, target)? {
                drop(heap);
                let message = format!(
                    "arraycopy: element type mismatch: can not cast one of the elements of {} to the type of the destination array, {}",
                    names::to_binary(src_class.name()),
                    names::to_binary(loader.get(target)?.name())
                );
                return Err(env.throw_new(names::ARRAY_STORE_EXCEPTION, Some(&message)));
            }
        }
        heap.array_store(dst, dst_pos + offset, value)?;
    }
    Ok(None)
}

/// Sink selected by the stream's `fd` field: 2 is `System.err`.
fn stream_sink<'t>(env: &mut NativeEnv<'_, 't>) -> Result<&'t OutputSink, Unwind> {
    let this = env.this()?;
    let stream = env.loader().resolve(names::PRINT_STREAM)?;
    let fd = match stream.declared_field("fd", "I") {
        Some(field) => env.heap().read_slot(this, field.slot, BasicType::Int)?.as_int().unwrap_or(1),
        None => 1,
    };
    Ok(if fd == 2 { env.stderr() } else { env.stdout() })
}

fn register_print_stream(registry: &NativeRegistry) {
    registry.register(names::PRINT_STREAM, "println", "()V", |env| {
        stream_sink(env)?.write_str("\n");
        Ok(None)
    });
    registry.register(names::PRINT_STREAM, "flush", "()V", |env| {
        stream_sink(env)?.flush();
        Ok(None)
    });
    for newline in [false, true] {
        let method = if newline { "println" } else { "print" };
        let end = if newline { "\n" } else { "" };
        for &(code, ty) in PRIMITIVES {
            registry.register(
                names::PRINT_STREAM,
                method,
                &format!("({})V", code),
                move |env| {
                    let sink = stream_sink(env)?;
                    let text = format_primitive(env.arg(1)?, ty);
                    sink.write_str(&format!("{}{}", text, end));
                    Ok(None)
                },
            );
        }
        registry.register(
            names::PRINT_STREAM,
            method,
            &format!("({})V", STRING_DESC),
            move |env| {
                let sink = stream_sink(env)?;
                let text = match env.object_arg(1)? {
                    Some(string) => env.string_value(string)?,
                    None => "null".to_string(),
                };
                sink.write_str(&format!("{}{}", text, end));
                Ok(None)
            },
        );
        registry.register(
            names::PRINT_STREAM,
            method,
            &format!("({})V", OBJECT_DESC),
            move |env| {
                let sink = stream_sink(env)?;
                let object = env.object_arg(1)?;
                let text = object_text(env, object)?;
                sink.write_str(&format!("{}{}", text, end));
                Ok(None)
            },
        );
    }
}

fn register_throwable(registry: &NativeRegistry) {
    registry.register(names::THROWABLE, TO_STRING.0, TO_STRING.1, |env| {
        let this = env.this()?;
        let name = class_name_of(env, this)?;
        let message = match env.invoke_virtual(this, "getLocalizedMessage", "()Ljava/lang/String;", &[])? {
            Some(Value::Reference(Some(text))) => Some(env.string_value(text)?),
            _ => None,
        };
        let text = match message {
            Some(message) => format!("{}: {}", name, message),
            None => name,
        };
        string_result(env, &text)
    });
    registry.register(names::THROWABLE, "printStackTrace", "()V", |env| {
        let this = env.this()?;
        let ctx = env.context();
        let mark = ctx.push_handle(Value::object(this));
        let lines = ctx.exception_lines(mark);
        ctx.truncate_handles(mark);
        let stderr = env.stderr();
        for line in lines? {
            stderr.write_str(&format!("{}\n", line));
        }
        Ok(None)
    });
}
