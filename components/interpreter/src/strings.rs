//! Java strings: creation, decoding, interning and the number formats of
//! `String.valueOf`.

use std::collections::HashMap;

use core_types::{BasicType, ObjectRef, Value};
use memory_manager::{ObjectShape, RootSet};

use crate::exceptions::Unwind;
use crate::execution::ExecutionContext;

/// Canonical `String` objects by contents.
///
/// Values are GC roots; the collector rewrites them in place.
#[derive(Debug, Default)]
pub struct InternTable {
    strings: HashMap<String, ObjectRef>,
}

impl InternTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Canonical object for `text`, if interned.
    pub fn get(&self, text: &str) -> Option<ObjectRef> {
        self.strings.get(text).copied()
    }

    /// Interns `object` as the canonical string for `text` unless one
    /// exists, returning the canonical object.
    pub fn insert(&mut self, text: &str, object: ObjectRef) -> ObjectRef {
        *self.strings.entry(text.to_string()).or_insert(object)
    }

    /// Number of interned strings.
    pub fn len(&self) -> usize {
        self.strings.len()
    }

    /// Returns true if nothing is interned.
    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }
}

impl RootSet for InternTable {
    fn visit_roots(&mut self, visitor: &mut dyn FnMut(&mut ObjectRef)) {
        for object in self.strings.values_mut() {
            visitor(object);
        }
    }
}

/// `String.hashCode` over UTF-16 code units.
pub fn java_hash(units: &[u16]) -> i32 {
    units
        .iter()
        .fold(0i32, |h, &u| h.wrapping_mul(31).wrapping_add(u as i32))
}

fn format_floating(
    nan: bool,
    infinite: bool,
    negative: bool,
    zero: bool,
    magnitude: f64,
    plain: impl FnOnce() -> String,
    scientific: impl FnOnce() -> String,
) -> String {
    if nan {
        return "NaN".to_string();
    }
    if infinite {
        return if negative { "-Infinity" } else { "Infinity" }.to_string();
    }
    if zero {
        return if negative { "-0.0" } else { "0.0" }.to_string();
    }
    if (1e-3..1e7).contains(&magnitude) {
        let text = plain();
        if text.contains('.') {
            text
        } else {
            format!("{}.0", text)
        }
    } else {
        let text = scientific();
        let (mantissa, exponent) = text.split_once('e').unwrap_or((text.as_str(), "0"));
        if mantissa.contains('.') {
            format!("{}E{}", mantissa, exponent)
        } else {
            format!("{}.0E{}", mantissa, exponent)
        }
    }
}

/// `Double.toString`: `1.0`, `0.001`, `1.0E7`, `NaN`, `-Infinity`.
pub fn java_double_to_string(value: f64) -> String {
    format_floating(
        value.is_nan(),
        value.is_infinite(),
        value.is_sign_negative(),
        value == 0.0,
        value.abs(),
        || format!("{}", value),
        || format!("{:e}", value),
    )
}

/// `Float.toString`, using the shortest `float` representation.
pub fn java_float_to_string(value: f32) -> String {
    format_floating(
        value.is_nan(),
        value.is_infinite(),
        value.is_sign_negative(),
        value == 0.0,
        value.abs() as f64,
        || format!("{}", value),
        || format!("{:e}", value),
    )
}

/// Text of a `char` value.
pub fn java_char_to_string(unit: u16) -> String {
    String::from_utf16_lossy(&[unit])
}

/// Text of a primitive value as `String.valueOf` prints it.
pub fn format_primitive(value: Value, ty: BasicType) -> String {
    match (ty, value) {
        (BasicType::Boolean, Value::Int(v)) => (v != 0).to_string(),
        (BasicType::Char, Value::Int(v)) => java_char_to_string(v as u16),
        (_, Value::Int(v)) => v.to_string(),
        (_, Value::Long(v)) => v.to_string(),
        (_, Value::Float(v)) => java_float_to_string(v),
        (_, Value::Double(v)) => java_double_to_string(v),
        (_, Value::Reference(None)) => "null".to_string(),
        (_, Value::Reference(Some(r))) => format!("@{:x}", r.offset()),
    }
}

impl ExecutionContext<'_> {
    /// Allocates a new `String` holding `text`.
    pub fn new_string(&mut self, text: &str) -> Result<ObjectRef, Unwind> {
        let units: Vec<u16> = text.encode_utf16().collect();
        self.new_string_from_units(&units)
    }

    /// Allocates a new `String` from UTF-16 code units.
    pub fn new_string_from_units(&mut self, units: &[u16]) -> Result<ObjectRef, Unwind> {
        let vm = self.vm();
        let chars = self.allocate(ObjectShape::Array {
            class: vm.char_array_class().id(),
            element: BasicType::Char,
            length: units.len() as u32,
        })?;
        vm.heap().lock().write_chars(chars, units).map_err(Unwind::from)?;

        let mark = self.push_handle(Value::object(chars));
        let string_class = vm.string_class();
        let string = self.allocate(ObjectShape::Instance {
            class: string_class.id(),
            slots: string_class.instance_slots(),
        });
        let chars = self.handle(mark);
        self.truncate_handles(mark);
        let string = string?;
        vm.heap()
            .lock()
            .write_slot(string, vm.string_value_slot(), chars)
            .map_err(Unwind::from)?;
        Ok(string)
    }

    /// Canonical `String` for `text`, created on first use.
    pub fn intern_string(&mut self, text: &str) -> Result<ObjectRef, Unwind> {
        let vm = self.vm();
        if let Some(existing) = vm.interned().lock().get(text) {
            return Ok(existing);
        }
        let created = self.new_string(text)?;
        Ok(vm.interned().lock().insert(text, created))
    }

    /// UTF-16 contents of a `String` object.
    pub fn string_units(&self, string: ObjectRef) -> Result<Vec<u16>, Unwind> {
        let vm = self.vm();
        let heap = vm.heap().lock();
        let value = heap
            .read_slot(string, vm.string_value_slot(), BasicType::Reference)
            .map_err(Unwind::from)?;
        match value.as_object() {
            Some(chars) => heap.read_chars(chars).map_err(Unwind::from),
            None => Ok(Vec::new()),
        }
    }

    /// Contents of a `String` object as Rust text.
    pub fn string_value(&self, string: ObjectRef) -> Result<String, Unwind> {
        Ok(String::from_utf16_lossy(&self.string_units(string)?))
    }
}
