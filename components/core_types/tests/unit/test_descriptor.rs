//! Unit tests for descriptor parsing

use core_types::{BasicType, FieldType, MethodDescriptor};

#[cfg(test)]
mod field_type_tests {
    use super::*;

    #[test]
    fn test_primitives() {
        assert_eq!(FieldType::parse("I").unwrap(), FieldType::Int);
        assert_eq!(FieldType::parse("Z").unwrap(), FieldType::Boolean);
        assert_eq!(FieldType::parse("J").unwrap().slots(), 2);
        assert_eq!(FieldType::parse("C").unwrap().basic_type(), BasicType::Char);
    }

    #[test]
    fn test_object_type() {
        let ty = FieldType::parse("Ljava/lang/String;").unwrap();
        assert_eq!(ty, FieldType::Object("java/lang/String".to_string()));
        assert!(ty.is_reference());
        assert_eq!(ty.class_name().as_deref(), Some("java/lang/String"));
    }

    #[test]
    fn test_primitive_has_no_class_name() {
        assert_eq!(FieldType::Int.class_name(), None);
    }

    #[test]
    fn test_array_display() {
        let ty = FieldType::parse("[[I").unwrap();
        assert_eq!(ty.to_string(), "[[I");
        assert_eq!(ty.slots(), 1);
    }
}

#[cfg(test)]
mod method_descriptor_tests {
    use super::*;

    #[test]
    fn test_main_descriptor() {
        let desc = MethodDescriptor::parse("([Ljava/lang/String;)V").unwrap();
        assert_eq!(desc.parameters.len(), 1);
        assert_eq!(desc.argument_slots(), 1);
        assert_eq!(desc.return_type, None);
    }

    #[test]
    fn test_wide_arguments() {
        let desc = MethodDescriptor::parse("(JDI)D").unwrap();
        assert_eq!(desc.argument_slots(), 5);
        assert_eq!(desc.return_type, Some(FieldType::Double));
    }

    #[test]
    fn test_no_arguments() {
        let desc = MethodDescriptor::parse("()I").unwrap();
        assert!(desc.parameters.is_empty());
        assert_eq!(desc.argument_slots(), 0);
    }

    #[test]
    fn test_rejects_void_parameter() {
        assert!(MethodDescriptor::parse("(V)V").is_err());
    }
}
