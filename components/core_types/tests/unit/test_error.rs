//! Unit tests for JvmError and ErrorKind

use core_types::{ErrorKind, JvmError, JvmResult};

#[cfg(test)]
mod error_kind_tests {
    use super::*;

    #[test]
    fn test_throwable_mapping() {
        assert_eq!(
            ErrorKind::NoSuchMethod.throwable_class(),
            Some("java/lang/NoSuchMethodError")
        );
        assert_eq!(
            ErrorKind::NoSuchField.throwable_class(),
            Some("java/lang/NoSuchFieldError")
        );
        assert_eq!(
            ErrorKind::StackOverflow.throwable_class(),
            Some("java/lang/StackOverflowError")
        );
        assert_eq!(
            ErrorKind::NotFound.throwable_class(),
            Some("java/lang/NoClassDefFoundError")
        );
    }

    #[test]
    fn test_out_of_memory_is_fatal() {
        assert!(ErrorKind::OutOfMemory.is_fatal());
        assert_eq!(ErrorKind::OutOfMemory.throwable_class(), None);
    }

    #[test]
    fn test_linkage_grouping() {
        let linkage: Vec<_> = [
            ErrorKind::NotFound,
            ErrorKind::ClassFormat,
            ErrorKind::Linkage,
            ErrorKind::ClassCircularity,
            ErrorKind::Initialization,
            ErrorKind::NoSuchMethod,
        ]
        .into_iter()
        .filter(|kind| kind.is_linkage())
        .collect();
        assert_eq!(linkage, vec![ErrorKind::Linkage, ErrorKind::ClassCircularity]);
    }

    #[test]
    fn test_kind_display() {
        assert_eq!(ErrorKind::ClassFormat.to_string(), "ClassFormatError");
        assert_eq!(ErrorKind::Initialization.to_string(), "InitializationError");
    }
}

#[cfg(test)]
mod jvm_error_tests {
    use super::*;

    #[test]
    fn test_constructors_set_kind() {
        assert_eq!(JvmError::not_found("A").kind, ErrorKind::NotFound);
        assert_eq!(JvmError::class_format("bad").kind, ErrorKind::ClassFormat);
        assert_eq!(JvmError::linkage("bad").kind, ErrorKind::Linkage);
        assert_eq!(JvmError::initialization("A").kind, ErrorKind::Initialization);
        assert_eq!(JvmError::out_of_memory("full").kind, ErrorKind::OutOfMemory);
    }

    #[test]
    fn test_error_is_std_error() {
        fn takes_error(_: &dyn std::error::Error) {}
        takes_error(&JvmError::internal("x"));
    }

    #[test]
    fn test_question_mark_propagation() {
        fn inner() -> JvmResult<()> {
            Err(JvmError::no_such_field("A.x:I"))
        }
        fn outer() -> JvmResult<u8> {
            inner()?;
            Ok(1)
        }
        let err = outer().unwrap_err();
        assert_eq!(err.kind, ErrorKind::NoSuchField);
        assert_eq!(err.message, "A.x:I");
    }

    #[test]
    fn test_error_clone_and_eq() {
        let a = JvmError::linkage("x");
        assert_eq!(a.clone(), a);
    }
}
