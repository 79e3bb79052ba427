//! Internal names of classes the VM itself refers to.

/// Root of the class hierarchy
pub const OBJECT: &str = "java/lang/Object";
/// String class
pub const STRING: &str = "java/lang/String";
/// String builder used by concatenation
pub const STRING_BUILDER: &str = "java/lang/StringBuilder";
/// System class holding `out`/`err`
pub const SYSTEM: &str = "java/lang/System";
/// Console stream class
pub const PRINT_STREAM: &str = "java/io/PrintStream";
/// Marker interface implemented by arrays
pub const CLONEABLE: &str = "java/lang/Cloneable";
/// Marker interface implemented by arrays
pub const SERIALIZABLE: &str = "java/io/Serializable";

/// Root of all throwables
pub const THROWABLE: &str = "java/lang/Throwable";
/// Checked exception base
pub const EXCEPTION: &str = "java/lang/Exception";
/// Unchecked exception base
pub const RUNTIME_EXCEPTION: &str = "java/lang/RuntimeException";
/// Error base
pub const ERROR: &str = "java/lang/Error";

/// Null dereference
pub const NULL_POINTER_EXCEPTION: &str = "java/lang/NullPointerException";
/// Integer division by zero
pub const ARITHMETIC_EXCEPTION: &str = "java/lang/ArithmeticException";
/// Array index outside bounds
pub const ARRAY_INDEX_OUT_OF_BOUNDS_EXCEPTION: &str =
    "java/lang/ArrayIndexOutOfBoundsException";
/// Negative array length
pub const NEGATIVE_ARRAY_SIZE_EXCEPTION: &str = "java/lang/NegativeArraySizeException";
/// Failed `checkcast`
pub const CLASS_CAST_EXCEPTION: &str = "java/lang/ClassCastException";
/// Incompatible element stored into a reference array
pub const ARRAY_STORE_EXCEPTION: &str = "java/lang/ArrayStoreException";
/// Unbalanced `monitorexit`
pub const ILLEGAL_MONITOR_STATE_EXCEPTION: &str = "java/lang/IllegalMonitorStateException";
/// Rejected argument
pub const ILLEGAL_ARGUMENT_EXCEPTION: &str = "java/lang/IllegalArgumentException";
/// `Object.clone` on a class that is not cloneable
pub const CLONE_NOT_SUPPORTED_EXCEPTION: &str = "java/lang/CloneNotSupportedException";
/// Unsupported operation
pub const UNSUPPORTED_OPERATION_EXCEPTION: &str = "java/lang/UnsupportedOperationException";

/// Wrapper for an exception thrown by a static initializer
pub const EXCEPTION_IN_INITIALIZER_ERROR: &str = "java/lang/ExceptionInInitializerError";
/// Class unusable (missing or failed initialization)
pub const NO_CLASS_DEF_FOUND_ERROR: &str = "java/lang/NoClassDefFoundError";
/// Call depth exceeded
pub const STACK_OVERFLOW_ERROR: &str = "java/lang/StackOverflowError";
/// Heap exhausted
pub const OUT_OF_MEMORY_ERROR: &str = "java/lang/OutOfMemoryError";

/// Descriptor of `main`
pub const MAIN_DESCRIPTOR: &str = "([Ljava/lang/String;)V";
/// Instance initializer name
pub const CONSTRUCTOR: &str = "<init>";
/// Static initializer name
pub const CLASS_INITIALIZER: &str = "<clinit>";

/// Converts a binary name (`java.lang.String`) to an internal name.
pub fn to_internal(name: &str) -> String {
    name.replace('.', "/")
}

/// Converts an internal name to the dotted form used in messages.
pub fn to_binary(name: &str) -> String {
    name.replace('/', ".")
}
