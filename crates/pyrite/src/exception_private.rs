use std::{borrow::Cow, fmt};

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};

use crate::types::ExcRef;

/// Result type alias for operations that can produce a runtime error.
pub type RunResult<T> = Result<T, RunError>;

/// Exception types known to the interpreter.
///
/// Uses strum derives for automatic `Display`, `FromStr`, and `Into<&'static str>` implementations.
/// The string representation matches the variant name exactly (e.g., `ValueError` -> "ValueError"),
/// which is also the name the builtin class is materialized under in the global scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr, Serialize, Deserialize)]
pub enum ExcType {
    /// Root of the hierarchy.
    BaseException,
    /// Primary exception class - every standard exception derives from it.
    Exception,
    KeyboardInterrupt,
    SystemExit,

    // --- ArithmeticError hierarchy ---
    ArithmeticError,
    ZeroDivisionError,
    OverflowError,

    // --- LookupError hierarchy ---
    LookupError,
    IndexError,
    KeyError,

    // --- RuntimeError hierarchy ---
    RuntimeError,
    RecursionError,
    NotImplementedError,

    // --- NameError hierarchy ---
    NameError,
    UnboundLocalError,

    // --- ImportError hierarchy ---
    ImportError,
    ModuleNotFoundError,

    // --- OSError hierarchy ---
    OSError,
    FileNotFoundError,
    PermissionError,
    TimeoutError,

    // --- Standalone exception types ---
    AttributeError,
    TypeError,
    ValueError,
    StopIteration,
    AssertionError,
    EOFError,
    /// Raised for interpreter invariant violations (malformed instruction streams).
    SystemError,
}

impl ExcType {
    /// Returns the direct parent in the builtin exception hierarchy.
    ///
    /// `BaseException` is the only root and returns `None`.
    #[must_use]
    pub fn parent(self) -> Option<Self> {
        match self {
            Self::BaseException => None,
            Self::Exception | Self::KeyboardInterrupt | Self::SystemExit => Some(Self::BaseException),
            Self::ZeroDivisionError | Self::OverflowError => Some(Self::ArithmeticError),
            Self::IndexError | Self::KeyError => Some(Self::LookupError),
            Self::RecursionError | Self::NotImplementedError => Some(Self::RuntimeError),
            Self::UnboundLocalError => Some(Self::NameError),
            Self::ModuleNotFoundError => Some(Self::ImportError),
            Self::FileNotFoundError | Self::PermissionError | Self::TimeoutError => Some(Self::OSError),
            Self::ArithmeticError
            | Self::LookupError
            | Self::RuntimeError
            | Self::NameError
            | Self::ImportError
            | Self::OSError
            | Self::AttributeError
            | Self::TypeError
            | Self::ValueError
            | Self::StopIteration
            | Self::AssertionError
            | Self::EOFError
            | Self::SystemError => Some(Self::Exception),
        }
    }

    /// Checks if this exception type is a subclass of another exception type.
    ///
    /// Returns true if `self` would be caught by `except handler_type:`.
    #[must_use]
    pub fn is_subclass_of(self, handler_type: Self) -> bool {
        let mut current = Some(self);
        while let Some(exc_type) = current {
            if exc_type == handler_type {
                return true;
            }
            current = exc_type.parent();
        }
        false
    }

    /// Creates a NameError for accessing an undefined variable.
    ///
    /// Format: `name 'x' is not defined`
    #[must_use]
    pub(crate) fn name_error(name: &str) -> RunError {
        SimpleException::new(Self::NameError, ErrorCode::UnknownIdentifier, [name]).into()
    }

    /// Creates a NameError for a `nonlocal` name no enclosing function scope holds.
    #[must_use]
    pub(crate) fn nonlocal_not_found(name: &str) -> RunError {
        SimpleException::new(Self::NameError, ErrorCode::NonLocalNotFound, [name]).into()
    }

    /// Creates a TypeError for too many positional arguments.
    ///
    /// Format: `{name}() takes {max} positional arguments but {actual} were given`
    #[must_use]
    pub(crate) fn type_error_too_many_positional(name: &str, max: usize, actual: usize) -> RunError {
        SimpleException::new(
            Self::TypeError,
            ErrorCode::TooManyArguments,
            [name.to_owned(), max.to_string(), actual.to_string()],
        )
        .into()
    }

    /// Creates a TypeError for a parameter that received no value and has no default.
    #[must_use]
    pub(crate) fn type_error_missing_arg(name: &str, param: &str) -> RunError {
        SimpleException::new(Self::TypeError, ErrorCode::MissingArgument, [name, param]).into()
    }

    /// Creates a TypeError for duplicate argument.
    ///
    /// Format: `{name}() got multiple values for argument '{param}'`
    #[must_use]
    pub(crate) fn type_error_duplicate_arg(name: &str, param: &str) -> RunError {
        SimpleException::new(Self::TypeError, ErrorCode::DuplicateArgument, [name, param]).into()
    }

    /// Creates a TypeError for a named argument matching no parameter.
    #[must_use]
    pub(crate) fn type_error_unexpected_keyword(name: &str, key: &str) -> RunError {
        SimpleException::new(Self::TypeError, ErrorCode::UnexpectedArgument, [name, key]).into()
    }

    /// Creates a TypeError for a `*spread` argument whose value is not iterable.
    #[must_use]
    pub(crate) fn type_error_expand_not_iterable(name: &str, type_name: &str) -> RunError {
        SimpleException::new(Self::TypeError, ErrorCode::ExpandNotIterable, [name, type_name]).into()
    }

    /// Creates a TypeError for a `**spread` argument that is not a string-keyed dictionary.
    #[must_use]
    pub(crate) fn type_error_kwargs_not_mapping(type_name: &str) -> RunError {
        SimpleException::new(Self::TypeError, ErrorCode::ExpandNotMapping, [type_name]).into()
    }

    /// Creates a TypeError for a native function called with the wrong number of arguments.
    #[must_use]
    pub(crate) fn type_error_arg_count(name: &str, expected: &str, actual: usize) -> RunError {
        SimpleException::new(
            Self::TypeError,
            ErrorCode::ArgumentCount,
            [name.to_owned(), expected.to_owned(), actual.to_string()],
        )
        .into()
    }

    /// Creates a TypeError for a native function receiving named arguments it does not accept.
    #[must_use]
    pub(crate) fn type_error_no_kwargs(name: &str) -> RunError {
        SimpleException::new(Self::TypeError, ErrorCode::NoNamedArguments, [name]).into()
    }

    #[must_use]
    pub(crate) fn type_error_not_callable(type_name: &str) -> RunError {
        SimpleException::new(Self::TypeError, ErrorCode::NotCallable, [type_name]).into()
    }

    #[must_use]
    pub(crate) fn type_error_not_iterable(type_name: &str) -> RunError {
        SimpleException::new(Self::TypeError, ErrorCode::NotIterable, [type_name]).into()
    }

    #[must_use]
    pub(crate) fn type_error_not_iterator(type_name: &str) -> RunError {
        SimpleException::new(Self::TypeError, ErrorCode::NotAnIterator, [type_name]).into()
    }

    #[must_use]
    pub(crate) fn type_error_not_subscriptable(type_name: &str) -> RunError {
        SimpleException::new(Self::TypeError, ErrorCode::NotSubscriptable, [type_name]).into()
    }

    #[must_use]
    pub(crate) fn type_error_item_assignment(type_name: &str) -> RunError {
        SimpleException::new(Self::TypeError, ErrorCode::ItemAssignment, [type_name]).into()
    }

    #[must_use]
    pub(crate) fn type_error_unhashable(type_name: &str) -> RunError {
        SimpleException::new(Self::TypeError, ErrorCode::Unhashable, [type_name]).into()
    }

    /// Creates a TypeError for a sequence indexed with a non-integer.
    #[must_use]
    pub(crate) fn type_error_indices(type_name: &str, index_type: &str) -> RunError {
        SimpleException::new(Self::TypeError, ErrorCode::IndexType, [type_name, index_type]).into()
    }

    #[must_use]
    pub(crate) fn type_error_no_len(type_name: &str) -> RunError {
        SimpleException::new(Self::TypeError, ErrorCode::NoLength, [type_name]).into()
    }

    /// Creates a TypeError for an `isinstance`/`issubclass` argument that is not a class.
    #[must_use]
    pub(crate) fn type_error_class_info(func: &str, position: usize) -> RunError {
        SimpleException::new(Self::TypeError, ErrorCode::ClassInfo, [func.to_owned(), position.to_string()]).into()
    }

    #[must_use]
    pub(crate) fn type_error_str_expected(what: &str, type_name: &str) -> RunError {
        SimpleException::new(Self::TypeError, ErrorCode::StrExpected, [what, type_name]).into()
    }

    #[must_use]
    pub(crate) fn type_error_integer_expected(type_name: &str) -> RunError {
        SimpleException::new(Self::TypeError, ErrorCode::IntegerExpected, [type_name]).into()
    }

    #[must_use]
    pub(crate) fn type_error_join_item(index: usize, type_name: &str) -> RunError {
        SimpleException::new(Self::TypeError, ErrorCode::JoinItem, [index.to_string(), type_name.to_owned()]).into()
    }

    #[must_use]
    pub(crate) fn type_error_super_receiver() -> RunError {
        SimpleException::new(Self::TypeError, ErrorCode::SuperReceiver, [] as [&str; 0]).into()
    }

    #[must_use]
    pub(crate) fn type_error_property_name() -> RunError {
        SimpleException::new(Self::TypeError, ErrorCode::PropertyNameNotString, [] as [&str; 0]).into()
    }

    /// Creates a TypeError for a binary operator applied to incompatible operands.
    ///
    /// Format: `unsupported operand type(s) for {op}: '{left}' and '{right}'`
    #[must_use]
    pub(crate) fn binary_type_error(op: &str, left: &str, right: &str) -> RunError {
        SimpleException::new(Self::TypeError, ErrorCode::UnsupportedOperand, [op, left, right]).into()
    }

    #[must_use]
    pub(crate) fn unary_type_error(op: &str, operand: &str) -> RunError {
        SimpleException::new(Self::TypeError, ErrorCode::BadUnaryOperand, [op, operand]).into()
    }

    #[must_use]
    pub(crate) fn type_error_not_comparable(op: &str, left: &str, right: &str) -> RunError {
        SimpleException::new(Self::TypeError, ErrorCode::NotComparable, [op, left, right]).into()
    }

    #[must_use]
    pub(crate) fn type_error_not_a_class(type_name: &str) -> RunError {
        SimpleException::new(Self::TypeError, ErrorCode::NotAClass, [type_name]).into()
    }

    #[must_use]
    pub(crate) fn type_error_not_an_exception(type_name: &str) -> RunError {
        SimpleException::new(Self::TypeError, ErrorCode::NotAnException, [type_name]).into()
    }

    /// Creates a TypeError raised when a class hierarchy has no consistent C3 linearization.
    #[must_use]
    pub(crate) fn type_error_mro_conflict(class_name: &str) -> RunError {
        SimpleException::new(Self::TypeError, ErrorCode::MroConflict, [class_name]).into()
    }

    #[must_use]
    pub(crate) fn type_error_exception_roots(class_name: &str) -> RunError {
        SimpleException::new(Self::TypeError, ErrorCode::MultipleExceptionRoots, [class_name]).into()
    }

    #[must_use]
    pub(crate) fn type_error_no_init_args(class_name: &str) -> RunError {
        SimpleException::new(Self::TypeError, ErrorCode::NoConstructorArguments, [class_name]).into()
    }

    #[must_use]
    pub(crate) fn attribute_error(type_name: &str, attr: &str) -> RunError {
        SimpleException::new(Self::AttributeError, ErrorCode::AttributeNotFound, [type_name, attr]).into()
    }

    #[must_use]
    pub(crate) fn attribute_error_read_only(type_name: &str, attr: &str) -> RunError {
        SimpleException::new(Self::AttributeError, ErrorCode::AttributeReadOnly, [type_name, attr]).into()
    }

    /// Creates an IndexError for an out-of-range sequence index.
    #[must_use]
    pub(crate) fn index_error(type_name: &str) -> RunError {
        SimpleException::new(Self::IndexError, ErrorCode::IndexOutOfRange, [type_name]).into()
    }

    #[must_use]
    pub(crate) fn key_error(key_repr: &str) -> RunError {
        SimpleException::new(Self::KeyError, ErrorCode::KeyNotFound, [key_repr]).into()
    }

    #[must_use]
    pub(crate) fn zero_division() -> RunError {
        SimpleException::new(Self::ZeroDivisionError, ErrorCode::DivisionByZero, [] as [&str; 0]).into()
    }

    #[must_use]
    pub(crate) fn overflow() -> RunError {
        SimpleException::new(Self::OverflowError, ErrorCode::IntegerOverflow, [] as [&str; 0]).into()
    }

    #[must_use]
    pub(crate) fn value_error_slice_step_zero() -> RunError {
        SimpleException::new(Self::ValueError, ErrorCode::SliceStepZero, [] as [&str; 0]).into()
    }

    #[must_use]
    pub(crate) fn value_error_range_step_zero() -> RunError {
        SimpleException::new(Self::ValueError, ErrorCode::RangeStepZero, [] as [&str; 0]).into()
    }

    /// Creates a ValueError for an extended slice assignment with mismatched lengths.
    #[must_use]
    pub(crate) fn value_error_slice_size(given: usize, expected: usize) -> RunError {
        SimpleException::new(
            Self::ValueError,
            ErrorCode::SliceSizeMismatch,
            [given.to_string(), expected.to_string()],
        )
        .into()
    }

    /// Creates a ValueError for an unpack target count mismatch.
    #[must_use]
    pub(crate) fn value_error_unpack(expected: usize, actual: usize) -> RunError {
        SimpleException::new(
            Self::ValueError,
            ErrorCode::UnpackCount,
            [expected.to_string(), actual.to_string()],
        )
        .into()
    }

    #[must_use]
    pub(crate) fn value_error_negative_shift() -> RunError {
        SimpleException::new(Self::ValueError, ErrorCode::NegativeShift, [] as [&str; 0]).into()
    }

    #[must_use]
    pub(crate) fn value_error_byte_range() -> RunError {
        SimpleException::new(Self::ValueError, ErrorCode::ByteRange, [] as [&str; 0]).into()
    }

    #[must_use]
    pub(crate) fn value_error_empty_separator() -> RunError {
        SimpleException::new(Self::ValueError, ErrorCode::EmptySeparator, [] as [&str; 0]).into()
    }

    #[must_use]
    pub(crate) fn value_error_conversion(type_name: &str, text: &str) -> RunError {
        SimpleException::new(Self::ValueError, ErrorCode::ValueConversion, [type_name, text]).into()
    }

    #[must_use]
    pub(crate) fn value_error_empty(func: &str) -> RunError {
        SimpleException::new(Self::ValueError, ErrorCode::EmptySequence, [func]).into()
    }

    #[must_use]
    pub(crate) fn value_error_not_in_list() -> RunError {
        SimpleException::new(Self::ValueError, ErrorCode::NotInSequence, [] as [&str; 0]).into()
    }

    #[must_use]
    pub(crate) fn value_error_generator_running() -> RunError {
        SimpleException::new(Self::ValueError, ErrorCode::GeneratorRunning, [] as [&str; 0]).into()
    }

    /// Creates the StopIteration raised by exhausted iterators and finished generators.
    #[must_use]
    pub(crate) fn stop_iteration() -> RunError {
        SimpleException::new(Self::StopIteration, ErrorCode::IterationStopped, [] as [&str; 0]).into()
    }

    #[must_use]
    pub(crate) fn runtime_error_no_active_exception() -> RunError {
        SimpleException::new(Self::RuntimeError, ErrorCode::NoActiveException, [] as [&str; 0]).into()
    }

    #[must_use]
    pub(crate) fn runtime_error_super() -> RunError {
        SimpleException::new(Self::RuntimeError, ErrorCode::SuperWithoutArguments, [] as [&str; 0]).into()
    }

    #[must_use]
    pub(crate) fn module_not_found_error(module_name: &str) -> RunError {
        SimpleException::new(Self::ModuleNotFoundError, ErrorCode::ModuleNotFound, [module_name]).into()
    }

    #[must_use]
    pub(crate) fn import_error_name(name: &str, module_name: &str) -> RunError {
        SimpleException::new(Self::ImportError, ErrorCode::ImportName, [name, module_name]).into()
    }

    #[must_use]
    pub(crate) fn import_error_circular(module_name: &str) -> RunError {
        SimpleException::new(Self::ImportError, ErrorCode::CircularImport, [module_name]).into()
    }

    #[must_use]
    pub(crate) fn recursion_error(limit: usize) -> RunError {
        SimpleException::new(Self::RecursionError, ErrorCode::RecursionLimit, [limit.to_string()]).into()
    }

    #[must_use]
    pub(crate) fn nested_call_limit(limit: usize) -> RunError {
        SimpleException::new(Self::RecursionError, ErrorCode::NestedCallLimit, [limit.to_string()]).into()
    }

    #[must_use]
    pub(crate) fn timeout_error(limit: u64) -> RunError {
        SimpleException::new(Self::TimeoutError, ErrorCode::InstructionLimit, [limit.to_string()]).into()
    }

    #[must_use]
    pub(crate) fn eof_error() -> RunError {
        SimpleException::new(Self::EOFError, ErrorCode::InputUnavailable, [] as [&str; 0]).into()
    }
}

/// Stable numeric diagnostic codes.
///
/// Each code owns a message template where `{0}`, `{1}`, ... are replaced by the
/// string parameters carried with the exception. Discriminants are part of the
/// public diagnostic contract and must never be renumbered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, IntoStaticStr, Serialize, Deserialize)]
#[repr(u16)]
pub enum ErrorCode {
    /// Interpreter invariant violation; the single parameter is the internal message.
    Internal = 1,
    /// Exception raised by user code; parameters are the `str()` of each constructor argument.
    UserRaised = 2,

    UnknownIdentifier = 100,
    NonLocalNotFound = 101,

    TooManyArguments = 200,
    MissingArgument = 201,
    DuplicateArgument = 202,
    UnexpectedArgument = 203,
    ExpandNotIterable = 204,
    ExpandNotMapping = 205,
    ArgumentCount = 206,
    NoNamedArguments = 207,

    NotCallable = 300,
    NotIterable = 301,
    NotAnIterator = 302,
    AttributeNotFound = 303,
    AttributeReadOnly = 304,
    PropertyNameNotString = 305,
    NotSubscriptable = 306,
    ItemAssignment = 307,
    Unhashable = 308,
    IndexType = 309,
    NoLength = 310,
    ClassInfo = 311,
    StrExpected = 312,
    IntegerExpected = 313,
    JoinItem = 314,

    IndexOutOfRange = 400,
    KeyNotFound = 401,

    UnsupportedOperand = 500,
    BadUnaryOperand = 501,
    NotComparable = 502,
    DivisionByZero = 503,
    IntegerOverflow = 504,

    SliceStepZero = 600,
    SliceSizeMismatch = 601,
    UnpackCount = 602,
    ValueConversion = 603,
    EmptySequence = 604,
    NotInSequence = 605,
    RangeStepZero = 606,
    NegativeShift = 607,
    ByteRange = 608,
    EmptySeparator = 609,

    MroConflict = 700,
    MultipleExceptionRoots = 701,
    NotAClass = 702,
    NotAnException = 703,
    SuperWithoutArguments = 704,
    NoConstructorArguments = 705,
    SuperReceiver = 706,

    NoActiveException = 800,
    IterationStopped = 801,
    GeneratorRunning = 802,

    ModuleNotFound = 900,
    ImportName = 901,
    CircularImport = 902,

    RecursionLimit = 1000,
    InstructionLimit = 1001,
    NestedCallLimit = 1002,

    InputUnavailable = 1100,
}

impl ErrorCode {
    /// The stable numeric value of this code.
    #[must_use]
    pub fn number(self) -> u16 {
        self as u16
    }

    fn template(self) -> &'static str {
        match self {
            Self::Internal => "internal error: {0}",
            Self::UserRaised => "{0}",
            Self::UnknownIdentifier => "name '{0}' is not defined",
            Self::NonLocalNotFound => "no binding for nonlocal '{0}' found",
            Self::TooManyArguments => "{0}() takes {1} positional arguments but {2} were given",
            Self::MissingArgument => "{0}() missing required argument: '{1}'",
            Self::DuplicateArgument => "{0}() got multiple values for argument '{1}'",
            Self::UnexpectedArgument => "{0}() got an unexpected keyword argument '{1}'",
            Self::ExpandNotIterable => "{0}() argument after * must be an iterable, not {1}",
            Self::ExpandNotMapping => "argument after ** must be a mapping with string keys, not {0}",
            Self::ArgumentCount => "{0}() takes {1} arguments ({2} given)",
            Self::NoNamedArguments => "{0}() takes no keyword arguments",
            Self::NotCallable => "'{0}' object is not callable",
            Self::NotIterable => "'{0}' object is not iterable",
            Self::NotAnIterator => "'{0}' object is not an iterator",
            Self::AttributeNotFound => "'{0}' object has no attribute '{1}'",
            Self::AttributeReadOnly => "'{0}' object attribute '{1}' is read-only",
            Self::PropertyNameNotString => "attribute name must be string",
            Self::NotSubscriptable => "'{0}' object is not subscriptable",
            Self::ItemAssignment => "'{0}' object does not support item assignment",
            Self::Unhashable => "unhashable type: '{0}'",
            Self::IndexType => "{0} indices must be integers or slices, not {1}",
            Self::NoLength => "object of type '{0}' has no len()",
            Self::ClassInfo => "{0}() arg {1} must be a type or tuple of types",
            Self::StrExpected => "{0} must be None or a string, not {1}",
            Self::IntegerExpected => "'{0}' object cannot be interpreted as an integer",
            Self::JoinItem => "sequence item {0}: expected str instance, {1} found",
            Self::IndexOutOfRange => "{0} index out of range",
            Self::KeyNotFound => "{0}",
            Self::UnsupportedOperand => "unsupported operand type(s) for {0}: '{1}' and '{2}'",
            Self::BadUnaryOperand => "bad operand type for unary {0}: '{1}'",
            Self::NotComparable => "'{0}' not supported between instances of '{1}' and '{2}'",
            Self::DivisionByZero => "division by zero",
            Self::IntegerOverflow => "integer overflow",
            Self::SliceStepZero => "slice step cannot be zero",
            Self::SliceSizeMismatch => "attempt to assign sequence of size {0} to extended slice of size {1}",
            Self::UnpackCount => "expected {0} values to unpack, got {1}",
            Self::ValueConversion => "invalid literal for {0}(): '{1}'",
            Self::EmptySequence => "{0}() arg is an empty sequence",
            Self::NotInSequence => "value not in list",
            Self::RangeStepZero => "range() arg 3 must not be zero",
            Self::NegativeShift => "negative shift count",
            Self::ByteRange => "bytes must be in range(0, 256)",
            Self::EmptySeparator => "empty separator",
            Self::MroConflict => "cannot create a consistent method resolution order (MRO) for class {0}",
            Self::MultipleExceptionRoots => "class {0} inherits from multiple unrelated exception roots",
            Self::NotAClass => "'{0}' object is not a class",
            Self::NotAnException => "exceptions must derive from BaseException, not {0}",
            Self::SuperWithoutArguments => "super(): no arguments",
            Self::NoConstructorArguments => "{0}() takes no arguments",
            Self::SuperReceiver => "super(type, obj): obj must be an instance or subtype of type",
            Self::NoActiveException => "No active exception to reraise",
            Self::IterationStopped => "",
            Self::GeneratorRunning => "generator already executing",
            Self::ModuleNotFound => "No module named '{0}'",
            Self::ImportName => "cannot import name '{0}' from '{1}'",
            Self::CircularImport => "cannot import partially initialized module '{0}' (circular import)",
            Self::RecursionLimit => "maximum recursion depth exceeded ({0})",
            Self::InstructionLimit => "instruction limit of {0} exceeded",
            Self::NestedCallLimit => "maximum nested call depth exceeded ({0})",
            Self::InputUnavailable => "EOF when reading a line",
        }
    }

    /// Formats the message for this code with the given parameters.
    ///
    /// `UserRaised` follows the `str()` of an exception's args: no args gives an
    /// empty message, one arg gives that arg, several give a parenthesized list.
    #[must_use]
    pub fn format(self, params: &[String]) -> String {
        if self == Self::UserRaised {
            return match params {
                [] => String::new(),
                [single] => single.clone(),
                many => format!("({})", many.join(", ")),
            };
        }
        let mut message = self.template().to_owned();
        for (index, param) in params.iter().enumerate() {
            message = message.replace(&format!("{{{index}}}"), param);
        }
        message
    }
}

/// Lightweight exception descriptor produced by the interpreter itself.
///
/// Materialized into an instance of the matching builtin class only when it
/// reaches the exception machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimpleException {
    exc_type: ExcType,
    code: ErrorCode,
    params: Vec<String>,
}

impl SimpleException {
    pub fn new<S: Into<String>>(exc_type: ExcType, code: ErrorCode, params: impl IntoIterator<Item = S>) -> Self {
        Self {
            exc_type,
            code,
            params: params.into_iter().map(Into::into).collect(),
        }
    }

    #[must_use]
    pub fn exc_type(&self) -> ExcType {
        self.exc_type
    }

    #[must_use]
    pub fn code(&self) -> ErrorCode {
        self.code
    }

    #[must_use]
    pub fn params(&self) -> &[String] {
        &self.params
    }

    #[must_use]
    pub fn message(&self) -> String {
        self.code.format(&self.params)
    }
}

impl fmt::Display for SimpleException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let message = self.message();
        if message.is_empty() {
            write!(f, "{}", self.exc_type)
        } else {
            write!(f, "{}: {message}", self.exc_type)
        }
    }
}

/// Runtime error types that can occur during execution.
///
/// Every variant is routed through the exception machine; none escapes to the host.
#[derive(Debug, Clone)]
pub enum RunError {
    /// Internal interpreter error - indicates a malformed instruction stream or an engine bug.
    ///
    /// Converted into a `SystemError` exception at the dispatcher boundary.
    Internal(Cow<'static, str>),
    /// Exception produced by the interpreter, not yet materialized as an instance.
    Exc(Box<SimpleException>),
    /// Exception instance raised by user code (or already materialized).
    Raised(ExcRef),
}

impl RunError {
    pub(crate) fn internal(msg: impl Into<Cow<'static, str>>) -> Self {
        Self::Internal(msg.into())
    }

    /// The exception type of this error, without materializing it.
    #[must_use]
    pub fn exc_type(&self) -> ExcType {
        match self {
            Self::Internal(_) => ExcType::SystemError,
            Self::Exc(exc) => exc.exc_type,
            Self::Raised(instance) => instance.exc_type().unwrap_or(ExcType::SystemError),
        }
    }

    /// Whether this error is a StopIteration (or a subclass of it).
    #[must_use]
    pub fn is_stop_iteration(&self) -> bool {
        self.exc_type().is_subclass_of(ExcType::StopIteration)
    }
}

impl From<SimpleException> for RunError {
    fn from(exc: SimpleException) -> Self {
        Self::Exc(Box::new(exc))
    }
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Internal(msg) => write!(f, "SystemError: internal error: {msg}"),
            Self::Exc(exc) => write!(f, "{exc}"),
            Self::Raised(instance) => write!(f, "{}: {}", instance.class().name(), instance.exception_message()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hierarchy_walks_to_base_exception() {
        assert!(ExcType::ZeroDivisionError.is_subclass_of(ExcType::ArithmeticError));
        assert!(ExcType::ZeroDivisionError.is_subclass_of(ExcType::Exception));
        assert!(ExcType::KeyError.is_subclass_of(ExcType::BaseException));
        assert!(!ExcType::KeyboardInterrupt.is_subclass_of(ExcType::Exception));
        assert!(!ExcType::KeyError.is_subclass_of(ExcType::IndexError));
    }

    #[test]
    fn templates_substitute_parameters() {
        let exc = SimpleException::new(ExcType::TypeError, ErrorCode::DuplicateArgument, ["f", "b"]);
        assert_eq!(exc.message(), "f() got multiple values for argument 'b'");
        assert_eq!(exc.to_string(), "TypeError: f() got multiple values for argument 'b'");
        assert_eq!(ErrorCode::DuplicateArgument.number(), 202);
    }

    #[test]
    fn user_raised_formats_like_args() {
        assert_eq!(ErrorCode::UserRaised.format(&[]), "");
        assert_eq!(ErrorCode::UserRaised.format(&["boom".to_owned()]), "boom");
        assert_eq!(ErrorCode::UserRaised.format(&["1".to_owned(), "2".to_owned()]), "(1, 2)");
    }
}
