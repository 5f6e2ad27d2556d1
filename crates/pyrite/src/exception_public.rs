use std::fmt;

use crate::{
    exception_private::{ErrorCode, ExcType},
    types::ExcRef,
    value::Value,
};

/// An exception as seen by the host.
///
/// Produced for completion callbacks and [`crate::Interpreter::unhandled_exception`].
/// Keeps the exception value itself so the host can inspect user attributes.
#[derive(Debug, Clone)]
pub struct ExceptionInfo {
    exc_type: ExcType,
    class_name: String,
    code: ErrorCode,
    params: Vec<String>,
    value: Value,
}

impl ExceptionInfo {
    pub(crate) fn from_instance(exc: &ExcRef) -> Self {
        Self {
            exc_type: exc.exc_type().unwrap_or(ExcType::SystemError),
            class_name: exc.class().name().to_owned(),
            code: exc.exception_code().unwrap_or(ErrorCode::Internal),
            params: exc.exception_params(),
            value: Value::Exception(exc.clone()),
        }
    }

    /// The builtin exception type the raised class derives from.
    #[must_use]
    pub fn exc_type(&self) -> ExcType {
        self.exc_type
    }

    /// Name of the raised class, which may be a user subclass.
    #[must_use]
    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    /// Stable diagnostic code.
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

    #[must_use]
    pub fn value(&self) -> &Value {
        &self.value
    }
}

impl fmt::Display for ExceptionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let message = self.message();
        if message.is_empty() {
            write!(f, "{}", self.class_name)
        } else {
            write!(f, "{}: {message}", self.class_name)
        }
    }
}

impl std::error::Error for ExceptionInfo {}
