/// Recommended maximum call depth if not otherwise specified.
pub const DEFAULT_MAX_CALL_DEPTH: usize = 1000;

/// Default bound on native code re-entering the VM (e.g. `sorted` calling a `key=` function).
///
/// Every level re-enters the dispatcher on the native stack, so this must stay
/// low enough to fit a 2 MiB thread stack in unoptimized builds.
pub const DEFAULT_MAX_NESTED_CALLS: usize = 32;

/// Configuration for resource limits.
///
/// Exceeding a limit raises a language exception (`RecursionError` or
/// `TimeoutError`) that user code may catch; the run is never aborted from
/// the outside.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ResourceLimits {
    /// Maximum number of active function frames.
    pub max_call_depth: usize,
    /// Maximum number of instructions executed over the life of a run.
    pub max_instructions: Option<u64>,
    /// Maximum nesting of native functions calling back into the VM.
    pub max_nested_calls: usize,
    /// Number of output lines retained for [`crate::Interpreter::output`]; `None` keeps all.
    pub output_log_limit: Option<usize>,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
            max_instructions: None,
            max_nested_calls: DEFAULT_MAX_NESTED_CALLS,
            output_log_limit: None,
        }
    }
}

impl ResourceLimits {
    /// Creates limits with the defaults above.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum call depth.
    #[must_use]
    pub fn max_call_depth(mut self, limit: usize) -> Self {
        self.max_call_depth = limit;
        self
    }

    /// Sets the maximum number of executed instructions.
    #[must_use]
    pub fn max_instructions(mut self, limit: u64) -> Self {
        self.max_instructions = Some(limit);
        self
    }

    #[must_use]
    pub fn max_nested_calls(mut self, limit: usize) -> Self {
        self.max_nested_calls = limit;
        self
    }

    #[must_use]
    pub fn output_log_limit(mut self, limit: usize) -> Self {
        self.output_log_limit = Some(limit);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limits_deserialize_from_json() {
        let limits: ResourceLimits = serde_json::from_str(
            r#"{"max_call_depth": 50, "max_instructions": 1000, "max_nested_calls": 10, "output_log_limit": null}"#,
        )
        .unwrap();
        assert_eq!(
            limits,
            ResourceLimits::new()
                .max_call_depth(50)
                .max_instructions(1000)
                .max_nested_calls(10)
        );
    }
}
