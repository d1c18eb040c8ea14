//! # Error Types
//!
//! Structured errors for chain resolution, registry configuration and dispatch.
//!
//! Handler code returns [`HandlerResult`], an `anyhow` result, so faults raised
//! deep inside a pipeline reach the caller of
//! [`Dispatcher::send`](crate::Dispatcher::send) unmodified. The core's own
//! failures are [`DispatchError`] variants.

use crate::types::TypeTag;
use thiserror::Error;

/// Result type used by handler implementations and continuations.
pub type HandlerResult<T> = anyhow::Result<T>;

/// Result type for dispatcher operations.
pub type DispatchResult<T> = Result<T, DispatchError>;

/// Result type for registry and configuration operations.
pub type ConfigResult<T> = Result<T, ConfigurationError>;

/// No handler chain can be completed for a `(request, response)` pair.
///
/// Raised on first use of the pair and memoized: the registry is frozen, so
/// building the same pair again would fail the same way.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error(
    "No handler chain resolves {request} -> {response}: nothing matches {stuck_request} -> {stuck_response}{}",
    format_resolved(.resolved)
)]
pub struct ResolutionError {
    /// Request type the caller dispatched
    pub request: TypeTag,
    /// Response type the caller expected
    pub response: TypeTag,
    /// Request side of the pair no remaining descriptor could service
    pub stuck_request: TypeTag,
    /// Response side of the pair no remaining descriptor could service
    pub stuck_response: TypeTag,
    /// Descriptor names already linked before the builder got stuck
    pub resolved: Vec<String>,
}

impl ResolutionError {
    /// Create an error for a pair that got stuck at `stuck`.
    #[must_use]
    pub fn new(
        request: TypeTag,
        response: TypeTag,
        stuck_request: TypeTag,
        stuck_response: TypeTag,
    ) -> Self {
        Self {
            request,
            response,
            stuck_request,
            stuck_response,
            resolved: Vec::new(),
        }
    }

    /// Record the descriptors linked before resolution got stuck.
    #[must_use]
    pub fn with_resolved(mut self, resolved: Vec<String>) -> Self {
        self.resolved = resolved;
        self
    }

    /// Whether resolution failed before linking any handler.
    pub fn is_unmatched_entry(&self) -> bool {
        self.resolved.is_empty()
    }
}

fn format_resolved(resolved: &[String]) -> String {
    if resolved.is_empty() {
        String::new()
    } else {
        format!(" (after {})", resolved.join(" -> "))
    }
}

/// Registry assembly and configuration loading failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    /// A closed handler's concrete types do not fit its descriptor's patterns
    #[error("Handler {handler} does not fit descriptor '{descriptor}': {reason}")]
    ClosureMismatch {
        descriptor: String,
        handler: &'static str,
        reason: String,
    },

    /// A closed handler leaves a declared type parameter unbound
    #[error("Handler {handler} leaves parameter '{parameter}' of descriptor '{descriptor}' unbound")]
    UnboundParameter {
        descriptor: String,
        handler: &'static str,
        parameter: &'static str,
    },

    /// A bound type does not advertise a capability its parameter requires
    #[error("Type {bound} bound to '{parameter}' in descriptor '{descriptor}' does not satisfy {capability}")]
    UnsatisfiedBound {
        descriptor: String,
        parameter: &'static str,
        bound: TypeTag,
        capability: TypeTag,
    },

    /// Two closed handlers of one descriptor produce the same binding
    #[error("Descriptor '{descriptor}' closes the same bindings twice ({handler})")]
    DuplicateClosure {
        descriptor: String,
        handler: &'static str,
    },

    /// A descriptor has open parameters but no closed implementation
    #[error("Descriptor '{0}' has no closed handler implementations")]
    NoClosedForms(String),

    /// An override rule resolves to a type that cannot become the expected type
    #[error("Override {request} -> {expected} resolves to {resolved}, which has no conversion to {expected}")]
    UnconvertibleOverride {
        request: TypeTag,
        expected: TypeTag,
        resolved: TypeTag,
    },

    /// Two override rules claim the same pair
    #[error("Override for {request} -> {expected} is registered twice")]
    DuplicateOverride { request: TypeTag, expected: TypeTag },

    /// Configuration source could not be loaded or deserialized
    #[error("Failed to load configuration: {0}")]
    Load(String),

    /// A configuration value is out of range
    #[error("Invalid configuration value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

impl From<config::ConfigError> for ConfigurationError {
    fn from(error: config::ConfigError) -> Self {
        ConfigurationError::Load(error.to_string())
    }
}

/// Errors surfaced by [`Dispatcher`](crate::Dispatcher) operations.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// No chain connects the request to the response
    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    /// The registry or configuration is invalid
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    /// A handler returned an error; the original fault is kept as-is
    #[error(transparent)]
    Handler(anyhow::Error),

    /// A handler panicked while the dispatcher was catching panics
    #[error("Handler panicked during dispatch of {request}: {message}")]
    HandlerPanicked { request: TypeTag, message: String },

    /// A value did not have the type the receiving side expected
    #[error("Payload mismatch in {context}: expected {expected}")]
    PayloadMismatch {
        expected: &'static str,
        context: String,
    },

    /// A pipe handler was invoked without its continuation
    #[error("Pipe handler {0} was invoked without a continuation")]
    MissingContinuation(&'static str),

    /// A resolution scope was used after it was disposed
    #[error("Resolution scope {0} is already disposed")]
    ScopeDisposed(uuid::Uuid),

    /// The scope could not produce an instance of the handler type
    #[error("Resolution scope cannot create handler {0}")]
    Unresolvable(TypeTag),

    /// A continuation outlived the chain it was built for
    #[error("Continuation outlived its chain")]
    ChainReleased,

    /// The executor was asked to run a link that does not exist
    #[error("Chain for {chain} has no link at index {index}")]
    LinkOutOfRange { chain: String, index: usize },
}

impl DispatchError {
    /// Lift an error returned through a handler back into a dispatch error.
    ///
    /// Errors the core raised while running a chain travel through handler
    /// results as `anyhow` errors; they come back out as their original
    /// variant. Anything else is a handler fault.
    pub fn from_handler(error: anyhow::Error) -> Self {
        match error.downcast::<DispatchError>() {
            Ok(dispatch_error) => dispatch_error,
            Err(fault) => DispatchError::Handler(fault),
        }
    }

    /// The handler fault, if this error is one.
    pub fn handler_fault(&self) -> Option<&anyhow::Error> {
        match self {
            DispatchError::Handler(fault) => Some(fault),
            _ => None,
        }
    }

    /// Whether this is a resolution (configuration-class) failure.
    pub fn is_resolution(&self) -> bool {
        matches!(self, DispatchError::Resolution(_))
    }

    pub(crate) fn payload_mismatch<T: ?Sized>(context: impl Into<String>) -> Self {
        DispatchError::PayloadMismatch {
            expected: std::any::type_name::<T>(),
            context: context.into(),
        }
    }
}
