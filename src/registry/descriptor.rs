//! # Handler Descriptors
//!
//! A [`HandlerDescriptor`] declares a handling capability: the request it
//! accepts, the response it returns and, for pipe handlers, the request and
//! response it forwards to the rest of the chain. Slots are [`TypePattern`]s,
//! so one descriptor can describe an open generic handler such as
//! `ValidationHandler<T>`.
//!
//! Rust monomorphizes generics at compile time, so an open descriptor carries
//! an explicit table of **closed factories**, one per concrete instantiation,
//! keyed by the binding vector of its parameters. The table is indexed when
//! the registry is frozen.
//!
//! ```rust,ignore
//! let validation = HandlerDescriptor::pipe(
//!     "validation",
//!     TypePattern::param("T"),
//!     TypePattern::exact::<ApiResponse>(),
//!     TypePattern::param("T"),
//!     TypePattern::exact::<ApiResponse>(),
//! )
//! .with_param(TypeParam::new("T").bounded_by::<dyn Validate>())
//! .close_pipe(ValidationHandler::<LoginRequest>::default)
//! .close_pipe(ValidationHandler::<SignupRequest>::default);
//! ```

use crate::error::{ConfigResult, ConfigurationError};
use crate::handler::adapter::{FinalAdapter, PipeAdapter};
use crate::handler::{FinalHandler, HandlerInstance, PipeHandler};
use crate::types::{unify, Bindings, TypeCatalog, TypeParam, TypePattern, TypeTag};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

type InstanceFactory = dyn Fn() -> Arc<dyn HandlerInstance> + Send + Sync;

/// A closed, concrete handler implementation selected for a chain position.
#[derive(Clone)]
pub struct BoundHandler {
    descriptor: Arc<str>,
    handler_type: TypeTag,
    request: TypeTag,
    response: TypeTag,
    forward: Option<(TypeTag, TypeTag)>,
    factory: Arc<InstanceFactory>,
}

impl BoundHandler {
    fn pipe<H, F>(descriptor: Arc<str>, factory: F) -> Self
    where
        H: PipeHandler,
        F: Fn() -> H + Send + Sync + 'static,
    {
        Self {
            descriptor,
            handler_type: TypeTag::of::<H>(),
            request: TypeTag::of::<H::Request>(),
            response: TypeTag::of::<H::Response>(),
            forward: Some((
                TypeTag::of::<H::NextRequest>(),
                TypeTag::of::<H::NextResponse>(),
            )),
            factory: Arc::new(move || Arc::new(PipeAdapter(factory())) as Arc<dyn HandlerInstance>),
        }
    }

    fn terminal<H, F>(descriptor: Arc<str>, factory: F) -> Self
    where
        H: FinalHandler,
        F: Fn() -> H + Send + Sync + 'static,
    {
        Self {
            descriptor,
            handler_type: TypeTag::of::<H>(),
            request: TypeTag::of::<H::Request>(),
            response: TypeTag::of::<H::Response>(),
            forward: None,
            factory: Arc::new(move || Arc::new(FinalAdapter(factory())) as Arc<dyn HandlerInstance>),
        }
    }

    /// Name of the descriptor this handler closes.
    pub fn descriptor(&self) -> &str {
        &self.descriptor
    }

    /// Concrete handler type.
    pub fn handler_type(&self) -> TypeTag {
        self.handler_type
    }

    /// Concrete request type.
    pub fn request(&self) -> TypeTag {
        self.request
    }

    /// Concrete response type.
    pub fn response(&self) -> TypeTag {
        self.response
    }

    /// Concrete forwarded `(request, response)`; `None` for final handlers.
    pub fn forward(&self) -> Option<(TypeTag, TypeTag)> {
        self.forward
    }

    /// Whether this is a final handler.
    pub fn is_terminal(&self) -> bool {
        self.forward.is_none()
    }

    /// Create a new, type-erased instance of the handler.
    pub fn instantiate(&self) -> Arc<dyn HandlerInstance> {
        (self.factory)()
    }
}

impl fmt::Debug for BoundHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundHandler")
            .field("descriptor", &self.descriptor)
            .field("handler_type", &self.handler_type)
            .field("request", &self.request)
            .field("response", &self.response)
            .field("forward", &self.forward)
            .finish()
    }
}

/// Declared handling capability of a handler.
#[derive(Debug, Clone)]
pub struct HandlerDescriptor {
    name: Arc<str>,
    params: Vec<TypeParam>,
    request_in: TypePattern,
    response_out: TypePattern,
    forward: Option<(TypePattern, TypePattern)>,
    closures: Vec<BoundHandler>,
    /// Binding vector -> index into `closures`; filled by `freeze`
    closed: HashMap<Vec<TypeTag>, usize>,
}

impl HandlerDescriptor {
    fn new(
        name: &str,
        request_in: TypePattern,
        response_out: TypePattern,
        forward: Option<(TypePattern, TypePattern)>,
    ) -> Self {
        let mut names = Vec::new();
        request_in.collect_params(&mut names);
        response_out.collect_params(&mut names);
        if let Some((next_request, next_response)) = &forward {
            next_request.collect_params(&mut names);
            next_response.collect_params(&mut names);
        }

        Self {
            name: Arc::from(name),
            params: names.into_iter().map(TypeParam::new).collect(),
            request_in,
            response_out,
            forward,
            closures: Vec::new(),
            closed: HashMap::new(),
        }
    }

    /// Descriptor of a pipe handler.
    ///
    /// Parameters mentioned in the patterns are declared automatically, in
    /// order of first appearance; use [`with_param`](Self::with_param) to add
    /// bounds.
    pub fn pipe(
        name: &str,
        request_in: TypePattern,
        response_out: TypePattern,
        next_request: TypePattern,
        next_response: TypePattern,
    ) -> Self {
        Self::new(name, request_in, response_out, Some((next_request, next_response)))
    }

    /// Descriptor of a final handler.
    pub fn terminal(name: &str, request_in: TypePattern, response_out: TypePattern) -> Self {
        Self::new(name, request_in, response_out, None)
    }

    /// Non-generic descriptor for pipe handler `H`, closed by `factory`.
    pub fn for_pipe<H, F>(name: &str, factory: F) -> Self
    where
        H: PipeHandler,
        F: Fn() -> H + Send + Sync + 'static,
    {
        Self::pipe(
            name,
            TypePattern::exact::<H::Request>(),
            TypePattern::exact::<H::Response>(),
            TypePattern::exact::<H::NextRequest>(),
            TypePattern::exact::<H::NextResponse>(),
        )
        .close_pipe(factory)
    }

    /// Non-generic descriptor for final handler `H`, closed by `factory`.
    pub fn for_final<H, F>(name: &str, factory: F) -> Self
    where
        H: FinalHandler,
        F: Fn() -> H + Send + Sync + 'static,
    {
        Self::terminal(
            name,
            TypePattern::exact::<H::Request>(),
            TypePattern::exact::<H::Response>(),
        )
        .close_final(factory)
    }

    /// Declare (or re-declare with bounds) an open parameter.
    #[must_use]
    pub fn with_param(mut self, param: TypeParam) -> Self {
        match self
            .params
            .iter_mut()
            .find(|existing| existing.name() == param.name())
        {
            Some(existing) => *existing = param,
            None => self.params.push(param),
        }
        self
    }

    /// Add a closed pipe implementation.
    #[must_use]
    pub fn close_pipe<H, F>(mut self, factory: F) -> Self
    where
        H: PipeHandler,
        F: Fn() -> H + Send + Sync + 'static,
    {
        let bound = BoundHandler::pipe(Arc::clone(&self.name), factory);
        self.closures.push(bound);
        self
    }

    /// Add a closed final implementation.
    #[must_use]
    pub fn close_final<H, F>(mut self, factory: F) -> Self
    where
        H: FinalHandler,
        F: Fn() -> H + Send + Sync + 'static,
    {
        let bound = BoundHandler::terminal(Arc::clone(&self.name), factory);
        self.closures.push(bound);
        self
    }

    /// Descriptor name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared open parameters.
    pub fn params(&self) -> &[TypeParam] {
        &self.params
    }

    /// Accepted request pattern.
    pub fn request_in(&self) -> &TypePattern {
        &self.request_in
    }

    /// Returned response pattern.
    pub fn response_out(&self) -> &TypePattern {
        &self.response_out
    }

    /// Forwarded `(request, response)` patterns; `None` for final handlers.
    pub fn forward(&self) -> Option<(&TypePattern, &TypePattern)> {
        self.forward
            .as_ref()
            .map(|(request, response)| (request, response))
    }

    /// Whether this descriptor delegates to a continuation.
    pub fn is_pipe(&self) -> bool {
        self.forward.is_some()
    }

    /// Whether this descriptor has open parameters.
    pub fn is_open(&self) -> bool {
        !self.params.is_empty()
    }

    /// All closed implementations, in registration order.
    pub fn closed_forms(&self) -> &[BoundHandler] {
        &self.closures
    }

    /// Closed implementation for a binding vector.
    pub fn closed_for(&self, bindings: &[TypeTag]) -> Option<&BoundHandler> {
        self.closed
            .get(bindings)
            .and_then(|index| self.closures.get(*index))
    }

    /// Validate every closed implementation against the patterns and index
    /// it by its binding vector.
    pub(crate) fn freeze(&mut self, catalog: &TypeCatalog) -> ConfigResult<()> {
        if self.closures.is_empty() {
            return Err(ConfigurationError::NoClosedForms(self.name.to_string()));
        }

        self.closed.clear();
        for (index, closure) in self.closures.iter().enumerate() {
            let bindings = self.bind_closure(closure, catalog)?;
            let vector = self.binding_vector(closure, &bindings)?;
            self.check_bounds(&vector, catalog)?;

            if self.closed.insert(vector, index).is_some() {
                return Err(ConfigurationError::DuplicateClosure {
                    descriptor: self.name.to_string(),
                    handler: closure.handler_type().name(),
                });
            }
        }
        Ok(())
    }

    fn bind_closure(&self, closure: &BoundHandler, catalog: &TypeCatalog) -> ConfigResult<Bindings> {
        let mismatch = |reason: String| ConfigurationError::ClosureMismatch {
            descriptor: self.name.to_string(),
            handler: closure.handler_type().name(),
            reason,
        };

        let mut bindings = Bindings::new();
        if !unify(&self.request_in, closure.request(), catalog, &mut bindings) {
            return Err(mismatch(format!(
                "request {} does not fit {}",
                closure.request(),
                self.request_in
            )));
        }
        if !unify(&self.response_out, closure.response(), catalog, &mut bindings) {
            return Err(mismatch(format!(
                "response {} does not fit {}",
                closure.response(),
                self.response_out
            )));
        }

        match (&self.forward, closure.forward()) {
            (None, None) => {}
            (Some((next_request, next_response)), Some((request, response))) => {
                if !unify(next_request, request, catalog, &mut bindings) {
                    return Err(mismatch(format!(
                        "forwarded request {request} does not fit {next_request}"
                    )));
                }
                if !unify(next_response, response, catalog, &mut bindings) {
                    return Err(mismatch(format!(
                        "forwarded response {response} does not fit {next_response}"
                    )));
                }
            }
            (Some(_), None) => {
                return Err(mismatch("final handler closes a pipe descriptor".to_string()))
            }
            (None, Some(_)) => {
                return Err(mismatch("pipe handler closes a final descriptor".to_string()))
            }
        }
        Ok(bindings)
    }

    fn binding_vector(&self, closure: &BoundHandler, bindings: &Bindings) -> ConfigResult<Vec<TypeTag>> {
        self.params
            .iter()
            .map(|param| {
                bindings
                    .get(param.name())
                    .ok_or_else(|| ConfigurationError::UnboundParameter {
                        descriptor: self.name.to_string(),
                        handler: closure.handler_type().name(),
                        parameter: param.name(),
                    })
            })
            .collect()
    }

    fn check_bounds(&self, vector: &[TypeTag], catalog: &TypeCatalog) -> ConfigResult<()> {
        for (param, bound) in self.params.iter().zip(vector) {
            if let Some(capability) = param
                .bounds()
                .iter()
                .find(|capability| !catalog.satisfies(*bound, **capability))
            {
                return Err(ConfigurationError::UnsatisfiedBound {
                    descriptor: self.name.to_string(),
                    parameter: param.name(),
                    bound: *bound,
                    capability: *capability,
                });
            }
        }
        Ok(())
    }
}
