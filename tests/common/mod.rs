//! Shared fixtures for integration tests: request and response types, the
//! handlers used across scenarios, and registry builders.

#![allow(dead_code)] // Each test binary uses a different subset

pub mod handlers;
pub mod strategies;

pub use handlers::*;

use async_trait::async_trait;
use parking_lot::Mutex;
use pipeline_dispatch::handler::HandlerInstance;
use pipeline_dispatch::registry::BoundHandler;
use pipeline_dispatch::{
    DispatchResult, HandlerDescriptor, HandlerRegistry, HandlerScope, RegistryBuilder,
    ResolutionScope, ScopeFactory, TypeCatalog, TypeParam, TypePattern,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// Capability: the request can check its own required fields.
pub trait Validate: Send {
    fn validate(&self) -> Result<(), String>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginRequest {
    pub username: Option<String>,
    pub password: Option<String>,
}

impl LoginRequest {
    pub fn new(username: &str, password: &str) -> Self {
        Self {
            username: Some(username.to_string()),
            password: Some(password.to_string()),
        }
    }

    pub fn without_password(username: &str) -> Self {
        Self {
            username: Some(username.to_string()),
            password: None,
        }
    }
}

impl Validate for LoginRequest {
    fn validate(&self) -> Result<(), String> {
        match (&self.username, &self.password) {
            (Some(username), _) if username.is_empty() => Err("username is required".to_string()),
            (None, _) => Err("username is required".to_string()),
            (_, None) => Err("password is required".to_string()),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignupRequest {
    pub email: String,
}

impl Validate for SignupRequest {
    fn validate(&self) -> Result<(), String> {
        if self.email.contains('@') {
            Ok(())
        } else {
            Err(format!("'{}' is not an email address", self.email))
        }
    }
}

/// Request whose final handler always fails.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExplodeRequest {
    pub code: u32,
}

/// Request whose final handler panics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PanicRequest;

/// Request no final handler accepts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrphanRequest;

#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Value,
}

impl ApiResponse {
    pub fn ok(body: Value) -> Self {
        Self { status: 200, body }
    }

    pub fn bad_request(reason: impl Into<String>) -> Self {
        Self {
            status: 400,
            body: json!({ "error": reason.into() }),
        }
    }

    pub fn internal_error(reason: impl Into<String>) -> Self {
        Self {
            status: 500,
            body: json!({ "error": reason.into() }),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Ordered record of which handlers ran, shared by every handler of a registry.
#[derive(Debug, Clone, Default)]
pub struct ExecutionLog(Arc<Mutex<Vec<String>>>);

impl ExecutionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, entry: impl Into<String>) {
        self.0.lock().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().clone()
    }

    pub fn is_empty(&self) -> bool {
        self.0.lock().is_empty()
    }

    pub fn clear(&self) {
        self.0.lock().clear();
    }
}

pub fn describe_requests(catalog: &mut TypeCatalog) {
    catalog.describe::<LoginRequest>().tagged::<dyn Validate>();
    catalog.describe::<SignupRequest>().tagged::<dyn Validate>();
}

/// `ValidationHandler<T>`: pipe `T -> ApiResponse` forwarding `T -> ApiResponse`,
/// for any `T` advertising `dyn Validate`.
pub fn validation_descriptor(log: &ExecutionLog) -> HandlerDescriptor {
    let login_log = log.clone();
    let signup_log = log.clone();
    HandlerDescriptor::pipe(
        "validation",
        TypePattern::param("T"),
        TypePattern::exact::<ApiResponse>(),
        TypePattern::param("T"),
        TypePattern::exact::<ApiResponse>(),
    )
    .with_param(TypeParam::new("T").bounded_by::<dyn Validate>())
    .close_pipe(move || ValidationHandler::<LoginRequest>::new(login_log.clone()))
    .close_pipe(move || ValidationHandler::<SignupRequest>::new(signup_log.clone()))
}

/// `FinalEcho<T>`: terminal `T -> ApiResponse` echoing the request as the body.
pub fn echo_descriptor(log: &ExecutionLog) -> HandlerDescriptor {
    let login_log = log.clone();
    let signup_log = log.clone();
    let explode_log = log.clone();
    HandlerDescriptor::terminal(
        "echo",
        TypePattern::param("T"),
        TypePattern::exact::<ApiResponse>(),
    )
    .close_final(move || FinalEcho::<LoginRequest>::new(login_log.clone()))
    .close_final(move || FinalEcho::<SignupRequest>::new(signup_log.clone()))
    .close_final(move || FinalEcho::<ExplodeRequest>::new(explode_log.clone()))
}

pub fn compose_descriptor(log: &ExecutionLog) -> HandlerDescriptor {
    let log = log.clone();
    HandlerDescriptor::for_pipe("compose", move || ComposeHandler::new(log.clone()))
}

/// `[validation -> echo]`
pub fn login_registry(log: &ExecutionLog) -> HandlerRegistry {
    RegistryBuilder::new()
        .describe_types(describe_requests)
        .register(validation_descriptor(log))
        .register(echo_descriptor(log))
        .build()
        .expect("login registry")
}

/// `[validation -> compose -> echo]`
pub fn composed_registry(log: &ExecutionLog) -> HandlerRegistry {
    RegistryBuilder::new()
        .describe_types(describe_requests)
        .register(validation_descriptor(log))
        .register(compose_descriptor(log))
        .register(echo_descriptor(log))
        .build()
        .expect("composed registry")
}

/// Faulting terminal, optionally behind an exception boundary.
pub fn faulting_registry(log: &ExecutionLog, with_boundary: bool) -> HandlerRegistry {
    let mut builder = RegistryBuilder::new();
    if with_boundary {
        let boundary_log = log.clone();
        builder.add(HandlerDescriptor::for_pipe("exception-boundary", move || {
            ExceptionBoundary::<ExplodeRequest>::new(boundary_log.clone())
        }));
    }
    let final_log = log.clone();
    let panic_log = log.clone();
    builder
        .register(HandlerDescriptor::for_final("faulty", move || {
            FaultyFinal::new(final_log.clone())
        }))
        .register(HandlerDescriptor::for_final("panicking", move || {
            PanickingFinal::new(panic_log.clone())
        }))
        .build()
        .expect("faulting registry")
}

/// Scope creation and disposal counts.
#[derive(Debug, Default)]
pub struct ScopeCounters {
    pub created: AtomicUsize,
    pub disposed: AtomicUsize,
}

impl ScopeCounters {
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn disposed(&self) -> usize {
        self.disposed.load(Ordering::SeqCst)
    }
}

/// Scope factory counting how many scopes were created and disposed.
#[derive(Debug, Clone, Default)]
pub struct TrackingScopeFactory {
    pub counters: Arc<ScopeCounters>,
}

impl TrackingScopeFactory {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ScopeFactory for TrackingScopeFactory {
    fn create_scope(&self) -> Arc<dyn ResolutionScope> {
        self.counters.created.fetch_add(1, Ordering::SeqCst);
        Arc::new(TrackingScope {
            inner: HandlerScope::new(),
            counters: Arc::clone(&self.counters),
        })
    }
}

struct TrackingScope {
    inner: HandlerScope,
    counters: Arc<ScopeCounters>,
}

#[async_trait]
impl ResolutionScope for TrackingScope {
    fn id(&self) -> Uuid {
        self.inner.id()
    }

    fn resolve(&self, handler: &BoundHandler) -> DispatchResult<Arc<dyn HandlerInstance>> {
        self.inner.resolve(handler)
    }

    async fn dispose(&self) {
        if !self.inner.is_disposed() {
            self.counters.disposed.fetch_add(1, Ordering::SeqCst);
        }
        self.inner.dispose().await;
    }
}
