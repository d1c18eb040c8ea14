//! # Resolution Scopes
//!
//! The boundary to whatever container owns handler lifetimes. A dispatch
//! resolves every handler of its chain from one [`ResolutionScope`] and
//! disposes the scope when the dispatch ends.
//!
//! [`DefaultScopeFactory`] produces [`HandlerScope`]s: one instance per
//! handler type per scope, created on first resolve from the handler's
//! registered factory, dropped on dispose.

use crate::error::{DispatchError, DispatchResult};
use crate::handler::HandlerInstance;
use crate::registry::BoundHandler;
use crate::types::TypeTag;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// A scope handler instances are resolved from.
#[async_trait]
pub trait ResolutionScope: Send + Sync {
    /// Identifier used in logs.
    fn id(&self) -> Uuid;

    /// Resolve an instance of the closed handler.
    ///
    /// # Errors
    ///
    /// [`DispatchError::ScopeDisposed`] once the scope is disposed, or
    /// [`DispatchError::Unresolvable`] when the scope cannot build the type.
    fn resolve(&self, handler: &BoundHandler) -> DispatchResult<Arc<dyn HandlerInstance>>;

    /// Release every instance the scope created. Idempotent.
    async fn dispose(&self);
}

/// Creates a fresh scope per dispatch.
pub trait ScopeFactory: Send + Sync {
    fn create_scope(&self) -> Arc<dyn ResolutionScope>;
}

/// Factory for [`HandlerScope`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultScopeFactory;

impl DefaultScopeFactory {
    pub fn new() -> Self {
        Self
    }
}

impl ScopeFactory for DefaultScopeFactory {
    fn create_scope(&self) -> Arc<dyn ResolutionScope> {
        Arc::new(HandlerScope::new())
    }
}

/// In-memory scope caching one instance per handler type.
pub struct HandlerScope {
    id: Uuid,
    instances: Mutex<HashMap<TypeTag, Arc<dyn HandlerInstance>>>,
    disposed: AtomicBool,
}

impl HandlerScope {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            instances: Mutex::new(HashMap::new()),
            disposed: AtomicBool::new(false),
        }
    }

    /// Number of instances created so far.
    pub fn instance_count(&self) -> usize {
        self.instances.lock().len()
    }

    /// Whether [`ResolutionScope::dispose`] has run.
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }
}

impl Default for HandlerScope {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for HandlerScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerScope")
            .field("id", &self.id)
            .field("instances", &self.instance_count())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

#[async_trait]
impl ResolutionScope for HandlerScope {
    fn id(&self) -> Uuid {
        self.id
    }

    fn resolve(&self, handler: &BoundHandler) -> DispatchResult<Arc<dyn HandlerInstance>> {
        if self.is_disposed() {
            return Err(DispatchError::ScopeDisposed(self.id));
        }
        let mut instances = self.instances.lock();
        let instance = instances
            .entry(handler.handler_type())
            .or_insert_with(|| handler.instantiate());
        Ok(Arc::clone(instance))
    }

    async fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        let released = std::mem::take(&mut *self.instances.lock());
        debug!(scope_id = %self.id, instances = released.len(), "Scope disposed");
    }
}
