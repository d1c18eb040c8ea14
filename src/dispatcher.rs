//! # Dispatcher
//!
//! Entry point of the crate: sends a request through the chain resolved for
//! its `(request, expected response)` pair and returns the chain's result.
//!
//! ## Flow
//!
//! ```text
//! send::<Req, Resp>(request)
//!   ├── chain_for(Req -> Resp)     compute-once, failures memoized
//!   ├── scope = factory.create_scope()
//!   ├── executor::execute(scope, chain, request, 0)
//!   ├── scope.dispose()            on every exit path, dropped futures included
//!   ├── override conversion        resolved response -> expected response
//!   └── downcast to Resp
//! ```
//!
//! Handler faults come back as [`DispatchError::Handler`] holding the original
//! error. Panics are converted to [`DispatchError::HandlerPanicked`] when
//! `dispatch.catch_panics` is set and re-raised after disposal otherwise.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let dispatcher = Dispatcher::builder(registry)
//!     .with_config(&config)
//!     .build();
//!
//! let response: ApiResponse = dispatcher
//!     .send(LoginRequest::new("ada", "hunter2"), CancellationToken::new())
//!     .await?;
//! ```

use crate::config::{DispatchSettings, DispatcherConfig};
use crate::error::{DispatchError, DispatchResult, ResolutionError};
use crate::logging;
use crate::pipeline::{executor, Chain, ChainBuilder, ChainCache, ChainCacheStats, ChainKey};
use crate::registry::HandlerRegistry;
use crate::scope::{DefaultScopeFactory, ResolutionScope, ScopeFactory};
use crate::types::Payload;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Outcome of [`Dispatcher::verify`].
#[derive(Debug, Clone, Default)]
pub struct VerificationReport {
    /// Pairs that resolved to a chain
    pub verified: Vec<ChainKey>,
    /// Pairs that did not, with the reason
    pub failures: Vec<ResolutionError>,
}

impl VerificationReport {
    /// Whether every pair resolved.
    pub fn is_ok(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Builder for [`Dispatcher`].
pub struct DispatcherBuilder {
    registry: Arc<HandlerRegistry>,
    scopes: Arc<dyn ScopeFactory>,
    settings: DispatchSettings,
}

impl DispatcherBuilder {
    /// Use `scopes` instead of [`DefaultScopeFactory`].
    #[must_use]
    pub fn scope_factory(mut self, scopes: Arc<dyn ScopeFactory>) -> Self {
        self.scopes = scopes;
        self
    }

    /// Take dispatch settings from a loaded configuration.
    #[must_use]
    pub fn with_config(mut self, config: &DispatcherConfig) -> Self {
        self.settings = config.dispatch.clone();
        self
    }

    #[must_use]
    pub fn settings(mut self, settings: DispatchSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn build(self) -> Dispatcher {
        if self.settings.warn_on_shadowing {
            let shadowed = self.registry.shadowed();
            if !shadowed.is_empty() {
                warn!(
                    count = shadowed.len(),
                    "Registration order hides some descriptors; the earlier registration wins"
                );
                logging::log_shadowing(&shadowed);
            }
        }

        info!(
            descriptors = self.registry.len(),
            catch_panics = self.settings.catch_panics,
            "Dispatcher ready"
        );

        Dispatcher {
            registry: self.registry,
            scopes: self.scopes,
            cache: Arc::new(ChainCache::new()),
            settings: self.settings,
        }
    }
}

/// Resolves and runs handler chains. Cheap to clone; clones share the chain cache.
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<HandlerRegistry>,
    scopes: Arc<dyn ScopeFactory>,
    cache: Arc<ChainCache>,
    settings: DispatchSettings,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("descriptors", &self.registry.len())
            .field("cached_chains", &self.cache.len())
            .field("settings", &self.settings)
            .finish()
    }
}

impl Dispatcher {
    /// Dispatcher over `registry` with default scopes and settings.
    pub fn new(registry: impl Into<Arc<HandlerRegistry>>) -> Self {
        Self::builder(registry).build()
    }

    /// Start configuring a dispatcher over `registry`.
    pub fn builder(registry: impl Into<Arc<HandlerRegistry>>) -> DispatcherBuilder {
        DispatcherBuilder {
            registry: registry.into(),
            scopes: Arc::new(DefaultScopeFactory::new()),
            settings: DispatchSettings::default(),
        }
    }

    /// The frozen registry chains are resolved from.
    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    pub fn settings(&self) -> &DispatchSettings {
        &self.settings
    }

    /// Send `request` through the chain for `Req -> Resp` in a fresh scope.
    ///
    /// # Errors
    ///
    /// - [`DispatchError::Resolution`] when no chain connects the pair; no
    ///   handler runs in that case
    /// - [`DispatchError::Handler`] with the original fault when a handler fails
    /// - [`DispatchError::HandlerPanicked`] when a handler panics and panics are caught
    pub async fn send<Req, Resp>(
        &self,
        request: Req,
        cancellation: CancellationToken,
    ) -> DispatchResult<Resp>
    where
        Req: Send + 'static,
        Resp: Send + 'static,
    {
        let key = ChainKey::of::<Req, Resp>();
        let response = self.dispatch(key, Box::new(request), cancellation, None).await?;
        downcast_response(response, key)
    }

    /// Like [`send`](Self::send), resolving handlers from a caller-owned scope.
    ///
    /// The scope is not disposed.
    pub async fn send_in_scope<Req, Resp>(
        &self,
        scope: Arc<dyn ResolutionScope>,
        request: Req,
        cancellation: CancellationToken,
    ) -> DispatchResult<Resp>
    where
        Req: Send + 'static,
        Resp: Send + 'static,
    {
        let key = ChainKey::of::<Req, Resp>();
        let response = self
            .dispatch(key, Box::new(request), cancellation, Some(scope))
            .await?;
        downcast_response(response, key)
    }

    /// Type-erased send for callers that only know runtime type tags.
    ///
    /// The payload must hold a value of `key.request`; the returned payload
    /// holds a value of `key.response`.
    pub async fn send_erased(
        &self,
        request: Payload,
        key: ChainKey,
        cancellation: CancellationToken,
    ) -> DispatchResult<Payload> {
        if (*request).type_id() != key.request.id() {
            return Err(DispatchError::PayloadMismatch {
                expected: key.request.name(),
                context: format!("erased request for {key}"),
            });
        }
        self.dispatch(key, request, cancellation, None).await
    }

    /// The cached chain for `key`, building it on first use.
    pub async fn chain_for(&self, key: ChainKey) -> DispatchResult<Arc<Chain>> {
        self.cache
            .get_or_build(key, || self.build_chain(key))
            .await
            .map_err(DispatchError::from)
    }

    /// Resolve every pair in `keys`, collecting all failures instead of
    /// stopping at the first. Successful chains stay cached.
    pub async fn verify(&self, keys: impl IntoIterator<Item = ChainKey>) -> VerificationReport {
        let mut report = VerificationReport::default();
        for key in keys {
            match self.cache.get_or_build(key, || self.build_chain(key)).await {
                Ok(_) => report.verified.push(key),
                Err(failure) => report.failures.push(failure),
            }
        }

        if report.is_ok() {
            info!(verified = report.verified.len(), "All dispatch pairs resolve");
        } else {
            error!(
                verified = report.verified.len(),
                failed = report.failures.len(),
                "Some dispatch pairs do not resolve"
            );
        }
        report
    }

    /// Chain cache statistics
    pub fn cache_stats(&self) -> ChainCacheStats {
        self.cache.stats()
    }

    fn build_chain(&self, key: ChainKey) -> Result<Arc<Chain>, ResolutionError> {
        match ChainBuilder::new(&self.registry).build(key) {
            Ok(chain) => {
                info!(chain = %chain, links = chain.len(), "Chain built");
                Ok(chain)
            }
            Err(failure) => {
                logging::log_resolution_failure(&failure);
                Err(failure)
            }
        }
    }

    async fn dispatch(
        &self,
        key: ChainKey,
        request: Payload,
        cancellation: CancellationToken,
        caller_scope: Option<Arc<dyn ResolutionScope>>,
    ) -> DispatchResult<Payload> {
        let chain = self.chain_for(key).await?;

        let owned = caller_scope.is_none();
        let scope = caller_scope.unwrap_or_else(|| self.scopes.create_scope());
        debug!(chain = %key, scope_id = %scope.id(), owned, "Dispatching");
        let guard = ScopeGuard::new(&scope, owned);

        let outcome = AssertUnwindSafe(executor::execute(
            Arc::clone(&scope),
            Arc::clone(&chain),
            request,
            cancellation,
            0,
        ))
        .catch_unwind()
        .await;

        guard.dispose().await;

        let response = match outcome {
            Ok(result) => result.map_err(DispatchError::from_handler)?,
            Err(panic) if self.settings.catch_panics => {
                let message = panic_message(panic.as_ref());
                error!(chain = %key, panic_msg = %message, "Handler panicked");
                return Err(DispatchError::HandlerPanicked {
                    request: key.request,
                    message,
                });
            }
            Err(panic) => std::panic::resume_unwind(panic),
        };

        match chain.response_conversion() {
            Some(conversion) => conversion.apply(response),
            None => Ok(response),
        }
    }
}

/// Disposes a dispatcher-owned scope, including when the `send` future is
/// dropped before the chain finishes.
struct ScopeGuard {
    scope: Option<Arc<dyn ResolutionScope>>,
}

impl ScopeGuard {
    fn new(scope: &Arc<dyn ResolutionScope>, owned: bool) -> Self {
        Self {
            scope: owned.then(|| Arc::clone(scope)),
        }
    }

    async fn dispose(mut self) {
        if let Some(scope) = self.scope.take() {
            scope.dispose().await;
        }
    }
}

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        let Some(scope) = self.scope.take() else {
            return;
        };
        match Handle::try_current() {
            Ok(handle) => {
                debug!(scope_id = %scope.id(), "Dispatch dropped mid-chain, disposing scope");
                handle.spawn(async move {
                    scope.dispose().await;
                });
            }
            Err(_) => {
                warn!(
                    scope_id = %scope.id(),
                    "Dispatch dropped outside a tokio runtime, scope left undisposed"
                );
            }
        }
    }
}

fn downcast_response<Resp: 'static>(response: Payload, key: ChainKey) -> DispatchResult<Resp> {
    response
        .downcast::<Resp>()
        .map(|response| *response)
        .map_err(|_| DispatchError::payload_mismatch::<Resp>(format!("response of {key}")))
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "Unknown panic".to_string()
    }
}
