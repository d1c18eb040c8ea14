//! # Chains and Continuations
//!
//! A [`Chain`] is the resolved, ordered sequence of closed handlers for one
//! [`ChainKey`]. Every link but the last carries a [`Continuation`] that
//! re-enters the executor at the following link; the last link is terminal.
//!
//! Continuations are built once, while the chain itself is being built,
//! through [`Arc::new_cyclic`]: each holds a weak reference back to the chain
//! plus the index and the downstream types it serves.

use super::executor;
use crate::error::{DispatchError, HandlerResult};
use crate::registry::BoundHandler;
use crate::scope::ResolutionScope;
use crate::types::{Conversion, Payload, TypeTag};
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::fmt;
use std::sync::{Arc, Weak};
use tokio_util::sync::CancellationToken;

/// Cache key of a chain: the dispatched request type and the expected response type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChainKey {
    pub request: TypeTag,
    pub response: TypeTag,
}

impl ChainKey {
    /// Key for `Req -> Resp`.
    pub fn of<Req: 'static, Resp: 'static>() -> Self {
        Self::new(TypeTag::of::<Req>(), TypeTag::of::<Resp>())
    }

    /// Key from runtime tags.
    pub fn new(request: TypeTag, response: TypeTag) -> Self {
        Self { request, response }
    }
}

impl fmt::Display for ChainKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.request, self.response)
    }
}

/// Callable that resumes a chain at a fixed link.
#[derive(Clone)]
pub struct Continuation {
    request: TypeTag,
    response: TypeTag,
    index: usize,
    chain: Weak<Chain>,
}

impl Continuation {
    /// Build the continuation resuming `chain` at `index` with `request -> response`.
    pub(crate) fn new(request: TypeTag, response: TypeTag, chain: Weak<Chain>, index: usize) -> Self {
        Self {
            request,
            response,
            index,
            chain,
        }
    }

    /// Downstream request type.
    pub fn request(&self) -> TypeTag {
        self.request
    }

    /// Downstream response type.
    pub fn response(&self) -> TypeTag {
        self.response
    }

    /// Link index this continuation resumes at.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Execute the remainder of the chain from this continuation's link.
    pub(crate) fn invoke(
        &self,
        scope: Arc<dyn ResolutionScope>,
        request: Payload,
        cancellation: CancellationToken,
    ) -> BoxFuture<'static, HandlerResult<Payload>> {
        let Some(chain) = self.chain.upgrade() else {
            return futures::future::ready(Err(DispatchError::ChainReleased.into())).boxed();
        };
        let index = self.index;
        async move { executor::execute(scope, chain, request, cancellation, index).await }.boxed()
    }
}

impl fmt::Debug for Continuation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Continuation")
            .field("request", &self.request)
            .field("response", &self.response)
            .field("index", &self.index)
            .finish()
    }
}

/// One position of a chain.
#[derive(Debug, Clone)]
pub struct ChainLink {
    handler: BoundHandler,
    continuation: Option<Continuation>,
    request_coercion: Option<Conversion>,
}

impl ChainLink {
    /// Closed handler selected for this position.
    pub fn handler(&self) -> &BoundHandler {
        &self.handler
    }

    /// Continuation to the next link; `None` on the terminal link.
    pub fn continuation(&self) -> Option<&Continuation> {
        self.continuation.as_ref()
    }

    /// Conversion applied to the incoming request when the handler matched
    /// through a capability of the request type.
    pub fn request_coercion(&self) -> Option<&Conversion> {
        self.request_coercion.as_ref()
    }

    /// Whether this is the terminal link.
    pub fn is_terminal(&self) -> bool {
        self.continuation.is_none()
    }
}

/// A planned link, before continuations exist.
#[derive(Debug, Clone)]
pub(crate) struct PlannedLink {
    pub(crate) handler: BoundHandler,
    pub(crate) forward: Option<(TypeTag, TypeTag)>,
    pub(crate) request_coercion: Option<Conversion>,
}

/// Resolved, immutable handler chain for one key.
#[derive(Debug)]
pub struct Chain {
    key: ChainKey,
    resolved_response: TypeTag,
    response_conversion: Option<Conversion>,
    links: Vec<ChainLink>,
    built_at: DateTime<Utc>,
}

impl Chain {
    /// Finalize planned links into a chain, building every continuation.
    pub(crate) fn assemble(
        key: ChainKey,
        resolved_response: TypeTag,
        response_conversion: Option<Conversion>,
        planned: Vec<PlannedLink>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|chain: &Weak<Chain>| {
            let links = planned
                .into_iter()
                .enumerate()
                .map(|(index, link)| ChainLink {
                    continuation: link.forward.map(|(request, response)| {
                        Continuation::new(request, response, Weak::clone(chain), index + 1)
                    }),
                    handler: link.handler,
                    request_coercion: link.request_coercion,
                })
                .collect();

            Chain {
                key,
                resolved_response,
                response_conversion,
                links,
                built_at: Utc::now(),
            }
        })
    }

    /// Key this chain was built for.
    pub fn key(&self) -> ChainKey {
        self.key
    }

    /// Response type the chain produces before any override conversion.
    pub fn resolved_response(&self) -> TypeTag {
        self.resolved_response
    }

    /// Conversion from the resolved response to the expected response.
    pub fn response_conversion(&self) -> Option<&Conversion> {
        self.response_conversion.as_ref()
    }

    /// Links in execution order.
    pub fn links(&self) -> &[ChainLink] {
        &self.links
    }

    /// Link at `index`.
    pub fn link(&self, index: usize) -> Option<&ChainLink> {
        self.links.get(index)
    }

    /// Number of links.
    pub fn len(&self) -> usize {
        self.links.len()
    }

    /// Whether the chain has no links. A built chain never is.
    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    /// When the chain was built.
    pub fn built_at(&self) -> DateTime<Utc> {
        self.built_at
    }

    /// Descriptor names in execution order.
    pub fn handler_names(&self) -> Vec<&str> {
        self.links
            .iter()
            .map(|link| link.handler.descriptor())
            .collect()
    }

    /// Whether exactly the last link is terminal.
    pub fn is_well_formed(&self) -> bool {
        match self.links.split_last() {
            Some((last, rest)) => last.is_terminal() && rest.iter().all(|link| !link.is_terminal()),
            None => false,
        }
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] ", self.key)?;
        f.write_str(&self.handler_names().join(" -> "))
    }
}
