//! # Handler Traits
//!
//! The contract handler authors implement.
//!
//! A chain is made of zero or more **pipe handlers** followed by exactly one
//! **final handler**. A pipe handler does its work, then delegates to the
//! rest of the chain through [`Next`], possibly changing the request and
//! response types on the way:
//!
//! ```text
//! send(LoginRequest) ─► Validation ─► Compose ─► FinalEcho
//!        ApiResponse ◄─────────────◄──────────◄──────┘
//! ```
//!
//! Handlers run in chain order going in, and each pipe handler observes its
//! downstream result before its own post-continuation logic resumes.
//!
//! ## Usage
//!
//! ```rust
//! use async_trait::async_trait;
//! use pipeline_dispatch::handler::{FinalHandler, Next, PipeHandler};
//! use pipeline_dispatch::HandlerResult;
//! use tokio_util::sync::CancellationToken;
//!
//! struct Trim;
//!
//! #[async_trait]
//! impl PipeHandler for Trim {
//!     type Request = String;
//!     type Response = usize;
//!     type NextRequest = String;
//!     type NextResponse = usize;
//!
//!     async fn handle(
//!         &self,
//!         request: String,
//!         cancellation: CancellationToken,
//!         next: Next<String, usize>,
//!     ) -> HandlerResult<usize> {
//!         next.run(request.trim().to_string(), cancellation).await
//!     }
//! }
//!
//! struct Length;
//!
//! #[async_trait]
//! impl FinalHandler for Length {
//!     type Request = String;
//!     type Response = usize;
//!
//!     async fn handle(&self, request: String, _: CancellationToken) -> HandlerResult<usize> {
//!         Ok(request.len())
//!     }
//! }
//! ```

pub mod adapter;

pub use adapter::{ErasedNext, HandlerInstance};

use crate::error::{DispatchError, HandlerResult};
use crate::types::TypeTag;
use async_trait::async_trait;
use std::marker::PhantomData;
use tokio_util::sync::CancellationToken;

/// A handler that works on a request and then delegates to the rest of the chain.
///
/// The four associated types are the handler's concrete handling shape:
/// it accepts `Request`, returns `Response`, and calls the remainder of the
/// chain with `NextRequest`, receiving `NextResponse`.
#[async_trait]
pub trait PipeHandler: Send + Sync + 'static {
    /// Request type this handler accepts
    type Request: Send + 'static;
    /// Response type this handler produces
    type Response: Send + 'static;
    /// Request type passed to the continuation
    type NextRequest: Send + 'static;
    /// Response type the continuation returns
    type NextResponse: Send + 'static;

    /// Handle `request`, calling `next` to run the remainder of the chain.
    ///
    /// Not calling `next` short-circuits the chain.
    async fn handle(
        &self,
        request: Self::Request,
        cancellation: CancellationToken,
        next: Next<Self::NextRequest, Self::NextResponse>,
    ) -> HandlerResult<Self::Response>;
}

/// A terminal handler producing the chain's ultimate result.
#[async_trait]
pub trait FinalHandler: Send + Sync + 'static {
    /// Request type this handler accepts
    type Request: Send + 'static;
    /// Response type this handler produces
    type Response: Send + 'static;

    /// Handle `request`.
    async fn handle(
        &self,
        request: Self::Request,
        cancellation: CancellationToken,
    ) -> HandlerResult<Self::Response>;
}

/// Typed handle on the remainder of a chain, given to pipe handlers.
pub struct Next<Req, Resp> {
    inner: ErasedNext,
    _marker: PhantomData<fn(Req) -> Resp>,
}

impl<Req, Resp> Next<Req, Resp>
where
    Req: Send + 'static,
    Resp: Send + 'static,
{
    pub(crate) fn new(inner: ErasedNext) -> Self {
        Self {
            inner,
            _marker: PhantomData,
        }
    }

    /// Run the remainder of the chain with `request`.
    ///
    /// Errors raised downstream come back unmodified.
    pub async fn run(&self, request: Req, cancellation: CancellationToken) -> HandlerResult<Resp> {
        let payload = self.inner.call(Box::new(request), cancellation).await?;
        payload.downcast::<Resp>().map(|response| *response).map_err(|_| {
            DispatchError::payload_mismatch::<Resp>(format!(
                "response of continuation to link {}",
                self.inner.index()
            ))
            .into()
        })
    }

    /// Downstream `(request, response)` types this continuation serves.
    pub fn downstream(&self) -> (TypeTag, TypeTag) {
        self.inner.downstream()
    }
}
