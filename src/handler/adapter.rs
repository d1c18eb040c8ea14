//! Type-erased handler instances.
//!
//! The executor only sees [`HandlerInstance`] trait objects; the adapters
//! here downcast payloads to the handler's associated types and box the
//! response back up.

use super::{FinalHandler, Next, PipeHandler};
use crate::error::{DispatchError, HandlerResult};
use crate::pipeline::chain::Continuation;
use crate::scope::ResolutionScope;
use crate::types::{Payload, TypeTag};
use async_trait::async_trait;
use futures::future::BoxFuture;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// A handler instance resolved from a scope, ready to be invoked with payloads.
#[async_trait]
pub trait HandlerInstance: Send + Sync {
    /// Concrete handler type behind this instance.
    fn handler_type(&self) -> TypeTag;

    /// Invoke the handler. `next` is `None` for terminal links.
    async fn invoke(
        &self,
        request: Payload,
        cancellation: CancellationToken,
        next: Option<ErasedNext>,
    ) -> HandlerResult<Payload>;
}

/// A continuation paired with the scope of the dispatch that reached it.
#[derive(Clone)]
pub struct ErasedNext {
    continuation: Continuation,
    scope: Arc<dyn ResolutionScope>,
}

impl ErasedNext {
    pub(crate) fn new(continuation: Continuation, scope: Arc<dyn ResolutionScope>) -> Self {
        Self {
            continuation,
            scope,
        }
    }

    /// Run the remainder of the chain with a type-erased request.
    pub fn call(
        &self,
        request: Payload,
        cancellation: CancellationToken,
    ) -> BoxFuture<'static, HandlerResult<Payload>> {
        self.continuation
            .invoke(Arc::clone(&self.scope), request, cancellation)
    }

    /// Index of the link this continuation resumes at.
    pub fn index(&self) -> usize {
        self.continuation.index()
    }

    /// Downstream `(request, response)` types.
    pub fn downstream(&self) -> (TypeTag, TypeTag) {
        (self.continuation.request(), self.continuation.response())
    }
}

fn downcast_request<T: Send + 'static>(request: Payload, handler: &'static str) -> HandlerResult<T> {
    request
        .downcast::<T>()
        .map(|value| *value)
        .map_err(|_| DispatchError::payload_mismatch::<T>(format!("request to {handler}")).into())
}

/// Adapter exposing a [`PipeHandler`] as a [`HandlerInstance`].
pub(crate) struct PipeAdapter<H>(pub(crate) H);

#[async_trait]
impl<H: PipeHandler> HandlerInstance for PipeAdapter<H> {
    fn handler_type(&self) -> TypeTag {
        TypeTag::of::<H>()
    }

    async fn invoke(
        &self,
        request: Payload,
        cancellation: CancellationToken,
        next: Option<ErasedNext>,
    ) -> HandlerResult<Payload> {
        let handler_name = std::any::type_name::<H>();
        let request = downcast_request::<H::Request>(request, handler_name)?;
        let next = next.ok_or(DispatchError::MissingContinuation(handler_name))?;
        let response = self.0.handle(request, cancellation, Next::new(next)).await?;
        Ok(Box::new(response))
    }
}

/// Adapter exposing a [`FinalHandler`] as a [`HandlerInstance`].
pub(crate) struct FinalAdapter<H>(pub(crate) H);

#[async_trait]
impl<H: FinalHandler> HandlerInstance for FinalAdapter<H> {
    fn handler_type(&self) -> TypeTag {
        TypeTag::of::<H>()
    }

    async fn invoke(
        &self,
        request: Payload,
        cancellation: CancellationToken,
        _next: Option<ErasedNext>,
    ) -> HandlerResult<Payload> {
        let request = downcast_request::<H::Request>(request, std::any::type_name::<H>())?;
        let response = self.0.handle(request, cancellation).await?;
        Ok(Box::new(response))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Shout;

    #[async_trait]
    impl FinalHandler for Shout {
        type Request = String;
        type Response = String;

        async fn handle(&self, request: String, _: CancellationToken) -> HandlerResult<String> {
            Ok(request.to_uppercase())
        }
    }

    struct Passthrough;

    #[async_trait]
    impl PipeHandler for Passthrough {
        type Request = String;
        type Response = String;
        type NextRequest = String;
        type NextResponse = String;

        async fn handle(
            &self,
            request: String,
            cancellation: CancellationToken,
            next: Next<String, String>,
        ) -> HandlerResult<String> {
            next.run(request, cancellation).await
        }
    }

    #[tokio::test]
    async fn test_final_adapter_round_trips_payload() {
        let instance = FinalAdapter(Shout);
        let response = instance
            .invoke(Box::new("hi".to_string()), CancellationToken::new(), None)
            .await
            .expect("handled");
        assert_eq!(*response.downcast::<String>().expect("string"), "HI");
        assert_eq!(instance.handler_type(), TypeTag::of::<Shout>());
    }

    #[tokio::test]
    async fn test_adapter_rejects_wrong_request_type() {
        let instance = FinalAdapter(Shout);
        let error = instance
            .invoke(Box::new(42_u32), CancellationToken::new(), None)
            .await
            .expect_err("mismatch");
        assert!(matches!(
            DispatchError::from_handler(error),
            DispatchError::PayloadMismatch { .. }
        ));
    }

    #[tokio::test]
    async fn test_pipe_adapter_requires_continuation() {
        let instance = PipeAdapter(Passthrough);
        let error = instance
            .invoke(Box::new("hi".to_string()), CancellationToken::new(), None)
            .await
            .expect_err("missing continuation");
        assert!(matches!(
            DispatchError::from_handler(error),
            DispatchError::MissingContinuation(_)
        ));
    }
}
