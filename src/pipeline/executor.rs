//! Chain execution.
//!
//! Runs one link of a chain: resolve the handler instance from the scope,
//! apply the link's request coercion, and invoke the instance with the link's
//! continuation. Handler errors and panics pass through untouched; catching
//! them is the dispatcher's decision. The cancellation token is handed down,
//! never polled here.

use super::chain::Chain;
use crate::error::{DispatchError, HandlerResult};
use crate::handler::adapter::ErasedNext;
use crate::scope::ResolutionScope;
use crate::types::Payload;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::trace;

/// Execute `chain` from the link at `index`.
pub(crate) async fn execute(
    scope: Arc<dyn ResolutionScope>,
    chain: Arc<Chain>,
    request: Payload,
    cancellation: CancellationToken,
    index: usize,
) -> HandlerResult<Payload> {
    let link = chain.link(index).ok_or_else(|| DispatchError::LinkOutOfRange {
        chain: chain.key().to_string(),
        index,
    })?;

    let instance = scope.resolve(link.handler())?;
    let request = match link.request_coercion() {
        Some(coercion) => coercion.apply(request)?,
        None => request,
    };
    let next = link
        .continuation()
        .map(|continuation| ErasedNext::new(continuation.clone(), Arc::clone(&scope)));

    trace!(
        chain = %chain.key(),
        index,
        descriptor = link.handler().descriptor(),
        scope_id = %scope.id(),
        terminal = next.is_none(),
        "Invoking handler"
    );

    instance.invoke(request, cancellation, next).await
}
