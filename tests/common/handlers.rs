//! Handler implementations used by the integration tests.

use super::{ApiResponse, ExecutionLog, ExplodeRequest, LoginRequest, PanicRequest, Validate};
use async_trait::async_trait;
use pipeline_dispatch::{FinalHandler, HandlerResult, Next, PipeHandler};
use serde::Serialize;
use std::marker::PhantomData;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Fault raised by [`ComposeHandler`] for unknown users.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("no profile for user '{0}'")]
pub struct UnknownUser(pub String);

/// Fault raised by [`FaultyFinal`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("meltdown with code {code}")]
pub struct Meltdown {
    pub code: u32,
}

/// Short-circuits with 400 when the request fails validation.
pub struct ValidationHandler<T> {
    log: ExecutionLog,
    _marker: PhantomData<fn(T)>,
}

impl<T> ValidationHandler<T> {
    pub fn new(log: ExecutionLog) -> Self {
        Self {
            log,
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<T: Validate + Send + 'static> PipeHandler for ValidationHandler<T> {
    type Request = T;
    type Response = ApiResponse;
    type NextRequest = T;
    type NextResponse = ApiResponse;

    async fn handle(
        &self,
        request: T,
        cancellation: CancellationToken,
        next: Next<T, ApiResponse>,
    ) -> HandlerResult<ApiResponse> {
        self.log.record("validation");
        if let Err(reason) = request.validate() {
            return Ok(ApiResponse::bad_request(reason));
        }
        next.run(request, cancellation).await
    }
}

/// Loads the user's profile; fails for user `ghost`. Records when its
/// downstream call returns so the onion order is observable.
pub struct ComposeHandler {
    log: ExecutionLog,
}

impl ComposeHandler {
    pub fn new(log: ExecutionLog) -> Self {
        Self { log }
    }
}

#[async_trait]
impl PipeHandler for ComposeHandler {
    type Request = LoginRequest;
    type Response = ApiResponse;
    type NextRequest = LoginRequest;
    type NextResponse = ApiResponse;

    async fn handle(
        &self,
        request: LoginRequest,
        cancellation: CancellationToken,
        next: Next<LoginRequest, ApiResponse>,
    ) -> HandlerResult<ApiResponse> {
        self.log.record("compose");
        let username = request.username.clone().unwrap_or_default();
        if username == "ghost" {
            return Err(UnknownUser(username).into());
        }
        let response = next.run(request, cancellation).await?;
        self.log.record("compose:after");
        Ok(response)
    }
}

/// Terminal handler echoing the request back as the response body.
pub struct FinalEcho<T> {
    log: ExecutionLog,
    _marker: PhantomData<fn(T)>,
}

impl<T> FinalEcho<T> {
    pub fn new(log: ExecutionLog) -> Self {
        Self {
            log,
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<T: Serialize + Send + 'static> FinalHandler for FinalEcho<T> {
    type Request = T;
    type Response = ApiResponse;

    async fn handle(&self, request: T, _: CancellationToken) -> HandlerResult<ApiResponse> {
        self.log.record("echo");
        Ok(ApiResponse::ok(serde_json::to_value(&request)?))
    }
}

/// Converts any downstream fault into a 500 response.
pub struct ExceptionBoundary<T> {
    log: ExecutionLog,
    _marker: PhantomData<fn(T)>,
}

impl<T> ExceptionBoundary<T> {
    pub fn new(log: ExecutionLog) -> Self {
        Self {
            log,
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<T: Send + 'static> PipeHandler for ExceptionBoundary<T> {
    type Request = T;
    type Response = ApiResponse;
    type NextRequest = T;
    type NextResponse = ApiResponse;

    async fn handle(
        &self,
        request: T,
        cancellation: CancellationToken,
        next: Next<T, ApiResponse>,
    ) -> HandlerResult<ApiResponse> {
        self.log.record("boundary");
        match next.run(request, cancellation).await {
            Ok(response) => Ok(response),
            Err(fault) => Ok(ApiResponse::internal_error(fault.to_string())),
        }
    }
}

pub struct FaultyFinal {
    log: ExecutionLog,
}

impl FaultyFinal {
    pub fn new(log: ExecutionLog) -> Self {
        Self { log }
    }
}

#[async_trait]
impl FinalHandler for FaultyFinal {
    type Request = ExplodeRequest;
    type Response = ApiResponse;

    async fn handle(&self, request: ExplodeRequest, _: CancellationToken) -> HandlerResult<ApiResponse> {
        self.log.record("faulty");
        Err(Meltdown { code: request.code }.into())
    }
}

pub struct PanickingFinal {
    log: ExecutionLog,
}

impl PanickingFinal {
    pub fn new(log: ExecutionLog) -> Self {
        Self { log }
    }
}

#[async_trait]
impl FinalHandler for PanickingFinal {
    type Request = PanicRequest;
    type Response = ApiResponse;

    async fn handle(&self, _: PanicRequest, _: CancellationToken) -> HandlerResult<ApiResponse> {
        self.log.record("panicking");
        panic!("handler exploded");
    }
}
