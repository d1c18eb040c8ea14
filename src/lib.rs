#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Pipeline Dispatch
//!
//! Request-dispatch core that resolves an ordered chain of handlers for a
//! `(request type, expected response type)` pair by structural capability
//! matching, then runs the chain with each handler able to delegate to the
//! remainder of it.
//!
//! ## Overview
//!
//! Handlers are registered once at startup as [`HandlerDescriptor`]s. A
//! descriptor declares the request it accepts and the response it returns
//! and, for pipe handlers, the request and response it forwards downstream.
//! Descriptors may be open over type parameters (`ValidationHandler<T>`),
//! closed by an explicit table of concrete instantiations.
//!
//! On first dispatch of a pair the [`ChainBuilder`](pipeline::ChainBuilder)
//! scans the registry in registration order, links the first matching
//! descriptor, moves on to the pair it forwards, and stops at the first final
//! handler. The chain is cached for the dispatcher's lifetime.
//!
//! ## Module Organization
//!
//! - [`types`] - Runtime type tags, patterns, unification and the type catalog
//! - [`handler`] - `PipeHandler` / `FinalHandler` traits and type erasure
//! - [`registry`] - Descriptors and the frozen handler registry
//! - [`pipeline`] - Matching, chain building, caching and execution
//! - [`scope`] - Resolution scopes handler instances live in
//! - [`dispatcher`] - The `send` entry points
//! - [`config`] - Layered configuration
//! - [`logging`] - Structured logging setup
//! - [`error`] - Structured error handling
//!
//! ## Quick Start
//!
//! ```rust
//! use async_trait::async_trait;
//! use pipeline_dispatch::handler::{FinalHandler, Next, PipeHandler};
//! use pipeline_dispatch::{Dispatcher, HandlerDescriptor, HandlerResult, RegistryBuilder};
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
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = RegistryBuilder::new()
//!     .register(HandlerDescriptor::for_pipe("trim", || Trim))
//!     .register(HandlerDescriptor::for_final("length", || Length))
//!     .build()?;
//!
//! let dispatcher = Dispatcher::new(registry);
//! let length: usize = dispatcher
//!     .send("  padded  ".to_string(), CancellationToken::new())
//!     .await?;
//! assert_eq!(length, 6);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod handler;
pub mod logging;
pub mod pipeline;
pub mod registry;
pub mod scope;
pub mod types;

pub use config::{ConfigLoader, DispatchSettings, DispatcherConfig, LoggingConfig};
pub use dispatcher::{Dispatcher, DispatcherBuilder, VerificationReport};
pub use error::{
    ConfigResult, ConfigurationError, DispatchError, DispatchResult, HandlerResult,
    ResolutionError,
};
pub use handler::{FinalHandler, Next, PipeHandler};
pub use pipeline::{Chain, ChainKey};
pub use registry::{HandlerDescriptor, HandlerRegistry, RegistryBuilder};
pub use scope::{DefaultScopeFactory, HandlerScope, ResolutionScope, ScopeFactory};
pub use types::{TypeCatalog, TypeParam, TypePattern, TypeTag};
