//! # Registry Infrastructure
//!
//! Handler descriptors and the frozen registry the dispatcher resolves
//! chains from.
//!
//! ## Architecture
//!
//! ```text
//! Registry Infrastructure
//! ├── HandlerDescriptor   (declared capability + closed factory table)
//! ├── BoundHandler        (one closed, concrete implementation)
//! ├── RegistryBuilder     (ordered registration, merge, overrides, catalog)
//! └── HandlerRegistry     (frozen, read-only, shared by every dispatch)
//! ```

pub mod descriptor;
pub mod handler_registry;

pub use descriptor::{BoundHandler, HandlerDescriptor};
pub use handler_registry::{
    HandlerRegistry, OverrideRule, RegistryBuilder, RegistryStats, Shadowing,
};
