//! # Pipeline Resolution and Execution
//!
//! ## Architecture
//!
//! ```text
//! Pipeline
//! ├── CapabilityMatcher  (does a descriptor service a concrete pair?)
//! ├── ChainBuilder       (first-match-wins scan into an ordered chain)
//! ├── Chain / Continuation (immutable links, pre-built continuations)
//! ├── ChainCache         (compute-once per ChainKey)
//! └── executor           (runs one link within a resolution scope)
//! ```

pub mod builder;
pub mod cache;
pub mod chain;
pub(crate) mod executor;
pub mod matcher;

pub use builder::ChainBuilder;
pub use cache::{ChainCache, ChainCacheStats};
pub use chain::{Chain, ChainKey, ChainLink, Continuation};
pub use matcher::{CapabilityMatch, CapabilityMatcher};
