//! # Type Catalog
//!
//! Explicit capability registration for concrete types.
//!
//! Each concrete type may advertise:
//! - **marker capabilities** (`tagged::<dyn Validate>()`) checked against
//!   parameter bounds,
//! - **convertible capabilities** (`converts_to::<Box<dyn Audit>>(..)`) that let a
//!   value be handed to a descriptor declaring the capability type, and let
//!   override rules widen a response,
//! - a **generic shape** (`constructed("Envelope", [..])`) used to unify
//!   `Applied` patterns.
//!
//! ```rust
//! use pipeline_dispatch::types::{TypeCatalog, TypeTag};
//!
//! trait Validate {}
//! struct LoginRequest;
//! impl Validate for LoginRequest {}
//!
//! let mut catalog = TypeCatalog::new();
//! catalog.describe::<LoginRequest>().tagged::<dyn Validate>();
//!
//! assert!(catalog.satisfies(TypeTag::of::<LoginRequest>(), TypeTag::of::<dyn Validate>()));
//! ```

use super::{Payload, TypeTag};
use crate::error::DispatchError;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::warn;

type ConvertFn = dyn Fn(Payload) -> Result<Payload, Payload> + Send + Sync;

/// A conversion between two concrete types registered in the catalog.
#[derive(Clone)]
pub struct Conversion {
    from: TypeTag,
    to: TypeTag,
    convert: Arc<ConvertFn>,
}

impl Conversion {
    /// Conversion from `F` to `T` via `convert`.
    pub fn new<F, T>(convert: impl Fn(F) -> T + Send + Sync + 'static) -> Self
    where
        F: Send + 'static,
        T: Send + 'static,
    {
        Self {
            from: TypeTag::of::<F>(),
            to: TypeTag::of::<T>(),
            convert: Arc::new(move |payload: Payload| match payload.downcast::<F>() {
                Ok(value) => Ok(Box::new(convert(*value)) as Payload),
                Err(original) => Err(original),
            }),
        }
    }

    /// Source type.
    pub fn from(&self) -> TypeTag {
        self.from
    }

    /// Target type.
    pub fn to(&self) -> TypeTag {
        self.to
    }

    /// Convert a payload holding the source type.
    pub fn apply(&self, payload: Payload) -> Result<Payload, DispatchError> {
        (self.convert)(payload).map_err(|_| DispatchError::PayloadMismatch {
            expected: self.from.name(),
            context: format!("conversion {} -> {}", self.from, self.to),
        })
    }
}

impl fmt::Debug for Conversion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Conversion")
            .field("from", &self.from)
            .field("to", &self.to)
            .finish()
    }
}

/// A capability a concrete type advertises.
#[derive(Debug, Clone)]
pub struct Capability {
    tag: TypeTag,
    conversion: Option<Conversion>,
}

impl Capability {
    /// Capability tag.
    pub fn tag(&self) -> TypeTag {
        self.tag
    }

    /// Conversion into the capability's carrier type, if the capability carries values.
    pub fn conversion(&self) -> Option<&Conversion> {
        self.conversion.as_ref()
    }
}

/// Registered generic shape of a concrete type: `constructor<args..>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeShape {
    constructor: &'static str,
    args: Vec<TypeTag>,
}

impl TypeShape {
    /// Constructor name.
    pub fn constructor(&self) -> &'static str {
        self.constructor
    }

    /// Concrete argument types.
    pub fn args(&self) -> &[TypeTag] {
        &self.args
    }
}

#[derive(Debug, Clone, Default)]
struct TypeEntry {
    shape: Option<TypeShape>,
    capabilities: Vec<Capability>,
}

/// Capability and shape registrations for concrete types.
#[derive(Debug, Clone, Default)]
pub struct TypeCatalog {
    entries: HashMap<TypeTag, TypeEntry>,
    /// Reverse index from shape to the concrete type carrying it
    shapes: HashMap<TypeShape, TypeTag>,
}

impl TypeCatalog {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start (or continue) describing `T`.
    pub fn describe<T: ?Sized + 'static>(&mut self) -> TypeEntryBuilder<'_, T> {
        let tag = TypeTag::of::<T>();
        self.entries.entry(tag).or_default();
        TypeEntryBuilder {
            catalog: self,
            tag,
            _marker: PhantomData,
        }
    }

    /// Registered shape of `tag`.
    pub fn shape_of(&self, tag: TypeTag) -> Option<&TypeShape> {
        self.entries.get(&tag).and_then(|entry| entry.shape.as_ref())
    }

    /// Concrete type registered for `constructor<args..>`.
    pub fn constructed(&self, constructor: &'static str, args: &[TypeTag]) -> Option<TypeTag> {
        self.shapes
            .get(&TypeShape {
                constructor,
                args: args.to_vec(),
            })
            .copied()
    }

    /// Capabilities advertised by `tag`, in registration order.
    pub fn capabilities(&self, tag: TypeTag) -> &[Capability] {
        self.entries
            .get(&tag)
            .map(|entry| entry.capabilities.as_slice())
            .unwrap_or_default()
    }

    /// Whether `tag` is `capability` or advertises it.
    pub fn satisfies(&self, tag: TypeTag, capability: TypeTag) -> bool {
        tag == capability
            || self
                .capabilities(tag)
                .iter()
                .any(|advertised| advertised.tag == capability)
    }

    /// Conversion from `from` to `to`, if registered.
    pub fn conversion(&self, from: TypeTag, to: TypeTag) -> Option<&Conversion> {
        self.capabilities(from)
            .iter()
            .find(|capability| capability.tag == to)
            .and_then(Capability::conversion)
    }

    /// Number of described types.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no type has been described.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Merge registrations from another catalog.
    ///
    /// Capabilities are appended after the ones already known; a conflicting
    /// shape keeps the existing registration.
    pub fn merge(&mut self, other: TypeCatalog) {
        for (tag, entry) in other.entries {
            let target = self.entries.entry(tag).or_default();
            if let Some(shape) = entry.shape {
                match &target.shape {
                    Some(existing) if *existing != shape => {
                        warn!(
                            type_name = tag.name(),
                            "Conflicting shape registration ignored during catalog merge"
                        );
                    }
                    Some(_) => {}
                    None => {
                        self.shapes.insert(shape.clone(), tag);
                        target.shape = Some(shape);
                    }
                }
            }
            for capability in entry.capabilities {
                if !target
                    .capabilities
                    .iter()
                    .any(|known| known.tag == capability.tag)
                {
                    target.capabilities.push(capability);
                }
            }
        }
    }
}

/// Builder returned by [`TypeCatalog::describe`].
pub struct TypeEntryBuilder<'a, T: ?Sized> {
    catalog: &'a mut TypeCatalog,
    tag: TypeTag,
    _marker: PhantomData<fn() -> Box<T>>,
}

impl<'a, T: ?Sized + 'static> TypeEntryBuilder<'a, T> {
    fn entry(&mut self) -> &mut TypeEntry {
        self.catalog.entries.entry(self.tag).or_default()
    }

    fn push_capability(&mut self, capability: Capability) {
        let capabilities = &mut self.entry().capabilities;
        if let Some(existing) = capabilities
            .iter_mut()
            .find(|known| known.tag == capability.tag)
        {
            *existing = capability;
        } else {
            capabilities.push(capability);
        }
    }

    /// Advertise marker capability `C`.
    pub fn tagged<C: ?Sized + 'static>(mut self) -> Self {
        self.push_capability(Capability {
            tag: TypeTag::of::<C>(),
            conversion: None,
        });
        self
    }

    /// Register the generic shape `constructor<args..>` for this type.
    pub fn constructed(
        mut self,
        constructor: &'static str,
        args: impl IntoIterator<Item = TypeTag>,
    ) -> Self {
        let shape = TypeShape {
            constructor,
            args: args.into_iter().collect(),
        };
        self.catalog.shapes.insert(shape.clone(), self.tag);
        self.entry().shape = Some(shape);
        self
    }
}

impl<'a, T: Send + 'static> TypeEntryBuilder<'a, T> {
    /// Advertise capability `C`, carried by converting values with `convert`.
    pub fn converts_to<C: Send + 'static>(
        mut self,
        convert: impl Fn(T) -> C + Send + Sync + 'static,
    ) -> Self {
        self.push_capability(Capability {
            tag: TypeTag::of::<C>(),
            conversion: Some(Conversion::new(convert)),
        });
        self
    }
}
