//! # Handler Registry
//!
//! Ordered, immutable-after-startup collection of handler descriptors, the
//! type catalog they are matched against, and the response override rules.
//!
//! ## Registration order is priority
//!
//! The chain builder takes the **first** descriptor, in registration order,
//! that matches a chain position. When registries assembled by independent
//! configuration sources are merged, the merge order decides which handler
//! wins. [`HandlerRegistry::shadowed`] lists the pairs where an earlier
//! descriptor hides a later one so that this does not go unnoticed.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let registry = RegistryBuilder::new()
//!     .describe_types(|catalog| {
//!         catalog.describe::<LoginRequest>().tagged::<dyn Validate>();
//!     })
//!     .register(validation_descriptor())
//!     .register(HandlerDescriptor::for_final("echo", || FinalEcho::<LoginRequest>::default()))
//!     .build()?;
//!
//! let stats = registry.stats();
//! assert_eq!(stats.total_descriptors, 2);
//! ```

use super::descriptor::HandlerDescriptor;
use crate::error::{ConfigResult, ConfigurationError};
use crate::pipeline::chain::ChainKey;
use crate::pipeline::matcher::CapabilityMatcher;
use crate::types::{Conversion, TypeCatalog, TypeTag};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Response override: dispatching `request` while expecting `expected`
/// builds the chain for `resolved` instead.
#[derive(Debug, Clone)]
pub struct OverrideRule {
    request: TypeTag,
    expected: TypeTag,
    resolved: TypeTag,
    conversion: Option<Conversion>,
}

impl OverrideRule {
    /// Override for `(request, expected) -> resolved`.
    pub fn new(request: TypeTag, expected: TypeTag, resolved: TypeTag) -> Self {
        Self {
            request,
            expected,
            resolved,
            conversion: None,
        }
    }

    /// Dispatched request type.
    pub fn request(&self) -> TypeTag {
        self.request
    }

    /// Response type the caller expects.
    pub fn expected(&self) -> TypeTag {
        self.expected
    }

    /// Response type the chain is built for.
    pub fn resolved(&self) -> TypeTag {
        self.resolved
    }

    /// Conversion from the resolved response to the expected one.
    ///
    /// `None` when both are the same type.
    pub fn conversion(&self) -> Option<&Conversion> {
        self.conversion.as_ref()
    }
}

/// An earlier final descriptor that matches a pair a later descriptor was
/// closed for.
///
/// The final handler ends the chain at that position, so the later
/// descriptor never runs for the pair. An earlier pipe is not reported: it is
/// consumed once linked and the later descriptor can still match next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shadowing {
    /// Descriptor that wins because it was registered first
    pub earlier: String,
    /// Descriptor that never gets the pair
    pub later: String,
    pub request: TypeTag,
    pub response: TypeTag,
}

/// Registry statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistryStats {
    pub total_descriptors: usize,
    pub pipe_descriptors: usize,
    pub final_descriptors: usize,
    pub open_descriptors: usize,
    pub closed_forms: usize,
    pub override_rules: usize,
    pub described_types: usize,
}

/// Collects descriptors, catalog registrations and overrides before freezing.
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    descriptors: Vec<HandlerDescriptor>,
    overrides: Vec<OverrideRule>,
    catalog: TypeCatalog,
}

impl RegistryBuilder {
    /// Create an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a descriptor. Registration order is matching priority.
    #[must_use]
    pub fn register(mut self, descriptor: HandlerDescriptor) -> Self {
        self.add(descriptor);
        self
    }

    /// Append a descriptor in place.
    pub fn add(&mut self, descriptor: HandlerDescriptor) {
        if self
            .descriptors
            .iter()
            .any(|existing| existing.name() == descriptor.name())
        {
            warn!(
                descriptor = descriptor.name(),
                "Descriptor name registered twice; both stay in matching order"
            );
        }
        self.descriptors.push(descriptor);
    }

    /// Register type capabilities and shapes.
    #[must_use]
    pub fn describe_types(mut self, describe: impl FnOnce(&mut TypeCatalog)) -> Self {
        describe(&mut self.catalog);
        self
    }

    /// Mutable access to the catalog.
    pub fn catalog_mut(&mut self) -> &mut TypeCatalog {
        &mut self.catalog
    }

    /// Dispatching `Req` while expecting `Expected` resolves the chain for `Resolved`.
    #[must_use]
    pub fn override_response<Req: 'static, Expected: 'static, Resolved: 'static>(mut self) -> Self {
        self.overrides.push(OverrideRule::new(
            TypeTag::of::<Req>(),
            TypeTag::of::<Expected>(),
            TypeTag::of::<Resolved>(),
        ));
        self
    }

    /// Add an override rule built from runtime tags.
    pub fn add_override(&mut self, rule: OverrideRule) {
        self.overrides.push(rule);
    }

    /// Merge another source: its descriptors are appended after ours,
    /// catalogs are merged and override rules concatenated.
    #[must_use]
    pub fn merge(mut self, other: RegistryBuilder) -> Self {
        for descriptor in other.descriptors {
            self.add(descriptor);
        }
        self.overrides.extend(other.overrides);
        self.catalog.merge(other.catalog);
        self
    }

    /// Number of descriptors collected so far.
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    /// Whether no descriptor has been registered.
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// Validate everything and freeze the registry.
    pub fn build(self) -> ConfigResult<HandlerRegistry> {
        let RegistryBuilder {
            descriptors,
            overrides,
            catalog,
        } = self;

        let mut frozen = Vec::with_capacity(descriptors.len());
        for mut descriptor in descriptors {
            descriptor.freeze(&catalog)?;
            debug!(
                descriptor = descriptor.name(),
                closed_forms = descriptor.closed_forms().len(),
                pipe = descriptor.is_pipe(),
                "Descriptor frozen"
            );
            frozen.push(Arc::new(descriptor));
        }

        let mut rules = HashMap::with_capacity(overrides.len());
        for mut rule in overrides {
            if rule.resolved != rule.expected {
                rule.conversion = Some(
                    catalog
                        .conversion(rule.resolved, rule.expected)
                        .cloned()
                        .ok_or(ConfigurationError::UnconvertibleOverride {
                            request: rule.request,
                            expected: rule.expected,
                            resolved: rule.resolved,
                        })?,
                );
            }
            let key = ChainKey::new(rule.request, rule.expected);
            if rules.insert(key, rule).is_some() {
                return Err(ConfigurationError::DuplicateOverride {
                    request: key.request,
                    expected: key.response,
                });
            }
        }

        let registry = HandlerRegistry {
            descriptors: frozen,
            overrides: rules,
            catalog,
        };
        let stats = registry.stats();
        info!(
            descriptors = stats.total_descriptors,
            closed_forms = stats.closed_forms,
            overrides = stats.override_rules,
            "Handler registry frozen"
        );
        Ok(registry)
    }
}

/// Frozen handler registry.
#[derive(Debug)]
pub struct HandlerRegistry {
    descriptors: Vec<Arc<HandlerDescriptor>>,
    overrides: HashMap<ChainKey, OverrideRule>,
    catalog: TypeCatalog,
}

impl HandlerRegistry {
    /// Start assembling a registry.
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// Descriptors in registration order.
    pub fn descriptors(&self) -> &[Arc<HandlerDescriptor>] {
        &self.descriptors
    }

    /// Catalog the descriptors are matched against.
    pub fn catalog(&self) -> &TypeCatalog {
        &self.catalog
    }

    /// Override rule for a dispatched pair.
    pub fn override_for(&self, key: ChainKey) -> Option<&OverrideRule> {
        self.overrides.get(&key)
    }

    /// Number of descriptors.
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    /// Whether the registry has no descriptors.
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// Registry statistics.
    pub fn stats(&self) -> RegistryStats {
        let pipe_descriptors = self.descriptors.iter().filter(|d| d.is_pipe()).count();
        RegistryStats {
            total_descriptors: self.descriptors.len(),
            pipe_descriptors,
            final_descriptors: self.descriptors.len() - pipe_descriptors,
            open_descriptors: self.descriptors.iter().filter(|d| d.is_open()).count(),
            closed_forms: self
                .descriptors
                .iter()
                .map(|d| d.closed_forms().len())
                .sum(),
            override_rules: self.overrides.len(),
            described_types: self.catalog.len(),
        }
    }

    /// Pairs a later descriptor was closed for but an earlier final handler
    /// ends the chain first.
    pub fn shadowed(&self) -> Vec<Shadowing> {
        let matcher = CapabilityMatcher::new(&self.catalog);
        let mut shadowed = Vec::new();

        for (position, later) in self.descriptors.iter().enumerate() {
            for closed in later.closed_forms() {
                let key = ChainKey::new(closed.request(), closed.response());
                let winner = self.descriptors[..position].iter().find(|earlier| {
                    !earlier.is_pipe()
                        && matcher.match_descriptor(earlier, key).is_some()
                });
                if let Some(earlier) = winner {
                    shadowed.push(Shadowing {
                        earlier: earlier.name().to_string(),
                        later: later.name().to_string(),
                        request: key.request,
                        response: key.response,
                    });
                }
            }
        }
        shadowed
    }
}
