//! # Chain Builder
//!
//! Assembles the ordered, terminated chain for one `(request, response)` pair.
//!
//! ```text
//! current = (Request, override(Response))
//! remaining = registry descriptors (working copy)
//! loop:
//!     first descriptor in `remaining` matching `current`?
//!         none     -> ResolutionError(current)
//!         final    -> append terminal link, done
//!         pipe     -> append link, current = forwarded pair
//!     remove it from `remaining`
//! ```
//!
//! Each descriptor is consumed at most once per chain, so building stops
//! after at most `registry.len()` iterations.

use super::chain::{Chain, ChainKey, PlannedLink};
use super::matcher::CapabilityMatcher;
use crate::error::ResolutionError;
use crate::registry::{HandlerDescriptor, HandlerRegistry};
use std::sync::Arc;
use tracing::{debug, warn};

/// Builds chains from a frozen registry.
#[derive(Debug, Clone, Copy)]
pub struct ChainBuilder<'a> {
    registry: &'a HandlerRegistry,
}

impl<'a> ChainBuilder<'a> {
    /// Builder over `registry`.
    pub fn new(registry: &'a HandlerRegistry) -> Self {
        Self { registry }
    }

    /// Build the chain for `key`.
    ///
    /// # Errors
    ///
    /// Returns a [`ResolutionError`] naming the pair no remaining descriptor
    /// could service.
    pub fn build(&self, key: ChainKey) -> Result<Arc<Chain>, ResolutionError> {
        let (resolved_response, response_conversion) = match self.registry.override_for(key) {
            Some(rule) => {
                debug!(
                    chain = %key,
                    resolved = %rule.resolved(),
                    "Applying response override"
                );
                (rule.resolved(), rule.conversion().cloned())
            }
            None => (key.response, None),
        };

        let matcher = CapabilityMatcher::new(self.registry.catalog());
        let mut remaining: Vec<&'a HandlerDescriptor> = self
            .registry
            .descriptors()
            .iter()
            .map(|descriptor| descriptor.as_ref())
            .collect();
        let mut current = ChainKey::new(key.request, resolved_response);
        let mut planned: Vec<PlannedLink> = Vec::new();

        loop {
            let found = remaining
                .iter()
                .copied()
                .enumerate()
                .find_map(|(position, descriptor)| {
                    matcher
                        .match_descriptor(descriptor, current)
                        .map(|matched| (position, matched))
                });

            let Some((position, matched)) = found else {
                let resolved: Vec<String> = planned
                    .iter()
                    .map(|link| link.handler.descriptor().to_string())
                    .collect();
                warn!(
                    chain = %key,
                    stuck = %current,
                    resolved = ?resolved,
                    "No descriptor matches chain position"
                );
                return Err(ResolutionError::new(
                    key.request,
                    key.response,
                    current.request,
                    current.response,
                )
                .with_resolved(resolved));
            };

            let descriptor = remaining.remove(position);
            debug!(
                chain = %key,
                position = planned.len(),
                descriptor = descriptor.name(),
                handler = matched.handler.handler_type().name(),
                pair = %current,
                coerced = matched.request_coercion.is_some(),
                "Linked descriptor"
            );

            let forward = matched.forward;
            planned.push(PlannedLink {
                handler: matched.handler.clone(),
                forward,
                request_coercion: matched.request_coercion,
            });

            match forward {
                Some((request, response)) => current = ChainKey::new(request, response),
                None => break,
            }
        }

        Ok(Chain::assemble(
            key,
            resolved_response,
            response_conversion,
            planned,
        ))
    }
}
