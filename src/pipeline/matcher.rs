//! # Capability Matcher
//!
//! Decides whether a [`HandlerDescriptor`] can service a concrete
//! `(request, response)` pair and, if so, which closed implementation does.
//!
//! ## Algorithm
//!
//! 1. Unify the descriptor's request pattern with the request type. If that
//!    fails, try each convertible capability the catalog advertises for the
//!    request type, in registration order; a match through a capability
//!    records the conversion as the link's request coercion.
//! 2. Unify the response pattern with the expected response type. Responses
//!    are matched invariantly; widening is what override rules are for.
//! 3. Every declared parameter must now be bound and satisfy its bounds. The
//!    binding vector selects a closed implementation, whose concrete types are
//!    re-verified against the substituted patterns so a partial or
//!    inconsistent binding never produces a link.

use super::chain::ChainKey;
use crate::registry::{BoundHandler, HandlerDescriptor};
use crate::types::{substitute, unify, Bindings, Conversion, TypeCatalog, TypeTag};
use tracing::trace;

/// A successful capability match.
#[derive(Debug, Clone)]
pub struct CapabilityMatch<'d> {
    /// Closed handler selected for the pair
    pub handler: &'d BoundHandler,
    /// Concrete forwarded pair for pipe handlers
    pub forward: Option<(TypeTag, TypeTag)>,
    /// Conversion applied to the request before the handler sees it
    pub request_coercion: Option<Conversion>,
    /// Parameter bindings that selected the closed handler
    pub bindings: Bindings,
}

/// Structural matcher over a frozen catalog.
#[derive(Debug, Clone, Copy)]
pub struct CapabilityMatcher<'a> {
    catalog: &'a TypeCatalog,
}

impl<'a> CapabilityMatcher<'a> {
    /// Matcher resolving shapes and capabilities through `catalog`.
    pub fn new(catalog: &'a TypeCatalog) -> Self {
        Self { catalog }
    }

    /// Match `descriptor` against the concrete pair `key`.
    pub fn match_descriptor<'d>(
        &self,
        descriptor: &'d HandlerDescriptor,
        key: ChainKey,
    ) -> Option<CapabilityMatch<'d>> {
        let direct = std::iter::once((key.request, None));
        let through_capabilities = self
            .catalog
            .capabilities(key.request)
            .iter()
            .filter_map(|capability| {
                capability
                    .conversion()
                    .map(|conversion| (capability.tag(), Some(conversion.clone())))
            });

        for (request, coercion) in direct.chain(through_capabilities) {
            let mut bindings = Bindings::new();
            if !unify(descriptor.request_in(), request, self.catalog, &mut bindings) {
                continue;
            }
            if !unify(descriptor.response_out(), key.response, self.catalog, &mut bindings) {
                continue;
            }
            if let Some(matched) = self.close(descriptor, request, key.response, bindings, coercion) {
                return Some(matched);
            }
        }
        None
    }

    fn close<'d>(
        &self,
        descriptor: &'d HandlerDescriptor,
        request: TypeTag,
        response: TypeTag,
        bindings: Bindings,
        request_coercion: Option<Conversion>,
    ) -> Option<CapabilityMatch<'d>> {
        let Some(vector) = bindings.vector(descriptor.params()) else {
            trace!(
                descriptor = descriptor.name(),
                "Request and response leave a parameter unbound"
            );
            return None;
        };

        let bounds_hold = descriptor
            .params()
            .iter()
            .zip(&vector)
            .all(|(param, bound)| {
                param
                    .bounds()
                    .iter()
                    .all(|capability| self.catalog.satisfies(*bound, *capability))
            });
        if !bounds_hold {
            trace!(descriptor = descriptor.name(), "Bound type lacks a required capability");
            return None;
        }

        let Some(handler) = descriptor.closed_for(&vector) else {
            trace!(
                descriptor = descriptor.name(),
                "No closed implementation for these bindings"
            );
            return None;
        };

        let forward = match descriptor.forward() {
            Some((next_request, next_response)) => Some((
                substitute(next_request, &bindings, self.catalog)?,
                substitute(next_response, &bindings, self.catalog)?,
            )),
            None => None,
        };

        if handler.request() != request || handler.response() != response || handler.forward() != forward
        {
            trace!(
                descriptor = descriptor.name(),
                handler = handler.handler_type().name(),
                "Closed implementation does not have the bound handling shape"
            );
            return None;
        }

        Some(CapabilityMatch {
            handler,
            forward,
            request_coercion,
            bindings,
        })
    }
}
