//! # Type Model
//!
//! Runtime type identities, descriptor slot patterns and the capability
//! catalog used by the capability matcher.
//!
//! Handler descriptors never rely on reflection. A descriptor declares each
//! slot as a [`TypePattern`]; concrete request and response types are
//! [`TypeTag`]s; everything a type "implements" beyond its own identity is
//! advertised explicitly in the [`TypeCatalog`].
//!
//! ```text
//! TypePattern::Applied("Envelope", [Param("T")])
//!        │  unify
//!        ▼
//! TypeTag(Envelope<LoginRequest>) ──catalog shape──► ("Envelope", [LoginRequest])
//!                                                    binds T = LoginRequest
//! ```

pub mod catalog;

pub use catalog::{Capability, Conversion, TypeCatalog, TypeEntryBuilder, TypeShape};

use std::any::{Any, TypeId};
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};

/// A type-erased value moving through a chain.
pub type Payload = Box<dyn Any + Send>;

/// Runtime identity of a Rust type.
///
/// Equality and hashing use the [`TypeId`] only; the name is kept for
/// diagnostics. `dyn Trait` types are valid tags and serve as capability
/// markers.
#[derive(Clone, Copy)]
pub struct TypeTag {
    id: TypeId,
    name: &'static str,
}

impl TypeTag {
    /// Tag of `T`.
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    /// The underlying type id.
    pub fn id(&self) -> TypeId {
        self.id
    }

    /// Fully qualified type name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Type name without module paths, for compact log lines.
    pub fn short_name(&self) -> String {
        let mut short = String::with_capacity(self.name.len());
        let mut segment = String::new();
        for ch in self.name.chars() {
            if ch.is_alphanumeric() || ch == '_' || ch == ':' {
                segment.push(ch);
            } else {
                short.push_str(segment.rsplit("::").next().unwrap_or(&segment));
                segment.clear();
                short.push(ch);
            }
        }
        short.push_str(segment.rsplit("::").next().unwrap_or(&segment));
        short
    }
}

impl PartialEq for TypeTag {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeTag {}

impl Hash for TypeTag {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeTag({})", self.name)
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.short_name())
    }
}

/// Shape a handler descriptor declares for one of its type slots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypePattern {
    /// Exactly this type
    Exact(TypeTag),
    /// An open type parameter of the descriptor, bound during matching
    Param(&'static str),
    /// A generic constructor applied to argument patterns
    Applied {
        constructor: &'static str,
        args: Vec<TypePattern>,
    },
}

impl TypePattern {
    /// Pattern matching exactly `T`.
    pub fn exact<T: ?Sized + 'static>() -> Self {
        TypePattern::Exact(TypeTag::of::<T>())
    }

    /// Pattern for the open parameter `name`.
    pub fn param(name: &'static str) -> Self {
        TypePattern::Param(name)
    }

    /// Pattern for `constructor<args..>`.
    pub fn applied(constructor: &'static str, args: impl IntoIterator<Item = TypePattern>) -> Self {
        TypePattern::Applied {
            constructor,
            args: args.into_iter().collect(),
        }
    }

    /// Whether the pattern mentions any open parameter.
    pub fn is_open(&self) -> bool {
        match self {
            TypePattern::Exact(_) => false,
            TypePattern::Param(_) => true,
            TypePattern::Applied { args, .. } => args.iter().any(TypePattern::is_open),
        }
    }

    /// Collect parameter names in order of first appearance.
    pub fn collect_params(&self, names: &mut Vec<&'static str>) {
        match self {
            TypePattern::Exact(_) => {}
            TypePattern::Param(name) => {
                if !names.contains(name) {
                    names.push(name);
                }
            }
            TypePattern::Applied { args, .. } => {
                for arg in args {
                    arg.collect_params(names);
                }
            }
        }
    }
}

impl fmt::Display for TypePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypePattern::Exact(tag) => write!(f, "{tag}"),
            TypePattern::Param(name) => f.write_str(name),
            TypePattern::Applied { constructor, args } => {
                write!(f, "{constructor}<")?;
                for (position, arg) in args.iter().enumerate() {
                    if position > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                f.write_str(">")
            }
        }
    }
}

/// An open type parameter declared by a descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeParam {
    name: &'static str,
    bounds: Vec<TypeTag>,
}

impl TypeParam {
    /// Unbounded parameter.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            bounds: Vec::new(),
        }
    }

    /// Require the bound type to advertise capability `C`.
    #[must_use]
    pub fn bounded_by<C: ?Sized + 'static>(mut self) -> Self {
        self.bounds.push(TypeTag::of::<C>());
        self
    }

    /// Parameter name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Capabilities the bound type must satisfy.
    pub fn bounds(&self) -> &[TypeTag] {
        &self.bounds
    }
}

/// Parameter bindings produced by unification.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bindings(BTreeMap<&'static str, TypeTag>);

impl Bindings {
    /// Empty binding set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bound type of `name`.
    pub fn get(&self, name: &str) -> Option<TypeTag> {
        self.0.get(name).copied()
    }

    /// Bind `name`; returns false if it is already bound to another type.
    pub fn bind(&mut self, name: &'static str, tag: TypeTag) -> bool {
        match self.0.get(name) {
            Some(existing) => *existing == tag,
            None => {
                self.0.insert(name, tag);
                true
            }
        }
    }

    /// Binding vector ordered by the given parameter declarations.
    ///
    /// `None` if any declared parameter is unbound.
    pub fn vector(&self, params: &[TypeParam]) -> Option<Vec<TypeTag>> {
        params.iter().map(|param| self.get(param.name())).collect()
    }

    /// Number of bound parameters.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether nothing is bound.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Unify `pattern` with the concrete type `tag`, extending `bindings`.
///
/// Transactional: on failure `bindings` is left untouched.
pub fn unify(
    pattern: &TypePattern,
    tag: TypeTag,
    catalog: &TypeCatalog,
    bindings: &mut Bindings,
) -> bool {
    let mut attempt = bindings.clone();
    if unify_into(pattern, tag, catalog, &mut attempt) {
        *bindings = attempt;
        true
    } else {
        false
    }
}

fn unify_into(
    pattern: &TypePattern,
    tag: TypeTag,
    catalog: &TypeCatalog,
    bindings: &mut Bindings,
) -> bool {
    match pattern {
        TypePattern::Exact(expected) => *expected == tag,
        TypePattern::Param(name) => bindings.bind(name, tag),
        TypePattern::Applied { constructor, args } => {
            let Some(shape) = catalog.shape_of(tag) else {
                return false;
            };
            shape.constructor() == *constructor
                && shape.args().len() == args.len()
                && args
                    .iter()
                    .zip(shape.args())
                    .all(|(arg, arg_tag)| unify_into(arg, *arg_tag, catalog, bindings))
        }
    }
}

/// Substitute bindings into `pattern`, producing a concrete type.
///
/// `Applied` patterns resolve through the catalog's registered shapes.
pub fn substitute(
    pattern: &TypePattern,
    bindings: &Bindings,
    catalog: &TypeCatalog,
) -> Option<TypeTag> {
    match pattern {
        TypePattern::Exact(tag) => Some(*tag),
        TypePattern::Param(name) => bindings.get(name),
        TypePattern::Applied { constructor, args } => {
            let arg_tags = args
                .iter()
                .map(|arg| substitute(arg, bindings, catalog))
                .collect::<Option<Vec<_>>>()?;
            catalog.constructed(constructor, &arg_tags)
        }
    }
}
