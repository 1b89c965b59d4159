//! Read-side view of a type graph plus the clone primitive the specializer
//! builds new nodes with.
//!
//! The graph itself is owned by whoever implements [`TypeModel`]; the core only
//! reads nodes and appends freshly specialized ones.

use indexmap::IndexMap;
use serde_json::Value;

/// Arena handle for a type node. Two handles are the same node iff they are equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TypeId(pub(crate) u32);

impl TypeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Annotations keyed by name, in declaration order.
pub type Annotations = IndexMap<String, Value>;

/// Name of the annotation carrying scope expressions.
pub const SCOPES_ANNOTATION: &str = "scopes";

#[derive(Debug, Clone, PartialEq)]
pub struct Property {
    pub name: String,
    pub range: TypeId,
    pub required: bool,
    /// Annotations declared alongside the property's range.
    pub annotations: Annotations,
}

/// One structural piece of a node, as seen by the clone step.
///
/// `facets()` decomposes a node into these; `assemble()` rebuilds a node from
/// whatever subset (possibly with replaced type handles) the caller keeps.
#[derive(Debug, Clone, PartialEq)]
pub enum Facet {
    /// "This property exists."
    HasProperty { name: String, required: bool },
    /// "This property's value has this type."
    PropertyIs { name: String, range: TypeId, annotations: Annotations },
    /// Array element type.
    Items(TypeId),
    /// Inheritance linkage.
    Supertype(TypeId),
    /// Union member.
    Option(TypeId),
    /// An inherited property of this name is dropped from the node.
    Withheld { name: String },
    /// Constraint or metadata, opaque to the core.
    Constraint { name: String, value: Value },
    Annotation { name: String, value: Value },
}

/// What the specializer needs from a type graph.
pub trait TypeModel {
    fn is_builtin(&self, ty: TypeId) -> bool;

    /// All properties in output order, inherited ones included.
    fn properties(&self, ty: TypeId) -> Vec<Property>;

    fn property(&self, ty: TypeId, name: &str) -> Option<Property> {
        self.properties(ty).into_iter().find(|p| p.name == name)
    }

    fn component_type(&self, ty: TypeId) -> Option<TypeId>;

    fn all_options(&self, ty: TypeId) -> Vec<TypeId>;

    fn annotations(&self, ty: TypeId) -> &Annotations;

    fn type_name(&self, ty: TypeId) -> Option<&str>;

    /// Structural decomposition of a single node (not its inherited members).
    fn facets(&self, ty: TypeId) -> Vec<Facet>;

    /// Allocates an empty node whose contents are filled in by [`TypeModel::assemble`].
    fn reserve(&mut self) -> TypeId;

    /// Builds `target` as a node of the same kind as `source` from `facets`.
    fn assemble(&mut self, target: TypeId, source: TypeId, facets: Vec<Facet>);
}
