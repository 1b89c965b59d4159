//! Arena-backed type graph.
//!
//! Nodes are addressed by [`TypeId`]; recursive types are just ids that point
//! back at an ancestor. Specialized clones are appended to the same arena.
use std::collections::{HashMap, HashSet};

use indexmap::{IndexMap, IndexSet};
use once_cell::sync::Lazy;
use serde_json::Value;

use crate::model::{Annotations, Facet, Property, TypeId, TypeModel};

// ————————————————————————————————————————————————————————————————————————————
// TYPES
// ————————————————————————————————————————————————————————————————————————————

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Builtin {
    Any,
    String,
    Number,
    Integer,
    Boolean,
    Null,
    Object,
    Array,
    DateOnly,
    TimeOnly,
    DateTimeOnly,
    DateTime,
    File,
}

impl Builtin {
    pub const ALL: [Builtin; 13] = [
        Builtin::Any,
        Builtin::String,
        Builtin::Number,
        Builtin::Integer,
        Builtin::Boolean,
        Builtin::Null,
        Builtin::Object,
        Builtin::Array,
        Builtin::DateOnly,
        Builtin::TimeOnly,
        Builtin::DateTimeOnly,
        Builtin::DateTime,
        Builtin::File,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Builtin::Any => "any",
            Builtin::String => "string",
            Builtin::Number => "number",
            Builtin::Integer => "integer",
            Builtin::Boolean => "boolean",
            Builtin::Null => "null",
            Builtin::Object => "object",
            Builtin::Array => "array",
            Builtin::DateOnly => "date-only",
            Builtin::TimeOnly => "time-only",
            Builtin::DateTimeOnly => "datetime-only",
            Builtin::DateTime => "datetime",
            Builtin::File => "file",
        }
    }

    pub fn from_name(name: &str) -> Option<Builtin> {
        BUILTINS_BY_NAME.get(name).copied()
    }
}

static BUILTINS_BY_NAME: Lazy<HashMap<&'static str, Builtin>> =
    Lazy::new(|| Builtin::ALL.iter().map(|b| (b.name(), *b)).collect());

#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    /// Reserved, contents not built yet.
    Pending,
    Builtin(Builtin),
    /// Everything comes from `supertypes`; the node only adds constraints or
    /// annotations (e.g. `Email: { type: string, pattern: ... }`).
    Derived,
    Object { properties: IndexMap<String, PropertyDecl> },
    Array { items: TypeId },
    Union { options: Vec<TypeId> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct PropertyDecl {
    pub range: TypeId,
    pub required: bool,
    pub annotations: Annotations,
}

impl PropertyDecl {
    pub fn new(range: TypeId) -> Self {
        Self { range, required: true, annotations: Annotations::new() }
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    pub fn annotate(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.annotations.insert(name.into(), value.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypeNode {
    pub name: Option<String>,
    pub shape: Shape,
    pub supertypes: Vec<TypeId>,
    pub constraints: IndexMap<String, Value>,
    pub annotations: Annotations,
    /// Inherited property names this node hides.
    pub withheld: IndexSet<String>,
}

impl TypeNode {
    pub fn new(shape: Shape) -> Self {
        Self {
            name: None,
            shape,
            supertypes: Vec::new(),
            constraints: IndexMap::new(),
            annotations: Annotations::new(),
            withheld: IndexSet::new(),
        }
    }

    pub fn object<I, S>(properties: I) -> Self
    where
        I: IntoIterator<Item = (S, PropertyDecl)>,
        S: Into<String>,
    {
        let properties = properties.into_iter().map(|(k, p)| (k.into(), p)).collect();
        Self::new(Shape::Object { properties })
    }

    pub fn array(items: TypeId) -> Self {
        Self::new(Shape::Array { items })
    }

    pub fn union(options: Vec<TypeId>) -> Self {
        Self::new(Shape::Union { options })
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn extending(mut self, supertype: TypeId) -> Self {
        self.supertypes.push(supertype);
        self
    }

    pub fn annotate(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.annotations.insert(name.into(), value.into());
        self
    }
}

/// An arena of type nodes plus the name table for declared types.
#[derive(Debug, Clone)]
pub struct TypeCollection {
    nodes: Vec<TypeNode>,
    names: IndexMap<String, TypeId>,
}

// ————————————————————————————————————————————————————————————————————————————
// IMPLEMENTATION
// ————————————————————————————————————————————————————————————————————————————

impl Default for TypeCollection {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeCollection {
    pub fn new() -> Self {
        let mut out = Self { nodes: Vec::new(), names: IndexMap::new() };
        for b in Builtin::ALL {
            let id = out.push(TypeNode::new(Shape::Builtin(b)).named(b.name()));
            out.names.insert(b.name().to_string(), id);
        }
        out
    }

    /// Builtins are registered first, in `Builtin::ALL` order.
    pub fn builtin(&self, builtin: Builtin) -> TypeId {
        let idx = Builtin::ALL.iter().position(|b| *b == builtin).unwrap_or(0);
        TypeId(idx as u32)
    }

    pub fn get(&self, name: &str) -> Option<TypeId> {
        self.names.get(name).copied()
    }

    /// Declared (non-builtin) type names in declaration order.
    pub fn declared_names(&self) -> impl Iterator<Item = &str> {
        self.names
            .iter()
            .filter(|(_, id)| !self.is_builtin(**id))
            .map(|(name, _)| name.as_str())
    }

    pub fn node(&self, ty: TypeId) -> &TypeNode {
        &self.nodes[ty.index()]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Adds an anonymous node.
    pub fn add(&mut self, node: TypeNode) -> TypeId {
        self.push(node)
    }

    /// Adds a node and registers it under `name`.
    pub fn define(&mut self, name: impl Into<String>, node: TypeNode) -> TypeId {
        let name = name.into();
        let id = self.push(node.named(name.clone()));
        self.names.insert(name, id);
        id
    }

    /// Registers `name` with a pending node so that later declarations can refer
    /// to it before it is built.
    pub(crate) fn declare(&mut self, name: &str) -> TypeId {
        self.define(name, TypeNode::new(Shape::Pending))
    }

    /// Replaces the contents of `ty`, keeping its name when `node` has none.
    pub fn set(&mut self, ty: TypeId, mut node: TypeNode) {
        let slot = &mut self.nodes[ty.index()];
        if node.name.is_none() {
            node.name = slot.name.take();
        }
        *slot = node;
    }

    /// Drops every node from `len` on, along with the names bound to them.
    pub(crate) fn truncate(&mut self, len: usize) {
        self.nodes.truncate(len);
        self.names.retain(|_, id| id.index() < len);
    }

    fn push(&mut self, node: TypeNode) -> TypeId {
        let id = TypeId(self.nodes.len() as u32);
        self.nodes.push(node);
        id
    }

    fn collect_properties(
        &self,
        ty: TypeId,
        out: &mut IndexMap<String, Property>,
        visited: &mut HashSet<TypeId>,
    ) {
        if !visited.insert(ty) {
            return;
        }
        let node = self.node(ty);
        for sup in &node.supertypes {
            self.collect_properties(*sup, out, visited);
        }
        for name in &node.withheld {
            out.shift_remove(name);
        }
        match &node.shape {
            Shape::Object { properties } => {
                for (name, decl) in properties {
                    // insert keeps the inherited position when overriding
                    out.insert(name.clone(), Property {
                        name: name.clone(),
                        range: decl.range,
                        required: decl.required,
                        annotations: decl.annotations.clone(),
                    });
                }
            }
            Shape::Union { options } => {
                for option in options {
                    let mut merged = IndexMap::new();
                    self.collect_properties(*option, &mut merged, visited);
                    for (name, prop) in merged {
                        out.entry(name).or_insert(prop);
                    }
                }
            }
            _ => {}
        }
    }

    fn find_component(&self, ty: TypeId, visited: &mut HashSet<TypeId>) -> Option<TypeId> {
        if !visited.insert(ty) {
            return None;
        }
        let node = self.node(ty);
        match &node.shape {
            Shape::Array { items } => Some(*items),
            Shape::Union { options } => options.iter().find_map(|o| self.find_component(*o, visited)),
            _ => node.supertypes.iter().find_map(|s| self.find_component(*s, visited)),
        }
    }
}

impl TypeModel for TypeCollection {
    fn is_builtin(&self, ty: TypeId) -> bool {
        matches!(self.node(ty).shape, Shape::Builtin(_))
    }

    fn properties(&self, ty: TypeId) -> Vec<Property> {
        let mut out = IndexMap::new();
        self.collect_properties(ty, &mut out, &mut HashSet::new());
        out.into_values().collect()
    }

    fn component_type(&self, ty: TypeId) -> Option<TypeId> {
        self.find_component(ty, &mut HashSet::new())
    }

    fn all_options(&self, ty: TypeId) -> Vec<TypeId> {
        match &self.node(ty).shape {
            Shape::Union { options } => options.clone(),
            _ => vec![ty],
        }
    }

    fn annotations(&self, ty: TypeId) -> &Annotations {
        &self.node(ty).annotations
    }

    fn type_name(&self, ty: TypeId) -> Option<&str> {
        self.node(ty).name.as_deref()
    }

    fn facets(&self, ty: TypeId) -> Vec<Facet> {
        let node = self.node(ty);
        let mut out = Vec::new();
        out.extend(node.supertypes.iter().map(|s| Facet::Supertype(*s)));
        match &node.shape {
            Shape::Object { properties } => {
                for (name, decl) in properties {
                    out.push(Facet::HasProperty { name: name.clone(), required: decl.required });
                    out.push(Facet::PropertyIs {
                        name: name.clone(),
                        range: decl.range,
                        annotations: decl.annotations.clone(),
                    });
                }
            }
            Shape::Array { items } => out.push(Facet::Items(*items)),
            Shape::Union { options } => out.extend(options.iter().map(|o| Facet::Option(*o))),
            Shape::Pending | Shape::Builtin(_) | Shape::Derived => {}
        }
        out.extend(node.withheld.iter().map(|name| Facet::Withheld { name: name.clone() }));
        out.extend(node.constraints.iter().map(|(name, value)| Facet::Constraint {
            name: name.clone(),
            value: value.clone(),
        }));
        out.extend(node.annotations.iter().map(|(name, value)| Facet::Annotation {
            name: name.clone(),
            value: value.clone(),
        }));
        out
    }

    fn reserve(&mut self) -> TypeId {
        self.push(TypeNode::new(Shape::Pending))
    }

    fn assemble(&mut self, target: TypeId, source: TypeId, facets: Vec<Facet>) {
        let any = self.builtin(Builtin::Any);
        let src = self.node(source);
        let mut node = TypeNode::new(Shape::Pending);
        node.name = src.name.clone();

        let mut exists: IndexMap<String, bool> = IndexMap::new();
        let mut ranges: HashMap<String, (TypeId, Annotations)> = HashMap::new();
        let mut items = None;
        let mut options = Vec::new();
        for facet in facets {
            match facet {
                Facet::HasProperty { name, required } => {
                    exists.insert(name, required);
                }
                Facet::PropertyIs { name, range, annotations } => {
                    ranges.insert(name, (range, annotations));
                }
                Facet::Items(ty) => items = Some(ty),
                Facet::Supertype(ty) => node.supertypes.push(ty),
                Facet::Withheld { name } => {
                    node.withheld.insert(name);
                }
                Facet::Option(ty) => options.push(ty),
                Facet::Constraint { name, value } => {
                    node.constraints.insert(name, value);
                }
                Facet::Annotation { name, value } => {
                    node.annotations.insert(name, value);
                }
            }
        }

        node.shape = match &src.shape {
            Shape::Pending => Shape::Pending,
            Shape::Builtin(b) => Shape::Builtin(*b),
            Shape::Derived => Shape::Derived,
            Shape::Object { .. } => {
                let properties = exists
                    .into_iter()
                    .map(|(name, required)| {
                        let (range, annotations) =
                            ranges.remove(&name).unwrap_or_else(|| (any, Annotations::new()));
                        (name, PropertyDecl { range, required, annotations })
                    })
                    .collect();
                Shape::Object { properties }
            }
            Shape::Array { items: original } => Shape::Array { items: items.unwrap_or(*original) },
            Shape::Union { .. } => Shape::Union { options },
        };
        self.nodes[target.index()] = node;
    }
}

// ————————————————————————————————————————————————————————————————————————————
// TESTS
// ————————————————————————————————————————————————————————————————————————————
