//! JSON type-collection documents → [`TypeCollection`].
//!
//! ```json
//! { "types": {
//!     "Pet":    { "properties": { "name": "string", "bio?": { "type": "string", "(scopes)": "read" } } },
//!     "Person": { "properties": { "name": "string", "pets?": { "type": "Pet[]", "(scopes)": ["read", "list"] } } }
//! } }
//! ```
//!
//! - a declaration is a type expression (`Pet`, `Pet[]`, `A | B`, `(A | B)[]`)
//!   or an object with `type`, `properties`, `items`, `anyOf`/`oneOf`
//! - `(name)` keys are annotations, every other unknown key is a constraint
//! - a `?` suffix on a property name makes it optional
//! - names may be used before they are declared, which is how recursive types
//!   are written
use std::collections::HashSet;

use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::collection::{Builtin, PropertyDecl, Shape, TypeCollection, TypeNode};
use crate::model::{Annotations, TypeId};
use crate::path_de;

// ————————————————————————————————————————————————————————————————————————————
// TYPES
// ————————————————————————————————————————————————————————————————————————————

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LoadError {
    #[error("malformed type document {0}")]
    Document(String),
    #[error("unknown type `{name}` referenced from `{context}`")]
    UnknownType { name: String, context: String },
    #[error("invalid type expression `{expr}`: {reason}")]
    BadExpression { expr: String, reason: &'static str },
    #[error("`{0}` is a builtin type and cannot be redeclared")]
    ReservedName(String),
    #[error("type `{0}` is already declared")]
    Duplicate(String),
    #[error("type `{0}` inherits from itself")]
    CyclicInheritance(String),
}

#[derive(Debug, Deserialize)]
struct Document {
    #[serde(default)]
    types: IndexMap<String, Decl>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum Decl {
    Expr(String),
    Full(Box<FullDecl>),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum Bases {
    One(String),
    Many(Vec<String>),
}

#[derive(Debug, Clone, Default, Deserialize)]
struct FullDecl {
    #[serde(rename = "type", default)]
    base: Option<Bases>,
    #[serde(default)]
    properties: Option<IndexMap<String, Decl>>,
    #[serde(default)]
    items: Option<Decl>,
    #[serde(default, rename = "anyOf", alias = "oneOf")]
    any_of: Option<Vec<Decl>>,
    #[serde(default)]
    required: Option<bool>,
    #[serde(flatten)]
    rest: IndexMap<String, Value>,
}

/// Parsed type expression.
#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Name(String),
    Array(Box<Expr>),
    Union(Vec<Expr>),
}

// ————————————————————————————————————————————————————————————————————————————
// ENTRY POINTS
// ————————————————————————————————————————————————————————————————————————————

impl TypeCollection {
    pub fn from_json_str(src: &str) -> Result<Self, LoadError> {
        let doc: Document = path_de::from_str_with_path(src).map_err(LoadError::Document)?;
        Self::from_document(doc)
    }

    pub fn from_json_value(value: Value) -> Result<Self, LoadError> {
        let doc: Document = path_de::from_value_with_path(value).map_err(LoadError::Document)?;
        Self::from_document(doc)
    }

    /// Adds a single named declaration, e.g. `parse_type("Hello", json!({"properties": {...}}))`.
    ///
    /// On error the collection is left as it was before the call.
    pub fn parse_type(&mut self, name: &str, decl: Value) -> Result<TypeId, LoadError> {
        let decl: Decl = path_de::from_value_with_path(decl).map_err(LoadError::Document)?;
        let mark = self.len();
        let id = self.declare_checked(name)?;
        let built = Loader { tc: &mut *self, context: name }.named(&decl);
        let result = built.and_then(|node| {
            self.set(id, node);
            check_inheritance(self, id)
        });
        if let Err(err) = result {
            self.truncate(mark);
            return Err(err);
        }
        Ok(id)
    }

    fn from_document(doc: Document) -> Result<Self, LoadError> {
        let mut tc = TypeCollection::new();
        let mut ids = Vec::with_capacity(doc.types.len());
        for name in doc.types.keys() {
            ids.push(tc.declare_checked(name)?);
        }
        for ((name, decl), id) in doc.types.iter().zip(&ids) {
            let node = Loader { tc: &mut tc, context: name }.named(decl)?;
            tc.set(*id, node);
        }
        for id in ids {
            check_inheritance(&tc, id)?;
        }
        debug!(types = doc.types.len(), nodes = tc.len(), "loaded type collection");
        Ok(tc)
    }

    fn declare_checked(&mut self, name: &str) -> Result<TypeId, LoadError> {
        if Builtin::from_name(name).is_some() {
            return Err(LoadError::ReservedName(name.to_string()));
        }
        if self.get(name).is_some() {
            return Err(LoadError::Duplicate(name.to_string()));
        }
        Ok(self.declare(name))
    }
}

// ————————————————————————————————————————————————————————————————————————————
// IMPLEMENTATION
// ————————————————————————————————————————————————————————————————————————————

struct Loader<'a> {
    tc: &'a mut TypeCollection,
    context: &'a str,
}

impl Loader<'_> {
    /// Node contents for a declaration that owns its own slot.
    fn named(&mut self, decl: &Decl) -> Result<TypeNode, LoadError> {
        match decl {
            Decl::Expr(src) => {
                let expr = parse_expr(src)?;
                self.node_from_expr(&expr)
            }
            Decl::Full(full) => {
                let (node, annotations) = self.node_from_full(full)?;
                Ok(TypeNode { annotations, ..node })
            }
        }
    }

    /// The range of a property: plain references stay references so that
    /// builtins and named types keep their identity.
    fn property(&mut self, key: &str, decl: &Decl) -> Result<(String, PropertyDecl), LoadError> {
        let (name, optional) = match key.strip_suffix('?') {
            Some(name) => (name.to_string(), true),
            None => (key.to_string(), false),
        };
        let mut prop = match decl {
            Decl::Expr(src) => PropertyDecl::new(self.resolve_src(src)?),
            Decl::Full(full) => {
                let (node, annotations) = self.node_from_full(full)?;
                let range = match (&full.base, is_plain_reference(&node)) {
                    (Some(Bases::One(src)), true) => self.resolve_src(src)?,
                    _ => self.tc.add(node),
                };
                let mut prop = PropertyDecl::new(range);
                prop.annotations = annotations;
                if let Some(required) = full.required {
                    prop.required = required;
                }
                prop
            }
        };
        if optional {
            prop.required = false;
        }
        Ok((name, prop))
    }

    /// Builds the node for an object declaration; annotations are returned
    /// separately since property declarations hand them to the property.
    fn node_from_full(&mut self, full: &FullDecl) -> Result<(TypeNode, Annotations), LoadError> {
        let bases: Vec<&str> = match &full.base {
            None => Vec::new(),
            Some(Bases::One(src)) => vec![src.as_str()],
            Some(Bases::Many(srcs)) => srcs.iter().map(String::as_str).collect(),
        };
        let mut node = if let Some(props) = &full.properties {
            let mut properties = IndexMap::new();
            for (key, decl) in props {
                let (name, prop) = self.property(key, decl)?;
                properties.insert(name, prop);
            }
            let mut node = TypeNode::new(Shape::Object { properties });
            for src in bases.iter().filter(|s| s.trim() != Builtin::Object.name()) {
                node.supertypes.push(self.resolve_src(src)?);
            }
            node
        } else if let Some(items) = &full.items {
            let items = match items {
                Decl::Expr(src) => self.resolve_src(src)?,
                Decl::Full(inner) => {
                    let (inner, annotations) = self.node_from_full(inner)?;
                    self.tc.add(TypeNode { annotations, ..inner })
                }
            };
            TypeNode::array(items)
        } else if let Some(options) = &full.any_of {
            let mut ids = Vec::with_capacity(options.len());
            for option in options {
                let node = self.named(option)?;
                ids.push(match (option, is_plain_reference(&node)) {
                    (Decl::Expr(src), true) => self.resolve_src(src)?,
                    _ => self.tc.add(node),
                });
            }
            TypeNode::union(ids)
        } else {
            match bases.as_slice() {
                [] => TypeNode::object(Vec::<(String, PropertyDecl)>::new()),
                [src] => self.node_from_expr(&parse_expr(src)?)?,
                srcs => {
                    let mut node = TypeNode::new(Shape::Derived);
                    for src in srcs {
                        node.supertypes.push(self.resolve_src(src)?);
                    }
                    node
                }
            }
        };

        let mut annotations = Annotations::new();
        for (key, value) in &full.rest {
            match key.strip_prefix('(').and_then(|k| k.strip_suffix(')')) {
                Some(name) => {
                    annotations.insert(name.to_string(), value.clone());
                }
                None => {
                    node.constraints.insert(key.clone(), value.clone());
                }
            }
        }
        Ok((node, annotations))
    }

    /// Top-level expression of a declaration: arrays and unions become the node
    /// itself, anything else is inherited from.
    fn node_from_expr(&mut self, expr: &Expr) -> Result<TypeNode, LoadError> {
        Ok(match expr {
            Expr::Array(inner) => TypeNode::array(self.resolve(inner)?),
            Expr::Union(options) => {
                let mut ids = Vec::with_capacity(options.len());
                for option in options {
                    ids.push(self.resolve(option)?);
                }
                TypeNode::union(ids)
            }
            Expr::Name(name) => match Builtin::from_name(name) {
                Some(Builtin::Object) => TypeNode::object(Vec::<(String, PropertyDecl)>::new()),
                Some(Builtin::Array) => TypeNode::array(self.tc.builtin(Builtin::Any)),
                _ => TypeNode::new(Shape::Derived).extending(self.resolve(expr)?),
            },
        })
    }

    fn resolve_src(&mut self, src: &str) -> Result<TypeId, LoadError> {
        let expr = parse_expr(src)?;
        self.resolve(&expr)
    }

    fn resolve(&mut self, expr: &Expr) -> Result<TypeId, LoadError> {
        match expr {
            Expr::Name(name) => self.tc.get(name).ok_or_else(|| LoadError::UnknownType {
                name: name.clone(),
                context: self.context.to_string(),
            }),
            Expr::Array(_) | Expr::Union(_) => {
                let node = self.node_from_expr(expr)?;
                Ok(self.tc.add(node))
            }
        }
    }
}

/// A node that adds nothing to the single type it extends.
fn is_plain_reference(node: &TypeNode) -> bool {
    matches!(node.shape, Shape::Derived)
        && node.supertypes.len() == 1
        && node.constraints.is_empty()
        && node.annotations.is_empty()
}

fn check_inheritance(tc: &TypeCollection, root: TypeId) -> Result<(), LoadError> {
    fn visit(tc: &TypeCollection, ty: TypeId, root: TypeId, seen: &mut HashSet<TypeId>) -> bool {
        if !seen.insert(ty) {
            return false;
        }
        tc.node(ty).supertypes.iter().any(|s| *s == root || visit(tc, *s, root, seen))
    }
    if visit(tc, root, root, &mut HashSet::new()) {
        let name = tc.node(root).name.clone().unwrap_or_default();
        return Err(LoadError::CyclicInheritance(name));
    }
    Ok(())
}

// ————————————————————————————————————————————————————————————————————————————
// TYPE EXPRESSIONS
// ————————————————————————————————————————————————————————————————————————————

//   union   := postfix ('|' postfix)*
//   postfix := primary ('[]')*
//   primary := name | '(' union ')'
fn parse_expr(src: &str) -> Result<Expr, LoadError> {
    let mut p = ExprParser { src, pos: 0 };
    let expr = p.union()?;
    p.skip_ws();
    if p.pos != src.len() {
        return Err(p.error("unexpected trailing input"));
    }
    Ok(expr)
}

struct ExprParser<'a> {
    src: &'a str,
    pos: usize,
}

impl ExprParser<'_> {
    fn union(&mut self) -> Result<Expr, LoadError> {
        let mut options = vec![self.postfix()?];
        while self.eat('|') {
            options.push(self.postfix()?);
        }
        Ok(if options.len() == 1 { options.remove(0) } else { Expr::Union(options) })
    }

    fn postfix(&mut self) -> Result<Expr, LoadError> {
        let mut expr = self.primary()?;
        while self.eat('[') {
            if !self.eat(']') {
                return Err(self.error("expected `]`"));
            }
            expr = Expr::Array(Box::new(expr));
        }
        Ok(expr)
    }

    fn primary(&mut self) -> Result<Expr, LoadError> {
        if self.eat('(') {
            let inner = self.union()?;
            if !self.eat(')') {
                return Err(self.error("expected `)`"));
            }
            return Ok(inner);
        }
        self.skip_ws();
        let rest = &self.src[self.pos..];
        let len = rest
            .find(|c: char| !(c.is_alphanumeric() || matches!(c, '_' | '-' | '.')))
            .unwrap_or(rest.len());
        if len == 0 {
            return Err(self.error("expected a type name"));
        }
        self.pos += len;
        Ok(Expr::Name(rest[..len].to_string()))
    }

    fn eat(&mut self, c: char) -> bool {
        self.skip_ws();
        if self.src[self.pos..].starts_with(c) {
            self.pos += c.len_utf8();
            true
        } else {
            false
        }
    }

    fn skip_ws(&mut self) {
        let rest = &self.src[self.pos..];
        self.pos += rest.len() - rest.trim_start().len();
    }

    fn error(&self, reason: &'static str) -> LoadError {
        LoadError::BadExpression { expr: self.src.to_string(), reason }
    }
}

// ————————————————————————————————————————————————————————————————————————————
// TESTS
// ————————————————————————————————————————————————————————————————————————————
