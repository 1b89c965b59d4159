//! Scope-based specialization of structural types and projection of JSON
//! values onto the specialized shapes.
//!
//! A [`TypeCollection`] holds named and anonymous types. Properties carry a
//! `scopes` annotation; [`specialize`] clones a type keeping only what a
//! caller holding a list of scopes may see, and [`to_shape`] strips a JSON
//! value down to that view.
pub mod collection;
pub mod loader;
pub mod model;
mod path_de;
pub mod schema;
pub mod scopes;
pub mod shape;
pub mod specialize;

pub use collection::{Builtin, PropertyDecl, Shape, TypeCollection, TypeNode};
pub use loader::LoadError;
pub use model::{Annotations, Facet, Property, SCOPES_ANNOTATION, TypeId, TypeModel};
pub use schema::emit_schema;
pub use scopes::{ScopeKind, ScopeRule, ScopeToken};
pub use shape::{Projector, ShapeError, to_shape};
pub use specialize::specialize;
