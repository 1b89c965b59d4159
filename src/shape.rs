//! Projection of JSON values onto scope-specialized types.
use std::collections::HashMap;

use serde_json::{Map, Value};
use thiserror::Error;
use tracing::trace;

use crate::model::{TypeId, TypeModel};
use crate::specialize::specialize;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ShapeError {
    #[error("array at `{pointer}` is declared as {ty}, which has no component type")]
    NoComponentType { pointer: String, ty: String },
}

/// Copies `value` keeping only what `ty` exposes under `provided`.
///
/// - `null` and scalars come back unchanged, with no type lookup
/// - arrays keep length and order, elements are projected with the component type
/// - objects keep the specialized type's properties, in its order, skipping
///   absent and `null` fields
///
/// Every call specializes afresh and the clones stay in the model. To project
/// many values with the same scopes, reuse one [`Projector`].
pub fn to_shape<M>(model: &mut M, value: &Value, ty: TypeId, provided: &[String]) -> Result<Value, ShapeError>
where
    M: TypeModel + ?Sized,
{
    Projector::new(model, provided).project(value, ty)
}

/// Projection context for one value and one scope list.
pub struct Projector<'m, 'p, M: TypeModel + ?Sized> {
    model: &'m mut M,
    provided: &'p [String],
    /// `type → specialize(type, provided)` for this projection only.
    specialized: HashMap<TypeId, TypeId>,
    path: Vec<String>,
}

impl<'m, 'p, M: TypeModel + ?Sized> Projector<'m, 'p, M> {
    pub fn new(model: &'m mut M, provided: &'p [String]) -> Self {
        Self { model, provided, specialized: HashMap::new(), path: Vec::new() }
    }

    /// Projects one value; specializations are shared with earlier calls.
    pub fn project(&mut self, value: &Value, ty: TypeId) -> Result<Value, ShapeError> {
        self.path.clear();
        self.project_at(value, ty)
    }

    fn project_at(&mut self, value: &Value, ty: TypeId) -> Result<Value, ShapeError> {
        match value {
            Value::Array(xs) => {
                let component = self.model.component_type(ty).ok_or_else(|| self.no_component(ty))?;
                let mut out = Vec::with_capacity(xs.len());
                for (i, x) in xs.iter().enumerate() {
                    self.path.push(i.to_string());
                    out.push(self.project_at(x, component)?);
                    self.path.pop();
                }
                Ok(Value::Array(out))
            }
            Value::Object(fields) => {
                let specialized = self.specialize(ty);
                let mut out = Map::new();
                for property in self.model.properties(specialized) {
                    let Some(field) = fields.get(&property.name).filter(|v| !v.is_null()) else {
                        continue;
                    };
                    // nested calls reuse the caller's scopes; ranges are already narrowed
                    self.path.push(property.name.clone());
                    let shaped = self.project_at(field, property.range)?;
                    self.path.pop();
                    out.insert(property.name, shaped);
                }
                Ok(Value::Object(out))
            }
            scalar => Ok(scalar.clone()),
        }
    }

    fn specialize(&mut self, ty: TypeId) -> TypeId {
        if let Some(done) = self.specialized.get(&ty) {
            return *done;
        }
        let out = specialize(&mut *self.model, ty, self.provided);
        trace!(?ty, specialized = ?out, "projecting object");
        self.specialized.insert(ty, out);
        out
    }

    fn no_component(&self, ty: TypeId) -> ShapeError {
        let ty = match self.model.type_name(ty) {
            Some(name) => format!("`{name}`"),
            None => format!("anonymous type #{}", ty.index()),
        };
        ShapeError::NoComponentType { pointer: json_pointer(&self.path), ty }
    }
}

fn json_pointer(path: &[String]) -> String {
    path.iter()
        .map(|seg| format!("/{}", seg.replace('~', "~0").replace('/', "~1")))
        .collect()
}

// ————————————————————————————————————————————————————————————————————————————
// TESTS
// ————————————————————————————————————————————————————————————————————————————
