//! JSON Schema emission for (specialized) types.
//!
//! Named types go under `$defs` and are referenced with `$ref`, so recursive
//! graphs produce finite schemas. Specialized clones keep their source name;
//! when two different nodes share a name the later one gets a numeric suffix.
use std::collections::HashMap;

use serde_json::{Map, Value, json};

use crate::collection::{Builtin, Shape, TypeCollection};
use crate::model::{TypeId, TypeModel};

pub const SCHEMA_DIALECT: &str = "https://json-schema.org/draft/2020-12/schema";

/// Emits a standalone schema document for `root`.
pub fn emit_schema(tc: &TypeCollection, root: TypeId) -> Value {
    let mut em = Emitter { tc, defs: Map::new(), def_names: HashMap::new() };
    let body = em.schema_of(root);

    let mut doc = Map::new();
    doc.insert("$schema".into(), Value::from(SCHEMA_DIALECT));
    if let Value::Object(fields) = body {
        doc.extend(fields);
    }
    if !em.defs.is_empty() {
        doc.insert("$defs".into(), Value::Object(em.defs));
    }
    Value::Object(doc)
}

pub fn builtin_schema(b: Builtin) -> Value {
    match b {
        Builtin::Any => json!({}),
        Builtin::String => json!({ "type": "string" }),
        Builtin::Number => json!({ "type": "number" }),
        Builtin::Integer => json!({ "type": "integer" }),
        Builtin::Boolean => json!({ "type": "boolean" }),
        Builtin::Null => json!({ "type": "null" }),
        Builtin::Object => json!({ "type": "object" }),
        Builtin::Array => json!({ "type": "array" }),
        Builtin::DateOnly => json!({ "type": "string", "format": "date" }),
        Builtin::TimeOnly => json!({ "type": "string", "format": "time" }),
        Builtin::DateTimeOnly | Builtin::DateTime => json!({ "type": "string", "format": "date-time" }),
        Builtin::File => json!({ "type": "string", "contentEncoding": "base64" }),
    }
}

struct Emitter<'a> {
    tc: &'a TypeCollection,
    defs: Map<String, Value>,
    def_names: HashMap<TypeId, String>,
}

impl<'a> Emitter<'a> {
    fn schema_of(&mut self, ty: TypeId) -> Value {
        let tc = self.tc;
        let node = tc.node(ty);
        if let Shape::Builtin(b) = node.shape {
            return builtin_schema(b);
        }
        match &node.name {
            Some(name) => {
                let def = match self.def_names.get(&ty) {
                    Some(def) => def.clone(),
                    None => self.define(ty, name),
                };
                json!({ "$ref": format!("#/$defs/{def}") })
            }
            None => self.body_of(ty),
        }
    }

    fn define(&mut self, ty: TypeId, name: &str) -> String {
        let mut def = name.to_string();
        let mut n = 1;
        while self.defs.contains_key(&def) {
            n += 1;
            def = format!("{name}_{n}");
        }
        self.def_names.insert(ty, def.clone());
        // placeholder keeps declaration order and marks the name as taken
        self.defs.insert(def.clone(), Value::Null);
        let body = self.body_of(ty);
        self.defs.insert(def.clone(), body);
        def
    }

    fn body_of(&mut self, ty: TypeId) -> Value {
        let tc = self.tc;
        let node = tc.node(ty);
        let mut o = match &node.shape {
            Shape::Pending => json!({}),
            Shape::Builtin(b) => builtin_schema(*b),
            Shape::Object { .. } => {
                let mut props = Map::new();
                let mut required = Vec::new();
                for p in tc.properties(ty) {
                    if p.required {
                        required.push(Value::from(p.name.clone()));
                    }
                    props.insert(p.name, self.schema_of(p.range));
                }
                let mut o = json!({ "type": "object", "properties": props });
                if !required.is_empty() {
                    o["required"] = Value::Array(required);
                }
                o
            }
            Shape::Array { items } => json!({ "type": "array", "items": self.schema_of(*items) }),
            Shape::Union { options } => {
                json!({ "anyOf": options.iter().map(|o| self.schema_of(*o)).collect::<Vec<_>>() })
            }
            Shape::Derived => match node.supertypes.as_slice() {
                [single] => match tc.node(*single).shape {
                    Shape::Builtin(b) => builtin_schema(b),
                    _ => json!({ "allOf": [self.schema_of(*single)] }),
                },
                many => json!({ "allOf": many.iter().map(|s| self.schema_of(*s)).collect::<Vec<_>>() }),
            },
        };
        if let Some(fields) = o.as_object_mut() {
            for (k, v) in &node.constraints {
                fields.entry(k.clone()).or_insert_with(|| v.clone());
            }
        }
        o
    }
}

// ————————————————————————————————————————————————————————————————————————————
// TESTS
// ————————————————————————————————————————————————————————————————————————————
