//! Scope specialization of a type graph.
//!
//! `specialize(ty, P)` clones `ty` facet by facet, keeping only the properties
//! visible under `P` and specializing every nested type it keeps. Recursive
//! graphs terminate through the in-flight stack: a `(type, P)` pair that is
//! already being cloned resolves to the node under construction.
use std::collections::HashMap;

use tracing::{debug_span, trace};

use crate::model::{Facet, TypeId, TypeModel};
use crate::scopes::{Downstream, ScopeKey, ScopeRule, classify};

/// Specializes `ty` for `provided` with a fresh call-scoped in-flight stack.
pub fn specialize<M>(model: &mut M, ty: TypeId, provided: &[String]) -> TypeId
where
    M: TypeModel + ?Sized,
{
    let _span = debug_span!("specialize", ?ty, scopes = %ScopeKey::of(provided)).entered();
    Specializer::new(model).specialize(ty, provided)
}

#[derive(Debug)]
struct InFlight {
    source: TypeId,
    key: ScopeKey,
    result: TypeId,
}

/// Specialization context. One per top-level call; never shared between calls.
pub struct Specializer<'m, M: TypeModel + ?Sized> {
    model: &'m mut M,
    in_flight: Vec<InFlight>,
}

impl<'m, M: TypeModel + ?Sized> Specializer<'m, M> {
    pub fn new(model: &'m mut M) -> Self {
        Self { model, in_flight: Vec::new() }
    }

    pub fn specialize(&mut self, ty: TypeId, provided: &[String]) -> TypeId {
        if self.model.is_builtin(ty) {
            return ty;
        }
        let key = ScopeKey::of(provided);
        if let Some(result) = self.lookup(ty, &key) {
            trace!(?ty, ?result, scopes = %key, "in-flight hit");
            return result;
        }

        let visible = self.classify_properties(ty, provided);
        let result = self.model.reserve();
        self.in_flight.push(InFlight { source: ty, key, result });

        let facets = self.model.facets(ty);
        let mut kept = Vec::with_capacity(facets.len());
        for facet in facets {
            if let Some(facet) = self.filter_facet(facet, &visible, provided) {
                kept.push(facet);
            }
        }
        self.model.assemble(result, ty, kept);

        self.in_flight.pop();
        result
    }

    fn lookup(&self, ty: TypeId, key: &ScopeKey) -> Option<TypeId> {
        self.in_flight
            .iter()
            .rev()
            .find(|r| r.source == ty && &r.key == key)
            .map(|r| r.result)
    }

    /// Visible property names with the scopes each one passes down.
    fn classify_properties(&self, ty: TypeId, provided: &[String]) -> HashMap<String, Downstream> {
        self.model
            .properties(ty)
            .into_iter()
            .filter_map(|property| {
                let rule = ScopeRule::of_property(&property, self.model.annotations(property.range));
                let decision = classify(rule.as_ref(), provided);
                trace!(property = %property.name, visible = decision.is_some(), "classified");
                decision.map(|d| (property.name, d))
            })
            .collect()
    }

    fn filter_facet(
        &mut self,
        facet: Facet,
        visible: &HashMap<String, Downstream>,
        provided: &[String],
    ) -> Option<Facet> {
        match facet {
            // a hidden own declaration must also hide what the supertypes provide
            Facet::HasProperty { name, required } => Some(if visible.contains_key(&name) {
                Facet::HasProperty { name, required }
            } else {
                Facet::Withheld { name }
            }),
            Facet::PropertyIs { name, range, annotations } => {
                let downstream = visible.get(&name)?;
                let range = self.specialize(range, downstream.resolve(provided));
                Some(Facet::PropertyIs { name, range, annotations })
            }
            // arrays keep the scope set; the owning property already narrowed it
            Facet::Items(ty) => Some(Facet::Items(self.specialize(ty, provided))),
            Facet::Supertype(ty) => Some(Facet::Supertype(self.specialize(ty, provided))),
            Facet::Option(ty) => Some(Facet::Option(self.specialize(ty, provided))),
            other @ (Facet::Withheld { .. } | Facet::Constraint { .. } | Facet::Annotation { .. }) => Some(other),
        }
    }
}

// ————————————————————————————————————————————————————————————————————————————
// TESTS
// ————————————————————————————————————————————————————————————————————————————

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::{Builtin, PropertyDecl, TypeCollection, TypeNode};
    use serde_json::json;

    fn s(xs: &[&str]) -> Vec<String> {
        xs.iter().map(|x| x.to_string()).collect()
    }

    fn has(tc: &TypeCollection, ty: TypeId, name: &str) -> bool {
        tc.property(ty, name).is_some()
    }

    fn range(tc: &TypeCollection, ty: TypeId, name: &str) -> TypeId {
        tc.property(ty, name).map(|p| p.range).expect("property")
    }

    fn component(tc: &TypeCollection, ty: TypeId) -> TypeId {
        tc.component_type(ty).expect("array")
    }

    /// `Person { name, lastName, friends?: Person[] <scopes> }`
    fn recursive_person(scopes: serde_json::Value) -> (TypeCollection, TypeId) {
        let mut tc = TypeCollection::new();
        let string = tc.builtin(Builtin::String);
        let person = tc.declare("Person");
        let friends = tc.add(TypeNode::array(person));
        tc.set(person, TypeNode::object([
            ("name", PropertyDecl::new(string)),
            ("lastName", PropertyDecl::new(string)),
            ("friends", PropertyDecl::new(friends).optional().annotate("scopes", scopes)),
        ]));
        (tc, person)
    }

    /// `Pet { name, kind?, bio? (read) }` and `Person { name, lastName, pets?: Pet[] (read|list) }`
    fn person_with_pets() -> (TypeCollection, TypeId) {
        let mut tc = TypeCollection::new();
        let string = tc.builtin(Builtin::String);
        let pet = tc.define("Pet", TypeNode::object([
            ("name", PropertyDecl::new(string)),
            ("kind", PropertyDecl::new(string).optional()),
            ("bio", PropertyDecl::new(string).optional().annotate("scopes", "read")),
        ]));
        let pets = tc.add(TypeNode::array(pet));
        let person = tc.define("Person", TypeNode::object([
            ("name", PropertyDecl::new(string)),
            ("lastName", PropertyDecl::new(string)),
            ("pets", PropertyDecl::new(pets).optional().annotate("scopes", json!(["read", "list"]))),
        ]));
        (tc, person)
    }

    #[test]
    fn builtins_are_returned_as_is() {
        let mut tc = TypeCollection::new();
        let string = tc.builtin(Builtin::String);
        let before = tc.len();
        assert_eq!(specialize(&mut tc, string, &s(&["read"])), string);
        assert_eq!(tc.len(), before);
    }

    #[test]
    fn unannotated_properties_survive_empty_scopes() {
        let (mut tc, person) = person_with_pets();
        let rs = specialize(&mut tc, person, &[]);
        assert_ne!(rs, person);
        assert!(has(&tc, rs, "name"));
        assert!(has(&tc, rs, "lastName"));
        assert!(!has(&tc, rs, "pets"));
        assert_eq!(tc.properties(rs).len(), 2);
    }

    #[test]
    fn scopes_flow_into_nested_element_types() {
        let (mut tc, person) = person_with_pets();

        let rs = specialize(&mut tc, person, &s(&["read"]));
        let pet = component(&tc, range(&tc, rs, "pets"));
        assert!(has(&tc, pet, "name"));
        assert!(has(&tc, pet, "bio"));

        let rs = specialize(&mut tc, person, &s(&["list"]));
        let pet = component(&tc, range(&tc, rs, "pets"));
        assert!(has(&tc, pet, "name"));
        assert!(!has(&tc, pet, "bio"));
    }

    #[test]
    fn recursive_types_close_the_cycle() {
        let (mut tc, person) = recursive_person(json!(["read", "list"]));

        let rs = specialize(&mut tc, person, &[]);
        assert!(has(&tc, rs, "name"));
        assert!(!has(&tc, rs, "friends"));

        let rs = specialize(&mut tc, person, &s(&["read"]));
        let friend = component(&tc, range(&tc, rs, "friends"));
        assert_eq!(friend, rs);
        assert!(has(&tc, friend, "friends"));

        let rs = specialize(&mut tc, person, &s(&["list"]));
        let friend = component(&tc, range(&tc, rs, "friends"));
        assert!(has(&tc, friend, "name"));
        assert!(has(&tc, friend, "friends"));
    }

    #[test]
    fn subtractive_scopes_narrow_the_nested_type() {
        let (mut tc, person) = recursive_person(json!(["-read", "-list"]));
        let rs = specialize(&mut tc, person, &[]);
        assert!(!has(&tc, rs, "friends"));

        let rs = specialize(&mut tc, person, &s(&["read"]));
        assert!(has(&tc, rs, "friends"));
        let friend = component(&tc, range(&tc, rs, "friends"));
        assert_ne!(friend, rs);
        assert!(has(&tc, friend, "name"));
        assert!(!has(&tc, friend, "friends"));
    }

    #[test]
    fn additive_scopes_widen_the_nested_type() {
        let mut tc = TypeCollection::new();
        let string = tc.builtin(Builtin::String);
        let account = tc.define("Account", TypeNode::object([
            ("id", PropertyDecl::new(string)),
            ("secret", PropertyDecl::new(string).annotate("scopes", "admin")),
        ]));
        let user = tc.define("User", TypeNode::object([
            ("secret", PropertyDecl::new(string).annotate("scopes", "admin")),
            ("account", PropertyDecl::new(account).annotate("scopes", json!(["read", "+admin"]))),
        ]));

        let rs = specialize(&mut tc, user, &s(&["read"]));
        assert!(!has(&tc, rs, "secret"));
        let account = range(&tc, rs, "account");
        assert!(has(&tc, account, "secret"));
    }

    #[test]
    fn vetoes_hide_regardless_of_matches() {
        let (mut tc, person) = recursive_person(json!(["read", "!list"]));
        let rs = specialize(&mut tc, person, &[]);
        assert!(!has(&tc, rs, "friends"));

        let rs = specialize(&mut tc, person, &s(&["read"]));
        assert!(has(&tc, rs, "friends"));
        let friend = component(&tc, range(&tc, rs, "friends"));
        assert!(has(&tc, friend, "friends"));

        let rs = specialize(&mut tc, person, &s(&["list"]));
        assert!(!has(&tc, rs, "friends"));
        let rs = specialize(&mut tc, person, &s(&["read", "list"]));
        assert!(!has(&tc, rs, "friends"));
    }

    #[test]
    fn compound_scopes_need_every_part() {
        let (mut tc, person) = recursive_person(json!(["read^admin"]));
        let rs = specialize(&mut tc, person, &[]);
        assert!(!has(&tc, rs, "friends"));
        let rs = specialize(&mut tc, person, &s(&["read"]));
        assert!(!has(&tc, rs, "friends"));
        let rs = specialize(&mut tc, person, &s(&["read", "admin"]));
        assert!(has(&tc, rs, "friends"));
        let friend = component(&tc, range(&tc, rs, "friends"));
        assert!(has(&tc, friend, "friends"));
    }

    #[test]
    fn union_options_are_filtered_independently() {
        let (mut tc, person) = person_with_pets();
        let pet = tc.get("Pet").unwrap();
        let either = tc.add(TypeNode::union(vec![person, pet]));

        let rs = specialize(&mut tc, either, &s(&["list"]));
        let options = tc.all_options(rs);
        assert_eq!(options.len(), 2);
        assert!(has(&tc, options[0], "pets"));
        assert!(!has(&tc, options[1], "bio"));
        assert_eq!(tc.type_name(options[1]), Some("Pet"));
    }

    #[test]
    fn inherited_members_are_filtered_with_the_same_scopes() {
        let (mut tc, _) = person_with_pets();
        let string = tc.builtin(Builtin::String);
        let pet = tc.get("Pet").unwrap();
        let dog = tc.define(
            "Dog",
            TypeNode::object([("breed", PropertyDecl::new(string).annotate("scopes", "list"))])
                .extending(pet),
        );

        let rs = specialize(&mut tc, dog, &s(&["list"]));
        let names: Vec<_> = tc.properties(rs).into_iter().map(|p| p.name).collect();
        assert_eq!(names, s(&["name", "kind", "breed"]));
        assert_ne!(tc.node(rs).supertypes[0], pet);

        let rs = specialize(&mut tc, dog, &s(&["read"]));
        let names: Vec<_> = tc.properties(rs).into_iter().map(|p| p.name).collect();
        assert_eq!(names, s(&["name", "kind", "bio"]));
    }

    #[test]
    fn range_type_annotations_apply_when_property_has_none() {
        let mut tc = TypeCollection::new();
        let string = tc.builtin(Builtin::String);
        let secret = tc.define(
            "Secret",
            TypeNode::object([("value", PropertyDecl::new(string))]).annotate("scopes", "admin"),
        );
        let vault = tc.define("Vault", TypeNode::object([
            ("label", PropertyDecl::new(string)),
            ("secret", PropertyDecl::new(secret)),
            ("public", PropertyDecl::new(secret).annotate("scopes", "read")),
        ]));

        let rs = specialize(&mut tc, vault, &s(&["read"]));
        assert!(!has(&tc, rs, "secret"));
        assert!(has(&tc, rs, "public"));
        let rs = specialize(&mut tc, vault, &s(&["admin"]));
        assert!(has(&tc, rs, "secret"));
    }

    #[test]
    fn constraints_and_annotations_pass_through() {
        let mut tc = TypeCollection::new();
        let string = tc.builtin(Builtin::String);
        let mut node = TypeNode::object([("name", PropertyDecl::new(string))]).annotate("audit", true);
        node.constraints.insert("minProperties".into(), json!(1));
        let ty = tc.define("Tagged", node);

        let rs = specialize(&mut tc, ty, &[]);
        assert_eq!(tc.node(rs).constraints.get("minProperties"), Some(&json!(1)));
        assert_eq!(tc.annotations(rs).get("audit"), Some(&json!(true)));
    }

    #[test]
    fn hidden_override_hides_the_inherited_property() {
        let mut tc = TypeCollection::new();
        let string = tc.builtin(Builtin::String);
        let pet = tc.define("Pet", TypeNode::object([
            ("name", PropertyDecl::new(string)),
            ("bio", PropertyDecl::new(string)),
        ]));
        let dog = tc.define(
            "Dog",
            TypeNode::object([("bio", PropertyDecl::new(string).annotate("scopes", "read"))]).extending(pet),
        );

        let rs = specialize(&mut tc, dog, &[]);
        let names: Vec<_> = tc.properties(rs).into_iter().map(|p| p.name).collect();
        assert_eq!(names, s(&["name"]));

        let rs = specialize(&mut tc, dog, &s(&["read"]));
        assert!(has(&tc, rs, "bio"));
        assert!(tc.property(rs, "bio").unwrap().annotations.contains_key("scopes"));
    }

    #[test]
    fn separate_calls_do_not_share_results() {
        let (mut tc, person) = recursive_person(json!("read"));
        let a = specialize(&mut tc, person, &s(&["read"]));
        let b = specialize(&mut tc, person, &s(&["read"]));
        assert_ne!(a, b);
        assert_eq!(tc.properties(a).len(), tc.properties(b).len());
    }

    #[test]
    fn respecializing_is_stable() {
        let (mut tc, person) = person_with_pets();
        let once = specialize(&mut tc, person, &s(&["list"]));
        let twice = specialize(&mut tc, once, &s(&["list"]));
        let names = |tc: &TypeCollection, t: TypeId| tc.properties(t).into_iter().map(|p| p.name).collect::<Vec<_>>();
        assert_eq!(names(&tc, once), names(&tc, twice));
        let pet_once = component(&tc, range(&tc, once, "pets"));
        let pet_twice = component(&tc, range(&tc, twice, "pets"));
        assert_eq!(names(&tc, pet_once), names(&tc, pet_twice));
    }
}
