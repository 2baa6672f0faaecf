// SPDX-License-Identifier: MIT OR Apache-2.0
//! Named pin types and their directional convertibility.
//!
//! Every document carries its own [`TypeSystem`]. Convertibility is looked up
//! edge by edge: `a -> b` and `b -> c` do not make `a -> c` convertible.

use crate::color::Color;
use indexmap::IndexMap;
use std::collections::HashMap;

/// Index of a registered type
pub type TypeIndex = usize;

#[derive(Debug, Clone, Default)]
struct TypeEntry {
    base: Option<TypeIndex>,
    color_hint: Option<Color>,
}

/// Registry of pin types
#[derive(Debug, Clone, Default)]
pub struct TypeSystem {
    types: IndexMap<String, TypeEntry>,
    convertible: HashMap<(TypeIndex, TypeIndex), bool>,
}

impl TypeSystem {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry preloaded with common value types and their pin colors
    pub fn with_builtin_types() -> Self {
        let mut types = Self::new();
        let builtin: [(&str, Option<&str>, [u8; 3]); 8] = [
            ("bool", None, [200, 80, 80]),
            ("float", None, [80, 200, 80]),
            ("int", Some("float"), [80, 200, 200]),
            ("vec2", None, [200, 200, 80]),
            ("vec3", None, [200, 150, 80]),
            ("vec4", None, [200, 100, 200]),
            ("color", Some("vec4"), [255, 200, 100]),
            ("string", None, [200, 180, 150]),
        ];
        for (name, base, [r, g, b]) in builtin {
            types.register_type(name, base, Some(Color::new(r, g, b, 255)));
        }
        types.set_convertible("float", "vec2", true);
        types.set_convertible("float", "vec3", true);
        types.set_convertible("float", "vec4", true);
        types
    }

    /// Register a type, returning its index.
    ///
    /// Registering an existing name returns the existing index unchanged. A
    /// base type is registered first and gets a `name -> base` edge. A fully
    /// transparent color hint counts as no hint.
    pub fn register_type(&mut self, name: &str, base: Option<&str>, hint: Option<Color>) -> TypeIndex {
        if let Some(index) = self.types.get_index_of(name) {
            return index;
        }
        let base_index = base
            .filter(|b| !b.is_empty())
            .map(|b| self.register_type(b, None, None));
        let (index, _) = self.types.insert_full(
            name.to_owned(),
            TypeEntry {
                base: base_index,
                color_hint: None,
            },
        );
        if let Some(base_index) = base_index {
            self.convertible.insert((index, base_index), true);
        }
        if let Some(hint) = hint.filter(|c| *c != Color::default()) {
            self.set_color_hint(index, hint);
        }
        tracing::trace!("registered type {name} as #{index}");
        index
    }

    /// Set or clear the `from -> to` edge, registering both types if needed
    pub fn set_convertible(&mut self, from: &str, to: &str, convertible: bool) {
        let from = self.register_type(from, None, None);
        let to = self.register_type(to, None, None);
        self.convertible.insert((from, to), convertible);
    }

    /// Whether a value of type `from` can feed a pin of type `to`
    pub fn is_convertible(&self, from: &str, to: &str) -> bool {
        if from == to || to == "any" || to == "*" {
            return true;
        }
        match (self.type_index(from), self.type_index(to)) {
            (Some(f), Some(t)) => self.convertible.get(&(f, t)).copied().unwrap_or(false),
            _ => false,
        }
    }

    /// Whether `name` is registered
    pub fn is_type(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    /// Index of a registered type
    pub fn type_index(&self, name: &str) -> Option<TypeIndex> {
        self.types.get_index_of(name)
    }

    /// Number of registered types
    pub fn type_count(&self) -> usize {
        self.types.len()
    }

    /// Name of the type at `index`
    pub fn type_name(&self, index: TypeIndex) -> Option<&str> {
        self.types.get_index(index).map(|(name, _)| name.as_str())
    }

    /// Base type of the type at `index`
    pub fn base_type(&self, index: TypeIndex) -> Option<&str> {
        let base = self.types.get_index(index)?.1.base?;
        self.type_name(base)
    }

    /// Set the display color of the type at `index`
    pub fn set_color_hint(&mut self, index: TypeIndex, color: Color) {
        if let Some((_, entry)) = self.types.get_index_mut(index) {
            entry.color_hint = Some(color);
        }
    }

    /// Display color of the named type
    pub fn color_hint(&self, name: &str) -> Option<Color> {
        self.types.get(name).and_then(|entry| entry.color_hint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_edge_is_directional() {
        let mut types = TypeSystem::new();
        types.register_type("int", Some("float"), None);
        assert!(types.is_convertible("int", "float"));
        assert!(!types.is_convertible("float", "int"));
        assert!(types.is_convertible("int", "any"));
        assert!(types.is_convertible("unregistered", "*"));
        assert!(types.is_convertible("float", "float"));
        let int = types.type_index("int").unwrap();
        assert_eq!(types.base_type(int), Some("float"));
        assert_eq!(types.type_index("float"), Some(0));
    }

    #[test]
    fn test_convertibility_is_not_transitive() {
        let mut types = TypeSystem::new();
        types.set_convertible("a", "b", true);
        types.set_convertible("b", "c", true);
        assert!(types.is_convertible("a", "b"));
        assert!(types.is_convertible("b", "c"));
        assert!(!types.is_convertible("a", "c"));
    }

    #[test]
    fn test_register_is_idempotent() {
        let mut types = TypeSystem::new();
        let first = types.register_type("vec3", None, Some(Color::new(1, 2, 3, 255)));
        let again = types.register_type("vec3", Some("vec4"), None);
        assert_eq!(first, again);
        assert_eq!(types.type_count(), 1);
        assert_eq!(types.color_hint("vec3"), Some(Color::new(1, 2, 3, 255)));

        types.register_type("mask", None, Some(Color::default()));
        assert_eq!(types.color_hint("mask"), None);
    }

    #[test]
    fn test_explicit_edge_can_be_revoked() {
        let mut types = TypeSystem::with_builtin_types();
        assert!(types.is_convertible("int", "float"));
        types.set_convertible("int", "float", false);
        assert!(!types.is_convertible("int", "float"));
        assert!(types.color_hint("int").is_some());
    }
}
