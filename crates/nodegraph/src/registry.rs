//! The fixed catalog of dependency types.
//!
//! Eight edge kinds in three categories. The catalog is immutable and built
//! at compile time; the engine owns a [`TypeRegistry`] value that hands out
//! `&'static` references into it. Each type's cascade flags are only
//! defaults: a caller may override them per edge.

use serde::Serialize;
use std::fmt;

use crate::error::{Error, Result};

/// Broad grouping of dependency types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    /// The dependent cannot exist (or be meaningful) without the dependency.
    Structural,
    /// The dependent needs the dependency to build or run.
    Behavioral,
    /// The dependent consumes data the dependency produces.
    Data,
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Structural => write!(f, "structural"),
            Self::Behavioral => write!(f, "behavioral"),
            Self::Data => write!(f, "data"),
        }
    }
}

/// A dependency type and its cascade policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DependencyType {
    /// Unique name, as stored on edges.
    pub name: &'static str,
    /// Catalog category.
    pub category: Category,
    /// Deleting the dependency deletes the dependent.
    pub cascade_delete: bool,
    /// Updating the dependency notifies the dependent.
    pub cascade_update: bool,
    /// Dependents should be re-validated when the dependency changes.
    pub validation_required: bool,
    /// Strength given to new edges, 0-100.
    pub default_strength: u8,
    /// Priority given to new edges, 0-100.
    pub default_priority: u8,
    /// One-line description.
    pub description: &'static str,
}

#[allow(clippy::too_many_arguments, clippy::fn_params_excessive_bools)]
const fn dependency_type(
    name: &'static str,
    category: Category,
    cascade_delete: bool,
    cascade_update: bool,
    validation_required: bool,
    default_strength: u8,
    default_priority: u8,
    description: &'static str,
) -> DependencyType {
    DependencyType {
        name,
        category,
        cascade_delete,
        cascade_update,
        validation_required,
        default_strength,
        default_priority,
        description,
    }
}

/// The built-in dependency types.
pub static CATALOG: [DependencyType; 8] = [
    dependency_type(
        "hard",
        Category::Structural,
        true,
        true,
        true,
        90,
        80,
        "Strong coupling; the dependent cannot exist without the dependency",
    ),
    dependency_type(
        "soft",
        Category::Structural,
        false,
        true,
        false,
        50,
        50,
        "Loose coupling; the dependent survives the dependency's removal",
    ),
    dependency_type(
        "reference",
        Category::Structural,
        false,
        false,
        false,
        30,
        30,
        "Informational link only",
    ),
    dependency_type(
        "runtime",
        Category::Behavioral,
        false,
        true,
        true,
        80,
        70,
        "Required while the dependent runs",
    ),
    dependency_type(
        "compile",
        Category::Behavioral,
        false,
        true,
        true,
        70,
        60,
        "Required to build the dependent",
    ),
    dependency_type(
        "optional",
        Category::Behavioral,
        false,
        false,
        false,
        20,
        20,
        "Enhances the dependent when present",
    ),
    dependency_type(
        "sync",
        Category::Data,
        false,
        true,
        true,
        60,
        60,
        "Data must stay synchronized with the dependency",
    ),
    dependency_type(
        "async",
        Category::Data,
        false,
        false,
        false,
        40,
        40,
        "Eventually consistent data flow from the dependency",
    ),
];

/// Lookup handle over the dependency type catalog.
#[derive(Debug, Clone, Copy)]
pub struct TypeRegistry {
    types: &'static [DependencyType],
}

impl TypeRegistry {
    /// The registry over the built-in [`CATALOG`].
    #[must_use]
    pub fn builtin() -> Self {
        Self { types: &CATALOG }
    }

    /// Look a type up by name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] for names outside the catalog.
    pub fn lookup(&self, name: &str) -> Result<&'static DependencyType> {
        self.types
            .iter()
            .find(|t| t.name == name)
            .ok_or_else(|| Error::Validation(format!("unknown dependency type '{name}'")))
    }

    /// Iterate the catalog in its fixed order.
    pub fn iter(&self) -> impl Iterator<Item = &'static DependencyType> {
        self.types.iter()
    }

    /// Number of registered types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Always `false` for the built-in catalog.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("hard", Category::Structural, true, true, 90)]
    #[case("soft", Category::Structural, false, true, 50)]
    #[case("reference", Category::Structural, false, false, 30)]
    #[case("runtime", Category::Behavioral, false, true, 80)]
    #[case("compile", Category::Behavioral, false, true, 70)]
    #[case("optional", Category::Behavioral, false, false, 20)]
    #[case("sync", Category::Data, false, true, 60)]
    #[case("async", Category::Data, false, false, 40)]
    fn catalog_entries(
        #[case] name: &str,
        #[case] category: Category,
        #[case] cascade_delete: bool,
        #[case] cascade_update: bool,
        #[case] strength: u8,
    ) {
        let t = TypeRegistry::builtin().lookup(name).unwrap();
        assert_eq!(t.category, category);
        assert_eq!(t.cascade_delete, cascade_delete);
        assert_eq!(t.cascade_update, cascade_update);
        assert_eq!(t.default_strength, strength);
    }

    #[test]
    fn only_hard_cascades_deletes() {
        let cascading: Vec<_> = TypeRegistry::builtin()
            .iter()
            .filter(|t| t.cascade_delete)
            .map(|t| t.name)
            .collect();
        assert_eq!(cascading, vec!["hard"]);
    }

    #[test]
    fn unknown_type_is_rejected() {
        let err = TypeRegistry::builtin().lookup("weak").unwrap_err();
        assert!(matches!(err, Error::Validation(msg) if msg.contains("weak")));
    }

    #[test]
    fn names_are_unique() {
        let registry = TypeRegistry::builtin();
        let mut names: Vec<_> = registry.iter().map(|t| t.name).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), registry.len());
    }
}
