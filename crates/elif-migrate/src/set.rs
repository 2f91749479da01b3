//! Validated, immutable collection of migration definitions

use std::collections::HashMap;

use crate::definition::MigrationDefinition;
use crate::error::{MigrationError, MigrationResult};

/// A validated set of migrations
///
/// Versions are unique and positive, names are non-empty and every definition
/// has at least one procedure. The set is never mutated after construction.
#[derive(Debug, Clone, Default)]
pub struct MigrationSet {
    definitions: Vec<MigrationDefinition>,
}

impl MigrationSet {
    /// Validate and wrap the given definitions
    pub fn new(definitions: impl IntoIterator<Item = MigrationDefinition>) -> MigrationResult<Self> {
        let definitions: Vec<_> = definitions.into_iter().collect();
        Self::validate(&definitions)?;
        Ok(Self { definitions })
    }

    /// Check a collection of definitions without taking ownership
    pub fn validate(definitions: &[MigrationDefinition]) -> MigrationResult<()> {
        let mut seen: HashMap<u64, &str> = HashMap::with_capacity(definitions.len());

        for definition in definitions {
            if definition.version() == 0 {
                return Err(MigrationError::InvalidVersion {
                    name: definition.name().to_string(),
                });
            }

            if let Some(first) = seen.insert(definition.version(), definition.name()) {
                return Err(MigrationError::DuplicateVersion {
                    version: definition.version(),
                    first: first.to_string(),
                    second: definition.name().to_string(),
                });
            }

            if definition.name().is_empty() {
                return Err(MigrationError::EmptyName {
                    version: definition.version(),
                });
            }

            if !definition.has_body() {
                return Err(MigrationError::MissingBody {
                    version: definition.version(),
                    name: definition.name().to_string(),
                });
            }
        }

        Ok(())
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    /// Highest version in the set, 0 when empty
    pub fn highest_version(&self) -> u64 {
        self.definitions
            .iter()
            .map(MigrationDefinition::version)
            .max()
            .unwrap_or(0)
    }

    /// Find the definition carrying exactly this version
    pub fn find(&self, version: u64) -> Option<&MigrationDefinition> {
        self.definitions.iter().find(|d| d.version() == version)
    }

    /// Definitions ordered by increasing version
    pub fn ascending(&self) -> Vec<&MigrationDefinition> {
        let mut ordered: Vec<_> = self.definitions.iter().collect();
        ordered.sort_by_key(|d| d.version());
        ordered
    }

    /// Definitions ordered by decreasing version
    pub fn descending(&self) -> Vec<&MigrationDefinition> {
        let mut ordered: Vec<_> = self.definitions.iter().collect();
        ordered.sort_by(|a, b| b.version().cmp(&a.version()));
        ordered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn definition(version: u64, name: &str) -> MigrationDefinition {
        MigrationDefinition::new(version, name).forward_sql("SELECT 1")
    }

    #[test]
    fn test_valid_set() {
        let set = MigrationSet::new(vec![
            definition(3, "Add Address For Users"),
            definition(1, "Create Users Table"),
            definition(2, "Add Email For Users"),
        ])
        .unwrap();

        assert_eq!(set.len(), 3);
        assert_eq!(set.highest_version(), 3);
        assert_eq!(set.find(2).map(|d| d.name()), Some("Add Email For Users"));
        assert!(set.find(4).is_none());

        let ascending: Vec<u64> = set.ascending().iter().map(|d| d.version()).collect();
        assert_eq!(ascending, vec![1, 2, 3]);
        let descending: Vec<u64> = set.descending().iter().map(|d| d.version()).collect();
        assert_eq!(descending, vec![3, 2, 1]);
    }

    #[test]
    fn test_empty_set_is_valid() {
        let set = MigrationSet::new(Vec::new()).unwrap();
        assert!(set.is_empty());
        assert_eq!(set.highest_version(), 0);
    }

    #[test]
    fn test_duplicate_versions_rejected() {
        let err = MigrationSet::new(vec![
            definition(1, "Test Migration"),
            definition(1, "Test Migration 2"),
        ])
        .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::DuplicateVersion);
        assert!(err.to_string().contains("Test Migration (1) and Test Migration 2 (1)"));
    }

    #[test]
    fn test_empty_name_rejected() {
        let err = MigrationSet::new(vec![definition(1, "")]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::EmptyName);
    }

    #[test]
    fn test_missing_body_rejected() {
        let err = MigrationSet::new(vec![MigrationDefinition::new(1, "Test Migration")]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingBody);
    }

    #[test]
    fn test_backward_only_definition_is_valid() {
        let only_backward = MigrationDefinition::new(1, "Drop Legacy Table").backward_sql("SELECT 1");
        assert!(MigrationSet::new(vec![only_backward]).is_ok());
    }

    #[test]
    fn test_zero_version_rejected() {
        let err = MigrationSet::new(vec![definition(0, "Zero")]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidVersion);
    }
}
