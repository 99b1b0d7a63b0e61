//! Specialist registry
//!
//! Maps codenames to constructors. Preloaded with the built-in roster;
//! callers may register additional or replacement specialists.

use super::builtins::{builtin_profiles, BuiltinSpecialist};
use super::Specialist;
use crate::error::CouncilError;
use crate::provider::ProviderRouter;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::debug;

/// Shared services handed to every specialist constructor
#[derive(Clone)]
pub struct SpecialistDeps {
    pub router: Arc<ProviderRouter>,
}

pub type SpecialistFactory = Arc<dyn Fn(&SpecialistDeps) -> Arc<dyn Specialist> + Send + Sync>;

struct Entry {
    division: String,
    factory: SpecialistFactory,
}

/// Specialist registry - codename to constructor
pub struct SpecialistRegistry {
    entries: HashMap<String, Entry>,
    /// Registration order, for stable listings
    order: Vec<String>,
}

impl SpecialistRegistry {
    /// Empty registry
    pub fn empty() -> Self {
        Self {
            entries: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// Registry with the built-in roster
    pub fn new() -> Self {
        let mut registry = Self::empty();
        for definition in builtin_profiles() {
            let codename = definition.profile.codename.clone();
            let division = definition.profile.division.clone();
            registry.register(
                codename,
                division,
                Arc::new(move |deps: &SpecialistDeps| {
                    Arc::new(BuiltinSpecialist::new(definition.clone(), deps.router.clone()))
                        as Arc<dyn Specialist>
                }),
            );
        }
        registry
    }

    /// Register or replace a constructor. Codenames are case-insensitive.
    pub fn register(
        &mut self,
        codename: impl Into<String>,
        division: impl Into<String>,
        factory: SpecialistFactory,
    ) {
        let codename = codename.into().to_uppercase();
        if !self.entries.contains_key(&codename) {
            self.order.push(codename.clone());
        }
        debug!(codename = %codename, "registered specialist");
        self.entries.insert(
            codename,
            Entry {
                division: division.into(),
                factory,
            },
        );
    }

    pub fn contains(&self, codename: &str) -> bool {
        self.entries.contains_key(&codename.to_uppercase())
    }

    /// Construct the specialist registered under `codename`
    pub fn create(
        &self,
        codename: &str,
        deps: &SpecialistDeps,
    ) -> Result<Arc<dyn Specialist>, CouncilError> {
        let entry = self
            .entries
            .get(&codename.to_uppercase())
            .ok_or_else(|| CouncilError::UnknownAgent(codename.to_string()))?;
        Ok((entry.factory)(deps))
    }

    /// All codenames in registration order
    pub fn codenames(&self) -> Vec<String> {
        self.order.clone()
    }

    pub fn division(&self, codename: &str) -> Option<&str> {
        self.entries
            .get(&codename.to_uppercase())
            .map(|e| e.division.as_str())
    }

    /// Division -> codenames, each list in registration order
    pub fn divisions(&self) -> BTreeMap<String, Vec<String>> {
        let mut divisions: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for codename in &self.order {
            if let Some(entry) = self.entries.get(codename) {
                divisions
                    .entry(entry.division.clone())
                    .or_default()
                    .push(codename.clone());
            }
        }
        divisions
    }
}

impl Default for SpecialistRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::RoutingTable;
    use crate::test_support::RecordingSpecialist;

    fn deps() -> SpecialistDeps {
        SpecialistDeps {
            router: Arc::new(ProviderRouter::new(RoutingTable::default())),
        }
    }

    #[test]
    fn test_create_builtin() {
        let registry = SpecialistRegistry::new();
        let oracle = registry.create("oracle", &deps()).unwrap();
        assert_eq!(oracle.profile().codename, "ORACLE");
        assert!(oracle.capabilities().supports("face_comparison"));
        assert_eq!(registry.division("ORACLE"), Some("Identity Resolution"));
    }

    #[test]
    fn test_unknown_codename() {
        let registry = SpecialistRegistry::new();
        let err = registry.create("ZEUS", &deps()).err().unwrap();
        assert!(matches!(err, CouncilError::UnknownAgent(ref name) if name == "ZEUS"));
    }

    #[test]
    fn test_divisions_listing() {
        let registry = SpecialistRegistry::new();
        let divisions = registry.divisions();
        assert_eq!(divisions.len(), 6);
        assert_eq!(divisions["Digital Forensics"], vec!["CERBERUS", "PHOENIX"]);
        assert_eq!(registry.codenames().first().map(String::as_str), Some("ARGUS"));
    }

    #[test]
    fn test_register_replaces_builtin() {
        let mut registry = SpecialistRegistry::new();
        registry.register(
            "atlas",
            "Geolocation Intelligence",
            Arc::new(|_: &SpecialistDeps| {
                RecordingSpecialist::new("ATLAS", &["custom_task"]) as Arc<dyn Specialist>
            }),
        );

        let atlas = registry.create("ATLAS", &deps()).unwrap();
        assert!(atlas.capabilities().supports("custom_task"));
        assert_eq!(registry.codenames().len(), 13);
    }
}
