use indexmap::IndexMap;

use super::{Definition, graph};
use crate::{ConfigurationError, compiler::Defaults};

/// Every statically known injectable. Built once at startup, read-only afterwards.
#[derive(Debug, Default)]
pub struct Registry {
    pub(super) definitions: IndexMap<String, Definition>,
}

impl Registry {
    /// Validates the whole set: unique codes, well-formed format configs, known
    /// dependencies and no cycles.
    pub fn new(
        definitions: impl IntoIterator<Item = Definition>,
    ) -> Result<Self, ConfigurationError> {
        let mut registry = IndexMap::new();
        for definition in definitions {
            if let Some(format) = &definition.format {
                format.validate(&definition.code)?;
            }
            if registry.contains_key(&definition.code) {
                return Err(ConfigurationError::DuplicateInjectable(definition.code));
            }
            registry.insert(definition.code.clone(), definition);
        }
        let registry = Self {
            definitions: registry,
        };
        let all = registry.definitions.keys().cloned().collect::<Vec<_>>();
        graph::plan(&registry, &all)?;
        Ok(registry)
    }

    pub fn get(&self, code: &str) -> Option<&Definition> {
        self.definitions.get(code)
    }

    pub fn contains(&self, code: &str) -> bool {
        self.definitions.contains_key(code)
    }

    /// Registration position, used to order codes within a stage.
    pub(super) fn position(&self, code: &str) -> usize {
        self.definitions.get_index_of(code).unwrap_or(usize::MAX)
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    pub fn codes(&self) -> impl Iterator<Item = &str> {
        self.definitions.keys().map(String::as_str)
    }

    /// Compiler facts for every registered injectable.
    pub fn defaults(&self) -> Defaults {
        self.definitions
            .iter()
            .map(|(code, definition)| (code.clone(), definition.info()))
            .collect()
    }
}
