use std::time::Duration;

use futures::future::BoxFuture;
use indexmap::IndexMap;

use super::ResolutionContext;
use crate::{
    compiler::InjectableInfo,
    value::{FormatConfig, InjectableValue, ValueType},
};

/// An injectable a provider knows about. Mirrors the static definition minus the
/// resolver, which the provider runs itself.
#[derive(Debug, Clone, PartialEq)]
pub struct ProvidedDefinition {
    pub code: String,
    pub value_type: ValueType,
    pub format: Option<FormatConfig>,
    pub critical: bool,
    pub default: Option<InjectableValue>,
    pub timeout: Option<Duration>,
}

impl ProvidedDefinition {
    pub fn new(code: impl Into<String>, value_type: ValueType) -> Self {
        Self {
            code: code.into(),
            value_type,
            format: None,
            critical: false,
            default: None,
            timeout: None,
        }
    }

    pub fn info(&self) -> InjectableInfo {
        InjectableInfo {
            value_type: self.value_type,
            format: self.format.clone(),
            default: self.default.clone(),
        }
    }
}

/// Per-code outcome of a batch. A code missing from the map failed without reason.
pub type ProvidedValues = IndexMap<String, Result<InjectableValue, String>>;

/// Source of injectables that are not registered at startup, typically defined per
/// workspace. Resolved in batches after the static graph.
pub trait Provider: Send + Sync {
    /// Which of `codes` this provider serves in `workspace`.
    fn definitions<'a>(
        &'a self,
        workspace: Option<&'a str>,
        codes: &'a [String],
    ) -> BoxFuture<'a, anyhow::Result<Vec<ProvidedDefinition>>>;

    fn resolve<'a>(
        &'a self,
        workspace: Option<&'a str>,
        codes: &'a [String],
        ctx: &'a ResolutionContext,
    ) -> BoxFuture<'a, anyhow::Result<ProvidedValues>>;
}
