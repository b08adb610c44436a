//! Named, typed values produced at render time, possibly depending on each other.

use std::{sync::Arc, time::Duration};

use derive_debug::Dbg;
use futures::{FutureExt, future::BoxFuture};

use crate::{
    compiler::InjectableInfo,
    value::{FormatConfig, InjectableValue, ValueType},
};

mod context;
mod engine;
mod graph;
mod provider;
mod registry;

pub use context::{InitOutput, Request, ResolutionContext};
pub use engine::{Engine, Initializer, Resolution};
pub use graph::{Plan, plan};
pub use provider::{ProvidedDefinition, ProvidedValues, Provider};
pub use registry::Registry;

pub type ResolverFuture = BoxFuture<'static, anyhow::Result<InjectableValue>>;
pub type Resolver = Arc<dyn Fn(Arc<ResolutionContext>) -> ResolverFuture + Send + Sync>;

#[derive(Dbg, Clone)]
pub struct Definition {
    pub code: String,
    pub value_type: ValueType,
    pub format: Option<FormatConfig>,
    pub critical: bool,
    /// Falls back to the engine's default timeout.
    pub timeout: Option<Duration>,
    pub default: Option<InjectableValue>,
    pub dependencies: Vec<String>,
    #[dbg(skip)]
    pub resolver: Resolver,
}

impl Definition {
    pub fn new<F, Fut>(code: impl Into<String>, value_type: ValueType, resolver: F) -> Self
    where
        F: Fn(Arc<ResolutionContext>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<InjectableValue>> + Send + 'static,
    {
        Self {
            code: code.into(),
            value_type,
            format: None,
            critical: false,
            timeout: None,
            default: None,
            dependencies: Vec::new(),
            resolver: Arc::new(move |ctx| resolver(ctx).boxed()),
        }
    }

    /// An injectable that always resolves to `value`.
    pub fn constant(code: impl Into<String>, value: InjectableValue) -> Self {
        let value_type = value.value_type();
        Self::new(code, value_type, move |_| {
            let value = value.clone();
            async move { Ok(value) }
        })
    }

    pub fn critical(mut self) -> Self {
        self.critical = true;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn default_value(mut self, value: impl Into<InjectableValue>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn format(mut self, format: FormatConfig) -> Self {
        self.format = Some(format);
        self
    }

    pub fn depends_on<I, S>(mut self, codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies.extend(codes.into_iter().map(Into::into));
        self
    }

    pub fn info(&self) -> InjectableInfo {
        InjectableInfo {
            value_type: self.value_type,
            format: self.format.clone(),
            default: self.default.clone(),
        }
    }
}
