use std::{sync::Arc, time::Duration};

use futures::future::{BoxFuture, join_all};
use indexmap::IndexMap;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use super::{
    Definition, InitOutput, Provider, Registry, Request, ResolutionContext, graph::plan,
};
use crate::{
    Error, ResolutionError, ResolveFailure,
    compiler::{Defaults, ResolvedValues},
    config::ResolutionConfig,
    value::InjectableValue,
};

/// Runs once per render before any resolver.
pub trait Initializer: Send + Sync {
    fn initialize<'a>(
        &'a self,
        request: &'a Request,
    ) -> BoxFuture<'a, anyhow::Result<InitOutput>>;
}

/// Outcome of resolving one render's injectables.
#[derive(Debug, Default)]
pub struct Resolution {
    pub values: ResolvedValues,
    /// Non-fatal failures, by code.
    pub errors: IndexMap<String, String>,
    /// The stages that ran, in order.
    pub stages: Vec<Vec<String>>,
    /// Compiler facts of every injectable that took part, static or provided.
    pub defaults: Defaults,
}

impl Resolution {
    /// Applies the failure policy to one outcome.
    fn settle(
        &mut self,
        code: &str,
        critical: bool,
        default: Option<&InjectableValue>,
        outcome: Result<InjectableValue, ResolveFailure>,
    ) -> Result<(), ResolutionError> {
        match outcome {
            Ok(value) => {
                self.values.insert(code.to_owned(), value);
                Ok(())
            }
            Err(cause) if critical => {
                error!(code, %cause, "critical injectable failed");
                Err(ResolutionError::Critical {
                    code: code.to_owned(),
                    cause,
                })
            }
            Err(cause) => {
                warn!(code, %cause, has_default = default.is_some(), "injectable failed");
                self.errors.insert(code.to_owned(), cause.to_string());
                if let Some(default) = default {
                    self.values.insert(code.to_owned(), default.clone());
                }
                Ok(())
            }
        }
    }

    fn context(&self, request: &Arc<Request>, init: &Option<InitOutput>) -> ResolutionContext {
        ResolutionContext {
            request: request.clone(),
            init: init.clone(),
            values: self.values.clone(),
            errors: self.errors.clone(),
        }
    }
}

/// Awaits `task` unless it outlives `timeout` or `cancel` fires.
async fn guarded<T>(
    cancel: &CancellationToken,
    timeout: Duration,
    task: impl Future<Output = anyhow::Result<T>>,
) -> Result<T, ResolveFailure> {
    tokio::select! {
        _ = cancel.cancelled() => Err(ResolveFailure::Cancelled),
        outcome = tokio::time::timeout(timeout, task) => match outcome {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(error)) => Err(ResolveFailure::Resolver(error)),
            Err(_) => Err(ResolveFailure::Timeout(timeout)),
        }
    }
}

/// Resolves injectables in dependency stages.
pub struct Engine {
    registry: Arc<Registry>,
    initializer: Option<Arc<dyn Initializer>>,
    providers: Vec<Arc<dyn Provider>>,
    default_timeout: Duration,
}

impl Engine {
    pub fn new(registry: Arc<Registry>, config: &ResolutionConfig) -> Self {
        Self {
            registry,
            initializer: None,
            providers: Vec::new(),
            default_timeout: config.default_timeout,
        }
    }

    pub fn with_initializer(mut self, initializer: impl Initializer + 'static) -> Self {
        self.initializer = Some(Arc::new(initializer));
        self
    }

    pub fn with_provider(mut self, provider: impl Provider + 'static) -> Self {
        self.providers.push(Arc::new(provider));
        self
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    async fn run(
        &self,
        definition: &Definition,
        ctx: Arc<ResolutionContext>,
        cancel: &CancellationToken,
    ) -> Result<InjectableValue, ResolveFailure> {
        let timeout = definition.timeout.unwrap_or(self.default_timeout);
        let value = guarded(cancel, timeout, (definition.resolver)(ctx)).await?;
        if value.value_type() != definition.value_type {
            debug!(
                code = %definition.code,
                declared = %definition.value_type,
                actual = %value.value_type(),
                "resolver returned another type than declared"
            );
        }
        Ok(value)
    }

    /// Resolves `requested` and everything they depend on. Cycles and unknown
    /// dependencies fail before any resolver runs; a failing critical injectable
    /// aborts the whole resolution.
    pub async fn resolve(
        &self,
        requested: &[String],
        request: Arc<Request>,
        cancel: &CancellationToken,
    ) -> Result<Resolution, Error> {
        let plan = plan(&self.registry, requested)?;

        let init = match &self.initializer {
            Some(initializer) => Some(tokio::select! {
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                output = initializer.initialize(&request) => {
                    output.map_err(ResolutionError::Initializer)?
                }
            }),
            None => None,
        };

        let mut resolution = Resolution {
            stages: plan.stages.clone(),
            ..Default::default()
        };
        for stage in &plan.stages {
            let ctx = Arc::new(resolution.context(&request, &init));
            let tasks = stage
                .iter()
                .filter_map(|code| self.registry.get(code))
                .map(|definition| {
                    let ctx = ctx.clone();
                    async move { (definition, self.run(definition, ctx, cancel).await) }
                });
            for (definition, outcome) in join_all(tasks).await {
                resolution
                    .defaults
                    .insert(definition.code.clone(), definition.info());
                resolution.settle(
                    &definition.code,
                    definition.critical,
                    definition.default.as_ref(),
                    outcome,
                )?;
            }
        }

        self.resolve_provided(plan.unknown, &request, &init, cancel, &mut resolution)
            .await?;
        Ok(resolution)
    }

    /// Hands codes the registry doesn't know to the providers, in order. Codes no
    /// provider serves are recorded as errors.
    async fn resolve_provided(
        &self,
        mut codes: Vec<String>,
        request: &Arc<Request>,
        init: &Option<InitOutput>,
        cancel: &CancellationToken,
        resolution: &mut Resolution,
    ) -> Result<(), ResolutionError> {
        let workspace = request.workspace_id.as_deref();
        for provider in &self.providers {
            if codes.is_empty() {
                break;
            }
            let described = provider.definitions(workspace, &codes);
            let definitions = match guarded(cancel, self.default_timeout, described).await {
                Ok(definitions) => definitions,
                Err(error) => {
                    warn!(%error, "provider could not describe injectables");
                    continue;
                }
            };
            let definitions = definitions
                .into_iter()
                .filter(|definition| codes.contains(&definition.code))
                .collect::<Vec<_>>();
            if definitions.is_empty() {
                continue;
            }
            let served = definitions
                .iter()
                .map(|definition| definition.code.clone())
                .collect::<Vec<_>>();
            codes.retain(|code| !served.contains(code));

            let ctx = resolution.context(request, init);
            let timeout = definitions
                .iter()
                .filter_map(|definition| definition.timeout)
                .max()
                .unwrap_or(self.default_timeout);
            let batch = guarded(cancel, timeout, provider.resolve(workspace, &served, &ctx)).await;
            let mut values = match batch {
                Ok(values) => Ok(values),
                Err(ResolveFailure::Resolver(error)) => Err(format!("{error:#}")),
                Err(failure) => Err(failure.to_string()),
            };
            for definition in &definitions {
                let outcome = match &mut values {
                    Ok(values) => match values.shift_remove(&definition.code) {
                        Some(Ok(value)) => Ok(value),
                        Some(Err(reason)) => Err(ResolveFailure::Provider(reason)),
                        None => Err(ResolveFailure::Provider("no value returned".to_owned())),
                    },
                    Err(reason) => Err(ResolveFailure::Provider(reason.clone())),
                };
                resolution
                    .defaults
                    .insert(definition.code.clone(), definition.info());
                resolution.settle(
                    &definition.code,
                    definition.critical,
                    definition.default.as_ref(),
                    outcome,
                )?;
            }
        }
        for code in codes {
            warn!(%code, "unknown injectable");
            resolution.errors.insert(code, "unknown injectable".to_owned());
        }
        Ok(())
    }
}
