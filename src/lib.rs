use std::time::Duration;

pub mod compiler;
pub mod config;
pub mod document;
pub mod image_cache;
pub mod injectable;
pub mod renderer;
pub mod value;

#[cfg(test)]
mod tests;

pub use compiler::{Builder, Compiled};
pub use document::Document;
pub use injectable::{Engine, Registry};
pub use renderer::{Rendered, Renderer};
pub use value::InjectableValue;

/// Errors visible to callers of the renderer. The HTTP layer maps variants to status
/// codes without inspecting message text.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigurationError),
    #[error("resolution error: {0}")]
    Resolution(#[from] ResolutionError),
    #[error("renderer busy: no render slot within {waited:?}")]
    RendererBusy { waited: Duration },
    #[error("render cancelled")]
    Cancelled,
    #[error("compile error: {0}")]
    Compile(#[from] CompileError),
}

impl Error {
    /// Whether the caller may retry later with backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RendererBusy { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigurationError {
    #[error("cyclic injectable dependency: {}", path.join(" -> "))]
    Cycle { path: Vec<String> },
    #[error("injectable {code} depends on unregistered injectable {dependency}")]
    UnknownDependency { code: String, dependency: String },
    #[error("injectable {0} registered twice")]
    DuplicateInjectable(String),
    #[error("malformed format_config for {code}: {reason}")]
    MalformedFormat { code: String, reason: String },
    #[error("invalid document: {0}")]
    InvalidDocument(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ResolutionError {
    #[error("initializer failed: {0:#}")]
    Initializer(anyhow::Error),
    #[error("critical injectable {code} failed: {cause}")]
    Critical { code: String, cause: ResolveFailure },
}

/// Why a single injectable produced no value.
#[derive(Debug, thiserror::Error)]
pub enum ResolveFailure {
    #[error("{0:#}")]
    Resolver(anyhow::Error),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("cancelled")]
    Cancelled,
    #[error("provider failed: {0}")]
    Provider(String),
}

#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    #[error("failed to spawn {program}: {error}")]
    Spawn {
        program: String,
        error: std::io::Error,
    },
    #[error("failed to talk to typst: {0}")]
    Io(std::io::Error),
    #[error("typst exited with {status}: {diagnostics}")]
    Failed { status: String, diagnostics: String },
    #[error("typst did not finish within {0:?}")]
    Timeout(Duration),
    #[error("failed to prepare images: {0}")]
    Images(std::io::Error),
}
