use std::{any::Any, sync::Arc};

use indexmap::IndexMap;
use serde::Deserialize;

use crate::{compiler::ResolvedValues, value::InjectableValue};

/// Whatever the initializer produced, shared with every resolver.
pub type InitOutput = Arc<dyn Any + Send + Sync>;

/// Per-request inputs supplied by the request layer.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Request {
    /// Request body after the external mapper parsed it.
    #[serde(default)]
    pub payload: serde_json::Value,
    #[serde(default)]
    pub external_id: Option<String>,
    #[serde(default)]
    pub template_id: Option<String>,
    #[serde(default)]
    pub transactional_id: Option<String>,
    /// Scope handed to external providers.
    #[serde(default)]
    pub workspace_id: Option<String>,
    #[serde(default)]
    pub headers: IndexMap<String, String>,
}

/// What a resolver can see: the request, the initializer output, and the values and
/// errors of every stage that finished before its own.
pub struct ResolutionContext {
    pub(super) request: Arc<Request>,
    pub(super) init: Option<InitOutput>,
    pub(super) values: ResolvedValues,
    pub(super) errors: IndexMap<String, String>,
}

impl ResolutionContext {
    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn payload(&self) -> &serde_json::Value {
        &self.request.payload
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.request
            .headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// The initializer output, if there was one of type `T`.
    pub fn init<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.init.as_deref()?.downcast_ref()
    }

    pub fn value(&self, code: &str) -> Option<&InjectableValue> {
        self.values.get(code)
    }

    pub fn error(&self, code: &str) -> Option<&str> {
        self.errors.get(code).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exposes_request_and_init() {
        let request: Request = serde_json::from_value(serde_json::json!({
            "payload": {"order": 7},
            "externalId": "ext-1",
            "headers": {"X-Tenant": "acme"}
        }))
        .unwrap();
        let ctx = ResolutionContext {
            request: Arc::new(request),
            init: Some(Arc::new(42u32)),
            values: ResolvedValues::new(),
            errors: IndexMap::new(),
        };
        assert_eq!(ctx.payload()["order"], 7);
        assert_eq!(ctx.request().external_id.as_deref(), Some("ext-1"));
        assert_eq!(ctx.header("x-tenant"), Some("acme"));
        assert_eq!(ctx.init::<u32>(), Some(&42));
        assert_eq!(ctx.init::<String>(), None);
    }
}
