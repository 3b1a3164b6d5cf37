//! Custom Directive Registry
//!
//! Name-keyed callables invoked by `{% name(args) %}` tags that no built-in
//! transformer claims. A registry is an ordinary value: share one between
//! several [`Templator`](crate::Templator)s by cloning the `Arc`, or give each
//! its own.

use std::sync::Arc;

use dashmap::DashMap;
use serde_json::Value;

use crate::error::{Result, TemplateError};

/// Names owned by the compiler itself.
pub const RESERVED_DIRECTIVES: &[&str] = &[
    "include",
    "extend",
    "section",
    "endsection",
    "sections",
    "endsections",
    "yield",
    "endyield",
    "component",
    "endcomponent",
    "if",
    "elseif",
    "else",
    "endif",
    "foreach",
    "endforeach",
    "break",
    "continue",
    "set",
    "use",
    "json",
    "raw",
    "endraw",
];

pub type DirectiveFn =
    Arc<dyn Fn(&[Value]) -> std::result::Result<Value, String> + Send + Sync + 'static>;

#[derive(Default, Clone)]
pub struct DirectiveRegistry {
    directives: Arc<DashMap<String, DirectiveFn>>,
}

impl std::fmt::Debug for DirectiveRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<String> = self.directives.iter().map(|e| e.key().clone()).collect();
        names.sort();
        f.debug_struct("DirectiveRegistry")
            .field("directives", &names)
            .finish()
    }
}

pub fn is_reserved(name: &str) -> bool {
    RESERVED_DIRECTIVES.contains(&name)
}

impl DirectiveRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `callable` under `name`, replacing any previous registration.
    pub fn register<F>(&self, name: &str, callable: F) -> Result<()>
    where
        F: Fn(&[Value]) -> std::result::Result<Value, String> + Send + Sync + 'static,
    {
        if is_reserved(name) {
            return Err(TemplateError::DirectiveReserved {
                name: name.to_string(),
            });
        }
        tracing::debug!(name, "registered directive");
        self.directives.insert(name.to_string(), Arc::new(callable));
        Ok(())
    }

    pub fn call(&self, name: &str, args: &[Value]) -> Result<Value> {
        // Clone the handle so the map shard is not locked while user code runs.
        let callable = self
            .directives
            .get(name)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| TemplateError::DirectiveNotRegistered {
                name: name.to_string(),
            })?;

        callable(args).map_err(|message| TemplateError::Directive {
            name: name.to_string(),
            message,
        })
    }

    pub fn has(&self, name: &str) -> bool {
        self.directives.contains_key(name)
    }

    pub fn remove(&self, name: &str) -> bool {
        self.directives.remove(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.directives.len()
    }

    pub fn is_empty(&self) -> bool {
        self.directives.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sum(args: &[Value]) -> std::result::Result<Value, String> {
        let total: i64 = args.iter().filter_map(Value::as_i64).sum();
        Ok(json!(total))
    }

    #[test]
    fn test_register_and_call() {
        let registry = DirectiveRegistry::new();
        registry.register("sum", sum).unwrap();

        assert!(registry.has("sum"));
        assert_eq!(registry.call("sum", &[json!(1), json!(2)]).unwrap(), json!(3));
    }

    #[test]
    fn test_reserved_name_is_rejected() {
        let registry = DirectiveRegistry::new();
        for name in ["include", "if", "foreach", "component"] {
            let err = registry.register(name, sum).unwrap_err();
            assert!(matches!(err, TemplateError::DirectiveReserved { .. }));
        }
        assert!(registry.is_empty());
    }

    #[test]
    fn test_call_unregistered() {
        let registry = DirectiveRegistry::new();
        let err = registry.call("missing", &[]).unwrap_err();
        assert!(
            matches!(err, TemplateError::DirectiveNotRegistered { ref name } if name == "missing")
        );
    }

    #[test]
    fn test_clones_share_registrations() {
        let registry = DirectiveRegistry::new();
        let shared = registry.clone();
        shared.register("sum", sum).unwrap();
        assert!(registry.has("sum"));

        assert!(registry.remove("sum"));
        assert!(!shared.has("sum"));
    }

    #[test]
    fn test_directive_error_is_wrapped() {
        let registry = DirectiveRegistry::new();
        registry
            .register("fail", |_| Err("boom".to_string()))
            .unwrap();

        let err = registry.call("fail", &[]).unwrap_err();
        assert_eq!(err.to_string(), "Directive 'fail' failed: boom");
    }
}
