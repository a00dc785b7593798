use crate::error::NrfuError;
use crate::test_contract::NrfuTest;
use indexmap::IndexMap;
use parking_lot::RwLock;
use serde_json::Value;
use tracing::debug;

/// Factory signature: declarative inputs in, ready-to-run instance out.
///
/// The factory receives the raw catalog inputs plus the instance name so
/// `BadInputs` failures can name the offending catalog entry.
pub type TestFactory = fn(name: &str, inputs: Value) -> Result<Box<dyn NrfuTest>, NrfuError>;

/// Two-level (module -> name -> factory) test registry.
///
/// Registration is insert-only and happens in one explicit phase at engine
/// initialization ([`TestRegistry::builtin`]); reads dominate afterwards.
pub struct TestRegistry {
    inner: RwLock<IndexMap<String, IndexMap<String, TestFactory>>>,
}

impl TestRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(IndexMap::new()),
        }
    }

    /// The registry with every built-in check registered.
    pub fn builtin() -> Self {
        let registry = Self::new();
        crate::checks::register_builtin(&registry)
            .unwrap_or_else(|e| panic!("built-in registration must not collide: {}", e));
        registry
    }

    /// Bind a factory under (module, name).
    ///
    /// Fails on empty keys or an existing binding.
    pub fn register(
        &self,
        module: &str,
        name: &str,
        factory: TestFactory,
    ) -> Result<(), NrfuError> {
        if module.is_empty() {
            return Err(NrfuError::InvalidKey("module must not be empty".to_string()));
        }
        if name.is_empty() {
            return Err(NrfuError::InvalidKey("name must not be empty".to_string()));
        }

        let mut inner = self.inner.write();
        let tests = inner.entry(module.to_string()).or_default();
        if tests.contains_key(name) {
            return Err(NrfuError::duplicate_test(module, name));
        }
        tests.insert(name.to_string(), factory);
        debug!(module, name, "registered test factory");
        Ok(())
    }

    /// Construct a fresh test instance for a catalog entry.
    pub fn get(
        &self,
        module: &str,
        name: &str,
        inputs: Value,
    ) -> Result<Box<dyn NrfuTest>, NrfuError> {
        let inner = self.inner.read();
        let tests = inner
            .get(module)
            .ok_or_else(|| NrfuError::UnknownModule(module.to_string()))?;
        let factory = tests
            .get(name)
            .ok_or_else(|| NrfuError::unknown_test(module, name))?;
        factory(name, inputs)
    }

    /// Registered module names, in registration order.
    pub fn list_modules(&self) -> Vec<String> {
        self.inner.read().keys().cloned().collect()
    }

    /// Test names registered under one module.
    pub fn list_tests(&self, module: &str) -> Vec<String> {
        self.inner
            .read()
            .get(module)
            .map(|tests| tests.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Every (module, name) pair.
    pub fn list_all(&self) -> Vec<(String, String)> {
        self.inner
            .read()
            .iter()
            .flat_map(|(module, tests)| {
                tests
                    .keys()
                    .map(|name| (module.clone(), name.clone()))
                    .collect::<Vec<_>>()
            })
            .collect()
    }
}

impl Default for TestRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::EapiClient;
    use crate::result::TestResult;
    use crate::test_contract::{NrfuTest, TestMeta};
    use async_trait::async_trait;
    use serde_json::json;
    use std::time::Duration;

    struct NoopTest {
        meta: TestMeta,
    }

    #[async_trait]
    impl NrfuTest for NoopTest {
        fn meta(&self) -> &TestMeta {
            &self.meta
        }

        async fn execute(&self, client: &EapiClient) -> TestResult {
            TestResult::success(
                &self.meta.name,
                client.name(),
                &self.meta.categories,
                Duration::ZERO,
            )
        }
    }

    fn noop_factory(name: &str, _inputs: serde_json::Value) -> Result<Box<dyn NrfuTest>, NrfuError> {
        Ok(Box::new(NoopTest {
            meta: TestMeta::new(name, "does nothing", &["noop"]),
        }))
    }

    #[test]
    fn duplicate_registration_fails() {
        let registry = TestRegistry::new();
        registry.register("system", "Noop", noop_factory).unwrap();
        let err = registry.register("system", "Noop", noop_factory).unwrap_err();
        assert!(matches!(err, NrfuError::DuplicateTest { .. }));
    }

    #[test]
    fn empty_keys_rejected() {
        let registry = TestRegistry::new();
        assert!(matches!(
            registry.register("", "Noop", noop_factory),
            Err(NrfuError::InvalidKey(_))
        ));
        assert!(matches!(
            registry.register("system", "", noop_factory),
            Err(NrfuError::InvalidKey(_))
        ));
    }

    #[test]
    fn unknown_lookups() {
        let registry = TestRegistry::new();
        registry.register("system", "Noop", noop_factory).unwrap();

        assert!(matches!(
            registry.get("bgp", "Noop", json!({})),
            Err(NrfuError::UnknownModule(_))
        ));
        assert!(matches!(
            registry.get("system", "Missing", json!({})),
            Err(NrfuError::UnknownTest { .. })
        ));
    }

    #[test]
    fn get_returns_fresh_instance_per_call() {
        let registry = TestRegistry::new();
        registry.register("system", "Noop", noop_factory).unwrap();

        let a = registry.get("system", "Noop", json!({})).unwrap();
        let b = registry.get("system", "Noop", json!({})).unwrap();
        assert_eq!(a.meta().name, "Noop");
        assert_eq!(b.meta().name, "Noop");
    }

    #[test]
    fn introspection_lists() {
        let registry = TestRegistry::new();
        registry.register("system", "Noop", noop_factory).unwrap();
        registry.register("bgp", "Noop", noop_factory).unwrap();

        assert_eq!(registry.list_modules(), vec!["system", "bgp"]);
        assert_eq!(registry.list_tests("system"), vec!["Noop"]);
        assert!(registry.list_tests("missing").is_empty());
        assert_eq!(registry.list_all().len(), 2);
    }

    #[test]
    fn builtin_registry_is_populated() {
        let registry = TestRegistry::builtin();
        assert!(registry.list_modules().len() >= 8);
        assert!(registry
            .list_tests("system")
            .contains(&"VerifyUptime".to_string()));
    }
}
