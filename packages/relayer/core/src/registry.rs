//! Defines the [`Registry`] that maps `(role, identifier)` to a module.

use std::{collections::HashMap, sync::Arc};

use tracing::{debug, instrument};

use crate::{
    backend::Backend,
    config::{BackendConfig, ChainConfig},
    error::{Collision, Error},
    module::{Module, Role},
};

/// The authoritative mapping from `(role, identifier)` to [`Module`].
///
/// A registry is populated once at startup and only read afterwards. Lookup
/// does not depend on registration order; the order is kept for listings.
#[derive(Default)]
pub struct Registry {
    /// Registered modules, in registration order.
    modules: Vec<Arc<dyn Module>>,
    /// Index into `modules` by role and identifier.
    index: HashMap<(Role, String), usize>,
}

/// The backends serving one configured chain.
#[derive(Debug)]
pub struct ChainBackends {
    /// The chain backend.
    pub chain: Box<dyn Backend>,
    /// The signer backend, if configured.
    pub signer: Option<Box<dyn Backend>>,
    /// The prover backend.
    pub prover: Box<dyn Backend>,
}

impl Registry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register every module in order. Fails as a whole on the first collision.
    ///
    /// # Errors
    /// Returns a backend [`Collision`] naming the contested role and identifier.
    pub fn from_modules<I>(modules: I) -> Result<Self, Error>
    where
        I: IntoIterator<Item = Arc<dyn Module>>,
    {
        let mut registry = Self::new();
        for module in modules {
            registry.register(module)?;
        }
        Ok(registry)
    }

    /// Register `module` under every role it declares.
    ///
    /// All roles are checked before anything is inserted, so a module is
    /// either registered completely or not at all.
    ///
    /// # Errors
    /// Returns a backend [`Collision`] if another module already holds one of
    /// the `(role, identifier)` pairs.
    #[instrument(skip_all, fields(module = %module.id()))]
    pub fn register(&mut self, module: Arc<dyn Module>) -> Result<(), Error> {
        let id = module.id();
        let mut roles = module.roles();
        roles.sort_unstable();
        roles.dedup();

        if let Some(role) = roles
            .iter()
            .find(|role| self.index.contains_key(&(**role, id.to_string())))
        {
            return Err(Error::Collision(Collision::Backend {
                role: *role,
                id: id.to_string(),
            }));
        }

        let position = self.modules.len();
        for role in roles {
            self.index.insert((role, id.to_string()), position);
        }
        self.modules.push(module);
        debug!("module registered");
        Ok(())
    }

    /// Returns the module registered as `id` for `role`.
    ///
    /// # Errors
    /// Returns [`Error::NotFound`] listing the identifiers available for `role`.
    pub fn resolve(&self, role: Role, id: &str) -> Result<&Arc<dyn Module>, Error> {
        self.index
            .get(&(role, id.to_string()))
            .map(|&position| &self.modules[position])
            .ok_or_else(|| Error::NotFound {
                role,
                id: id.to_string(),
                available: self.identifiers(role).into_iter().map(String::from).collect(),
            })
    }

    /// The identifiers registered for `role`, in registration order.
    #[must_use]
    pub fn identifiers(&self, role: Role) -> Vec<&'static str> {
        self.modules
            .iter()
            .enumerate()
            .filter(|(position, m)| self.index.get(&(role, m.id().to_string())) == Some(position))
            .map(|(_, m)| m.id())
            .collect()
    }

    /// The registered modules, in registration order.
    #[must_use]
    pub fn modules(&self) -> impl Iterator<Item = &Arc<dyn Module>> {
        self.modules.iter()
    }

    /// Returns true if no module is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Check `config` against the schema of the module it selects for `role`
    /// without constructing anything.
    ///
    /// # Errors
    /// Returns [`Error::NotFound`] or [`Error::Configuration`].
    pub fn validate(&self, role: Role, config: &BackendConfig) -> Result<(), Error> {
        let module = self.resolve(role, &config.module)?;
        module
            .schema(role)?
            .validate(&config.config)
            .map_err(|e| Error::Configuration {
                role,
                id: config.module.clone(),
                source: e.into(),
            })
    }

    /// Construct a fresh backend instance for `role` from `config`.
    ///
    /// # Errors
    /// Returns [`Error::NotFound`] if no module matches, and
    /// [`Error::Configuration`] if the schema or the factory rejects the
    /// configuration.
    #[instrument(skip(self, config), fields(module = %config.module))]
    pub async fn build_backend(
        &self,
        role: Role,
        config: &BackendConfig,
    ) -> Result<Box<dyn Backend>, Error> {
        self.validate(role, config)?;
        let module = self.resolve(role, &config.module)?;
        let configuration_error = |source| Error::Configuration {
            role,
            id: config.module.clone(),
            source,
        };

        let backend = module
            .factory(role)?
            .create(config.config.clone())
            .await
            .map_err(configuration_error)?;

        if backend.role() != role {
            return Err(configuration_error(anyhow::anyhow!(
                "factory produced a {} backend",
                backend.role()
            )));
        }
        debug!("backend created");
        Ok(backend)
    }

    /// Construct every backend of a configured chain.
    ///
    /// # Errors
    /// Returns the first error from [`Self::build_backend`].
    pub async fn build_chain(&self, chain: &ChainConfig) -> Result<ChainBackends, Error> {
        let signer = match &chain.signer {
            Some(signer) => Some(self.build_backend(Role::Signer, signer).await?),
            None => None,
        };
        Ok(ChainBackends {
            chain: self.build_backend(Role::Chain, &chain.chain).await?,
            signer,
            prover: self.build_backend(Role::Prover, &chain.prover).await?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        module::Factory,
        schema::{ConfigSchema, FieldKind},
    };
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug)]
    struct Dummy(Role);

    impl Backend for Dummy {
        fn role(&self) -> Role {
            self.0
        }
    }

    struct DummyFactory {
        role: Role,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait::async_trait]
    impl Factory for DummyFactory {
        async fn create(&self, config: serde_json::Value) -> anyhow::Result<Box<dyn Backend>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if config.get("fail").is_some() {
                anyhow::bail!("endpoint unreachable");
            }
            Ok(Box::new(Dummy(self.role)))
        }
    }

    struct TestModule {
        id: &'static str,
        roles: Vec<Role>,
        calls: Arc<AtomicUsize>,
    }

    impl TestModule {
        fn new(id: &'static str, roles: &[Role]) -> Arc<dyn Module> {
            Arc::new(Self {
                id,
                roles: roles.to_vec(),
                calls: Arc::default(),
            })
        }
    }

    impl Module for TestModule {
        fn id(&self) -> &'static str {
            self.id
        }

        fn roles(&self) -> Vec<Role> {
            self.roles.clone()
        }

        fn schema(&self, role: Role) -> Result<ConfigSchema, Error> {
            if !self.roles.contains(&role) {
                return Err(self.unsupported(role));
            }
            Ok(ConfigSchema::new().optional("fail", FieldKind::Boolean, "fail on create", false))
        }

        fn factory(&self, role: Role) -> Result<Arc<dyn Factory>, Error> {
            if !self.roles.contains(&role) {
                return Err(self.unsupported(role));
            }
            Ok(Arc::new(DummyFactory {
                role,
                calls: self.calls.clone(),
            }))
        }
    }

    fn backend(module: &str, config: serde_json::Value) -> BackendConfig {
        BackendConfig {
            module: module.to_string(),
            config,
        }
    }

    #[test]
    fn same_role_and_id_collide() {
        let mut registry = Registry::new();
        registry
            .register(TestModule::new("ethereum", &[Role::Chain]))
            .unwrap();
        let err = registry
            .register(TestModule::new("ethereum", &[Role::Chain]))
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Collision(Collision::Backend { role: Role::Chain, ref id }) if id == "ethereum"
        ));
    }

    #[test]
    fn same_id_different_role_coexist() {
        let a = TestModule::new("ethereum", &[Role::Chain]);
        let b = TestModule::new("ethereum", &[Role::Signer]);
        let registry = Registry::from_modules([a.clone(), b.clone()]).unwrap();

        assert!(Arc::ptr_eq(registry.resolve(Role::Chain, "ethereum").unwrap(), &a));
        assert!(Arc::ptr_eq(registry.resolve(Role::Signer, "ethereum").unwrap(), &b));
    }

    #[test]
    fn collision_is_reported_in_either_order() {
        let make = || {
            (
                TestModule::new("mock", &[Role::Chain, Role::Prover]),
                TestModule::new("mock", &[Role::Prover]),
            )
        };

        let (a, b) = make();
        let forward = Registry::from_modules([a, b]).err().unwrap();
        let (a, b) = make();
        let backward = Registry::from_modules([b, a]).err().unwrap();

        for err in [forward, backward] {
            assert!(matches!(
                err,
                Error::Collision(Collision::Backend { role: Role::Prover, ref id }) if id == "mock"
            ));
        }
    }

    #[test]
    fn failed_registration_inserts_nothing() {
        let mut registry = Registry::new();
        registry
            .register(TestModule::new("mock", &[Role::Prover]))
            .unwrap();
        registry
            .register(TestModule::new("mock", &[Role::Chain, Role::Prover]))
            .unwrap_err();

        assert!(registry.resolve(Role::Chain, "mock").is_err());
        assert_eq!(registry.modules().count(), 1);
    }

    #[test]
    fn resolve_is_order_independent() {
        let chain = TestModule::new("ethereum", &[Role::Chain]);
        let signer = TestModule::new("hd", &[Role::Signer]);
        let prover = TestModule::new("mock", &[Role::Chain, Role::Prover]);

        let forward =
            Registry::from_modules([chain.clone(), signer.clone(), prover.clone()]).unwrap();
        let backward =
            Registry::from_modules([prover.clone(), signer.clone(), chain.clone()]).unwrap();

        for (role, id) in [
            (Role::Chain, "ethereum"),
            (Role::Chain, "mock"),
            (Role::Signer, "hd"),
            (Role::Prover, "mock"),
        ] {
            assert!(Arc::ptr_eq(
                forward.resolve(role, id).unwrap(),
                backward.resolve(role, id).unwrap()
            ));
        }
        assert_eq!(forward.identifiers(Role::Chain), vec!["ethereum", "mock"]);
        assert_eq!(backward.identifiers(Role::Chain), vec!["mock", "ethereum"]);
    }

    #[test]
    fn resolve_is_exact_and_lists_alternatives() {
        let registry = Registry::from_modules([
            TestModule::new("ethereum", &[Role::Chain]),
            TestModule::new("mock", &[Role::Chain]),
        ])
        .unwrap();

        let err = registry.resolve(Role::Chain, "Ethereum").err().unwrap();
        match err {
            Error::NotFound {
                role,
                id,
                available,
            } => {
                assert_eq!(role, Role::Chain);
                assert_eq!(id, "Ethereum");
                assert_eq!(available, vec!["ethereum", "mock"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn build_backend_creates_independent_instances() {
        let calls = Arc::new(AtomicUsize::new(0));
        let module: Arc<dyn Module> = Arc::new(TestModule {
            id: "mock",
            roles: vec![Role::Prover],
            calls: calls.clone(),
        });
        let registry = Registry::from_modules([module]).unwrap();

        let config = backend("mock", json!({}));
        let first = registry.build_backend(Role::Prover, &config).await.unwrap();
        let second = registry.build_backend(Role::Prover, &config).await.unwrap();

        assert_eq!(first.role(), Role::Prover);
        assert_eq!(second.role(), Role::Prover);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn build_backend_surfaces_factory_message() {
        let registry =
            Registry::from_modules([TestModule::new("mock", &[Role::Prover])]).unwrap();

        let err = registry
            .build_backend(Role::Prover, &backend("mock", json!({ "fail": true })))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Configuration { role: Role::Prover, .. }));
        assert!(err.to_string().contains("endpoint unreachable"), "{err}");
    }

    #[tokio::test]
    async fn schema_violation_never_reaches_the_factory() {
        let calls = Arc::new(AtomicUsize::new(0));
        let module: Arc<dyn Module> = Arc::new(TestModule {
            id: "mock",
            roles: vec![Role::Prover],
            calls: calls.clone(),
        });
        let registry = Registry::from_modules([module]).unwrap();

        let err = registry
            .build_backend(Role::Prover, &backend("mock", json!({ "fail": "yes" })))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Configuration { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn build_chain_resolves_each_role() {
        let registry = Registry::from_modules([
            TestModule::new("ethereum", &[Role::Chain]),
            TestModule::new("mock", &[Role::Prover]),
        ])
        .unwrap();

        let chain = ChainConfig {
            name: "ibc0".to_string(),
            enabled: true,
            chain: backend("ethereum", json!(null)),
            signer: Some(backend("hd", json!(null))),
            prover: backend("mock", json!(null)),
        };
        let err = registry.build_chain(&chain).await.unwrap_err();
        assert!(matches!(err, Error::NotFound { role: Role::Signer, .. }));

        let chain = ChainConfig {
            signer: None,
            ..chain
        };
        let backends = registry.build_chain(&chain).await.unwrap();
        assert_eq!(backends.chain.role(), Role::Chain);
        assert_eq!(backends.prover.role(), Role::Prover);
    }
}
