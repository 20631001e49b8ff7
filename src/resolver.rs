//! The DNS lookup surface the chain engine needs: plain TXT resolution,
//! narrow enough to mock in tests and to implement against any resolver
//! crate.

use crate::ArcError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

#[async_trait]
pub trait Resolver: Send + Sync {
    async fn resolve_txt(&self, name: &str) -> Result<Vec<String>, ArcError>;
}

/// Real-DNS resolver backed by hickory-resolver, constructed from the
/// system configuration.
pub struct HickoryResolver {
    inner: hickory_resolver::TokioResolver,
}

impl HickoryResolver {
    pub fn from_system_conf() -> Result<Self, ArcError> {
        let (config, mut options) = hickory_resolver::system_conf::read_system_conf()
            .map_err(|err| ArcError::Internal(format!("failed to read DNS config: {err}")))?;
        options.use_hosts_file = hickory_resolver::config::ResolveHosts::Never;
        let inner = hickory_resolver::Resolver::builder_with_config(
            config,
            hickory_resolver::name_server::TokioConnectionProvider::default(),
        )
        .with_options(options)
        .build();
        Ok(Self { inner })
    }
}

#[async_trait]
impl Resolver for HickoryResolver {
    async fn resolve_txt(&self, name: &str) -> Result<Vec<String>, ArcError> {
        let lookup = self
            .inner
            .txt_lookup(name)
            .await
            .map_err(|err| ArcError::KeyFail(err.to_string()))?;
        Ok(lookup.iter().map(|txt| txt.to_string()).collect())
    }
}

/// An in-memory resolver for tests and fixtures: maps a fully-qualified
/// query name to the TXT records it should return.
#[derive(Clone, Default)]
pub struct TestResolver {
    records: Arc<HashMap<String, Vec<String>>>,
}

impl TestResolver {
    pub fn new(records: HashMap<String, Vec<String>>) -> Self {
        Self {
            records: Arc::new(records),
        }
    }
}

#[async_trait]
impl Resolver for TestResolver {
    async fn resolve_txt(&self, name: &str) -> Result<Vec<String>, ArcError> {
        self.records
            .get(name)
            .cloned()
            .ok_or_else(|| ArcError::KeyFail(format!("no TXT record for {name}")))
    }
}
