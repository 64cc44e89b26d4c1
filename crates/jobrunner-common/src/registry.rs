// CapabilityRegistry: the name → plugin lookup table for every capability kind.
// Populated once at process start, then shared read-mostly across job runners.

use crate::errors::JobError;
use dashmap::DashMap;
use jobrunner_sdk::{
    Action, Builder, CapabilityKind, ConnectInfo, Notifier, Provisioner, Source, Transport,
};
use std::sync::Arc;

pub type BuilderFactory = Arc<dyn Fn() -> Box<dyn Builder> + Send + Sync>;
pub type TransportFactory =
    Arc<dyn Fn(ConnectInfo, Arc<dyn Notifier>) -> Box<dyn Transport> + Send + Sync>;
pub type ProvisionerFactory = Arc<dyn Fn() -> Box<dyn Provisioner> + Send + Sync>;
pub type SourceFactory = Arc<dyn Fn() -> Box<dyn Source> + Send + Sync>;
/// Builds an action from its descriptor parameters; malformed parameters are an error.
pub type ActionFactory =
    Arc<dyn Fn(&serde_json::Value) -> anyhow::Result<Box<dyn Action>> + Send + Sync>;

/// A registered plugin constructor. The variant decides the capability kind,
/// so a registration can never land under more than one kind.
#[derive(Clone)]
pub enum PluginFactory {
    Builder(BuilderFactory),
    Transport(TransportFactory),
    Provisioner(ProvisionerFactory),
    Source(SourceFactory),
    Action(ActionFactory),
}

impl PluginFactory {
    pub fn kind(&self) -> CapabilityKind {
        match self {
            PluginFactory::Builder(_) => CapabilityKind::Builder,
            PluginFactory::Transport(_) => CapabilityKind::Transport,
            PluginFactory::Provisioner(_) => CapabilityKind::Provisioner,
            PluginFactory::Source(_) => CapabilityKind::Source,
            PluginFactory::Action(_) => CapabilityKind::Action,
        }
    }
}

/// Resolves plugin implementations by `(kind, name)`.
///
/// Lookups are safe from any number of concurrent job runners. Registration
/// is expected to happen during process warm-up.
///
/// Registering the same `(kind, name)` twice replaces the earlier factory:
/// the last registration wins. This is intentional so a deployment can
/// override a built-in plugin by registering its own under the same name.
#[derive(Default)]
pub struct CapabilityRegistry {
    entries: DashMap<(CapabilityKind, String), PluginFactory>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `factory` under `name`. Returns `true` when an earlier
    /// registration was replaced.
    pub fn register(&self, name: impl Into<String>, factory: PluginFactory) -> bool {
        let name = name.into();
        let kind = factory.kind();
        let replaced = self.entries.insert((kind, name.clone()), factory).is_some();
        if replaced {
            tracing::debug!(%kind, %name, "plugin registration replaced an earlier one");
        }
        replaced
    }

    pub fn register_builder<F>(&self, name: impl Into<String>, factory: F) -> bool
    where
        F: Fn() -> Box<dyn Builder> + Send + Sync + 'static,
    {
        self.register(name, PluginFactory::Builder(Arc::new(factory)))
    }

    pub fn register_transport<F>(&self, name: impl Into<String>, factory: F) -> bool
    where
        F: Fn(ConnectInfo, Arc<dyn Notifier>) -> Box<dyn Transport> + Send + Sync + 'static,
    {
        self.register(name, PluginFactory::Transport(Arc::new(factory)))
    }

    pub fn register_provisioner<F>(&self, name: impl Into<String>, factory: F) -> bool
    where
        F: Fn() -> Box<dyn Provisioner> + Send + Sync + 'static,
    {
        self.register(name, PluginFactory::Provisioner(Arc::new(factory)))
    }

    pub fn register_source<F>(&self, name: impl Into<String>, factory: F) -> bool
    where
        F: Fn() -> Box<dyn Source> + Send + Sync + 'static,
    {
        self.register(name, PluginFactory::Source(Arc::new(factory)))
    }

    pub fn register_action<F>(&self, name: impl Into<String>, factory: F) -> bool
    where
        F: Fn(&serde_json::Value) -> anyhow::Result<Box<dyn Action>> + Send + Sync + 'static,
    {
        self.register(name, PluginFactory::Action(Arc::new(factory)))
    }

    pub fn contains(&self, kind: CapabilityKind, name: &str) -> bool {
        self.entries.contains_key(&(kind, name.to_string()))
    }

    /// Registered names for `kind`, sorted.
    pub fn names(&self, kind: CapabilityKind) -> Vec<String> {
        let mut names: Vec<String> = self
            .entries
            .iter()
            .filter(|entry| entry.key().0 == kind)
            .map(|entry| entry.key().1.clone())
            .collect();
        names.sort();
        names
    }

    /// Clone the factory out so the map shard is not held while it runs.
    fn lookup(&self, kind: CapabilityKind, name: &str) -> Result<PluginFactory, JobError> {
        self.entries
            .get(&(kind, name.to_string()))
            .map(|entry| entry.value().clone())
            .ok_or_else(|| JobError::plugin_not_found(kind, name))
    }

    pub fn builder(&self, name: &str) -> Result<Box<dyn Builder>, JobError> {
        match self.lookup(CapabilityKind::Builder, name)? {
            PluginFactory::Builder(f) => Ok(f()),
            _ => Err(JobError::plugin_not_found(CapabilityKind::Builder, name)),
        }
    }

    pub fn transport(
        &self,
        name: &str,
        connect: ConnectInfo,
        log_sink: Arc<dyn Notifier>,
    ) -> Result<Box<dyn Transport>, JobError> {
        match self.lookup(CapabilityKind::Transport, name)? {
            PluginFactory::Transport(f) => Ok(f(connect, log_sink)),
            _ => Err(JobError::plugin_not_found(CapabilityKind::Transport, name)),
        }
    }

    pub fn provisioner(&self, name: &str) -> Result<Box<dyn Provisioner>, JobError> {
        match self.lookup(CapabilityKind::Provisioner, name)? {
            PluginFactory::Provisioner(f) => Ok(f()),
            _ => Err(JobError::plugin_not_found(CapabilityKind::Provisioner, name)),
        }
    }

    pub fn source(&self, name: &str) -> Result<Box<dyn Source>, JobError> {
        match self.lookup(CapabilityKind::Source, name)? {
            PluginFactory::Source(f) => Ok(f()),
            _ => Err(JobError::plugin_not_found(CapabilityKind::Source, name)),
        }
    }

    /// Build the action registered as `name` from its parameters.
    pub fn action(
        &self,
        name: &str,
        parameters: &serde_json::Value,
    ) -> Result<Box<dyn Action>, JobError> {
        match self.lookup(CapabilityKind::Action, name)? {
            PluginFactory::Action(f) => f(parameters)
                .map_err(|e| JobError::deserialization(format!("parameters of action '{name}'"), e)),
            _ => Err(JobError::plugin_not_found(CapabilityKind::Action, name)),
        }
    }
}
