use std::collections::BTreeMap;
use std::fmt;
use std::sync::Mutex;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use muxprims_transport::{resource, Lifecycle, Resource};
use serde_json::Value;
use tracing::{debug, warn};

use crate::engine::{ClipHandle, Code, Engine};
use crate::error::{Result, ScriptError};
use crate::lock;

/// Config keys under this prefix mirror the engine's core settings.
pub const CORE_PREFIX: &str = "vs.core.";

/// Output clips by name.
pub type Outputs = BTreeMap<String, ClipHandle>;

/// An acquirable script environment.
pub trait Script: Send + Sync {
    fn acquire(&self) -> BoxFuture<'_, Result<()>>;

    fn release(&self) -> BoxFuture<'_, Result<()>>;

    /// The value stored under `key`, or [`ScriptError::MissingKey`].
    fn get_config<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Value>>;

    fn set_config<'a>(&'a self, key: &'a str, value: Value) -> BoxFuture<'a, Result<()>>;

    /// Every config key, sorted.
    fn list_config(&self) -> BoxFuture<'_, Result<Vec<String>>>;

    /// Execute `code` and return its result.
    fn run(&self, code: Code) -> BoxFuture<'_, Result<Value>>;

    fn retrieve_outputs(&self) -> BoxFuture<'_, Result<Outputs>>;
}

/// [`Script`] over a synchronous [`Engine`].
///
/// Acquiring seeds the config map with the engine's core settings under
/// [`CORE_PREFIX`]; setting such a key also changes the engine. Every
/// operation first checks that the engine is alive and releases the script
/// when it is not.
pub struct EngineScript<E> {
    engine: E,
    config: Mutex<BTreeMap<String, Value>>,
    lifecycle: Lifecycle,
}

impl<E: Engine> EngineScript<E> {
    pub fn new(engine: E) -> Self {
        Self {
            engine,
            config: Mutex::new(BTreeMap::new()),
            lifecycle: Lifecycle::new("script"),
        }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn is_acquired(&self) -> bool {
        self.lifecycle.is_acquired()
    }

    async fn ensure_usable(&self) -> Result<()> {
        if !self.engine.is_alive() {
            debug!("script environment is gone, releasing");
            if let Err(err) = resource::release(self, false).await {
                warn!(%err, "failed to release script after its environment died");
            }
            return Err(ScriptError::EnvironmentDestroyed);
        }
        self.lifecycle.ensure_acquired()?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Value> {
        self.ensure_usable().await?;
        lock(&self.config)
            .get(key)
            .cloned()
            .ok_or_else(|| ScriptError::MissingKey(key.to_string()))
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        self.ensure_usable().await?;
        if let Some(setting) = key.strip_prefix(CORE_PREFIX) {
            self.engine.set_core_setting(setting, &value)?;
        }
        lock(&self.config).insert(key.to_string(), value);
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>> {
        self.ensure_usable().await?;
        Ok(lock(&self.config).keys().cloned().collect())
    }

    async fn execute(&self, code: Code) -> Result<Value> {
        self.ensure_usable().await?;
        debug!(len = code.as_bytes().len(), "running script code");
        self.engine.run(&code)
    }

    async fn outputs(&self) -> Result<Outputs> {
        self.ensure_usable().await?;
        self.engine.outputs()
    }
}

impl<E: Engine> Resource for EngineScript<E> {
    type Error = ScriptError;

    fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    async fn on_acquire(&self) -> Result<()> {
        if !self.engine.is_alive() {
            return Err(ScriptError::EnvironmentDestroyed);
        }
        let settings = self.engine.core_settings()?;
        let mut config = lock(&self.config);
        for (key, value) in settings {
            config.insert(format!("{CORE_PREFIX}{key}"), value);
        }
        Ok(())
    }

    async fn on_release(&self) -> Result<()> {
        Ok(())
    }
}

impl<E: Engine> Script for EngineScript<E> {
    fn acquire(&self) -> BoxFuture<'_, Result<()>> {
        resource::acquire(self).boxed()
    }

    fn release(&self) -> BoxFuture<'_, Result<()>> {
        resource::release(self, false).boxed()
    }

    fn get_config<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Value>> {
        self.get(key).boxed()
    }

    fn set_config<'a>(&'a self, key: &'a str, value: Value) -> BoxFuture<'a, Result<()>> {
        self.set(key, value).boxed()
    }

    fn list_config(&self) -> BoxFuture<'_, Result<Vec<String>>> {
        self.keys().boxed()
    }

    fn run(&self, code: Code) -> BoxFuture<'_, Result<Value>> {
        self.execute(code).boxed()
    }

    fn retrieve_outputs(&self) -> BoxFuture<'_, Result<Outputs>> {
        self.outputs().boxed()
    }
}

impl<E> fmt::Debug for EngineScript<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineScript")
            .field("config", &lock(&self.config).len())
            .field("lifecycle", &self.lifecycle)
            .finish_non_exhaustive()
    }
}
