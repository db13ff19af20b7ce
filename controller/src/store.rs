use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::Context;
use redlink_common::AppConfig;
use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tracing::info;

use crate::error::ControllerError;

#[derive(Clone)]
pub struct ConfigStore {
    path: Arc<PathBuf>,
    lock: Arc<Mutex<()>>,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Arc::new(path.into()),
            lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn path(&self) -> &Path {
        self.path.as_ref()
    }

    pub async fn load(&self) -> anyhow::Result<AppConfig> {
        let _guard = self.lock.lock().await;
        self.read().await
    }

    pub async fn save(&self, config: &AppConfig) -> anyhow::Result<()> {
        let _guard = self.lock.lock().await;
        self.write(config).await
    }

    pub async fn ensure(&self) -> anyhow::Result<AppConfig> {
        let _guard = self.lock.lock().await;
        match tokio::fs::metadata(self.path.as_ref()).await {
            Ok(_) => self.read().await,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                let config = AppConfig::default();
                self.write(&config).await?;
                info!(path = %self.path.display(), "created default config");
                Ok(config)
            }
            Err(err) => Err(err).with_context(|| format!("failed to stat {}", self.path.display())),
        }
    }

    pub async fn update(&self, changes: Map<String, Value>) -> Result<AppConfig, ControllerError> {
        let _guard = self.lock.lock().await;
        let current = self.read().await?;
        let Value::Object(mut merged) =
            serde_json::to_value(&current).context("failed to serialize config")?
        else {
            return Err(ControllerError::Store(
                "config did not serialize to an object".to_string(),
            ));
        };
        merged.extend(changes);

        let config = AppConfig::from_value(Value::Object(merged)).map_err(|err| {
            ControllerError::Validation(format!("config update has invalid field types: {err}"))
        })?;
        self.write(&config).await?;
        Ok(config)
    }

    async fn read(&self) -> anyhow::Result<AppConfig> {
        match tokio::fs::read(self.path.as_ref()).await {
            Ok(raw) => AppConfig::from_slice(&raw)
                .with_context(|| format!("failed to parse {}", self.path.display())),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(AppConfig::default()),
            Err(err) => Err(err).with_context(|| format!("failed to read {}", self.path.display())),
        }
    }

    async fn write(&self, config: &AppConfig) -> anyhow::Result<()> {
        let path = self.path.as_ref();
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        // Round-trip through Value so keys come out sorted.
        let mut payload = serde_json::to_vec_pretty(&serde_json::to_value(config)?)?;
        payload.push(b'\n');
        tokio::fs::write(path, payload)
            .await
            .with_context(|| format!("failed to write {}", path.display()))?;
        Ok(())
    }
}
