use std::{
    fmt::Display,
    io::ErrorKind,
    path::Path,
    sync::Arc,
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

pub const DEVICE_FILE: &str = "device-id";

/// Identifier of the device that produced an increment. Generated once and kept in the
/// application directory, so it survives restarts.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(Arc<str>);

impl DeviceId {
    pub fn new(id: impl Into<Arc<str>>) -> Self {
        Self(id.into())
    }

    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string().into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for DeviceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Reads the identity stored at `path`, creating it on first access.
pub fn load_or_create(path: &Path) -> Result<DeviceId> {
    match std::fs::read_to_string(path) {
        Ok(content) if !content.trim().is_empty() => return Ok(DeviceId::new(content.trim())),
        Ok(_) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => return Err(e).with_context(|| format!("Failed to read device id at {path:?}")),
    }

    let device = DeviceId::generate();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, device.as_str())
        .with_context(|| format!("Failed to store device id at {path:?}"))?;
    info!("Generated new device id {device}");
    Ok(device)
}
