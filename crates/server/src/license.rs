//! License installation on a node

use dynconf_model::{License, ModelResult};
use parking_lot::RwLock;
use tracing::info;

/// Owns the license content of a node
pub trait LicenseService: Send + Sync + 'static {
    /// The installed license content, if any
    fn license_content(&self) -> Option<String>;

    /// Validate and install license content
    fn install(&self, content: &str) -> ModelResult<License>;

    /// Remove the installed license
    fn remove(&self);
}

/// License service keeping the content in memory
#[derive(Debug, Default)]
pub struct InMemoryLicenseService {
    content: RwLock<Option<String>>,
}

impl InMemoryLicenseService {
    /// A service with no license installed
    pub fn new() -> Self {
        Self::default()
    }

    /// A service with `content` already installed, without validation
    pub fn with_content(content: impl Into<String>) -> Self {
        Self {
            content: RwLock::new(Some(content.into())),
        }
    }
}

impl LicenseService for InMemoryLicenseService {
    fn license_content(&self) -> Option<String> {
        self.content.read().clone()
    }

    fn install(&self, content: &str) -> ModelResult<License> {
        let license = License::parse(content)?;
        *self.content.write() = Some(content.to_string());
        info!("License installed, expiring on {}", license.expiry_date);
        Ok(license)
    }

    fn remove(&self) {
        if self.content.write().take().is_some() {
            info!("License removed");
        }
    }
}
