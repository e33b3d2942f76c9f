use std::path::{Path, PathBuf};

use tracing::debug;

/// Host integration points the engine needs from its embedding environment.
///
/// Streaming never goes through here; these exist so UI layers on different
/// hosts can adapt without the engine knowing which host it runs on.
pub trait Platform: Send + Sync {
    /// Directory holding the persistent store file.
    fn config_dir(&self) -> &Path;

    /// Version string reported to providers via the user agent.
    fn app_version(&self) -> &str;

    /// Short host identifier, e.g. `linux` or `macos`.
    fn platform_name(&self) -> &str;

    /// Whether the host is a mobile form factor.
    fn is_mobile(&self) -> bool {
        false
    }

    /// Opens `url` in the host's browser, where the host supports it.
    fn open_link(&self, url: &str);
}

/// Plain filesystem-backed platform for desktop hosts.
pub struct DesktopPlatform {
    config_dir: PathBuf,
    app_version: String,
}

impl DesktopPlatform {
    #[must_use]
    pub fn new(config_dir: impl Into<PathBuf>, app_version: impl Into<String>) -> Self {
        Self {
            config_dir: config_dir.into(),
            app_version: app_version.into(),
        }
    }
}

impl Platform for DesktopPlatform {
    fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    fn app_version(&self) -> &str {
        &self.app_version
    }

    fn platform_name(&self) -> &str {
        std::env::consts::OS
    }

    fn open_link(&self, url: &str) {
        // Browser launching belongs to the embedding UI; headless hosts only log.
        debug!(url = %url, "open_link requested");
    }
}

/// User agent sent with provider requests.
#[must_use]
pub fn user_agent(platform: &dyn Platform) -> String {
    format!("chat-engine/{}", platform.app_version())
}
