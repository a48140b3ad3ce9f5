//! Launching the browser consent step
//!
//! The consent step hands the authorization URL to the platform's default
//! browser. The trait seam exists because a headless environment has no
//! browser to launch, and tests drive the callback listener directly.

use crate::Result;
use crate::error::Error;

/// Opens the provider consent page for the user
pub trait ConsentLauncher: Send + Sync {
    fn launch(&self, url: &str) -> Result<()>;
}

/// Default launcher delegating to the operating system's URL handler
pub struct SystemBrowser;

impl ConsentLauncher for SystemBrowser {
    fn launch(&self, url: &str) -> Result<()> {
        tracing::info!("opening browser for Google sign-in");
        open::that(url)
            .map_err(|e| Error::ConsentUi(format!("Failed to open system browser: {}", e)))
    }
}
