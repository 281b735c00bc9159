//! # Execution context handed to an engine.
//!
//! Carries the global configuration and the directory of event receivers.
//! The engine itself only reads the configuration; the directory is used when
//! flow definitions are resolved into [`Flow`](crate::Flow)s.

use crate::config::ConfigProperties;
use crate::flows::ReceiverDirectory;

/// Configuration plus receiver directory.
#[derive(Clone, Debug, Default)]
pub struct Context {
    config: ConfigProperties,
    receivers: ReceiverDirectory,
}

impl Context {
    pub fn new(config: ConfigProperties, receivers: ReceiverDirectory) -> Self {
        Self { config, receivers }
    }

    /// Context with configuration only.
    pub fn with_config(config: ConfigProperties) -> Self {
        Self::new(config, ReceiverDirectory::new())
    }

    pub fn config(&self) -> &ConfigProperties {
        &self.config
    }

    pub fn receivers(&self) -> &ReceiverDirectory {
        &self.receivers
    }
}
