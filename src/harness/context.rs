//! Per-suite harness context: the SUT client, the state purger and the
//! activity logger, acquired once and released when the suite ends.

#![allow(missing_docs)]

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::core::config::{Backend, Config};
use crate::core::errors::Result;
use crate::logger::dual::{ActivityEvent, ActivityLoggerHandle, DualLoggerConfig, spawn_logger};
#[cfg(feature = "http")]
use crate::sut::http::HttpSut;
use crate::sut::memory::MemorySut;
use crate::sut::{RequestingApp, StatePurger, SutClient};

pub struct HarnessContext {
    config: Config,
    client: Arc<dyn SutClient>,
    purger: Arc<dyn StatePurger>,
    app: RequestingApp,
    logger: Option<ActivityLoggerHandle>,
    logger_thread: Option<JoinHandle<()>>,
}

impl HarnessContext {
    /// Context over explicit collaborators, without activity logging.
    #[must_use]
    pub fn new(config: Config, client: Arc<dyn SutClient>, purger: Arc<dyn StatePurger>) -> Self {
        let app = RequestingApp {
            client_code: config.harness.app_code.clone(),
            author_name: config.harness.author_name.clone(),
            author_type: config.harness.author_type.clone(),
        };
        Self {
            config,
            client,
            purger,
            app,
            logger: None,
            logger_thread: None,
        }
    }

    /// Context whose client and purger are the same in-memory SUT.
    #[must_use]
    pub fn in_memory(config: Config, sut: Arc<MemorySut>) -> Self {
        let client: Arc<dyn SutClient> = sut.clone();
        Self::new(config, client, sut)
    }

    /// Build the backend named by `[sut].backend`.
    pub fn from_config(config: Config) -> Result<Self> {
        match config.sut.backend {
            Backend::Memory => Ok(Self::in_memory(config, Arc::new(MemorySut::new()))),
            #[cfg(feature = "http")]
            Backend::Http => {
                let sut = Arc::new(HttpSut::new(&config.sut)?);
                let client: Arc<dyn SutClient> = sut.clone();
                Ok(Self::new(config, client, sut))
            }
            #[cfg(not(feature = "http"))]
            Backend::Http => Err(crate::core::errors::IshError::InvalidConfig {
                details: "sut.backend = \"http\" requires the `http` feature".to_string(),
            }),
        }
    }

    /// Start the dual-write logger at the configured paths.
    pub fn start_logging(&mut self) -> Result<()> {
        if self.logger.is_some() {
            return Ok(());
        }
        let (handle, join) = spawn_logger(DualLoggerConfig::from_config(&self.config))?;
        self.logger = Some(handle);
        self.logger_thread = Some(join);
        Ok(())
    }

    pub fn log(&self, event: ActivityEvent) {
        if let Some(logger) = &self.logger {
            logger.send(event);
        }
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[must_use]
    pub fn client(&self) -> &dyn SutClient {
        self.client.as_ref()
    }

    #[must_use]
    pub fn purger(&self) -> &dyn StatePurger {
        self.purger.as_ref()
    }

    #[must_use]
    pub const fn app(&self) -> &RequestingApp {
        &self.app
    }

    #[must_use]
    pub const fn settle_interval(&self) -> Duration {
        Duration::from_millis(self.config.harness.settle_interval_ms)
    }

    /// Flush and stop the logger thread.
    pub fn release(mut self) {
        self.stop_logger();
    }

    fn stop_logger(&mut self) {
        if let Some(logger) = self.logger.take() {
            logger.shutdown();
        }
        if let Some(join) = self.logger_thread.take() {
            let _ = join.join();
        }
    }
}

impl Drop for HarnessContext {
    fn drop(&mut self) {
        self.stop_logger();
    }
}
