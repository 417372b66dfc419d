use std::sync::Arc;
use std::time::Duration;

use super::publisher::{BackpressurePolicy, Publisher};
use super::subscriber::Subscriber;
use super::transport::Transport;
use crate::config::TransportConfig;
use crate::error::Result;

pub struct TransportBuilder {
    config: TransportConfig,
    in_process: bool,
    dedicated_writer: bool,
    policy: Option<BackpressurePolicy>,
}

impl Default for TransportBuilder {
    fn default() -> Self {
        Self {
            config: TransportConfig::default(),
            in_process: false,
            dedicated_writer: false,
            policy: None,
        }
    }
}

impl TransportBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: TransportConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.config.name = name.to_string();
        self
    }

    pub fn with_ring_buffer_size_kb(mut self, kb: u64) -> Self {
        self.config.ring_buffer_size_kb = kb;
        self
    }

    pub fn with_max_readers(mut self, max_readers: u16) -> Self {
        self.config.max_readers = max_readers;
        self
    }

    pub fn with_backpressure_sleep(mut self, delay: Duration) -> Self {
        self.config.backpressure_sleep_ms = delay.as_millis() as u64;
        self
    }

    pub fn with_open_timeout(mut self, timeout: Duration) -> Self {
        self.config.open_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Back the bus with private memory instead of named segments.
    pub fn in_process(mut self, in_process: bool) -> Self {
        self.in_process = in_process;
        self
    }

    /// Give publishers their own writer thread.
    pub fn with_dedicated_writer(mut self, dedicated: bool) -> Self {
        self.dedicated_writer = dedicated;
        self
    }

    /// Override the default policy of retrying after `backpressure_sleep_ms`.
    pub fn with_backpressure_policy(mut self, policy: BackpressurePolicy) -> Self {
        self.policy = Some(policy);
        self
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    pub fn build(&self) -> Result<Arc<Transport>> {
        let transport = if self.in_process {
            Transport::in_process(self.config.clone())?
        } else {
            Transport::create_or_open(self.config.clone())?
        };
        Ok(Arc::new(transport))
    }

    pub fn build_publisher(&self) -> Result<Publisher> {
        self.publisher_for(self.build()?)
    }

    /// A publisher on an already built transport, using this builder's
    /// writer settings.
    pub fn publisher_for(&self, transport: Arc<Transport>) -> Result<Publisher> {
        let policy = self.policy.unwrap_or(BackpressurePolicy::RetryAfter(Duration::from_millis(
            self.config.backpressure_sleep_ms,
        )));
        Publisher::new(transport, policy, self.dedicated_writer)
    }

    pub fn build_subscriber(&self) -> Result<Subscriber> {
        Subscriber::new(self.build()?, |event| {
            tracing::info!(?event, "channel reader event");
        })
    }
}

impl From<TransportConfig> for TransportBuilder {
    fn from(config: TransportConfig) -> Self {
        Self::from_config(config)
    }
}

