//!
//! Command line and environment configuration
//!
use crate::cycle::Options;
use crate::{Client, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Parser)]
#[command(name = "nri-redis-enterprise", version)]
#[command(about = "Redis Enterprise integration for the infrastructure agent", long_about = None)]
pub struct Args {
    /// Hostname or IP of a cluster node
    #[arg(long, env = "REDIS_ENTERPRISE_HOSTNAME", default_value = "localhost")]
    pub hostname: String,

    /// Port of the management API
    #[arg(long, env = "REDIS_ENTERPRISE_PORT", default_value_t = 9443)]
    pub port: u16,

    /// Username to login as
    #[arg(long, env = "REDIS_ENTERPRISE_USERNAME", default_value = "admin@example.com")]
    pub username: String,

    /// Password for login
    #[arg(
        long,
        env = "REDIS_ENTERPRISE_PASSWORD",
        default_value = "myPass",
        hide_env_values = true,
        hide_default_value = true
    )]
    pub password: String,

    /// Seconds of replication stats to sample
    #[arg(long, env = "REDIS_ENTERPRISE_EVENT_TIME", default_value_t = 60)]
    pub event_time: u64,

    /// Only collect metrics
    #[arg(long)]
    pub metrics: bool,

    /// Only collect inventory
    #[arg(long)]
    pub inventory: bool,

    /// Pretty print the output
    #[arg(long)]
    pub pretty: bool,

    /// Debug logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Request timeout in seconds
    #[arg(long, env = "REDIS_ENTERPRISE_TIMEOUT", default_value_t = 30)]
    pub timeout: u64,

    /// Seconds a whole collection cycle may take
    #[arg(long, env = "REDIS_ENTERPRISE_CYCLE_TIMEOUT", default_value_t = 120)]
    pub cycle_timeout: u64,

    /// PEM encoded CA certificate of the cluster
    #[arg(long, env = "REDIS_ENTERPRISE_CA_CERT")]
    pub ca_cert: Option<PathBuf>,

    /// Accept invalid certificates
    #[arg(long, env = "REDIS_ENTERPRISE_INSECURE")]
    pub insecure: bool,
}

impl Args {
    /// Neither metrics nor inventory was selected, collect both
    #[must_use]
    pub fn all(&self) -> bool {
        !self.metrics && !self.inventory
    }

    #[must_use]
    pub fn base_url(&self) -> String {
        format!("https://{}:{}", self.hostname, self.port)
    }

    #[must_use]
    pub fn options(&self) -> Options {
        Options {
            metrics: self.all() || self.metrics,
            inventory: self.all() || self.inventory,
            event_time: Duration::from_secs(self.event_time),
            deadline: Some(Duration::from_secs(self.cycle_timeout)),
        }
    }

    /// Build the API client
    pub fn client(&self) -> Result<Client> {
        let builder = Client::builder().timeout(Duration::from_secs(self.timeout));

        let builder = match &self.ca_cert {
            Some(path) => builder.add_root_certificate(&std::fs::read(path)?)?,
            None => builder,
        };

        let builder = if self.insecure {
            builder.danger_accept_invalid_certs()
        } else {
            builder
        };

        builder.connect(&self.base_url(), &self.username, &self.password)
    }
}
