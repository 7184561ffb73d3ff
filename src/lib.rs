//!
//! Library for collecting Redis Enterprise cluster telemetry.
//!
//! ## Client
//! All interaction with the cluster management API goes through a [`Client`]
//! ```no_run
//! #[tokio::main]
//! async fn main() -> Result<(), redis_enterprise_telemetry::Error> {
//!     use redis_enterprise_telemetry::ClientBuilder;
//!
//!     // API CA certificate loaded
//!     let ca_cert: Vec<u8> = Vec::new();
//!
//!     let client = ClientBuilder::new()
//!         .add_root_certificate(&ca_cert)?
//!         .connect("https://cluster.local:9443", "admin@example.com", "secret")?;
//!
//!     let cluster = redis_enterprise_telemetry::api::cluster(&client).await?;
//!     println!("{}", cluster.name);
//!     Ok(())
//! }
//! ```
//!
//! ## Collection cycle
//! One cycle probes for leadership, fetches the cluster resources and turns
//! them into an [`telemetry::Integration`] ready to be published.
//! ```no_run
//! #[tokio::main]
//! async fn main() -> Result<(), redis_enterprise_telemetry::Error> {
//!     use redis_enterprise_telemetry::cycle::{self, Cycle, Options};
//!     use redis_enterprise_telemetry::telemetry::{JsonPublisher, Publisher};
//!
//!     let client = redis_enterprise_telemetry::Client::builder()
//!         .danger_accept_invalid_certs()
//!         .connect("https://localhost:9443", "admin@example.com", "secret")?;
//!
//!     match cycle::run(&client, &Options::default()).await? {
//!         Cycle::Collected(integration) => JsonPublisher::stdout().publish(&integration)?,
//!         Cycle::Skipped => {}
//!     }
//!     Ok(())
//! }
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::module_name_repetitions)]

pub mod api;
pub mod config;
pub mod cycle;
pub mod entities;
pub mod metrics;
pub mod telemetry;

/// Error returned by client and collection functions
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Connection failure, request timeout or other HTTP client error
    #[error("Transport: {0}")]
    Transport(#[from] reqwest::Error),

    /// The API answered with something other than 200
    #[error("HTTP status {status} from {path}, expected 200")]
    UnexpectedStatus {
        /// Returned status code
        status: u16,
        /// Requested API path
        path: String,
    },

    /// The response body could not be decoded
    #[error("Failed to decode response from {path}: {source}")]
    Decode {
        /// Requested API path
        path: String,
        /// Underlying JSON error
        #[source]
        source: serde_json::Error,
    },

    /// Data required to build the telemetry is missing or invalid
    #[error("Precondition failed: {0}")]
    Precondition(String),

    /// URL parsing error
    #[error("URL: {0}")]
    URL(#[from] url::ParseError),

    /// The collection cycle did not finish in time
    #[error("Collection cycle did not complete within {0:?}")]
    Timeout(std::time::Duration),

    /// JSON serialization error
    #[error("Serde JSON error: {0}")]
    Serde(#[from] serde_json::Error),

    /// IO Errors
    #[error("IO error {0}")]
    IO(#[from] std::io::Error),
}

impl Error {
    /// Create a precondition error
    #[must_use]
    pub fn precondition(err: &str) -> Self {
        Self::Precondition(err.to_string())
    }
}

/// Result type
pub type Result<T> = std::result::Result<T, Error>;

/// Builder for a [`Client`]
#[derive(Clone)]
pub struct ClientBuilder {
    reqwest_ca: Vec<reqwest::Certificate>,
    disable_cert_verification: bool,
    timeout: Option<std::time::Duration>,
}

impl ClientBuilder {
    /// Create a new builder instance
    #[must_use]
    pub const fn new() -> Self {
        Self {
            reqwest_ca: Vec::new(),
            disable_cert_verification: false,
            timeout: None,
        }
    }

    /// Add a root certificate for API certificate verification
    pub fn add_root_certificate(mut self, cert: &[u8]) -> Result<Self> {
        let r_ca = reqwest::Certificate::from_pem(cert)?;
        self.reqwest_ca.push(r_ca);
        Ok(self)
    }

    /// Disable certificate verification, clusters ship with self signed
    /// certificates out of the box.
    #[must_use]
    pub fn danger_accept_invalid_certs(self) -> Self {
        Self {
            disable_cert_verification: true,
            ..self
        }
    }

    /// Timeout applied to every single request
    #[must_use]
    pub fn timeout(self, timeout: std::time::Duration) -> Self {
        Self {
            timeout: Some(timeout),
            ..self
        }
    }

    /// Create a client for the management API at `host`, e.g. `https://10.0.0.1:9443`.
    /// The credentials are sent with every request.
    pub fn connect(&self, host: &str, username: &str, password: &str) -> Result<Client> {
        let base_url = url::Url::parse(host)?;
        let client = reqwest::Client::builder().redirect(reqwest::redirect::Policy::none());

        // Add CA certificates
        let client = self
            .reqwest_ca
            .iter()
            .fold(client, |client, ca| client.add_root_certificate(ca.clone()));

        let client = client.danger_accept_invalid_certs(self.disable_cert_verification);

        let client = match self.timeout {
            Some(timeout) => client.timeout(timeout),
            None => client,
        };

        Ok(Client {
            client: client.build()?,
            base_url,
            username: username.to_string(),
            password: password.to_string(),
        })
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// The `Client` is used for all interaction with the cluster management API.
#[derive(Clone)]
pub struct Client {
    base_url: url::Url,
    username: String,
    password: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("base_url", &self.base_url)
            .field("username", &self.username)
            .field("client", &self.client)
            .finish()
    }
}

impl Client {
    /// Create a Client builder
    #[must_use]
    pub const fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Base URL of the management API
    #[must_use]
    pub fn base_url(&self) -> &url::Url {
        &self.base_url
    }

    fn get(
        &self,
        path: &str,
        query_params: Option<&[(&str, &str)]>,
    ) -> Result<reqwest::RequestBuilder> {
        let url = self.base_url.join(path)?;
        tracing::debug!("GET {}", url);

        let mut builder = self
            .client
            .get(url)
            .basic_auth(&self.username, Some(&self.password))
            .header("Accept", "application/json");
        if let Some(qp) = query_params {
            builder = builder.query(qp);
        }
        Ok(builder)
    }

    /// GET a json payload from the REST API. Anything but a 200 is an error.
    pub async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query_params: Option<&[(&str, &str)]>,
    ) -> Result<T> {
        let result = self.get(path, query_params)?.send().await?;

        if result.status() == reqwest::StatusCode::OK {
            let body = result.bytes().await?;
            serde_json::from_slice(&body).map_err(|source| Error::Decode {
                path: path.to_string(),
                source,
            })
        } else {
            Err(Error::UnexpectedStatus {
                status: result.status().as_u16(),
                path: path.to_string(),
            })
        }
    }

    /// GET `path` without following redirects and return the status code.
    pub async fn probe(&self, path: &str) -> Result<reqwest::StatusCode> {
        let result = self.get(path, None)?.send().await?;
        Ok(result.status())
    }
}
