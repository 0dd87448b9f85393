use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_sdk_dynamodb::Client;
use aws_types::sdk_config::{RetryConfig, TimeoutConfig};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

use super::DynamoDbTransport;

/// Endpoint used when `AWS_PROFILE=localstack`.
pub const LOCALSTACK_ENDPOINT: &str = "http://127.0.0.1:4566";

/// Environment variable overriding the store endpoint.
pub const ENDPOINT_URL_ENV: &str = "DYNAMO_FIELDS_ENDPOINT_URL";

/// Timeouts, retries and endpoint used to build clients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSettings {
    /// Connect timeout
    pub connect_timeout: Duration,
    /// Read timeout
    pub read_timeout: Duration,
    /// Whole operation timeout, retries included
    pub operation_timeout: Duration,
    /// Adaptive retry attempts
    pub max_attempts: u32,
    /// First retry backoff
    pub initial_backoff: Duration,
    /// Custom endpoint, e.g. LocalStack
    pub endpoint_url: Option<String>,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(3),
            read_timeout: Duration::from_secs(20),
            operation_timeout: Duration::from_secs(60),
            max_attempts: 3,
            initial_backoff: Duration::from_secs(1),
            endpoint_url: None,
        }
    }
}

impl ClientSettings {
    /// Defaults, with the endpoint taken from the environment.
    ///
    /// `AWS_PROFILE=localstack` selects [`LOCALSTACK_ENDPOINT`];
    /// [`ENDPOINT_URL_ENV`] wins over it when set and non-empty.
    pub fn from_env() -> Self {
        let mut settings = Self::default();

        if std::env::var("AWS_PROFILE").unwrap_or_default() == "localstack" {
            settings.endpoint_url = Some(LOCALSTACK_ENDPOINT.to_string());
        }

        if let Ok(url) = std::env::var(ENDPOINT_URL_ENV) {
            if !url.trim().is_empty() {
                settings.endpoint_url = Some(url);
            }
        }

        settings
    }

    /// Load an SDK config for `region` with these settings.
    pub async fn load(&self, region: &str) -> SdkConfig {
        let timeout_config = TimeoutConfig::builder()
            .connect_timeout(self.connect_timeout)
            .read_timeout(self.read_timeout)
            .operation_timeout(self.operation_timeout)
            .build();

        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region.to_string()))
            .retry_config(
                RetryConfig::adaptive()
                    .with_max_attempts(self.max_attempts)
                    .with_initial_backoff(self.initial_backoff),
            )
            .timeout_config(timeout_config);

        if let Some(url) = &self.endpoint_url {
            loader = loader.endpoint_url(url);
        }

        loader.load().await
    }
}

/// Clients shared across tables, one per region.
///
/// Owned by the application and handed to whatever builds tables; nothing
/// in the crate keeps a hidden global client.
#[derive(Debug, Default)]
pub struct ClientPool {
    settings: ClientSettings,
    clients: Mutex<HashMap<String, Client>>,
}

impl ClientPool {
    /// Empty pool building clients with `settings`.
    pub fn new(settings: ClientSettings) -> Self {
        Self {
            settings,
            clients: Mutex::new(HashMap::new()),
        }
    }

    /// Settings used for new clients
    pub fn settings(&self) -> &ClientSettings {
        &self.settings
    }

    /// Client for `region`, built on first use.
    pub async fn client(&self, region: &str) -> Client {
        let mut clients = self.clients.lock().await;

        if let Some(client) = clients.get(region) {
            return client.clone();
        }

        debug!(region, "building dynamodb client");
        let config = self.settings.load(region).await;
        let client = Client::new(&config);
        let _ = clients.insert(region.to_string(), client.clone());
        client
    }

    /// Register a preconfigured client for `region`, replacing any existing one.
    pub async fn insert(&self, region: &str, client: Client) {
        let _ = self.clients.lock().await.insert(region.to_string(), client);
    }

    /// Transport over the client for `region`.
    pub async fn transport(&self, region: &str) -> DynamoDbTransport {
        DynamoDbTransport::new(self.client(region).await)
    }

    /// Number of regions with a client
    pub async fn len(&self) -> usize {
        self.clients.lock().await.len()
    }

    /// Whether no client was built yet
    pub async fn is_empty(&self) -> bool {
        self.clients.lock().await.is_empty()
    }
}
