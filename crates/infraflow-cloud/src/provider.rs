//! Cloud provider trait definition

use crate::error::{CloudError, Result};
use crate::state::ResourceState;
use async_trait::async_trait;
use infraflow_core::ResourceKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// Outputs generated by the provider for one resource
pub type ResourceOutputs = BTreeMap<String, serde_json::Value>;

/// Cloud provider abstraction trait
///
/// The provider owns the real control plane; the engine only hands it fully
/// resolved inputs and records what it returns.
#[async_trait]
pub trait CloudProvider: Send + Sync {
    /// Returns the provider name (e.g., "local")
    fn name(&self) -> &str;

    /// Returns the provider display name for UI
    fn display_name(&self) -> &str;

    /// Check if the provider is properly configured and authenticated
    async fn check_auth(&self) -> Result<AuthStatus>;

    /// Create a resource and return its outputs
    async fn create(&self, request: &ResourceRequest) -> Result<ResourceOutputs>;

    /// Update a resource in place and return its (possibly new) outputs
    async fn update(
        &self,
        request: &ResourceRequest,
        current: &ResourceState,
    ) -> Result<ResourceOutputs>;

    /// Delete a resource
    async fn delete(&self, current: &ResourceState) -> Result<()>;
}

/// Authentication status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthStatus {
    /// Whether authentication is valid
    pub authenticated: bool,

    /// Account/user information if available
    pub account_info: Option<String>,

    /// Error message if not authenticated
    pub error: Option<String>,
}

impl AuthStatus {
    pub fn ok(account_info: impl Into<String>) -> Self {
        Self {
            authenticated: true,
            account_info: Some(account_info.into()),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            authenticated: false,
            account_info: None,
            error: Some(error.into()),
        }
    }
}

/// A resource with every reference resolved, ready for the provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceRequest {
    /// Logical name in the stack
    pub name: String,

    /// Resource kind
    pub kind: ResourceKind,

    /// Resolved property values (a JSON object)
    pub inputs: serde_json::Value,
}

impl ResourceRequest {
    pub fn new(name: impl Into<String>, kind: ResourceKind, inputs: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            kind,
            inputs,
        }
    }

    /// Get an input value as a specific type
    pub fn get_input<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.inputs
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// String input, if present
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.inputs.get(key).and_then(|v| v.as_str())
    }

    /// Name of the resource at the provider: the `name` input, or the logical name
    pub fn provider_name(&self) -> &str {
        self.get_str("name").unwrap_or(&self.name)
    }
}

/// Retry configuration for provider operations
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, the first one included
    pub max_attempts: u32,

    /// Initial delay between retries
    pub initial_delay: Duration,

    /// Maximum delay between retries
    pub max_delay: Duration,

    /// Backoff multiplier
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// No retries at all
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay before retry number `attempt` (0-based), exponential and capped
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = self.backoff_multiplier.powi(attempt as i32);
        Duration::try_from_secs_f64(self.initial_delay.as_secs_f64() * factor)
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }
}

/// Run a provider operation, retrying errors flagged retryable
///
/// Non-retryable errors are returned on the first occurrence.
pub async fn with_retry<T, F, Fut>(config: &RetryConfig, operation: &str, mut f: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        match f().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt + 1 < max_attempts => {
                let delay = config.delay_for_attempt(attempt);
                tracing::warn!(
                    operation,
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Retrying provider operation"
                );
                sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Shorthand for a provider-side failure on `request`
pub fn provider_error(request: &ResourceRequest, message: impl Into<String>) -> CloudError {
    CloudError::provider(request.name.clone(), message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_retry(max_attempts: u32) -> RetryConfig {
        RetryConfig {
            max_attempts,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            backoff_multiplier: 2.0,
        }
    }

    #[test]
    fn test_delay_calculation() {
        let config = RetryConfig {
            max_attempts: 5,
            initial_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(10000),
            backoff_multiplier: 2.0,
        };

        assert_eq!(config.delay_for_attempt(0), Duration::from_millis(1000));
        assert_eq!(config.delay_for_attempt(1), Duration::from_millis(2000));
        assert_eq!(config.delay_for_attempt(2), Duration::from_millis(4000));
        assert_eq!(config.delay_for_attempt(3), Duration::from_millis(8000));
        assert_eq!(config.delay_for_attempt(4), Duration::from_millis(10000)); // capped at max
    }

    #[tokio::test]
    async fn test_retry_until_success() {
        let calls = AtomicU32::new(0);
        let result = with_retry(&fast_retry(3), "create", || async {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(CloudError::Timeout("slow".into()))
            } else {
                Ok(42)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_no_retry_on_provider_error() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = with_retry(&fast_retry(5), "create", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(CloudError::provider("ip", "InvalidSku"))
        })
        .await;

        assert!(matches!(result, Err(CloudError::Provider { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retry_gives_up() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = with_retry(&fast_retry(2), "delete", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(CloudError::Throttled {
                resource: "rg".into(),
                message: "TooManyRequests".into(),
            })
        })
        .await;

        assert!(result.unwrap_err().is_retryable());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_success_needs_one_attempt() {
        let calls = AtomicU32::new(0);
        let result = tokio_test::block_on(with_retry(&RetryConfig::default(), "check", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok("done")
        }));

        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_request_inputs() {
        let request = ResourceRequest::new(
            "gatewaypublicip",
            ResourceKind::PublicIp,
            json!({"name": "gatewaypublicip", "sku": "Standard", "idle_timeout": 4}),
        );

        assert_eq!(request.get_str("sku"), Some("Standard"));
        assert_eq!(request.get_input::<u32>("idle_timeout"), Some(4));
        assert_eq!(request.provider_name(), "gatewaypublicip");

        let unnamed = ResourceRequest::new("rg", ResourceKind::ResourceGroup, json!({}));
        assert_eq!(unnamed.provider_name(), "rg");
    }
}
