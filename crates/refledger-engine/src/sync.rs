//! Post-commit notification of the external payment provider.
//!
//! The store is the source of truth; provider sync is fire-after-commit.
//! A failed notification is logged and retried by ops tooling, never rolled
//! back into ledger state.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use refledger_core::{Payout, Reward};

/// Error type for provider sync operations.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The provider API returned an error.
    #[error("provider API error: {status} - {error}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Error message.
        error: String,
    },
}

/// Notifications the engine sends to the external provider.
#[async_trait]
pub trait ProviderSync: Send + Sync {
    /// A reward matured into the owner's balance.
    async fn reward_released(&self, reward: &Reward) -> Result<(), SyncError>;

    /// A payout was settled.
    async fn payout_settled(&self, payout: &Payout) -> Result<(), SyncError>;
}

/// A sync that does nothing. For tests and provider-less deployments.
pub struct NoopSync;

#[async_trait]
impl ProviderSync for NoopSync {
    async fn reward_released(&self, _reward: &Reward) -> Result<(), SyncError> {
        Ok(())
    }

    async fn payout_settled(&self, _payout: &Payout) -> Result<(), SyncError> {
        Ok(())
    }
}

#[derive(Serialize)]
struct ReleaseNotification<'a> {
    reward_id: String,
    user_id: String,
    amount_cents: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    currency: Option<&'a str>,
    level: u8,
}

#[derive(Serialize)]
struct SettlementNotification {
    payout_id: String,
    user_id: String,
    amount_cents: i64,
    currency: String,
}

#[derive(Deserialize)]
struct ProviderErrorResponse {
    status: u16,
    error: String,
}

/// HTTP provider sync client.
#[derive(Debug, Clone)]
pub struct HttpProviderSync {
    client: Client,
    base_url: String,
    api_key: String,
}

impl HttpProviderSync {
    /// Create a new provider sync client.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client cannot be built (should not happen with
    /// default settings).
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }

    async fn post<T: Serialize>(&self, path: &str, body: &T) -> Result<(), SyncError> {
        let url = format!("{}{path}", self.base_url);
        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        match response.json::<ProviderErrorResponse>().await {
            Ok(body) => Err(SyncError::Api {
                status: body.status,
                error: body.error,
            }),
            Err(_) => Err(SyncError::Api {
                status: status.as_u16(),
                error: format!("HTTP {status}"),
            }),
        }
    }
}

#[async_trait]
impl ProviderSync for HttpProviderSync {
    async fn reward_released(&self, reward: &Reward) -> Result<(), SyncError> {
        self.post(
            "/api/v1/referral_rewards",
            &ReleaseNotification {
                reward_id: reward.id.to_string(),
                user_id: reward.user_id.to_string(),
                amount_cents: reward.value.amount_cents(),
                currency: reward.value.currency(),
                level: reward.level,
            },
        )
        .await
    }

    async fn payout_settled(&self, payout: &Payout) -> Result<(), SyncError> {
        self.post(
            &format!("/api/v1/payouts/{}/settle", payout.id),
            &SettlementNotification {
                payout_id: payout.id.to_string(),
                user_id: payout.user_id.to_string(),
                amount_cents: payout.total_amount_cents,
                currency: payout.currency.clone(),
            },
        )
        .await
    }
}
