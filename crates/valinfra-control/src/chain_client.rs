//! HTTP client for chain REST (LCD) endpoints.
//!
//! This module queries the Cosmos SDK staking module for the voting power,
//! self bond, jail state and commission of a validator.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use valinfra_store::{ChainParams, Validator};

use crate::error::{ControlError, Result};

/// Trait for chain queries.
///
/// This trait abstracts the chain client interface, allowing for
/// mock implementations in tests.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Fetch the current staking state of `validator` on the chain described by `chain`.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::Chain` if the endpoint is unreachable or answers
    /// with an unexpected shape.
    async fn validator_info(&self, chain: &ChainParams, validator: &Validator) -> Result<ValidatorInfo>;
}

/// Staking state of a validator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidatorInfo {
    /// Operator address.
    pub operator_address: String,
    /// Bonded tokens, in whole denomination units.
    pub voting_power: f64,
    /// Share of the chain's bonded tokens, in percent.
    pub voting_percentage: f64,
    /// Operator's own delegation, in whole denomination units, if known.
    pub self_bond: Option<f64>,
    /// Staking denomination.
    pub denom: String,
    /// Whether the validator is jailed.
    pub jailed: bool,
    /// Commission rate, in percent.
    pub commission_rate: f64,
    /// Maximum commission rate, in percent.
    pub commission_max_rate: f64,
    /// Maximum daily commission change, in percent.
    pub commission_max_change_rate: f64,
}

// Wire shapes of the staking REST API.

#[derive(Deserialize)]
struct ValidatorResponse {
    validator: ValidatorBody,
}

#[derive(Deserialize)]
struct ValidatorBody {
    operator_address: String,
    tokens: String,
    #[serde(default)]
    jailed: bool,
    commission: CommissionBody,
}

#[derive(Deserialize)]
struct CommissionBody {
    commission_rates: CommissionRates,
}

#[derive(Deserialize)]
struct CommissionRates {
    rate: String,
    max_rate: String,
    max_change_rate: String,
}

#[derive(Deserialize)]
struct DelegationsResponse {
    #[serde(default)]
    delegation_responses: Vec<DelegationResponse>,
}

#[derive(Deserialize)]
struct DelegationResponse {
    delegation: Delegation,
    balance: Coin,
}

#[derive(Deserialize)]
struct Delegation {
    delegator_address: String,
}

#[derive(Deserialize)]
struct Coin {
    amount: String,
}

#[derive(Deserialize)]
struct PoolResponse {
    pool: Pool,
}

#[derive(Deserialize)]
struct Pool {
    bonded_tokens: String,
}

/// `reqwest`-backed chain client.
#[derive(Debug, Clone)]
pub struct HttpChainClient {
    client: reqwest::Client,
}

impl HttpChainClient {
    /// Create a client with the given request timeout.
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(5))
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Falling back to default HTTP client");
                reqwest::Client::new()
            });
        Self { client }
    }

    /// Create a client around an existing `reqwest::Client`.
    #[must_use]
    pub const fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn get<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ControlError::Chain(format!("GET {url}: {e}")))?;

        if !response.status().is_success() {
            return Err(ControlError::Chain(format!(
                "GET {url}: status {}",
                response.status()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| ControlError::Chain(format!("GET {url}: {e}")))
    }
}

#[async_trait]
impl ChainClient for HttpChainClient {
    async fn validator_info(&self, chain: &ChainParams, validator: &Validator) -> Result<ValidatorInfo> {
        let base = chain.rest_url.trim_end_matches('/');
        let address = &validator.validator_address;

        let body = self
            .get::<ValidatorResponse>(&format!("{base}/cosmos/staking/v1beta1/validators/{address}"))
            .await?
            .validator;
        let delegations = self
            .get::<DelegationsResponse>(&format!(
                "{base}/cosmos/staking/v1beta1/validators/{address}/delegations"
            ))
            .await?
            .delegation_responses;
        let pool = self
            .get::<PoolResponse>(&format!("{base}/cosmos/staking/v1beta1/pool"))
            .await?
            .pool;

        let scale = 10f64.powi(i32::try_from(chain.decimals).unwrap_or(i32::MAX));
        let tokens = parse_amount(&body.tokens, "tokens")?;
        let bonded = parse_amount(&pool.bonded_tokens, "bonded_tokens")?;

        let self_bond = match &validator.account_address {
            Some(account) => delegations
                .iter()
                .find(|d| &d.delegation.delegator_address == account)
                .map(|d| parse_amount(&d.balance.amount, "balance.amount"))
                .transpose()?
                .map(|amount| amount / scale),
            None => None,
        };

        let rates = &body.commission.commission_rates;
        Ok(ValidatorInfo {
            operator_address: body.operator_address,
            voting_power: tokens / scale,
            voting_percentage: if bonded > 0.0 { tokens / bonded * 100.0 } else { 0.0 },
            self_bond,
            denom: chain.denom.clone(),
            jailed: body.jailed,
            commission_rate: parse_amount(&rates.rate, "commission.rate")? * 100.0,
            commission_max_rate: parse_amount(&rates.max_rate, "commission.max_rate")? * 100.0,
            commission_max_change_rate: parse_amount(
                &rates.max_change_rate,
                "commission.max_change_rate",
            )? * 100.0,
        })
    }
}

/// Parse a decimal string amount as sent by the staking API.
fn parse_amount(value: &str, field: &str) -> Result<f64> {
    value
        .parse::<f64>()
        .map_err(|_| ControlError::Chain(format!("{field} is not a number: {value:?}")))
}

/// Mock implementations for testing.
#[cfg(any(test, feature = "test-utils"))]
pub mod mock {
    use super::{async_trait, ChainClient, ChainParams, ControlError, Result, Validator, ValidatorInfo};
    use parking_lot::Mutex;

    /// A chain client that returns a canned answer.
    #[derive(Default)]
    pub struct MockChainClient {
        info: Mutex<Option<ValidatorInfo>>,
    }

    impl MockChainClient {
        /// Answer every query with `info`.
        #[must_use]
        pub fn returning(info: ValidatorInfo) -> Self {
            Self {
                info: Mutex::new(Some(info)),
            }
        }
    }

    #[async_trait]
    impl ChainClient for MockChainClient {
        async fn validator_info(&self, _: &ChainParams, _: &Validator) -> Result<ValidatorInfo> {
            self.info
                .lock()
                .clone()
                .ok_or_else(|| ControlError::Chain("mock chain has no answer".to_string()))
        }
    }
}
