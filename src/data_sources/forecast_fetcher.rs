use async_trait::async_trait;
use log::{error, info, warn};
use std::time::Duration;
use tokio::time::sleep;

use super::call_budget::CallBudget;
use super::forecast_payload::{ForecastPayload, ProviderStatus};
use crate::config::HeatcastConfig;
use crate::error::FetchError;
use crate::region::Region;

/// Transport for a single forecast request, returning the raw body.
#[async_trait]
pub trait ForecastSource: Send + Sync {
    async fn get(&self, provider_key: &str) -> Result<String, FetchError>;
}

pub struct HttpForecastSource {
    client: reqwest::Client,
    url: String,
    api_key: String,
}

impl HttpForecastSource {
    pub fn new(config: &HeatcastConfig) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent("heatcast/0.1")
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            url: config.weather_api_url.clone(),
            api_key: config.api_key.clone(),
        })
    }
}

#[async_trait]
impl ForecastSource for HttpForecastSource {
    async fn get(&self, provider_key: &str) -> Result<String, FetchError> {
        let params = [
            ("id", provider_key),
            ("units", "metric"),
            ("APPID", self.api_key.as_str()),
        ];
        // Error statuses still carry a JSON body with the provider code.
        let response = self.client.get(&self.url).query(&params).send().await?;
        info!("    Response status: {}", response.status());
        Ok(response.text().await?)
    }
}

/// What a fetch produced for one region.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    Success(ForecastPayload),
    /// No usable data for this region right now.
    NotFound,
    /// Credential or quota failure reported by the provider.
    Rejected { code: String, message: String },
    /// Every attempt failed at the network level.
    Exhausted { attempts: u32 },
}

pub struct ForecastFetcher<S> {
    source: S,
    retry_attempts: u32,
    retry_delay: Duration,
}

impl<S: ForecastSource> ForecastFetcher<S> {
    pub fn new(source: S, config: &HeatcastConfig) -> Self {
        Self {
            source,
            retry_attempts: config.retry_attempts,
            retry_delay: config.retry_delay,
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub async fn fetch(&self, budget: &mut CallBudget, region: &Region) -> FetchOutcome {
        budget.acquire().await;
        info!("  Fetching forecast for region {} (key {})", region.id, region.provider_key);

        let body = match self.get_with_retry(&region.provider_key).await {
            Some(body) => body,
            None => {
                error!(
                    "Server is not responding after {} attempts",
                    self.retry_attempts
                );
                return FetchOutcome::Exhausted {
                    attempts: self.retry_attempts,
                };
            }
        };

        let payload = match ForecastPayload::parse(&body) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("  Region {}: {}", region.id, e);
                return FetchOutcome::NotFound;
            }
        };

        match payload.status.clone() {
            ProviderStatus::Success if payload.samples.is_empty() => {
                warn!("  Region {}: provider returned no samples", region.id);
                FetchOutcome::NotFound
            }
            ProviderStatus::Success => FetchOutcome::Success(payload),
            ProviderStatus::NotFound => FetchOutcome::NotFound,
            status if status.is_fatal() => FetchOutcome::Rejected {
                code: payload.code,
                message: payload.message,
            },
            _ => {
                warn!(
                    "  Region {}: unexpected provider code {} ({})",
                    region.id, payload.code, payload.message
                );
                FetchOutcome::NotFound
            }
        }
    }

    async fn get_with_retry(&self, provider_key: &str) -> Option<String> {
        for attempt in 1..=self.retry_attempts {
            match self.source.get(provider_key).await {
                Ok(body) => return Some(body),
                Err(e) => {
                    warn!(
                        "Attempt {}/{} failed: {}",
                        attempt, self.retry_attempts, e
                    );
                    if attempt < self.retry_attempts {
                        info!(
                            "Seems like server is not responding. Will try again in {} seconds...",
                            self.retry_delay.as_secs()
                        );
                        sleep(self.retry_delay).await;
                    }
                }
            }
        }
        None
    }
}
