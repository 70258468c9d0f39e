use chrono::{DateTime, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::error::FetchError;

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Serialize, Deserialize)]
struct ProviderResponse {
    #[serde(default)]
    cod: serde_json::Value,
    #[serde(default)]
    message: serde_json::Value,
    #[serde(default)]
    list: Vec<ProviderEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ProviderEntry {
    #[serde(default)]
    dt: Option<i64>,
    #[serde(default)]
    dt_txt: Option<String>,
    main: MainReadings,
}

#[derive(Debug, Serialize, Deserialize)]
struct MainReadings {
    temp: f64,
}

/// Status code reported inside the provider's JSON body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderStatus {
    Success,
    NotFound,
    Unauthorized,
    RateLimited,
    Other(String),
}

impl ProviderStatus {
    pub fn from_code(code: &str) -> Self {
        match code {
            "200" => Self::Success,
            "404" => Self::NotFound,
            "401" => Self::Unauthorized,
            "429" => Self::RateLimited,
            other => Self::Other(other.to_string()),
        }
    }

    /// Quota or credential failures stop the whole run.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Unauthorized | Self::RateLimited)
    }
}

/// One three-hour forecast reading, timestamped in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForecastSample {
    pub utc: NaiveDateTime,
    pub temp: f64,
}

/// Decoded provider answer: status code, message and samples in ascending time.
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastPayload {
    pub status: ProviderStatus,
    pub code: String,
    pub message: String,
    pub samples: Vec<ForecastSample>,
}

fn value_to_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

impl ForecastPayload {
    /// Decodes a provider body. The provider sends `cod` as either a string
    /// or a number depending on the endpoint, so both are accepted. A body
    /// without any code is treated as "no data".
    pub fn parse(body: &str) -> Result<Self, FetchError> {
        if body.trim().is_empty() {
            return Ok(Self::empty());
        }
        let response: ProviderResponse = serde_json::from_str(body)?;
        let code = value_to_string(&response.cod);
        if code.is_empty() {
            return Ok(Self::empty());
        }

        let mut samples: Vec<ForecastSample> = response
            .list
            .iter()
            .filter_map(|entry| {
                let utc = entry
                    .dt_txt
                    .as_deref()
                    .and_then(|txt| NaiveDateTime::parse_from_str(txt, TIMESTAMP_FORMAT).ok())
                    .or_else(|| {
                        entry
                            .dt
                            .and_then(|secs| DateTime::from_timestamp(secs, 0))
                            .map(|dt| dt.naive_utc())
                    })?;
                Some(ForecastSample {
                    utc,
                    temp: entry.main.temp,
                })
            })
            .collect();
        samples.sort_by_key(|s| s.utc);

        Ok(Self {
            status: ProviderStatus::from_code(&code),
            code,
            message: value_to_string(&response.message),
            samples,
        })
    }

    fn empty() -> Self {
        Self {
            status: ProviderStatus::NotFound,
            code: String::new(),
            message: "empty response".to_string(),
            samples: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_successful_forecast() {
        let body = r#"{
            "cod": "200", "message": 0, "cnt": 2,
            "list": [
                {"dt": 1539961200, "main": {"temp": 4.5}, "dt_txt": "2018-10-19 15:00:00"},
                {"dt": 1539950400, "main": {"temp": 6.25}, "dt_txt": "2018-10-19 12:00:00"}
            ]
        }"#;
        let payload = ForecastPayload::parse(body).unwrap();
        assert_eq!(payload.status, ProviderStatus::Success);
        assert_eq!(payload.samples.len(), 2);
        assert_eq!(payload.samples[0].temp, 6.25);
        assert_eq!(payload.samples[0].utc.to_string(), "2018-10-19 12:00:00");
    }

    #[test]
    fn numeric_codes_are_classified() {
        let payload =
            ForecastPayload::parse(r#"{"cod": 401, "message": "Invalid API key"}"#).unwrap();
        assert_eq!(payload.status, ProviderStatus::Unauthorized);
        assert_eq!(payload.code, "401");
        assert_eq!(payload.message, "Invalid API key");
        assert!(payload.status.is_fatal());

        let payload =
            ForecastPayload::parse(r#"{"cod": "404", "message": "city not found"}"#).unwrap();
        assert_eq!(payload.status, ProviderStatus::NotFound);
        assert!(!payload.status.is_fatal());
    }

    #[test]
    fn empty_bodies_mean_no_data() {
        assert_eq!(ForecastPayload::parse("").unwrap().status, ProviderStatus::NotFound);
        assert_eq!(ForecastPayload::parse("{}").unwrap().status, ProviderStatus::NotFound);
    }

    #[test]
    fn falls_back_to_unix_timestamp() {
        let body = r#"{"cod": "200", "list": [{"dt": 1539950400, "main": {"temp": 1.0}}]}"#;
        let payload = ForecastPayload::parse(body).unwrap();
        assert_eq!(payload.samples[0].utc.to_string(), "2018-10-19 12:00:00");
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(ForecastPayload::parse("<html>").is_err());
    }
}
