pub mod call_budget;
pub mod forecast_fetcher;
pub mod forecast_payload;

pub use call_budget::CallBudget;
pub use forecast_fetcher::{FetchOutcome, ForecastFetcher, ForecastSource, HttpForecastSource};
pub use forecast_payload::{ForecastPayload, ForecastSample};
