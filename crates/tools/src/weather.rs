//! Weather tool backed by a REST weather service.
//!
//! [`GetWeather`] takes a Chinese administrative division code (`adcode`)
//! and returns live conditions. The data comes from a [`WeatherService`];
//! [`AmapWeatherService`] is the production implementation.

use async_trait::async_trait;
use personax_core::error::{ResourceError, ToolError};
use personax_core::schema::{Param, ParamType, Property, ToolSpec};
use personax_core::tool::{Tool, ToolArgs, ToolOutput, decode_args};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Live weather for one location, as reported by a service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeatherInfo {
    pub address: String,
    pub condition: String,
    pub temperature: String,
    pub winddirection: String,
    pub windpower: String,
    pub humidity: String,
    pub reporttime: String,
}

/// A source of live weather data.
#[async_trait]
pub trait WeatherService: Send + Sync {
    async fn fetch(&self, adcode: &str) -> Result<WeatherInfo, ResourceError>;
}

/// What the tool hands back to the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Weather {
    pub location: String,
    pub temperature: String,
    pub condition: String,
    pub humidity: String,
    pub windpower: String,
}

#[derive(Deserialize)]
struct GetWeatherArgs {
    adcode: String,
}

/// Current weather by administrative code.
pub struct GetWeather {
    spec: ToolSpec,
    service: Arc<dyn WeatherService>,
}

impl GetWeather {
    pub fn new(service: Arc<dyn WeatherService>) -> Result<Self, ToolError> {
        let spec = ToolSpec::builder(
            "Get the current weather information for a given location by its administrative code.",
        )
        .param(
            Param::required("adcode", ParamType::of::<String>()).with(
                Property::new()
                    .description("The administrative code of the location to get the weather for.")
                    .examples(["110000"]),
            ),
        )
        .build_for::<Self>()?;
        Ok(Self { spec, service })
    }
}

#[async_trait]
impl Tool for GetWeather {
    fn spec(&self) -> &ToolSpec {
        &self.spec
    }

    async fn invoke(&self, args: ToolArgs) -> Result<ToolOutput, ToolError> {
        let args: GetWeatherArgs = decode_args(self.name(), args)?;

        let info = self.service.fetch(&args.adcode).await.map_err(|e| {
            ToolError::failed(
                self.name(),
                format!("Failed to get weather info for adcode {}: {e}", args.adcode),
            )
        })?;

        let weather = Weather {
            location: info.address,
            temperature: info.temperature,
            condition: info.condition,
            humidity: info.humidity,
            windpower: info.windpower,
        };
        ToolOutput::json(&weather).map_err(|e| ToolError::Internal {
            tool_name: self.name().to_string(),
            reason: e.to_string(),
        })
    }
}

// --- Amap (Gaode) weather service ---

const AMAP_BASE_URL: &str = "https://restapi.amap.com/v3/weather";

/// Retry policy for REST calls: a fixed wait between attempts.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub wait: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            wait: Duration::from_secs(2),
        }
    }
}

/// Live weather from the Amap web-service API.
pub struct AmapWeatherService {
    key: String,
    base_url: String,
    retry: RetryPolicy,
    client: reqwest::Client,
}

impl AmapWeatherService {
    pub fn new(key: impl Into<String>, timeout: Duration, retry: RetryPolicy) -> Result<Self, ResourceError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ResourceError::Request {
                endpoint: AMAP_BASE_URL.into(),
                reason: format!("failed to create HTTP client: {e}"),
            })?;
        Ok(Self {
            key: key.into(),
            base_url: AMAP_BASE_URL.into(),
            retry,
            client,
        })
    }

    pub fn from_config(config: &personax_config::AmapWeatherConfig) -> Result<Option<Self>, ResourceError> {
        let Some(key) = &config.key else {
            return Ok(None);
        };
        Self::new(
            key.clone(),
            Duration::from_secs(config.timeout_secs),
            RetryPolicy {
                max_retries: config.max_retries,
                wait: Duration::from_millis(config.retry_wait_ms),
            },
        )
        .map(Some)
    }

    /// Point at a different host (proxies, tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    async fn request(&self, adcode: &str) -> Result<AmapResponse, ResourceError> {
        let endpoint = format!("{}/weatherInfo", self.base_url);
        let mut attempt = 0;

        loop {
            let result = self.request_once(&endpoint, adcode).await;
            match result {
                Ok(body) => return Ok(body),
                Err(e) if attempt < self.retry.max_retries && is_transient(&e) => {
                    attempt += 1;
                    warn!(
                        endpoint = %endpoint,
                        attempt,
                        max_retries = self.retry.max_retries,
                        error = %e,
                        "Weather request failed, retrying"
                    );
                    tokio::time::sleep(self.retry.wait).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn request_once(&self, endpoint: &str, adcode: &str) -> Result<AmapResponse, ResourceError> {
        let response = self
            .client
            .get(endpoint)
            .query(&[
                ("key", self.key.as_str()),
                ("city", adcode),
                ("extensions", "base"),
                ("output", "JSON"),
            ])
            .send()
            .await
            .map_err(|e| ResourceError::Request {
                endpoint: endpoint.to_string(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ResourceError::Status {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
            });
        }

        response.json().await.map_err(|e| ResourceError::Request {
            endpoint: endpoint.to_string(),
            reason: format!("invalid response body: {e}"),
        })
    }
}

fn is_transient(err: &ResourceError) -> bool {
    match err {
        ResourceError::Request { .. } => true,
        ResourceError::Status { status, .. } => *status == 429 || *status >= 500,
        ResourceError::Rejected(_) | ResourceError::NoData(_) => false,
    }
}

#[async_trait]
impl WeatherService for AmapWeatherService {
    async fn fetch(&self, adcode: &str) -> Result<WeatherInfo, ResourceError> {
        let started = Instant::now();
        let response = self.request(adcode).await?;
        let info = response.into_weather()?;
        debug!(
            adcode,
            address = %info.address,
            temperature = %info.temperature,
            condition = %info.condition,
            duration_ms = started.elapsed().as_millis() as u64,
            "Fetched weather"
        );
        Ok(info)
    }
}

#[derive(Debug, Deserialize)]
struct AmapResponse {
    status: String,
    #[serde(default)]
    info: Option<String>,
    #[serde(default)]
    infocode: Option<String>,
    #[serde(default)]
    lives: Vec<AmapLive>,
}

#[derive(Debug, Deserialize)]
struct AmapLive {
    #[serde(default)]
    province: String,
    #[serde(default)]
    city: String,
    #[serde(default)]
    weather: String,
    #[serde(default)]
    temperature: String,
    #[serde(default)]
    winddirection: String,
    #[serde(default)]
    windpower: String,
    #[serde(default)]
    humidity: String,
    #[serde(default)]
    reporttime: String,
}

impl AmapResponse {
    /// Status "1" with infocode "10000" is success; anything else is a
    /// rejection. A success without live data is `NoData`.
    fn into_weather(self) -> Result<WeatherInfo, ResourceError> {
        if self.status != "1" || self.infocode.as_deref() != Some("10000") {
            let info = self.info.unwrap_or_else(|| "unknown error".into());
            warn!(info = %info, "Amap weather API error");
            return Err(ResourceError::Rejected(format!("Failed to fetch weather data: {info}")));
        }
        let live = self
            .lives
            .into_iter()
            .next()
            .ok_or_else(|| ResourceError::NoData("No live weather data available".into()))?;

        Ok(WeatherInfo {
            address: format!("{} {}", live.province, live.city),
            condition: live.weather,
            temperature: live.temperature,
            winddirection: live.winddirection,
            windpower: live.windpower,
            humidity: live.humidity,
            reporttime: live.reporttime,
        })
    }
}
