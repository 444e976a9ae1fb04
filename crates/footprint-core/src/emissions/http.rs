//! Client for the backend's emissions endpoint.
//!
//! The backend proxies the third-party estimators (Open Food Facts,
//! ImpactCO2) and does the unit conversion; this client only posts the
//! request and reads back `{"emissions": number | null}`.

use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use url::Url;

use super::{round_kg, EmissionRequest, EmissionsCalculator};
use crate::error::{CalculatorError, CoreError};

#[derive(Debug, Deserialize)]
struct EmissionResponse {
    emissions: Option<f64>,
}

/// Blocking facade over an async `reqwest` client.
///
/// Owns a current-thread tokio runtime, so it must not be called from inside
/// another runtime.
pub struct HttpCalculator {
    client: Client,
    endpoint: Url,
    runtime: tokio::runtime::Runtime,
}

impl HttpCalculator {
    /// # Errors
    /// Returns an error if `base_url` is not a valid URL or the client or
    /// runtime cannot be built.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, CoreError> {
        let endpoint = endpoint_url(base_url)?;
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(CalculatorError::from)?;
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        Ok(Self {
            client,
            endpoint,
            runtime,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

/// `{base_url}/emissions`, tolerating a missing trailing slash on the base.
fn endpoint_url(base_url: &str) -> Result<Url, CoreError> {
    let mut base = Url::parse(base_url).map_err(|e| {
        CoreError::Config(crate::error::ConfigError::InvalidValue {
            key: "calculator.base_url".into(),
            message: e.to_string(),
        })
    })?;
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    base.join("emissions").map_err(|e| {
        CoreError::Config(crate::error::ConfigError::InvalidValue {
            key: "calculator.base_url".into(),
            message: e.to_string(),
        })
    })
}

impl EmissionsCalculator for HttpCalculator {
    fn estimate(&self, request: &EmissionRequest) -> Result<Option<f64>, CalculatorError> {
        let response = self.runtime.block_on(async {
            let resp = self
                .client
                .post(self.endpoint.clone())
                .json(request)
                .send()
                .await?;

            let status = resp.status();
            if !status.is_success() {
                let body = resp.text().await.unwrap_or_default();
                return Err(CalculatorError::Status {
                    status: status.as_u16(),
                    body,
                });
            }

            let bytes = resp.bytes().await?;
            serde_json::from_slice::<EmissionResponse>(&bytes)
                .map_err(|e| CalculatorError::Decode(e.to_string()))
        })?;

        tracing::debug!(
            category = %request.category,
            action_type = %request.action_type,
            emissions = ?response.emissions,
            "priced entry via backend"
        );
        Ok(response.emissions.map(round_kg))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::ActionType;
    use crate::recurrence::RulePayload;

    fn request() -> EmissionRequest {
        EmissionRequest::new(
            ActionType::Usage,
            Some("car-thermal".into()),
            RulePayload::Transport { distance_km: 42.0 },
        )
    }

    #[test]
    fn endpoint_joins_with_or_without_trailing_slash() {
        assert_eq!(
            endpoint_url("http://localhost:3000/api").unwrap().as_str(),
            "http://localhost:3000/api/emissions"
        );
        assert_eq!(
            endpoint_url("http://localhost:3000/api/").unwrap().as_str(),
            "http://localhost:3000/api/emissions"
        );
        assert!(endpoint_url("not a url").is_err());
    }

    #[test]
    fn posts_request_and_reads_emissions() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("POST", "/api/emissions")
            .match_body(mockito::Matcher::PartialJson(serde_json::json!({
                "category": "transport",
                "type": "usage",
                "code": "car-thermal",
                "params": { "distance_km": 42.0 }
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"emissions": 9.15624}"#)
            .create();

        let calculator =
            HttpCalculator::new(&format!("{}/api", server.url()), Duration::from_secs(5)).unwrap();
        let kg = calculator.estimate(&request()).unwrap();

        mock.assert();
        assert_eq!(kg, Some(9.156));
    }

    #[test]
    fn null_emissions_are_passed_through() {
        let mut server = mockito::Server::new();
        let _mock = server
            .mock("POST", "/emissions")
            .with_status(200)
            .with_body(r#"{"emissions": null}"#)
            .create();

        let calculator = HttpCalculator::new(&server.url(), Duration::from_secs(5)).unwrap();
        assert_eq!(calculator.estimate(&request()).unwrap(), None);
    }

    #[test]
    fn server_error_maps_to_status() {
        let mut server = mockito::Server::new();
        let _mock = server
            .mock("POST", "/emissions")
            .with_status(502)
            .with_body("upstream unavailable")
            .create();

        let calculator = HttpCalculator::new(&server.url(), Duration::from_secs(5)).unwrap();
        let err = calculator.estimate(&request()).unwrap_err();
        assert!(matches!(err, CalculatorError::Status { status: 502, .. }));
    }

    #[test]
    fn malformed_body_maps_to_decode() {
        let mut server = mockito::Server::new();
        let _mock = server
            .mock("POST", "/emissions")
            .with_status(200)
            .with_body("<html>")
            .create();

        let calculator = HttpCalculator::new(&server.url(), Duration::from_secs(5)).unwrap();
        let err = calculator.estimate(&request()).unwrap_err();
        assert!(matches!(err, CalculatorError::Decode(_)));
    }
}
