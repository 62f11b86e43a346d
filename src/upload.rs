/// Delivery of decoded observations to the collection server
use log::{debug, info};
use reqwest::{ClientBuilder, StatusCode};
use std::time::Duration;
use url::Url;

use crate::models::Observation;

// Bounds a whole request, so a server that never answers cannot stall polling
const UPLOAD_TIMEOUT: Duration = Duration::from_secs(10);

/// Posts observations as JSON to a single endpoint
pub struct Uploader {
    client: reqwest::Client,
    url: Url,
}

impl Uploader {
    pub fn new(url: Url) -> Result<Self, String> {
        Self::from_builder(reqwest::Client::builder(), url, UPLOAD_TIMEOUT)
    }

    fn from_builder(builder: ClientBuilder, url: Url, timeout: Duration) -> Result<Self, String> {
        let client = builder
            .timeout(timeout)
            .build()
            .map_err(|e| format!("HTTP client setup error: {}", e))?;

        Ok(Self { client, url })
    }

    /// Send one observation
    ///
    /// The server answers 201 Created on success; any other status is an
    /// error. Nothing is retried here, the next poll cycle produces fresh data.
    ///
    /// # Arguments
    /// * `observation` - A decoded record with `valid == true`
    ///
    /// # Returns
    /// Result indicating success or failure
    pub async fn send(&self, observation: &Observation) -> Result<(), String> {
        debug!("Posting observation to {}", self.url);

        let response = self
            .client
            .post(self.url.clone())
            .json(observation)
            .send()
            .await
            .map_err(|e| format!("Request to {} failed: {}", self.url, e))?;

        match response.status() {
            StatusCode::CREATED => {
                info!("Observation stored by server");
                Ok(())
            }
            status => Err(format!(
                "Server did not store the observation, HTTP code: {}",
                status
            )),
        }
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::{direct_uploader, one_shot_server, silent_server};
    use super::*;
    use crate::console::decoder::decode;
    use crate::console::fixtures::golden_frame;

    #[tokio::test]
    async fn posts_observation_as_json() {
        let (url, server) = one_shot_server("HTTP/1.1 201 Created").await;
        let uploader = direct_uploader(url, UPLOAD_TIMEOUT);

        uploader.send(&decode(&golden_frame())).await.unwrap();

        let body: serde_json::Value = serde_json::from_str(&server.await.unwrap()).unwrap();
        assert_eq!(body["wind_direction"], 225);
        assert_eq!(body["start_date_storm"], "2008-01-02");
        assert_eq!(body["valid"], true);
    }

    #[tokio::test]
    async fn non_created_status_is_an_error() {
        let (url, server) = one_shot_server("HTTP/1.1 500 Internal Server Error").await;
        let uploader = direct_uploader(url, UPLOAD_TIMEOUT);

        let result = uploader.send(&decode(&golden_frame())).await;

        assert!(result.unwrap_err().contains("500"));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn unanswered_request_times_out() {
        let (url, server) = silent_server().await;
        let uploader = direct_uploader(url, Duration::from_millis(200));

        let result = tokio::time::timeout(
            Duration::from_secs(5),
            uploader.send(&decode(&golden_frame())),
        )
        .await
        .expect("upload should give up on its own");

        assert!(result.unwrap_err().contains("failed"));
        server.abort();
    }

    #[test]
    fn production_client_builds() {
        let url = Url::parse("http://localhost:8000/api").unwrap();
        assert!(Uploader::new(url).is_ok());
    }
}
