use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SendError {
    #[error("http status {0}")]
    Status(u16),
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

#[derive(Debug, Clone, Serialize)]
pub struct LocationPush {
    #[serde(rename = "userId")]
    pub user_id: String,
    pub lat: f64,
    pub lon: f64,
    pub ts: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heartbeat: Option<bool>,
}

pub struct LocationClient {
    client: reqwest::Client,
    timeout: Duration,
}

impl LocationClient {
    pub fn new(timeout: Duration) -> Self {
        LocationClient {
            client: reqwest::Client::new(),
            timeout,
        }
    }

    /// One best-effort location POST. A failure here loses a single sample
    /// and is never fatal; the caller logs and moves on.
    pub async fn post_location(&self, base: &str, push: &LocationPush) -> Result<(), SendError> {
        let res = self
            .client
            .post(format!("{}/location", base))
            .timeout(self.timeout)
            .json(push)
            .send()
            .await?;
        if !res.status().is_success() {
            return Err(SendError::Status(res.status().as_u16()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heartbeat_flag_is_omitted_when_absent() {
        let push = LocationPush {
            user_id: "galaxy-1a2b3c4d".into(),
            lat: -34.6,
            lon: -58.38,
            ts: 1_700_000_000_000,
            heartbeat: None,
        };
        let json = serde_json::to_string(&push).unwrap();
        assert!(json.contains("\"userId\""));
        assert!(!json.contains("heartbeat"));

        let hb = LocationPush {
            heartbeat: Some(true),
            ..push
        };
        assert!(serde_json::to_string(&hb).unwrap().contains("\"heartbeat\":true"));
    }
}
