use serde_json::json;
use std::sync::RwLock;

use crate::config::PublishConfig;

/// The endpoint this relay currently advertises to the world. Updated by
/// whatever owns the public address (a tunnel, a static config), read by
/// the discovery endpoints, and optionally mirrored to a shared gist so
/// resolvers off the LAN can find us.
pub struct Advertised {
    config: PublishConfig,
    url: RwLock<Option<String>>,
    client: reqwest::Client,
}

impl Advertised {
    pub fn new(config: PublishConfig) -> Self {
        Advertised {
            config,
            url: RwLock::new(None),
            client: reqwest::Client::new(),
        }
    }

    pub fn current(&self) -> Option<String> {
        self.url.read().unwrap().clone()
    }

    pub async fn set(&self, url: String) {
        {
            let mut current = self.url.write().unwrap();
            if current.as_deref() == Some(url.as_str()) {
                return;
            }
            *current = Some(url.clone());
        }
        log::info!("advertised endpoint: {}", url);

        if let Some(path) = &self.config.mirror_file {
            let doc = json!({ "server": url });
            if let Err(e) = std::fs::write(path, doc.to_string()) {
                log::warn!("failed to mirror endpoint to {}: {}", path.display(), e);
            }
        }

        match (&self.config.gist_id, &self.config.gist_token) {
            (Some(id), Some(token)) => self.push_gist(id, token, &url).await,
            _ => log::debug!("gist publishing not configured, skipping"),
        }
    }

    /// Overwrites the gist's discovery document; append would confuse
    /// resolvers, they only ever read the current value.
    async fn push_gist(&self, gist_id: &str, token: &str, url: &str) {
        let content = json!({ "server": url }).to_string();
        let body = json!({
            "files": {
                "current-tunnel.json": { "content": content }
            }
        });

        let result = self
            .client
            .patch(format!("https://api.github.com/gists/{}", gist_id))
            .header("User-Agent", "waylink-discovery")
            .header("Accept", "application/vnd.github+json")
            .bearer_auth(token)
            .json(&body)
            .send()
            .await;

        match result {
            Ok(res) if res.status().is_success() => log::info!("discovery gist updated"),
            Ok(res) => log::warn!("gist update failed: status {}", res.status()),
            Err(e) => log::warn!("gist update failed: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn temp_mirror() -> PathBuf {
        std::env::temp_dir().join(format!("waylink-mirror-{}.json", uuid::Uuid::new_v4()))
    }

    #[tokio::test]
    async fn set_updates_state_and_mirror() {
        let mirror = temp_mirror();
        let advertised = Advertised::new(PublishConfig {
            gist_id: None,
            gist_token: None,
            mirror_file: Some(mirror.clone()),
        });
        assert_eq!(advertised.current(), None);

        advertised.set("https://relay.example".to_string()).await;
        assert_eq!(advertised.current().as_deref(), Some("https://relay.example"));

        let content = std::fs::read_to_string(&mirror).unwrap();
        assert_eq!(content, r#"{"server":"https://relay.example"}"#);
        std::fs::remove_file(&mirror).ok();
    }

    #[tokio::test]
    async fn unchanged_url_does_not_rewrite() {
        let mirror = temp_mirror();
        let advertised = Advertised::new(PublishConfig {
            gist_id: None,
            gist_token: None,
            mirror_file: Some(mirror.clone()),
        });
        advertised.set("https://relay.example".to_string()).await;
        std::fs::remove_file(&mirror).unwrap();

        // Same value again: no mirror write happens.
        advertised.set("https://relay.example".to_string()).await;
        assert!(!mirror.exists());
    }
}
