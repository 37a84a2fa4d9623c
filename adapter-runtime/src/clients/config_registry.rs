//! The optional remote configuration-registry client: `ping`,
//! `get_config`, `put_config`, `register_service`, per spec.md §6.
//! Only consulted when a registry URL is configured (spec.md §4.7,
//! `INIT → CONFIG_LOADED`); otherwise configuration comes from the
//! local directory.

use adapter_api::{Error, Result};
use async_trait::async_trait;
use toml::value::Table;

#[async_trait]
pub trait ConfigRegistryClient: Send + Sync {
    async fn ping(&self) -> Result<()>;
    /// `None` means the registry has no configuration under this key
    /// yet; the orchestrator responds by reading local config and
    /// uploading it (spec.md §4.7).
    async fn get_config(&self, key: &str) -> Result<Option<Table>>;
    async fn put_config(&self, key: &str, config: &Table) -> Result<()>;
    async fn register_service(&self, service: &str) -> Result<()>;
}

pub struct HttpConfigRegistryClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpConfigRegistryClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        HttpConfigRegistryClient {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    fn fail(context: &str, e: impl std::fmt::Display) -> Error {
        Error::RemoteServerDown(format!("config registry {}: {}", context, e))
    }
}

#[async_trait]
impl ConfigRegistryClient for HttpConfigRegistryClient {
    async fn ping(&self) -> Result<()> {
        let url = format!("{}/v1/health", self.base_url);
        self.client
            .get(url)
            .send()
            .await
            .map_err(|e| Self::fail("ping", e))?
            .error_for_status()
            .map_err(|e| Self::fail("ping status", e))?;
        Ok(())
    }

    async fn get_config(&self, key: &str) -> Result<Option<Table>> {
        let url = format!("{}/v1/kv/{}", self.base_url, key);
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Self::fail("get_config", e))?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let body = resp
            .error_for_status()
            .map_err(|e| Self::fail("get_config status", e))?
            .text()
            .await
            .map_err(|e| Self::fail("get_config body", e))?;

        toml::from_str(&body)
            .map(Some)
            .map_err(|e| Self::fail("get_config parse", e))
    }

    async fn put_config(&self, key: &str, config: &Table) -> Result<()> {
        let url = format!("{}/v1/kv/{}", self.base_url, key);
        let body = toml::to_string(config).map_err(|e| Self::fail("put_config serialize", e))?;

        self.client
            .put(url)
            .body(body)
            .send()
            .await
            .map_err(|e| Self::fail("put_config", e))?
            .error_for_status()
            .map_err(|e| Self::fail("put_config status", e))?;
        Ok(())
    }

    async fn register_service(&self, service: &str) -> Result<()> {
        let url = format!("{}/v1/agent/service/register", self.base_url);
        self.client
            .post(url)
            .json(&serde_json::json!({ "Name": service }))
            .send()
            .await
            .map_err(|e| Self::fail("register_service", e))?
            .error_for_status()
            .map_err(|e| Self::fail("register_service status", e))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct FakeConfigRegistryClient {
        pub stored: Mutex<Option<Table>>,
    }

    #[async_trait]
    impl ConfigRegistryClient for FakeConfigRegistryClient {
        async fn ping(&self) -> Result<()> {
            Ok(())
        }

        async fn get_config(&self, _key: &str) -> Result<Option<Table>> {
            Ok(self.stored.lock().unwrap().clone())
        }

        async fn put_config(&self, _key: &str, config: &Table) -> Result<()> {
            *self.stored.lock().unwrap() = Some(config.clone());
            Ok(())
        }

        async fn register_service(&self, _service: &str) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn missing_key_reports_none_until_put() {
        let client = FakeConfigRegistryClient::default();
        assert!(client.get_config("svc").await.unwrap().is_none());

        let mut table = Table::new();
        table.insert("servicename".into(), toml::Value::String("svc".into()));
        client.put_config("svc", &table).await.unwrap();

        assert_eq!(client.get_config("svc").await.unwrap(), Some(table));
    }
}
