use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::DiscoveryError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub url: String,
}

/// Resolves a logical upstream service name (e.g. "upload-service") to a
/// gRPC endpoint. The result reporter depends on this trait, not a concrete
/// resolver, so a static map and a real discovery backend are interchangeable.
#[async_trait]
pub trait ServiceDiscovery: Send + Sync {
    async fn resolve(&self, logical_name: &str) -> Result<Endpoint, DiscoveryError>;
}

/// Discovery backed by a fixed map populated from configuration. Used when
/// the deployment has no service-discovery system of its own.
pub struct StaticServiceDiscovery {
    endpoints: HashMap<String, Endpoint>,
}

impl StaticServiceDiscovery {
    pub fn new(endpoints: HashMap<String, Endpoint>) -> Self {
        Self { endpoints }
    }
}

#[async_trait]
impl ServiceDiscovery for StaticServiceDiscovery {
    async fn resolve(&self, logical_name: &str) -> Result<Endpoint, DiscoveryError> {
        self.endpoints
            .get(logical_name)
            .cloned()
            .ok_or_else(|| DiscoveryError::Unknown(logical_name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn resolves_known_logical_name() {
        let mut endpoints = HashMap::new();
        endpoints.insert(
            "upload-service".to_string(),
            Endpoint {
                url: "http://upload:9000".to_string(),
            },
        );
        let discovery = StaticServiceDiscovery::new(endpoints);
        let endpoint = discovery.resolve("upload-service").await.unwrap();
        assert_eq!(endpoint.url, "http://upload:9000");
    }

    #[tokio::test]
    async fn unknown_name_is_an_error() {
        let discovery = StaticServiceDiscovery::new(HashMap::new());
        assert!(discovery.resolve("nope").await.is_err());
    }
}
