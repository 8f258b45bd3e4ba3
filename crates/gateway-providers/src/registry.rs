//! Provider registry.
//!
//! Built once at startup and shared read-only (`Arc<ProviderRegistry>`);
//! reloading providers requires a restart.

use crate::client::ClientConfig;
use gateway_config::{GatewayConfig, ProviderConfig};
use gateway_core::{
    ChatProvider, GatewayError, ProviderCapability, ProviderKind, ProviderStatus,
};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

/// A registered provider
#[derive(Clone)]
pub struct ProviderEntry {
    /// Read-only descriptor
    pub capability: Arc<ProviderCapability>,
    /// Upstream client; absent when the provider cannot serve requests
    pub client: Option<Arc<dyn ChatProvider>>,
    /// Why the client could not be created
    pub init_error: Option<String>,
}

impl fmt::Debug for ProviderEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderEntry")
            .field("capability", &self.capability)
            .field("client", &self.client.is_some())
            .field("init_error", &self.init_error)
            .finish()
    }
}

impl ProviderEntry {
    /// Status reported by the health endpoints
    #[must_use]
    pub fn status(&self) -> ProviderStatus {
        if !self.capability.enabled {
            ProviderStatus::Disabled
        } else if self.capability.credential_present && self.client.is_some() {
            ProviderStatus::Ok
        } else {
            ProviderStatus::Error
        }
    }
}

/// A provider that can serve a turn
#[derive(Clone)]
pub struct ResolvedProvider {
    /// Descriptor
    pub capability: Arc<ProviderCapability>,
    /// Upstream client
    pub client: Arc<dyn ChatProvider>,
}

impl fmt::Debug for ResolvedProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedProvider")
            .field("capability", &self.capability)
            .finish_non_exhaustive()
    }
}

/// Immutable map from provider id to capability and client
#[derive(Debug, Default)]
pub struct ProviderRegistry {
    providers: HashMap<String, ProviderEntry>,
}

impl ProviderRegistry {
    /// Start building a registry
    #[must_use]
    pub fn builder() -> ProviderRegistryBuilder {
        ProviderRegistryBuilder::default()
    }

    /// Build the registry from configuration.
    ///
    /// Disabled providers and providers without a credential are registered
    /// without a client so health reporting still lists them.
    #[must_use]
    pub fn from_config(config: &GatewayConfig) -> Self {
        let mut builder = Self::builder();

        for provider in &config.providers {
            let capability = provider.capability();

            if !capability.enabled {
                info!(provider = %provider.id, "Provider disabled");
                builder = builder.register_unavailable(capability, None);
                continue;
            }
            if !capability.credential_present {
                warn!(
                    provider = %provider.id,
                    api_key_env = ?provider.api_key_env,
                    "Provider has no API key configured"
                );
                builder = builder.register_unavailable(capability, None);
                continue;
            }

            match build_client(provider) {
                Ok(client) => {
                    info!(
                        provider = %provider.id,
                        kind = %provider.kind,
                        default_model = %provider.default_model,
                        fallback_model = %provider.fallback_model,
                        "Registered provider"
                    );
                    builder = builder.register(capability, client);
                }
                Err(e) => {
                    warn!(provider = %provider.id, error = %e, "Failed to create provider client");
                    builder = builder.register_unavailable(capability, Some(e.to_string()));
                }
            }
        }

        builder.build()
    }

    /// Resolve a provider able to serve a turn.
    ///
    /// # Errors
    /// Returns [`GatewayError::ProviderUnavailable`] when the provider is
    /// unknown, disabled, missing its credential, or has no client.
    pub fn resolve(&self, provider_id: &str) -> Result<ResolvedProvider, GatewayError> {
        let entry = self.providers.get(provider_id).ok_or_else(|| {
            GatewayError::provider_unavailable(provider_id, "unknown provider")
        })?;

        if !entry.capability.enabled {
            return Err(GatewayError::provider_unavailable(
                provider_id,
                "provider is disabled",
            ));
        }
        if !entry.capability.credential_present {
            return Err(GatewayError::provider_unavailable(
                provider_id,
                "provider has no API key configured",
            ));
        }

        let client = entry.client.clone().ok_or_else(|| {
            GatewayError::provider_unavailable(
                provider_id,
                entry
                    .init_error
                    .clone()
                    .unwrap_or_else(|| "provider client is not initialized".to_string()),
            )
        })?;

        Ok(ResolvedProvider {
            capability: Arc::clone(&entry.capability),
            client,
        })
    }

    /// Resolve the model to invoke for a requested model name
    pub fn resolve_model(
        capability: &ProviderCapability,
        requested: Option<&str>,
    ) -> Result<String, GatewayError> {
        capability.resolve_model(requested)
    }

    /// Registered entry, available or not
    #[must_use]
    pub fn get(&self, provider_id: &str) -> Option<&ProviderEntry> {
        self.providers.get(provider_id)
    }

    /// Descriptor of a registered provider
    #[must_use]
    pub fn capability(&self, provider_id: &str) -> Option<Arc<ProviderCapability>> {
        self.providers
            .get(provider_id)
            .map(|entry| Arc::clone(&entry.capability))
    }

    /// Health status of a registered provider
    #[must_use]
    pub fn status(&self, provider_id: &str) -> Option<ProviderStatus> {
        self.providers.get(provider_id).map(ProviderEntry::status)
    }

    /// Status of every registered provider
    #[must_use]
    pub fn statuses(&self) -> Vec<(String, ProviderStatus)> {
        let mut statuses: Vec<_> = self
            .providers
            .iter()
            .map(|(id, entry)| (id.clone(), entry.status()))
            .collect();
        statuses.sort_by(|a, b| a.0.cmp(&b.0));
        statuses
    }

    /// Registered provider ids, sorted
    #[must_use]
    pub fn provider_ids(&self) -> Vec<String> {
        let mut ids: Vec<_> = self.providers.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Whether `provider_id` is registered
    #[must_use]
    pub fn contains(&self, provider_id: &str) -> bool {
        self.providers.contains_key(provider_id)
    }

    /// Number of registered providers
    #[must_use]
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    /// Whether no provider is registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

/// Builder for [`ProviderRegistry`]
#[derive(Debug, Default)]
pub struct ProviderRegistryBuilder {
    providers: HashMap<String, ProviderEntry>,
}

impl ProviderRegistryBuilder {
    /// Register a provider with its client
    #[must_use]
    pub fn register(
        mut self,
        capability: ProviderCapability,
        client: Arc<dyn ChatProvider>,
    ) -> Self {
        self.providers.insert(
            capability.id.clone(),
            ProviderEntry {
                capability: Arc::new(capability),
                client: Some(client),
                init_error: None,
            },
        );
        self
    }

    /// Register a provider that cannot serve requests
    #[must_use]
    pub fn register_unavailable(
        mut self,
        capability: ProviderCapability,
        init_error: Option<String>,
    ) -> Self {
        self.providers.insert(
            capability.id.clone(),
            ProviderEntry {
                capability: Arc::new(capability),
                client: None,
                init_error,
            },
        );
        self
    }

    /// Finish building
    #[must_use]
    pub fn build(self) -> ProviderRegistry {
        ProviderRegistry {
            providers: self.providers,
        }
    }
}

fn build_client(provider: &ProviderConfig) -> Result<Arc<dyn ChatProvider>, GatewayError> {
    let api_key = provider.api_key.clone().ok_or_else(|| {
        GatewayError::configuration(format!("provider '{}' has no API key", provider.id))
    })?;

    let mut config = ClientConfig::new(&provider.id, api_key).with_timeout(provider.timeout);
    if let Some(base_url) = &provider.base_url {
        config = config.with_base_url(base_url);
    }

    match provider.kind {
        #[cfg(feature = "openai")]
        ProviderKind::OpenAI | ProviderKind::Groq => Ok(Arc::new(
            crate::openai::OpenAIProvider::new(config, provider.kind)?,
        )),
        #[cfg(feature = "anthropic")]
        ProviderKind::Anthropic => Ok(Arc::new(crate::anthropic::AnthropicProvider::new(config)?)),
        #[cfg(feature = "google")]
        ProviderKind::Google => Ok(Arc::new(crate::google::GoogleProvider::new(config)?)),
        #[allow(unreachable_patterns)]
        kind => Err(GatewayError::configuration(format!(
            "support for {kind} providers is not compiled in"
        ))),
    }
}
