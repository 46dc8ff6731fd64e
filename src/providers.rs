use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::document::DocumentStore;

/// Operator-maintained list of upstream providers plus UI selection state.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConfigDocument {
    #[serde(default, deserialize_with = "provider_list")]
    pub providers: Vec<ProviderConfig>,
    #[serde(default, deserialize_with = "optional_text")]
    pub selected_provider_id: Option<String>,
    #[serde(default, deserialize_with = "optional_text")]
    pub selected_model: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One OpenAI-compatible endpoint and its credential. Nulls and non-string
/// values read as absent.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfig {
    #[serde(default, deserialize_with = "optional_text")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "optional_text")]
    pub host: Option<String>,
    #[serde(default, deserialize_with = "optional_text")]
    pub api_key: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ProviderConfig {
    pub fn id(&self) -> &str {
        self.id.as_deref().unwrap_or_default().trim()
    }

    pub fn host(&self) -> &str {
        self.host.as_deref().unwrap_or_default()
    }

    pub fn bearer_token(&self) -> Option<&str> {
        let key = self.api_key.as_deref()?.trim();
        (!key.is_empty()).then_some(key)
    }
}

fn optional_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(text) => Ok(Some(text)),
        _ => Ok(None),
    }
}

/// Entries that are not provider objects are skipped instead of failing the
/// whole document.
fn provider_list<'de, D>(deserializer: D) -> Result<Vec<ProviderConfig>, D::Error>
where
    D: Deserializer<'de>,
{
    let Value::Array(items) = Value::deserialize(deserializer)? else {
        return Ok(Vec::new());
    };
    Ok(items
        .into_iter()
        .enumerate()
        .filter_map(|(index, item)| match serde_json::from_value(item) {
            Ok(provider) => Some(provider),
            Err(err) => {
                warn!(index, error = %err, "skipping unreadable provider entry");
                None
            }
        })
        .collect())
}

impl ConfigDocument {
    pub fn provider(&self, id: &str) -> Option<&ProviderConfig> {
        let id = id.trim();
        self.providers
            .iter()
            .find(|provider| !id.is_empty() && provider.id() == id)
    }
}

/// Persistence for the provider configuration document.
#[derive(Debug)]
pub struct ConfigRepository {
    store: DocumentStore,
}

impl ConfigRepository {
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let default_payload = serde_json::to_value(ConfigDocument::default())
            .context("failed to build default config document")?;
        Ok(Self {
            store: DocumentStore::new(path, default_payload),
        })
    }

    pub fn path(&self) -> &Path {
        self.store.path()
    }

    /// Raw document text, created with an empty provider list on first use.
    pub async fn get_or_create(&self) -> Result<String> {
        self.store.get_or_create().await
    }

    /// Replace the whole document with `document`, whatever its shape.
    pub async fn replace(&self, document: &Value) -> Result<()> {
        self.store.save(document).await?;
        info!(path = %self.path().display(), "config document replaced");
        Ok(())
    }

    /// Typed view of the document. Only invalid JSON is an error; any other
    /// root than an object reads as an empty configuration.
    pub async fn load(&self) -> Result<ConfigDocument> {
        let text = self.get_or_create().await?;
        let root: Value = serde_json::from_str(&text)
            .with_context(|| format!("Malformed config document at {}", self.path().display()))?;
        if !root.is_object() {
            warn!(path = %self.path().display(), "config document is not an object");
            return Ok(ConfigDocument::default());
        }
        serde_json::from_value(root)
            .with_context(|| format!("Malformed config document at {}", self.path().display()))
    }

    pub async fn find_provider(&self, id: &str) -> Result<Option<ProviderConfig>> {
        let document = self.load().await?;
        Ok(document.provider(id).cloned())
    }
}
