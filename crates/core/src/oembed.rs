//! oEmbed document model.
//!
//! Only the members the snapshot pipeline acts on are typed; everything else
//! a provider sends is kept in `extra` so the document can be re-emitted as-is.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize};

/// The `type` member of an oEmbed document.
///
/// Values outside the four defined by oEmbed are kept verbatim in `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EmbedType {
    Photo,
    Video,
    Link,
    Rich,
    Other(String),
}

impl From<String> for EmbedType {
    fn from(value: String) -> Self {
        match value.as_str() {
            "photo" => EmbedType::Photo,
            "video" => EmbedType::Video,
            "link" => EmbedType::Link,
            "rich" => EmbedType::Rich,
            _ => EmbedType::Other(value),
        }
    }
}

impl From<EmbedType> for String {
    fn from(value: EmbedType) -> Self {
        value.as_str().to_string()
    }
}

impl EmbedType {
    pub fn as_str(&self) -> &str {
        match self {
            EmbedType::Photo => "photo",
            EmbedType::Video => "video",
            EmbedType::Link => "link",
            EmbedType::Rich => "rich",
            EmbedType::Other(other) => other,
        }
    }
}

impl fmt::Display for EmbedType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed oEmbed response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OEmbedDocument {
    #[serde(rename = "type")]
    pub kind: EmbedType,

    /// Image URL for `photo` documents.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Embed markup for `rich` and `video` documents.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html: Option<String>,

    /// Suggested cache lifetime in seconds.
    #[serde(default, deserialize_with = "lenient_seconds", skip_serializing_if = "Option::is_none")]
    pub cache_age: Option<u64>,

    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl OEmbedDocument {
    /// Parse a document from a JSON body.
    pub fn from_slice(body: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(body)
    }

    /// `cache_age` as a duration, if the provider sent one.
    pub fn cache_ttl(&self) -> Option<Duration> {
        self.cache_age.map(Duration::from_secs)
    }

    /// Photo URL, ignoring empty strings.
    pub fn photo_url(&self) -> Option<&str> {
        self.url.as_deref().map(str::trim).filter(|u| !u.is_empty())
    }
}

/// Accept `cache_age` as an integer, a float, or a numeric string.
///
/// Providers disagree on the encoding; anything unusable counts as absent
/// rather than failing the whole document.
fn lenient_seconds<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Number(n)) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite() && *f >= 0.0).map(|f| f as u64)),
        Some(serde_json::Value::String(s)) => s.trim().parse::<u64>().ok(),
        _ => None,
    })
}
