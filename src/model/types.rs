//! Search entities shared by the clients, the grouper and the orchestrator.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Site locales served by the search pipeline.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    De,
    En,
}

impl Locale {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::De => "de",
            Self::En => "en",
        }
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Locale {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "de" => Ok(Self::De),
            "en" => Ok(Self::En),
            other => Err(format!("unknown locale '{other}'")),
        }
    }
}

/// Content collections a search hit can belong to (`relationTo`).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum CollectionKind {
    Artists,
    Employees,
    Pages,
    Repertoire,
    News,
}

impl CollectionKind {
    pub const ALL: [CollectionKind; 5] = [
        CollectionKind::Artists,
        CollectionKind::Employees,
        CollectionKind::Pages,
        CollectionKind::Repertoire,
        CollectionKind::News,
    ];

    /// Collections recognized when no explicit set is configured.
    pub const DEFAULT_RECOGNIZED: [CollectionKind; 4] = [
        CollectionKind::Artists,
        CollectionKind::Employees,
        CollectionKind::Pages,
        CollectionKind::Repertoire,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Artists => "artists",
            Self::Employees => "employees",
            Self::Pages => "pages",
            Self::Repertoire => "repertoire",
            Self::News => "news",
        }
    }
}

impl fmt::Display for CollectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CollectionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("unknown collection '{s}'"))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContactPerson {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
}

/// A search hit as it arrives on the wire, before its collection is validated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawSearchDoc {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub relation_to: String,
    #[serde(default, deserialize_with = "string_or_number")]
    pub relation_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
    #[serde(default, deserialize_with = "priority_or_zero")]
    pub priority: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact_persons: Option<Vec<ContactPerson>>,
}

/// A validated search hit, filed under a recognized collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchDoc {
    pub id: String,
    pub title: String,
    pub relation_to: CollectionKind,
    pub relation_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
    pub priority: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact_persons: Option<Vec<ContactPerson>>,
}

impl SearchDoc {
    pub fn from_raw(raw: RawSearchDoc, relation_to: CollectionKind) -> Self {
        Self {
            id: raw.id,
            title: raw.title,
            relation_to,
            relation_id: raw.relation_id,
            slug: raw.slug,
            priority: raw.priority,
            contact_persons: raw.contact_persons,
        }
    }
}

/// Which tier produced a result set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultSource {
    Primary,
    Fallback,
}

impl fmt::Display for ResultSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Primary => f.write_str("primary"),
            Self::Fallback => f.write_str("fallback"),
        }
    }
}

/// Grouped answer to one query. Every recognized collection has a bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResultSet {
    pub results: BTreeMap<CollectionKind, Vec<SearchDoc>>,
    pub source: ResultSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SearchResultSet {
    /// Docs filed under `kind`; empty if the collection is not recognized.
    pub fn bucket(&self, kind: CollectionKind) -> &[SearchDoc] {
        self.results.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn total(&self) -> usize {
        self.results.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

/// Build-time snapshot served as `search-index-<locale>.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StaticIndex {
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub locale: String,
    #[serde(default)]
    pub updated: String,
    #[serde(default)]
    pub docs: Vec<IndexDescriptor>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexDescriptor {
    pub display_title: String,
    #[serde(default)]
    pub slug: Option<String>,
    pub relation_to: String,
    /// Only read by the priority ranking policy.
    #[serde(default)]
    pub priority: Option<f64>,
}

/// CMS ids arrive as strings or numbers depending on the database adapter.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        serde_json::Value::Null => Ok(String::new()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number id, got {other}"
        ))),
    }
}

fn priority_or_zero<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(0.0))
}
