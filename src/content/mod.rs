//! Content records and the store contract the webhook receiver consumes
//!
//! A store hands out records by key and performs writes through a scope.
//! Writes made through a scope become durable only once `complete` is called;
//! dropping a scope without completing it discards them.

pub mod memory;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::future::Future;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};

pub use memory::MemoryContentStore;

/// User id recorded for publishes performed by the system itself
pub const SYSTEM_USER_ID: i32 = -1;

/// Describes the shape of a record and whether it varies by culture
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentType {
    pub alias: String,
    pub name: String,
    pub varies_by_culture: bool,
    pub property_aliases: BTreeSet<String>,
}

impl ContentType {
    pub fn new(alias: impl Into<String>, varies_by_culture: bool) -> Self {
        let alias = alias.into();
        Self {
            name: alias.clone(),
            alias,
            varies_by_culture,
            property_aliases: BTreeSet::new(),
        }
    }

    pub fn with_property(mut self, alias: impl Into<String>) -> Self {
        self.property_aliases.insert(alias.into());
        self
    }

    pub fn has_property(&self, alias: &str) -> bool {
        self.property_aliases.contains(alias)
    }
}

/// A content record as loaded from a store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Content {
    pub key: Uuid,
    pub name: String,
    pub content_type: ContentType,
    pub trashed: bool,
    properties: BTreeMap<String, String>,
    available_cultures: BTreeSet<String>,
}

impl Content {
    pub fn new(key: Uuid, name: impl Into<String>, content_type: ContentType) -> Self {
        Self {
            key,
            name: name.into(),
            content_type,
            trashed: false,
            properties: BTreeMap::new(),
            available_cultures: BTreeSet::new(),
        }
    }

    pub fn with_culture(mut self, culture: impl Into<String>) -> Self {
        self.available_cultures.insert(culture.into());
        self
    }

    pub fn with_cultures<I, C>(mut self, cultures: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<String>,
    {
        self.available_cultures
            .extend(cultures.into_iter().map(Into::into));
        self
    }

    /// Overwrite a property value. The alias must be declared by the content type.
    pub fn set_value(&mut self, alias: &str, value: impl Into<String>) -> StoreResult<()> {
        if !self.content_type.has_property(alias) {
            return Err(StoreError::UnknownProperty {
                content_type: self.content_type.alias.clone(),
                alias: alias.to_string(),
            });
        }
        self.properties.insert(alias.to_string(), value.into());
        Ok(())
    }

    /// Load a stored value without checking the content type.
    pub(crate) fn restore_value(&mut self, alias: String, value: String) {
        self.properties.insert(alias, value);
    }

    pub fn get_value(&self, alias: &str) -> Option<&str> {
        self.properties.get(alias).map(String::as_str)
    }

    pub fn properties(&self) -> &BTreeMap<String, String> {
        &self.properties
    }

    pub fn available_cultures(&self) -> &BTreeSet<String> {
        &self.available_cultures
    }

    /// Culture selection a publish of this record should target.
    pub fn publish_cultures(&self) -> CultureSelection {
        if self.content_type.varies_by_culture {
            CultureSelection::Cultures(self.available_cultures.clone())
        } else {
            CultureSelection::Invariant
        }
    }
}

/// Which variants of a record a publish applies to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CultureSelection {
    /// The record has no culture variants
    Invariant,
    /// Exactly these cultures; may be empty
    Cultures(BTreeSet<String>),
}

impl CultureSelection {
    /// Culture codes as stored in publication rows; invariant maps to `""`.
    pub fn targets(&self) -> Vec<String> {
        match self {
            CultureSelection::Invariant => vec![String::new()],
            CultureSelection::Cultures(cultures) => cultures.iter().cloned().collect(),
        }
    }
}

impl fmt::Display for CultureSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CultureSelection::Invariant => write!(f, "invariant"),
            CultureSelection::Cultures(cultures) => {
                let list: Vec<&str> = cultures.iter().map(String::as_str).collect();
                write!(f, "[{}]", list.join(", "))
            }
        }
    }
}

/// Business-level outcome of a publish
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishStatus {
    Success,
    FailedTrashed,
    FailedNothingToPublish,
    FailedCultureUnavailable(String),
    FailedVariationMismatch,
}

impl fmt::Display for PublishStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PublishStatus::Success => write!(f, "success"),
            PublishStatus::FailedTrashed => write!(f, "content is trashed"),
            PublishStatus::FailedNothingToPublish => write!(f, "no cultures to publish"),
            PublishStatus::FailedCultureUnavailable(culture) => {
                write!(f, "culture '{}' is not available", culture)
            }
            PublishStatus::FailedVariationMismatch => {
                write!(f, "culture selection does not match content type variation")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishResult {
    pub status: PublishStatus,
    pub published_cultures: Vec<String>,
}

impl PublishResult {
    pub fn succeeded(published_cultures: Vec<String>) -> Self {
        Self {
            status: PublishStatus::Success,
            published_cultures,
        }
    }

    pub fn failed(status: PublishStatus) -> Self {
        Self {
            status,
            published_cultures: Vec::new(),
        }
    }

    pub fn success(&self) -> bool {
        self.status == PublishStatus::Success
    }
}

/// Snapshot of a record's values made live for one culture (`""` when invariant)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Publication {
    pub content_key: Uuid,
    pub culture: String,
    pub values: BTreeMap<String, String>,
    pub published_by: i32,
    pub published_at: DateTime<Utc>,
}

/// Business rules shared by every backend; `None` means the publish may proceed.
pub fn check_publishable(content: &Content, cultures: &CultureSelection) -> Option<PublishStatus> {
    if content.trashed {
        return Some(PublishStatus::FailedTrashed);
    }
    match (content.content_type.varies_by_culture, cultures) {
        (false, CultureSelection::Invariant) => None,
        (true, CultureSelection::Cultures(requested)) => {
            if requested.is_empty() {
                return Some(PublishStatus::FailedNothingToPublish);
            }
            requested
                .iter()
                .find(|culture| !content.available_cultures.contains(*culture))
                .map(|culture| PublishStatus::FailedCultureUnavailable(culture.clone()))
        }
        _ => Some(PublishStatus::FailedVariationMismatch),
    }
}

/// Read access to records plus the entry point for scoped writes
pub trait ContentStore: Send + Sync + 'static {
    type Scope: ContentScope;

    fn get_by_id(&self, key: Uuid) -> impl Future<Output = StoreResult<Option<Content>>> + Send;

    fn create_scope(&self) -> impl Future<Output = StoreResult<Self::Scope>> + Send;
}

/// A unit of work against a content store
pub trait ContentScope: Send {
    fn save(&mut self, content: &Content) -> impl Future<Output = StoreResult<()>> + Send;

    fn publish(
        &mut self,
        content: &Content,
        cultures: &CultureSelection,
        user_id: i32,
    ) -> impl Future<Output = StoreResult<PublishResult>> + Send;

    /// Commit every write made through this scope.
    fn complete(self) -> impl Future<Output = StoreResult<()>> + Send;
}
