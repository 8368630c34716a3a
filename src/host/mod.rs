//! Issue-tracker side of the bridge
//!
//! - **jira**: JIRA REST client (issue fetch, field catalog, field writes)
//! - **webhook**: decoding of JIRA webhook deliveries into events
//!
//! The handler only sees the [`FieldStore`] trait and the webhook listener
//! only sees [`IssueSource`], so tests substitute in-memory stores.

pub mod jira;
pub mod webhook;

pub use jira::{JiraClient, JiraIssue};
pub use webhook::WebhookPayload;

use crate::config::FieldNames;
use crate::model::{CustomField, FieldUpdates, IssueSnapshot};
use crate::{BridgeError, Result};
use async_trait::async_trait;
use std::collections::BTreeMap;

/// Writes managed custom-field values onto an issue
#[async_trait]
pub trait FieldStore: Send + Sync {
    async fn write_fields(&self, issue_key: &str, updates: &FieldUpdates) -> Result<()>;
}

/// Reads an issue as it currently stands, including earlier field writes
#[async_trait]
pub trait IssueSource: Send + Sync {
    async fn fetch_snapshot(&self, issue_key: &str) -> Result<IssueSnapshot>;
}

/// A JIRA field as listed by `GET /rest/api/2/field`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDefinition {
    pub id: String,
    pub name: String,
    /// Schema type; "option" fields take `{"value": ..}` on write
    pub schema_type: Option<String>,
}

/// Where a managed field lives in JIRA
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    pub id: String,
    pub option: bool,
}

/// Resolved ids of the managed custom fields
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldCatalog {
    entries: BTreeMap<CustomField, CatalogEntry>,
}

impl FieldCatalog {
    /// Match the configured display names against the instance's fields
    ///
    /// Every managed field must exist; the error names the missing ones.
    pub fn resolve(names: &FieldNames, available: &[FieldDefinition]) -> Result<Self> {
        let mut entries = BTreeMap::new();
        let mut missing = Vec::new();

        for field in CustomField::ALL {
            let name = names.name(field);
            match available
                .iter()
                .find(|def| def.name.trim().eq_ignore_ascii_case(name.trim()))
            {
                Some(def) => {
                    entries.insert(
                        field,
                        CatalogEntry {
                            id: def.id.clone(),
                            option: def.schema_type.as_deref() == Some("option"),
                        },
                    );
                }
                None => missing.push(name.to_string()),
            }
        }

        if !missing.is_empty() {
            return Err(BridgeError::Config(format!(
                "JIRA custom fields not found: {}",
                missing.join(", ")
            )));
        }
        Ok(Self { entries })
    }

    /// Build a catalog from known ids (all plain text fields)
    pub fn from_ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = (CustomField, S)>,
        S: Into<String>,
    {
        Self {
            entries: ids
                .into_iter()
                .map(|(field, id)| {
                    (
                        field,
                        CatalogEntry {
                            id: id.into(),
                            option: false,
                        },
                    )
                })
                .collect(),
        }
    }

    pub fn entry(&self, field: CustomField) -> Option<&CatalogEntry> {
        self.entries.get(&field)
    }

    pub fn id(&self, field: CustomField) -> Option<&str> {
        self.entry(field).map(|entry| entry.id.as_str())
    }

    /// Reverse lookup by JIRA field id
    pub fn field_for_id(&self, id: &str) -> Option<CustomField> {
        self.entries
            .iter()
            .find(|(_, entry)| entry.id == id)
            .map(|(field, _)| *field)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (CustomField, &CatalogEntry)> {
        self.entries.iter().map(|(field, entry)| (*field, entry))
    }
}
