//! JIRA webhook payloads

use super::{FieldCatalog, JiraIssue};
use crate::config::FieldNames;
use crate::model::EventKind;
use serde::Deserialize;

/// Body of a JIRA webhook delivery (only the parts the bridge reads)
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookPayload {
    #[serde(rename = "webhookEvent", default)]
    pub webhook_event: String,
    #[serde(default)]
    pub issue_event_type_name: Option<String>,
    #[serde(default)]
    pub issue: Option<JiraIssue>,
    #[serde(default)]
    pub changelog: Option<Changelog>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Changelog {
    #[serde(default)]
    pub items: Vec<ChangelogItem>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChangelogItem {
    /// Display name of the changed field
    #[serde(default)]
    pub field: String,
    #[serde(rename = "fieldId", default)]
    pub field_id: Option<String>,
}

impl WebhookPayload {
    /// Map the delivery to an issue event; `None` for deliveries the bridge ignores
    pub fn event_kind(&self) -> Option<EventKind> {
        match self.webhook_event.as_str() {
            "jira:issue_created" => Some(EventKind::Created),
            "jira:issue_updated" => Some(match self.issue_event_type_name.as_deref() {
                Some("issue_closed") => EventKind::Closed,
                Some("issue_resolved") => EventKind::Resolved,
                Some("issue_assigned") => EventKind::Assigned,
                Some("issue_work_started") => EventKind::Started,
                _ => EventKind::Updated,
            }),
            _ => None,
        }
    }

    /// True when every changed field is one the bridge itself writes
    pub fn only_touches_managed_fields(&self, names: &FieldNames, catalog: &FieldCatalog) -> bool {
        let items = match &self.changelog {
            Some(changelog) if !changelog.items.is_empty() => &changelog.items,
            _ => return false,
        };
        items.iter().all(|item| {
            item.field_id
                .as_deref()
                .is_some_and(|id| catalog.field_for_id(id).is_some())
                || names.field_named(&item.field).is_some()
        })
    }
}
