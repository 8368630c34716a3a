//! Core data types
//!
//! The issue-side view ([`IssueSnapshot`]), the CRM-side records resolved for
//! it, and the custom-field values mirrored back onto the issue.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Issue lifecycle events the handler reacts to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Created,
    Updated,
    Closed,
    Resolved,
    Assigned,
    Started,
}

/// What an event asks of the remote case
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventAction {
    /// Create the case if missing, otherwise push the latest issue data
    Upsert,
    /// Close the case if one exists
    Close,
}

impl EventKind {
    /// Resolved behaves as closed; assigned and started behave as updated
    pub fn action(self) -> EventAction {
        match self {
            EventKind::Closed | EventKind::Resolved => EventAction::Close,
            EventKind::Created | EventKind::Updated | EventKind::Assigned | EventKind::Started => {
                EventAction::Upsert
            }
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventKind::Created => write!(f, "created"),
            EventKind::Updated => write!(f, "updated"),
            EventKind::Closed => write!(f, "closed"),
            EventKind::Resolved => write!(f, "resolved"),
            EventKind::Assigned => write!(f, "assigned"),
            EventKind::Started => write!(f, "started"),
        }
    }
}

impl std::str::FromStr for EventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "created" | "create" => Ok(EventKind::Created),
            "updated" | "update" => Ok(EventKind::Updated),
            "closed" | "close" => Ok(EventKind::Closed),
            "resolved" | "resolve" => Ok(EventKind::Resolved),
            "assigned" | "assign" => Ok(EventKind::Assigned),
            "started" | "start" => Ok(EventKind::Started),
            other => Err(format!("Unknown event kind: {}", other)),
        }
    }
}

/// JIRA custom fields written by the handler
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CustomField {
    AccountName,
    AccountUrl,
    AccountOwner,
    ContactName,
    ContactEmail,
    ContactPhone,
    CaseId,
    SyncStatus,
}

impl CustomField {
    pub const ALL: [CustomField; 8] = [
        CustomField::AccountName,
        CustomField::AccountUrl,
        CustomField::AccountOwner,
        CustomField::ContactName,
        CustomField::ContactEmail,
        CustomField::ContactPhone,
        CustomField::CaseId,
        CustomField::SyncStatus,
    ];

    /// Default display name of the field in JIRA
    pub fn default_name(self) -> &'static str {
        match self {
            CustomField::AccountName => "CRM Account Name",
            CustomField::AccountUrl => "CRM Account URL",
            CustomField::AccountOwner => "CRM Account Owner",
            CustomField::ContactName => "CRM Contact Name",
            CustomField::ContactEmail => "CRM Contact Email",
            CustomField::ContactPhone => "CRM Contact Phone",
            CustomField::CaseId => "CRM Case Id",
            CustomField::SyncStatus => "Sync Status",
        }
    }
}

/// Value of the sync-status field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncStatus {
    Synced,
    Unsynced,
}

impl SyncStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SyncStatus::Synced => "Synced",
            SyncStatus::Unsynced => "Unsynced",
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Current values of the managed custom fields on an issue
pub type FieldValues = BTreeMap<CustomField, String>;

/// Read-only view of an issue at the moment of an event
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueSnapshot {
    pub key: String,
    pub summary: String,
    #[serde(default)]
    pub description: String,
    pub issue_type_name: String,
    #[serde(default)]
    pub reporter_name: Option<String>,
    #[serde(default)]
    pub reporter_email: Option<String>,
    #[serde(default)]
    pub assignee_email: Option<String>,
    pub project_key: String,
    #[serde(default)]
    pub existing_case_id: Option<String>,
    /// Managed custom-field values as they were when the event fired
    #[serde(default)]
    pub mirrored: FieldValues,
}

impl IssueSnapshot {
    pub fn new(key: impl Into<String>, project_key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            project_key: project_key.into(),
            ..Self::default()
        }
    }

    /// The linked case id, if the field holds a non-blank value
    pub fn case_id(&self) -> Option<&str> {
        self.existing_case_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }

    pub fn reporter_email(&self) -> Option<&str> {
        non_blank(self.reporter_email.as_deref())
    }

    pub fn assignee_email(&self) -> Option<&str> {
        non_blank(self.assignee_email.as_deref())
    }

    /// Name used to address the reporter in notifications
    pub fn reporter_display(&self) -> &str {
        non_blank(self.reporter_name.as_deref())
            .or_else(|| self.reporter_email())
            .unwrap_or("(unknown reporter)")
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// CRM contact matched by the reporter's email
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContactInfo {
    pub id: String,
    pub account_id: Option<String>,
    pub name: String,
    pub phone: Option<String>,
    pub email: String,
}

/// CRM user matched by the assignee's email
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserInfo {
    pub id: String,
    pub name: String,
}

/// CRM account of a contact
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountInfo {
    pub name: String,
    pub owner_id: Option<String>,
}

/// Remote case status values used by the handler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaseStatus {
    New,
    Closed,
}

impl CaseStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            CaseStatus::New => "New",
            CaseStatus::Closed => "Closed",
        }
    }
}

/// Origin stamped on every case created from an issue
pub const CASE_ORIGIN: &str = "Web";

/// Fields of a case to be created
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCase {
    pub owner_id: String,
    pub account_id: Option<String>,
    pub contact_id: String,
    pub status: CaseStatus,
    pub case_type: String,
    pub subject: String,
    pub description: String,
    pub origin: String,
    /// Issue key, stored in the case's external-key field
    pub external_key: String,
}

impl NewCase {
    pub fn for_issue(issue: &IssueSnapshot, contact: &ContactInfo, owner: &UserInfo) -> Self {
        Self {
            owner_id: owner.id.clone(),
            account_id: contact.account_id.clone(),
            contact_id: contact.id.clone(),
            status: CaseStatus::New,
            case_type: issue.issue_type_name.clone(),
            subject: issue.summary.clone(),
            description: issue.description.clone(),
            origin: CASE_ORIGIN.to_string(),
            external_key: issue.key.clone(),
        }
    }
}

/// Fields pushed onto an existing case when its issue changes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaseUpdate {
    pub contact_id: String,
    pub account_id: Option<String>,
    pub subject: String,
    pub description: String,
}

impl CaseUpdate {
    pub fn for_issue(issue: &IssueSnapshot, contact: &ContactInfo) -> Self {
        Self {
            contact_id: contact.id.clone(),
            account_id: contact.account_id.clone(),
            subject: issue.summary.clone(),
            description: issue.description.clone(),
        }
    }
}

/// Account data as shown on the issue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountMirror {
    pub name: String,
    pub url: String,
    pub owner_name: String,
}

/// Everything resolved from the CRM that gets copied onto the issue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrmMirror {
    pub case_id: String,
    pub contact: ContactInfo,
    pub account: Option<AccountMirror>,
}

/// Ordered set of custom-field writes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldUpdates {
    values: FieldValues,
}

impl FieldUpdates {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(status: SyncStatus) -> Self {
        let mut updates = Self::new();
        updates.set(CustomField::SyncStatus, status.as_str());
        updates
    }

    pub fn set(&mut self, field: CustomField, value: impl Into<String>) {
        self.values.insert(field, value.into());
    }

    pub fn get(&self, field: CustomField) -> Option<&str> {
        self.values.get(&field).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (CustomField, &str)> {
        self.values.iter().map(|(field, value)| (*field, value.as_str()))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Drop writes whose value the issue already holds (an unset field equals "")
    pub fn changed_from(mut self, current: &FieldValues) -> Self {
        self.values
            .retain(|field, value| current.get(field).map_or("", String::as_str) != value.as_str());
        self
    }
}
