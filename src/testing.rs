//! In-memory collaborators for unit tests

use crate::config::SyncConfig;
use crate::crm::{CrmGateway, CrmSession};
use crate::host::{FieldStore, IssueSource};
use crate::model::{
    AccountInfo, CaseUpdate, ContactInfo, CustomField, FieldUpdates, IssueSnapshot, NewCase,
    UserInfo,
};
use crate::notify::{Notification, Notifier};
use crate::sync::IssueSyncHandler;
use crate::{BridgeError, Result};
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};

/// CRM fake with one contact, one user and one account
#[derive(Default)]
pub struct FakeCrm {
    pub fail_login: bool,
    pub fail_create: bool,
    pub no_contact: bool,
    pub calls: Mutex<Vec<String>>,
}

impl FakeCrm {
    fn record(&self, call: &str) {
        self.calls.lock().unwrap().push(call.to_string());
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

pub fn session() -> CrmSession {
    CrmSession {
        server_url: "https://acme.my.salesforce.com/services/Soap/c/59.0/00D".to_string(),
        session_id: "SID".to_string(),
        user_id: None,
        password_expired: false,
    }
}

#[async_trait]
impl CrmGateway for FakeCrm {
    async fn authenticate(&self) -> Result<CrmSession> {
        self.record("login");
        if self.fail_login {
            return Err(BridgeError::Auth("INVALID_LOGIN".to_string()));
        }
        Ok(session())
    }

    async fn find_contact_by_email(
        &self,
        _session: &CrmSession,
        email: &str,
    ) -> Result<Option<ContactInfo>> {
        self.record("contact");
        if self.no_contact {
            return Ok(None);
        }
        Ok(Some(ContactInfo {
            id: "003A".to_string(),
            account_id: Some("001A".to_string()),
            name: "Ada".to_string(),
            phone: Some("555".to_string()),
            email: email.to_string(),
        }))
    }

    async fn find_user_by_email(
        &self,
        _session: &CrmSession,
        _email: &str,
    ) -> Result<Option<UserInfo>> {
        self.record("user");
        Ok(Some(UserInfo {
            id: "005B".to_string(),
            name: "Bob".to_string(),
        }))
    }

    async fn find_account_by_id(
        &self,
        _session: &CrmSession,
        _account_id: &str,
    ) -> Result<Option<AccountInfo>> {
        self.record("account");
        Ok(Some(AccountInfo {
            name: "Acme".to_string(),
            owner_id: Some("005O".to_string()),
        }))
    }

    async fn find_user_name_by_id(
        &self,
        _session: &CrmSession,
        _user_id: &str,
    ) -> Result<Option<String>> {
        self.record("owner");
        Ok(Some("Olga".to_string()))
    }

    async fn create_case(&self, _session: &CrmSession, _case: &NewCase) -> Result<String> {
        self.record("create");
        if self.fail_create {
            return Err(BridgeError::RemoteWrite(
                "REQUIRED_FIELD_MISSING".to_string(),
            ));
        }
        Ok("500A".to_string())
    }

    async fn update_case(
        &self,
        _session: &CrmSession,
        _case_id: &str,
        _update: &CaseUpdate,
    ) -> Result<()> {
        self.record("update");
        Ok(())
    }

    async fn close_case(&self, _session: &CrmSession, _case_id: &str) -> Result<()> {
        self.record("close");
        Ok(())
    }
}

/// Issue store that records every write and applies it to the stored issue
#[derive(Default)]
pub struct MemoryFields {
    pub writes: Mutex<Vec<FieldUpdates>>,
    issues: Mutex<BTreeMap<String, IssueSnapshot>>,
}

impl MemoryFields {
    pub fn insert(&self, issue: IssueSnapshot) {
        self.issues.lock().unwrap().insert(issue.key.clone(), issue);
    }
}

#[async_trait]
impl FieldStore for MemoryFields {
    async fn write_fields(&self, issue_key: &str, updates: &FieldUpdates) -> Result<()> {
        self.writes.lock().unwrap().push(updates.clone());
        if let Some(issue) = self.issues.lock().unwrap().get_mut(issue_key) {
            for (field, value) in updates.iter() {
                if value.is_empty() {
                    issue.mirrored.remove(&field);
                } else {
                    issue.mirrored.insert(field, value.to_string());
                }
            }
            issue.existing_case_id = issue.mirrored.get(&CustomField::CaseId).cloned();
        }
        Ok(())
    }
}

#[async_trait]
impl IssueSource for MemoryFields {
    async fn fetch_snapshot(&self, issue_key: &str) -> Result<IssueSnapshot> {
        self.issues
            .lock()
            .unwrap()
            .get(issue_key)
            .cloned()
            .ok_or_else(|| BridgeError::Jira(format!("JIRA issue not found: {}", issue_key)))
    }
}

#[derive(Default)]
pub struct Outbox {
    pub sent: Mutex<Vec<Notification>>,
}

#[async_trait]
impl Notifier for Outbox {
    async fn send(
        &self,
        _recipients: &BTreeSet<String>,
        notification: &Notification,
    ) -> Result<()> {
        self.sent.lock().unwrap().push(notification.clone());
        Ok(())
    }
}

/// A handler for project PROJ wired to the fakes
pub struct Harness {
    pub crm: Arc<FakeCrm>,
    pub fields: Arc<MemoryFields>,
    pub outbox: Arc<Outbox>,
    pub handler: IssueSyncHandler,
}

pub fn harness(crm: FakeCrm) -> Harness {
    let crm = Arc::new(crm);
    let fields = Arc::new(MemoryFields::default());
    let outbox = Arc::new(Outbox::default());
    let config = SyncConfig {
        tracked_project_keys: ["PROJ".to_string()].into_iter().collect(),
        notify_emails: ["ops@example.com".to_string()].into_iter().collect(),
        ..SyncConfig::default()
    };
    let handler = IssueSyncHandler::new(config, crm.clone(), fields.clone(), outbox.clone())
        .with_issue_url_base("https://jira.example.com/");
    Harness {
        crm,
        fields,
        outbox,
        handler,
    }
}

/// PROJ-1 reported by a@x.com, assigned to b@x.com, no case yet
pub fn issue() -> IssueSnapshot {
    let mut issue = IssueSnapshot::new("PROJ-1", "PROJ");
    issue.summary = "Broken login".to_string();
    issue.issue_type_name = "Bug".to_string();
    issue.reporter_name = Some("Ada".to_string());
    issue.reporter_email = Some("a@x.com".to_string());
    issue.assignee_email = Some("b@x.com".to_string());
    issue
}
