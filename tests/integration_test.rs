//! Integration tests for casebridge
//!
//! These tests drive the event handler end to end against in-memory CRM,
//! issue-field and mail fakes.

use async_trait::async_trait;
use casebridge::config::{BridgeConfig, SyncConfig};
use casebridge::crm::{CrmGateway, CrmSession};
use casebridge::error::MissingParty;
use casebridge::host::FieldStore;
use casebridge::model::{
    AccountInfo, CaseUpdate, ContactInfo, CustomField, EventKind, FieldUpdates, FieldValues,
    IssueSnapshot, NewCase, UserInfo,
};
use casebridge::notify::{Notification, Notifier};
use casebridge::sync::{IgnoreReason, IssueSyncHandler, SyncOutcome};
use casebridge::{BridgeError, Result};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

/// Remote case as stored by the fake CRM
#[derive(Debug, Clone, PartialEq, Eq)]
struct StoredCase {
    owner_id: String,
    account_id: Option<String>,
    contact_id: String,
    status: String,
    case_type: String,
    subject: String,
    description: String,
    origin: String,
    external_key: String,
}

/// A tiny CRM: contacts and users keyed by email, accounts and cases by id
#[derive(Default)]
struct FakeCrm {
    reject_login: bool,
    contacts: BTreeMap<String, ContactInfo>,
    users: BTreeMap<String, UserInfo>,
    accounts: BTreeMap<String, AccountInfo>,
    cases: Mutex<BTreeMap<String, StoredCase>>,
    calls: Mutex<Vec<&'static str>>,
}

impl FakeCrm {
    fn populated() -> Self {
        let mut crm = FakeCrm::default();
        crm.contacts.insert(
            "a@x.com".to_string(),
            ContactInfo {
                id: "003A".to_string(),
                account_id: Some("001A".to_string()),
                name: "Ada Lovelace".to_string(),
                phone: Some("+1 555 0100".to_string()),
                email: "a@x.com".to_string(),
            },
        );
        crm.contacts.insert(
            "solo@x.com".to_string(),
            ContactInfo {
                id: "003S".to_string(),
                account_id: None,
                name: "Sol Solo".to_string(),
                phone: None,
                email: "solo@x.com".to_string(),
            },
        );
        crm.users.insert(
            "b@x.com".to_string(),
            UserInfo {
                id: "005B".to_string(),
                name: "Bob Builder".to_string(),
            },
        );
        crm.users.insert(
            "owner@x.com".to_string(),
            UserInfo {
                id: "005O".to_string(),
                name: "Olga Owner".to_string(),
            },
        );
        crm.accounts.insert(
            "001A".to_string(),
            AccountInfo {
                name: "Acme Corp".to_string(),
                owner_id: Some("005O".to_string()),
            },
        );
        crm
    }

    fn record(&self, call: &'static str) {
        self.calls.lock().unwrap().push(call);
    }

    fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    fn case(&self, id: &str) -> Option<StoredCase> {
        self.cases.lock().unwrap().get(id).cloned()
    }

    fn case_count(&self) -> usize {
        self.cases.lock().unwrap().len()
    }
}

#[async_trait]
impl CrmGateway for FakeCrm {
    async fn authenticate(&self) -> Result<CrmSession> {
        self.record("login");
        if self.reject_login {
            return Err(BridgeError::Auth(
                "Login failed (INVALID_LOGIN): Invalid username, password, security token"
                    .to_string(),
            ));
        }
        Ok(CrmSession {
            server_url: "https://acme.my.salesforce.com/services/Soap/c/59.0/00Dxx".to_string(),
            session_id: "00Dxx!session".to_string(),
            user_id: Some("005I".to_string()),
            password_expired: false,
        })
    }

    async fn find_contact_by_email(
        &self,
        _session: &CrmSession,
        email: &str,
    ) -> Result<Option<ContactInfo>> {
        self.record("find_contact");
        Ok(self.contacts.get(&email.to_lowercase()).cloned())
    }

    async fn find_user_by_email(
        &self,
        _session: &CrmSession,
        email: &str,
    ) -> Result<Option<UserInfo>> {
        self.record("find_user");
        Ok(self.users.get(&email.to_lowercase()).cloned())
    }

    async fn find_account_by_id(
        &self,
        _session: &CrmSession,
        account_id: &str,
    ) -> Result<Option<AccountInfo>> {
        self.record("find_account");
        Ok(self.accounts.get(account_id).cloned())
    }

    async fn find_user_name_by_id(
        &self,
        _session: &CrmSession,
        user_id: &str,
    ) -> Result<Option<String>> {
        self.record("find_user_name");
        Ok(self
            .users
            .values()
            .find(|user| user.id == user_id)
            .map(|user| user.name.clone()))
    }

    async fn create_case(&self, _session: &CrmSession, case: &NewCase) -> Result<String> {
        self.record("create_case");
        let mut cases = self.cases.lock().unwrap();
        let id = format!("500{:03}", cases.len() + 1);
        cases.insert(
            id.clone(),
            StoredCase {
                owner_id: case.owner_id.clone(),
                account_id: case.account_id.clone(),
                contact_id: case.contact_id.clone(),
                status: case.status.as_str().to_string(),
                case_type: case.case_type.clone(),
                subject: case.subject.clone(),
                description: case.description.clone(),
                origin: case.origin.clone(),
                external_key: case.external_key.clone(),
            },
        );
        Ok(id)
    }

    async fn update_case(
        &self,
        _session: &CrmSession,
        case_id: &str,
        update: &CaseUpdate,
    ) -> Result<()> {
        self.record("update_case");
        let mut cases = self.cases.lock().unwrap();
        let case = cases
            .get_mut(case_id)
            .ok_or_else(|| BridgeError::RemoteQuery(format!("Case {} not found", case_id)))?;
        case.contact_id = update.contact_id.clone();
        case.account_id = update.account_id.clone();
        case.subject = update.subject.clone();
        case.description = update.description.clone();
        Ok(())
    }

    async fn close_case(&self, _session: &CrmSession, case_id: &str) -> Result<()> {
        self.record("close_case");
        let mut cases = self.cases.lock().unwrap();
        let case = cases
            .get_mut(case_id)
            .ok_or_else(|| BridgeError::RemoteQuery(format!("Case {} not found", case_id)))?;
        case.status = "Closed".to_string();
        Ok(())
    }
}

/// Issue custom fields, applied write by write
#[derive(Default)]
struct FakeIssueFields {
    values: Mutex<FieldValues>,
    writes: Mutex<usize>,
}

impl FakeIssueFields {
    fn get(&self, field: CustomField) -> Option<String> {
        self.values.lock().unwrap().get(&field).cloned()
    }

    fn snapshot(&self) -> FieldValues {
        self.values.lock().unwrap().clone()
    }

    fn write_count(&self) -> usize {
        *self.writes.lock().unwrap()
    }
}

#[async_trait]
impl FieldStore for FakeIssueFields {
    async fn write_fields(&self, _issue_key: &str, updates: &FieldUpdates) -> Result<()> {
        *self.writes.lock().unwrap() += 1;
        let mut values = self.values.lock().unwrap();
        for (field, value) in updates.iter() {
            if value.is_empty() {
                values.remove(&field);
            } else {
                values.insert(field, value.to_string());
            }
        }
        Ok(())
    }
}

#[derive(Default)]
struct FakeMail {
    sent: Mutex<Vec<(BTreeSet<String>, Notification)>>,
}

impl FakeMail {
    fn sent(&self) -> Vec<Notification> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|(_, n)| n.clone())
            .collect()
    }
}

#[async_trait]
impl Notifier for FakeMail {
    async fn send(
        &self,
        recipients: &BTreeSet<String>,
        notification: &Notification,
    ) -> Result<()> {
        self.sent
            .lock()
            .unwrap()
            .push((recipients.clone(), notification.clone()));
        Ok(())
    }
}

struct Bridge {
    crm: Arc<FakeCrm>,
    fields: Arc<FakeIssueFields>,
    mail: Arc<FakeMail>,
    handler: IssueSyncHandler,
}

fn sync_config() -> SyncConfig {
    SyncConfig {
        crm_username: "ops@example.com".to_string(),
        crm_password: "hunter2".to_string(),
        crm_security_token: "TOKEN".to_string(),
        notify_emails: ["support@example.com".to_string()].into_iter().collect(),
        tracked_project_keys: ["PROJ".to_string(), "OPS".to_string()]
            .into_iter()
            .collect(),
    }
}

fn bridge(crm: FakeCrm) -> Bridge {
    let crm = Arc::new(crm);
    let fields = Arc::new(FakeIssueFields::default());
    let mail = Arc::new(FakeMail::default());
    let handler = IssueSyncHandler::new(sync_config(), crm.clone(), fields.clone(), mail.clone())
        .with_issue_url_base("https://jira.example.com");
    Bridge {
        crm,
        fields,
        mail,
        handler,
    }
}

impl Bridge {
    /// The issue as JIRA would present it now, custom fields included
    fn current(&self, base: &IssueSnapshot) -> IssueSnapshot {
        let mut issue = base.clone();
        issue.mirrored = self.fields.snapshot();
        issue.existing_case_id = self.fields.get(CustomField::CaseId);
        issue
    }
}

fn proj1() -> IssueSnapshot {
    let mut issue = IssueSnapshot::new("PROJ-1", "PROJ");
    issue.summary = "Login page returns 500".to_string();
    issue.description = "Steps: open /login".to_string();
    issue.issue_type_name = "Bug".to_string();
    issue.reporter_name = Some("Ada Lovelace".to_string());
    issue.reporter_email = Some("a@x.com".to_string());
    issue.assignee_email = Some("b@x.com".to_string());
    issue
}

mod lifecycle_tests {
    use super::*;

    #[tokio::test]
    async fn test_proj1_created_and_mirrored() {
        let b = bridge(FakeCrm::populated());

        let outcome = b.handler.on_issue_created(&proj1()).await;
        assert_eq!(
            outcome,
            SyncOutcome::Synced {
                case_id: "500001".to_string()
            }
        );

        let case = b.crm.case("500001").unwrap();
        assert_eq!(case.status, "New");
        assert_eq!(case.origin, "Web");
        assert_eq!(case.external_key, "PROJ-1");
        assert_eq!(case.owner_id, "005B");
        assert_eq!(case.contact_id, "003A");
        assert_eq!(case.account_id.as_deref(), Some("001A"));
        assert_eq!(case.case_type, "Bug");
        assert_eq!(case.subject, "Login page returns 500");

        assert_eq!(b.fields.get(CustomField::CaseId).as_deref(), Some("500001"));
        assert_eq!(
            b.fields.get(CustomField::SyncStatus).as_deref(),
            Some("Synced")
        );
        assert_eq!(
            b.fields.get(CustomField::ContactName).as_deref(),
            Some("Ada Lovelace")
        );
        assert_eq!(
            b.fields.get(CustomField::ContactPhone).as_deref(),
            Some("+1 555 0100")
        );
        assert_eq!(
            b.fields.get(CustomField::AccountName).as_deref(),
            Some("Acme Corp")
        );
        assert_eq!(
            b.fields.get(CustomField::AccountOwner).as_deref(),
            Some("Olga Owner")
        );
        assert_eq!(
            b.fields.get(CustomField::AccountUrl).as_deref(),
            Some("https://acme.my.salesforce.com/001A")
        );
        assert!(b.mail.sent().is_empty());
    }

    #[tokio::test]
    async fn test_case_created_once_per_issue() {
        let b = bridge(FakeCrm::populated());

        b.handler.on_issue_created(&proj1()).await;
        let outcome = b.handler.on_issue_assigned(&b.current(&proj1())).await;
        assert_eq!(
            outcome,
            SyncOutcome::Synced {
                case_id: "500001".to_string()
            }
        );
        b.handler.on_issue_updated(&b.current(&proj1())).await;

        assert_eq!(b.crm.case_count(), 1);
        assert_eq!(
            b.crm
                .calls()
                .iter()
                .filter(|call| **call == "create_case")
                .count(),
            1
        );
    }

    #[tokio::test]
    async fn test_update_is_idempotent() {
        let b = bridge(FakeCrm::populated());
        b.handler.on_issue_created(&proj1()).await;

        let mut edited = proj1();
        edited.summary = "Login page returns 502".to_string();

        b.handler.on_issue_updated(&b.current(&edited)).await;
        let first = b.crm.case("500001").unwrap();
        let writes_after_first = b.fields.write_count();

        b.handler.on_issue_updated(&b.current(&edited)).await;
        let second = b.crm.case("500001").unwrap();

        assert_eq!(first, second);
        assert_eq!(second.subject, "Login page returns 502");
        // mirrored fields were already current, so no further JIRA write
        assert_eq!(b.fields.write_count(), writes_after_first);
    }

    #[tokio::test]
    async fn test_close_and_resolve() {
        let b = bridge(FakeCrm::populated());
        b.handler.on_issue_created(&proj1()).await;

        let outcome = b.handler.on_issue_resolved(&b.current(&proj1())).await;
        assert!(matches!(outcome, SyncOutcome::Synced { .. }));
        assert_eq!(b.crm.case("500001").unwrap().status, "Closed");

        let outcome = b.handler.on_issue_closed(&b.current(&proj1())).await;
        assert!(matches!(outcome, SyncOutcome::Synced { .. }));
        assert_eq!(b.crm.case_count(), 1);
    }

    #[tokio::test]
    async fn test_close_without_case_makes_no_remote_call() {
        let b = bridge(FakeCrm::populated());

        let outcome = b.handler.on_issue_closed(&proj1()).await;
        assert_eq!(outcome, SyncOutcome::Skipped(IgnoreReason::NoCaseToClose));
        assert!(b.crm.calls().is_empty());
        assert_eq!(b.fields.write_count(), 0);
    }

    #[tokio::test]
    async fn test_contact_without_account_clears_account_fields() {
        let b = bridge(FakeCrm::populated());
        b.handler.on_issue_created(&proj1()).await;
        assert!(b.fields.get(CustomField::AccountName).is_some());

        let mut moved = proj1();
        moved.reporter_email = Some("SOLO@x.com".to_string());
        let outcome = b.handler.on_issue_updated(&b.current(&moved)).await;

        assert!(matches!(outcome, SyncOutcome::Synced { .. }));
        assert_eq!(b.crm.case("500001").unwrap().account_id, None);
        assert_eq!(b.fields.get(CustomField::AccountName), None);
        assert_eq!(b.fields.get(CustomField::AccountUrl), None);
        assert_eq!(
            b.fields.get(CustomField::ContactName).as_deref(),
            Some("Sol Solo")
        );
    }
}

mod filtering_tests {
    use super::*;

    #[tokio::test]
    async fn test_untracked_project_is_ignored() {
        let b = bridge(FakeCrm::populated());
        let mut issue = proj1();
        issue.key = "HR-9".to_string();
        issue.project_key = "HR".to_string();

        for kind in [
            EventKind::Created,
            EventKind::Updated,
            EventKind::Assigned,
            EventKind::Closed,
        ] {
            assert_eq!(
                b.handler.handle(kind, &issue).await,
                SyncOutcome::Skipped(IgnoreReason::UntrackedProject)
            );
        }
        assert!(b.crm.calls().is_empty());
        assert_eq!(b.fields.write_count(), 0);
        assert!(b.mail.sent().is_empty());
    }

    #[tokio::test]
    async fn test_project_match_is_case_insensitive() {
        let b = bridge(FakeCrm::populated());
        let mut issue = proj1();
        issue.project_key = "proj".to_string();

        assert!(matches!(
            b.handler.on_issue_created(&issue).await,
            SyncOutcome::Synced { .. }
        ));
    }

    #[tokio::test]
    async fn test_unassigned_issue_waits_for_assignment() {
        let b = bridge(FakeCrm::populated());
        let mut issue = proj1();
        issue.assignee_email = None;

        assert_eq!(
            b.handler.on_issue_created(&issue).await,
            SyncOutcome::Skipped(IgnoreReason::MissingParticipants)
        );
        assert!(b.crm.calls().is_empty());

        assert!(matches!(
            b.handler.on_issue_assigned(&proj1()).await,
            SyncOutcome::Synced { .. }
        ));
    }
}

mod failure_tests {
    use super::*;

    #[tokio::test]
    async fn test_unknown_reporter_sends_one_missing_contact_mail() {
        let b = bridge(FakeCrm::populated());
        let mut issue = proj1();
        issue.reporter_email = Some("nobody@x.com".to_string());

        let outcome = b.handler.on_issue_created(&issue).await;
        assert_eq!(outcome, SyncOutcome::MissingContact);
        assert_eq!(b.crm.case_count(), 0);
        assert_eq!(b.fields.write_count(), 0);

        let sent = b.mail.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(
            sent[0].subject(),
            "Missing Jira Contact in Salesforce: Ada Lovelace"
        );
        assert!(sent[0].body().contains("nobody@x.com"));
        assert!(sent[0]
            .body()
            .ends_with("https://jira.example.com/browse/PROJ-1"));
    }

    #[tokio::test]
    async fn test_unknown_assignee_sends_missing_user_mail() {
        let b = bridge(FakeCrm::populated());
        let mut issue = proj1();
        issue.assignee_email = Some("temp@x.com".to_string());

        assert_eq!(
            b.handler.on_issue_created(&issue).await,
            SyncOutcome::MissingContact
        );
        assert_eq!(b.crm.case_count(), 0);

        let sent = b.mail.sent();
        assert_eq!(sent.len(), 1);
        match &sent[0] {
            Notification::MissingContact {
                party,
                unmatched_email,
                ..
            } => {
                assert_eq!(*party, MissingParty::User);
                assert_eq!(unmatched_email, "temp@x.com");
            }
            other => panic!("unexpected notification: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_invalid_credentials() {
        let b = bridge(FakeCrm {
            reject_login: true,
            ..FakeCrm::populated()
        });

        let outcome = b.handler.on_issue_created(&proj1()).await;
        assert!(matches!(outcome, SyncOutcome::Unsynced { .. }));

        assert_eq!(b.crm.calls(), vec!["login"]);
        assert_eq!(
            b.fields.get(CustomField::SyncStatus).as_deref(),
            Some("Unsynced")
        );

        let sent = b.mail.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        let (recipients, notification) = &sent[0];
        assert!(recipients.contains("support@example.com"));
        assert_eq!(
            notification.subject(),
            "Jira-Salesforce Sync Failed: PROJ-1"
        );
        assert!(notification.body().contains("INVALID_LOGIN"));
    }

    #[tokio::test]
    async fn test_stale_case_id_marks_unsynced() {
        let b = bridge(FakeCrm::populated());
        let mut issue = proj1();
        issue.existing_case_id = Some("500999".to_string());

        let outcome = b.handler.on_issue_closed(&issue).await;
        match outcome {
            SyncOutcome::Unsynced { error } => assert!(error.contains("500999")),
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(
            b.fields.get(CustomField::SyncStatus).as_deref(),
            Some("Unsynced")
        );
        assert_eq!(b.mail.sent().len(), 1);
    }
}

mod config_tests {
    use super::*;

    const CONFIG: &str = r#"
salesforce:
  username: ops@example.com
  password: hunter2
  security_token: TOKEN
jira:
  url: https://jira.example.com
  token: secret
sync:
  tracked_projects: "PROJ;OPS"
  notify_emails: "support@example.com, leads@example.com"
"#;

    #[test]
    fn test_config_file_to_sync_config() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.yaml");
        std::fs::write(&path, CONFIG).unwrap();

        let config = BridgeConfig::load(&path).unwrap();
        let sync = config.sync_config().unwrap();

        assert_eq!(sync.login_password(), "hunter2TOKEN");
        assert!(sync.tracks_project("ops"));
        assert_eq!(sync.notify_emails.len(), 2);
        assert!(casebridge::config::validate_config(&config).is_ok());
    }

    #[tokio::test]
    async fn test_loaded_config_drives_handler() {
        let config = BridgeConfig::parse(CONFIG).unwrap();
        let crm = Arc::new(FakeCrm::populated());
        let fields = Arc::new(FakeIssueFields::default());
        let mail = Arc::new(FakeMail::default());
        let handler = IssueSyncHandler::new(
            config.sync_config().unwrap(),
            crm.clone(),
            fields.clone(),
            mail.clone(),
        )
        .with_issue_url_base(config.jira.url.as_str());

        let mut issue = proj1();
        issue.key = "OPS-3".to_string();
        issue.project_key = "OPS".to_string();

        assert!(matches!(
            handler.on_issue_created(&issue).await,
            SyncOutcome::Synced { .. }
        ));
        assert_eq!(crm.case("500001").unwrap().external_key, "OPS-3");
    }
}
