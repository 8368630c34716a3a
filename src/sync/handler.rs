//! Per-event state machine
//!
//! Each event is handled to completion: authenticate, resolve identities,
//! create/update/close the case, mirror the result onto the issue. Every error
//! is absorbed here and turned into a [`SyncOutcome`].

use super::{apply_crm_result_to_issue, plan, SyncOutcome, SyncPlan};
use crate::config::SyncConfig;
use crate::crm::{CrmGateway, CrmSession};
use crate::error::MissingParty;
use crate::host::FieldStore;
use crate::model::{
    AccountMirror, CaseUpdate, ContactInfo, CrmMirror, EventKind, FieldUpdates, IssueSnapshot,
    NewCase, SyncStatus,
};
use crate::notify::{Notification, Notifier};
use crate::{BridgeError, Result};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Handles issue events against the CRM
pub struct IssueSyncHandler {
    config: SyncConfig,
    crm: Arc<dyn CrmGateway>,
    fields: Arc<dyn FieldStore>,
    notifier: Arc<dyn Notifier>,
    issue_url_base: String,
    record_url_base: Option<String>,
}

impl IssueSyncHandler {
    pub fn new(
        config: SyncConfig,
        crm: Arc<dyn CrmGateway>,
        fields: Arc<dyn FieldStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            config,
            crm,
            fields,
            notifier,
            issue_url_base: String::new(),
            record_url_base: None,
        }
    }

    /// Base URL of the issue tracker, used for links in notifications
    pub fn with_issue_url_base(mut self, url: impl Into<String>) -> Self {
        self.issue_url_base = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Base URL for account links; defaults to the CRM instance URL
    pub fn with_record_url_base(mut self, url: Option<String>) -> Self {
        self.record_url_base = url;
        self
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub async fn on_issue_created(&self, issue: &IssueSnapshot) -> SyncOutcome {
        self.handle(EventKind::Created, issue).await
    }

    pub async fn on_issue_updated(&self, issue: &IssueSnapshot) -> SyncOutcome {
        self.handle(EventKind::Updated, issue).await
    }

    pub async fn on_issue_closed(&self, issue: &IssueSnapshot) -> SyncOutcome {
        self.handle(EventKind::Closed, issue).await
    }

    pub async fn on_issue_resolved(&self, issue: &IssueSnapshot) -> SyncOutcome {
        self.handle(EventKind::Resolved, issue).await
    }

    pub async fn on_issue_assigned(&self, issue: &IssueSnapshot) -> SyncOutcome {
        self.handle(EventKind::Assigned, issue).await
    }

    pub async fn on_issue_started(&self, issue: &IssueSnapshot) -> SyncOutcome {
        self.handle(EventKind::Started, issue).await
    }

    /// Process one event; never fails, the outcome says what happened
    pub async fn handle(&self, kind: EventKind, issue: &IssueSnapshot) -> SyncOutcome {
        let plan = plan(&self.config, kind, issue);
        debug!(issue = %issue.key, event = %kind, plan = ?plan, "Planned issue event");

        let result = match &plan {
            SyncPlan::Ignore(reason) => {
                debug!(issue = %issue.key, event = %kind, reason = %reason, "Event skipped");
                return SyncOutcome::Skipped(*reason);
            }
            SyncPlan::CreateCase => self.create_case(issue).await,
            SyncPlan::UpdateCase { case_id } => self.update_case(issue, case_id).await,
            SyncPlan::CloseCase { case_id } => self.close_case(issue, case_id).await,
        };

        match result {
            Ok(case_id) => {
                info!(issue = %issue.key, event = %kind, case_id = %case_id, "Issue synced");
                SyncOutcome::Synced { case_id }
            }
            Err(BridgeError::MissingMapping { party, email }) => {
                warn!(issue = %issue.key, party = %party, email = %email, "No CRM match");
                self.notify(self.missing_contact(issue, party, email)).await;
                SyncOutcome::MissingContact
            }
            Err(e) => {
                error!(issue = %issue.key, event = %kind, error = %e, "Issue sync failed");
                self.mark_unsynced(issue).await;
                let error = e.to_string();
                self.notify(Notification::SyncFailed {
                    issue_key: issue.key.clone(),
                    issue_url: self.issue_url(&issue.key),
                    error: error.clone(),
                })
                .await;
                SyncOutcome::Unsynced { error }
            }
        }
    }

    async fn create_case(&self, issue: &IssueSnapshot) -> Result<String> {
        let session = self.crm.authenticate().await?;
        let contact = self.require_contact(&session, issue).await?;

        let assignee = required_email(issue.assignee_email(), "assignee")?;
        let owner = self
            .crm
            .find_user_by_email(&session, assignee)
            .await?
            .ok_or_else(|| BridgeError::MissingMapping {
                party: MissingParty::User,
                email: assignee.to_string(),
            })?;

        // Everything the fields need is fetched before the case exists.
        let account = self.resolve_account(&session, &contact).await?;

        let case_id = self
            .crm
            .create_case(&session, &NewCase::for_issue(issue, &contact, &owner))
            .await?;

        let mirror = CrmMirror {
            case_id: case_id.clone(),
            contact,
            account,
        };
        self.write_mirror(issue, &mirror).await.map_err(|e| {
            BridgeError::Jira(format!(
                "case {} was created but could not be recorded: {}",
                case_id, e
            ))
        })?;
        Ok(case_id)
    }

    async fn update_case(&self, issue: &IssueSnapshot, case_id: &str) -> Result<String> {
        let session = self.crm.authenticate().await?;
        let contact = self.require_contact(&session, issue).await?;
        let account = self.resolve_account(&session, &contact).await?;

        self.crm
            .update_case(&session, case_id, &CaseUpdate::for_issue(issue, &contact))
            .await?;

        let mirror = CrmMirror {
            case_id: case_id.to_string(),
            contact,
            account,
        };
        self.write_mirror(issue, &mirror).await?;
        Ok(case_id.to_string())
    }

    async fn close_case(&self, issue: &IssueSnapshot, case_id: &str) -> Result<String> {
        let session = self.crm.authenticate().await?;
        self.crm.close_case(&session, case_id).await?;

        let updates = FieldUpdates::status(SyncStatus::Synced).changed_from(&issue.mirrored);
        if !updates.is_empty() {
            self.fields.write_fields(&issue.key, &updates).await?;
        }
        Ok(case_id.to_string())
    }

    async fn require_contact(
        &self,
        session: &CrmSession,
        issue: &IssueSnapshot,
    ) -> Result<ContactInfo> {
        let reporter = required_email(issue.reporter_email(), "reporter")?;
        self.crm
            .find_contact_by_email(session, reporter)
            .await?
            .ok_or_else(|| BridgeError::MissingMapping {
                party: MissingParty::Contact,
                email: reporter.to_string(),
            })
    }

    async fn resolve_account(
        &self,
        session: &CrmSession,
        contact: &ContactInfo,
    ) -> Result<Option<AccountMirror>> {
        let Some(account_id) = contact.account_id.as_deref() else {
            debug!(contact_id = %contact.id, "Contact has no account");
            return Ok(None);
        };

        let Some(account) = self.crm.find_account_by_id(session, account_id).await? else {
            warn!(contact_id = %contact.id, account_id = %account_id, "Account not found");
            return Ok(None);
        };

        let owner_name = match account.owner_id.as_deref() {
            Some(owner_id) => self
                .crm
                .find_user_name_by_id(session, owner_id)
                .await?
                .unwrap_or_default(),
            None => String::new(),
        };

        let base = self
            .record_url_base
            .as_deref()
            .unwrap_or_else(|| session.instance_url());

        Ok(Some(AccountMirror {
            name: account.name,
            url: format!("{}/{}", base.trim_end_matches('/'), account_id),
            owner_name,
        }))
    }

    async fn write_mirror(&self, issue: &IssueSnapshot, mirror: &CrmMirror) -> Result<()> {
        let updates = apply_crm_result_to_issue(mirror).changed_from(&issue.mirrored);
        if updates.is_empty() {
            debug!(issue = %issue.key, "Custom fields already current");
            return Ok(());
        }
        self.fields.write_fields(&issue.key, &updates).await
    }

    async fn mark_unsynced(&self, issue: &IssueSnapshot) {
        let updates = FieldUpdates::status(SyncStatus::Unsynced).changed_from(&issue.mirrored);
        if updates.is_empty() {
            return;
        }
        if let Err(e) = self.fields.write_fields(&issue.key, &updates).await {
            warn!(issue = %issue.key, error = %e, "Could not flag issue as unsynced");
        }
    }

    async fn notify(&self, notification: Notification) {
        if let Err(e) = self
            .notifier
            .send(&self.config.notify_emails, &notification)
            .await
        {
            warn!(
                issue = %notification.issue_key(),
                error = %e,
                "Notification could not be delivered"
            );
        }
    }

    fn missing_contact(
        &self,
        issue: &IssueSnapshot,
        party: MissingParty,
        email: String,
    ) -> Notification {
        Notification::MissingContact {
            issue_key: issue.key.clone(),
            issue_url: self.issue_url(&issue.key),
            reporter_name: issue.reporter_display().to_string(),
            reporter_email: issue.reporter_email().unwrap_or_default().to_string(),
            party,
            unmatched_email: email,
        }
    }

    fn issue_url(&self, key: &str) -> String {
        format!("{}/browse/{}", self.issue_url_base, key)
    }
}

fn required_email<'a>(email: Option<&'a str>, role: &str) -> Result<&'a str> {
    email.ok_or_else(|| BridgeError::Other(format!("issue has no {} email", role)))
}
