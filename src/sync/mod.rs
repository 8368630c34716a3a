//! Issue-to-case synchronization
//!
//! Deciding what an event means is a pure function ([`plan`]); carrying it out
//! against the CRM, the issue tracker and the notification list is the job of
//! [`IssueSyncHandler`].

mod handler;

pub use handler::IssueSyncHandler;

use crate::config::SyncConfig;
use crate::model::{
    CrmMirror, CustomField, EventAction, EventKind, FieldUpdates, IssueSnapshot, SyncStatus,
};
use std::fmt;

/// Why an event needs no remote work
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// The issue's project is not in the tracked set
    UntrackedProject,
    /// A close/resolve event for an issue that never got a case
    NoCaseToClose,
    /// No reporter, or no assignee when a case would be created
    MissingParticipants,
}

impl fmt::Display for IgnoreReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IgnoreReason::UntrackedProject => write!(f, "project not tracked"),
            IgnoreReason::NoCaseToClose => write!(f, "no case to close"),
            IgnoreReason::MissingParticipants => write!(f, "reporter or assignee not set"),
        }
    }
}

/// What to do for one event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncPlan {
    Ignore(IgnoreReason),
    CreateCase,
    UpdateCase { case_id: String },
    CloseCase { case_id: String },
}

/// How an event ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    Skipped(IgnoreReason),
    Synced { case_id: String },
    /// A remote call failed; the issue is flagged and the list notified
    Unsynced { error: String },
    /// Reporter or assignee has no CRM record; nothing was written
    MissingContact,
}

impl fmt::Display for SyncOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncOutcome::Skipped(reason) => write!(f, "skipped ({})", reason),
            SyncOutcome::Synced { case_id } => write!(f, "synced (case {})", case_id),
            SyncOutcome::Unsynced { error } => write!(f, "unsynced: {}", error),
            SyncOutcome::MissingContact => write!(f, "missing CRM contact or user"),
        }
    }
}

/// Decide what an event requires
///
/// A non-blank case id is the only signal that a case already exists, so an
/// issue gets at most one case no matter how many events arrive.
pub fn plan(config: &SyncConfig, kind: EventKind, issue: &IssueSnapshot) -> SyncPlan {
    if !config.tracks_project(&issue.project_key) {
        return SyncPlan::Ignore(IgnoreReason::UntrackedProject);
    }

    match (kind.action(), issue.case_id()) {
        (EventAction::Close, Some(case_id)) => SyncPlan::CloseCase {
            case_id: case_id.to_string(),
        },
        (EventAction::Close, None) => SyncPlan::Ignore(IgnoreReason::NoCaseToClose),
        (EventAction::Upsert, Some(case_id)) => {
            if issue.reporter_email().is_none() {
                SyncPlan::Ignore(IgnoreReason::MissingParticipants)
            } else {
                SyncPlan::UpdateCase {
                    case_id: case_id.to_string(),
                }
            }
        }
        (EventAction::Upsert, None) => {
            if issue.reporter_email().is_none() || issue.assignee_email().is_none() {
                SyncPlan::Ignore(IgnoreReason::MissingParticipants)
            } else {
                SyncPlan::CreateCase
            }
        }
    }
}

/// Custom-field values mirroring a synced case; absent values clear the field
pub fn apply_crm_result_to_issue(mirror: &CrmMirror) -> FieldUpdates {
    let mut updates = FieldUpdates::status(SyncStatus::Synced);
    updates.set(CustomField::CaseId, mirror.case_id.as_str());
    updates.set(CustomField::ContactName, mirror.contact.name.as_str());
    updates.set(CustomField::ContactEmail, mirror.contact.email.as_str());
    updates.set(
        CustomField::ContactPhone,
        mirror.contact.phone.clone().unwrap_or_default(),
    );

    match &mirror.account {
        Some(account) => {
            updates.set(CustomField::AccountName, account.name.as_str());
            updates.set(CustomField::AccountUrl, account.url.as_str());
            updates.set(CustomField::AccountOwner, account.owner_name.as_str());
        }
        None => {
            updates.set(CustomField::AccountName, "");
            updates.set(CustomField::AccountUrl, "");
            updates.set(CustomField::AccountOwner, "");
        }
    }
    updates
}
