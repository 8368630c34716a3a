//! Operator notifications
//!
//! Two messages exist: a request to create a missing CRM record, and a report
//! that an issue failed to sync. Delivery is best effort; the handler logs a
//! failed send and moves on.

mod smtp;

pub use smtp::{LogNotifier, SmtpNotifier};

use crate::error::MissingParty;
use crate::Result;
use async_trait::async_trait;
use std::collections::BTreeSet;

/// A message for the notification list
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// The reporter (or assignee) has no CRM counterpart
    MissingContact {
        issue_key: String,
        issue_url: String,
        reporter_name: String,
        reporter_email: String,
        party: MissingParty,
        unmatched_email: String,
    },
    /// A remote call failed and the issue is now unsynced
    SyncFailed {
        issue_key: String,
        issue_url: String,
        error: String,
    },
}

impl Notification {
    pub fn subject(&self) -> String {
        match self {
            Notification::MissingContact { reporter_name, .. } => {
                format!("Missing Jira Contact in Salesforce: {}", reporter_name)
            }
            Notification::SyncFailed { issue_key, .. } => {
                format!("Jira-Salesforce Sync Failed: {}", issue_key)
            }
        }
    }

    pub fn body(&self) -> String {
        match self {
            Notification::MissingContact {
                issue_url,
                reporter_name,
                reporter_email,
                party: MissingParty::Contact,
                ..
            } => format!(
                "Please create a corresponding contact in Salesforce for the appropriate \
                 account with the name {} and the email address {} then update the issue {}",
                reporter_name, reporter_email, issue_url
            ),
            Notification::MissingContact {
                issue_url,
                party: MissingParty::User,
                unmatched_email,
                ..
            } => format!(
                "The assignee {} has no matching Salesforce user. Please create or correct \
                 the user in Salesforce then update the issue {}",
                unmatched_email, issue_url
            ),
            Notification::SyncFailed {
                issue_url, error, ..
            } => format!("{} {}", issue_url, error),
        }
    }

    pub fn issue_key(&self) -> &str {
        match self {
            Notification::MissingContact { issue_key, .. }
            | Notification::SyncFailed { issue_key, .. } => issue_key,
        }
    }
}

/// Delivers notifications to a recipient list
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, recipients: &BTreeSet<String>, notification: &Notification)
        -> Result<()>;
}
