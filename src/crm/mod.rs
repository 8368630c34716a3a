//! CRM gateway
//!
//! [`CrmGateway`] is the seam between the sync handler and Salesforce. Every
//! method is a single request/response against a session opened by
//! [`CrmGateway::authenticate`]; sessions live for one event and are never
//! reused.
//!
//! Lookups by email may match several records. The first one returned wins
//! and the ambiguity is logged.

mod salesforce;

pub use salesforce::SalesforceGateway;

use crate::model::{AccountInfo, CaseUpdate, ContactInfo, NewCase, UserInfo};
use crate::Result;
use async_trait::async_trait;

/// Authenticated CRM handle: endpoint plus session token
pub type CrmSession = sforce::Session;

#[async_trait]
pub trait CrmGateway: Send + Sync {
    /// Open a session; fails with `BridgeError::Auth`
    async fn authenticate(&self) -> Result<CrmSession>;

    async fn find_contact_by_email(
        &self,
        session: &CrmSession,
        email: &str,
    ) -> Result<Option<ContactInfo>>;

    async fn find_user_by_email(&self, session: &CrmSession, email: &str)
        -> Result<Option<UserInfo>>;

    async fn find_account_by_id(
        &self,
        session: &CrmSession,
        account_id: &str,
    ) -> Result<Option<AccountInfo>>;

    async fn find_user_name_by_id(
        &self,
        session: &CrmSession,
        user_id: &str,
    ) -> Result<Option<String>>;

    /// Create a case and return its id
    async fn create_case(&self, session: &CrmSession, case: &NewCase) -> Result<String>;

    async fn update_case(
        &self,
        session: &CrmSession,
        case_id: &str,
        update: &CaseUpdate,
    ) -> Result<()>;

    /// Set the case status to Closed
    async fn close_case(&self, session: &CrmSession, case_id: &str) -> Result<()>;
}
