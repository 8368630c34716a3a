//! Salesforce implementation of [`CrmGateway`] over the SOAP API

use super::{CrmGateway, CrmSession};
use crate::config::{SalesforceSettings, SyncConfig};
use crate::model::{AccountInfo, CaseStatus, CaseUpdate, ContactInfo, NewCase, UserInfo};
use crate::{BridgeError, Result};
use async_trait::async_trait;
use sforce::{soql, Client, Fields, SObject};
use tracing::{debug, info, warn};

const CONTACT_FIELDS: &[&str] = &["Id", "AccountId", "Name", "Phone", "Email"];

/// Salesforce CRM gateway
pub struct SalesforceGateway {
    client: Client,
    username: String,
    login_password: String,
    external_key_field: String,
}

impl SalesforceGateway {
    /// Create a gateway from the connection settings and resolved credentials
    pub fn new(settings: &SalesforceSettings, sync: &SyncConfig) -> Result<Self> {
        let client = Client::new(&settings.login_url, &settings.api_version)
            .map_err(|e| BridgeError::Config(format!("Cannot build Salesforce client: {}", e)))?;
        Ok(Self {
            client,
            username: sync.crm_username.clone(),
            login_password: sync.login_password(),
            external_key_field: settings.case_external_key_field.clone(),
        })
    }

    async fn query(
        &self,
        session: &CrmSession,
        fields: &[&str],
        object: &str,
        field: &str,
        value: &str,
    ) -> Result<Vec<Fields>> {
        let query = soql::select_where_eq(fields, object, field, value);
        self.client
            .query(session, &query)
            .await
            .map_err(|e| BridgeError::RemoteQuery(e.to_string()))
    }

    /// First record of a lookup; extra matches are logged and ignored
    fn first_match(records: Vec<Fields>, object: &str, value: &str) -> Option<Fields> {
        if records.len() > 1 {
            warn!(
                object = %object,
                value = %value,
                matches = records.len(),
                "Several Salesforce records match, using the first"
            );
        }
        records.into_iter().next()
    }

    /// Read a case, failing when the id no longer resolves
    async fn require_case(
        &self,
        session: &CrmSession,
        case_id: &str,
        fields: &[&str],
    ) -> Result<Fields> {
        let records = self.query(session, fields, "Case", "Id", case_id).await?;
        records
            .into_iter()
            .next()
            .ok_or_else(|| BridgeError::RemoteQuery(format!("Case {} not found", case_id)))
    }

    fn case_object(&self, case: &NewCase) -> SObject {
        let mut object = SObject::new("Case")
            .with("OwnerId", case.owner_id.as_str())
            .with("ContactId", case.contact_id.as_str());
        object.set("AccountId", case.account_id.clone());
        object.set("Status", Some(case.status.as_str().to_string()));
        object.set("Type", Some(case.case_type.clone()));
        object.set("Subject", Some(case.subject.clone()));
        object.set("Description", Some(case.description.clone()));
        object.set("Origin", Some(case.origin.clone()));
        object.set(
            self.external_key_field.as_str(),
            Some(case.external_key.clone()),
        );
        object
    }

    fn update_object(case_id: &str, update: &CaseUpdate) -> SObject {
        let mut object = SObject::existing("Case", case_id);
        object.set("ContactId", Some(update.contact_id.clone()));
        object.set("AccountId", update.account_id.clone());
        object.set("Subject", Some(update.subject.clone()));
        object.set("Description", Some(update.description.clone()));
        object
    }
}

fn required(record: &Fields, field: &str, object: &str) -> Result<String> {
    record
        .get(field)
        .cloned()
        .ok_or_else(|| BridgeError::RemoteQuery(format!("{} record without {}", object, field)))
}

fn optional(record: &Fields, field: &str) -> Option<String> {
    record.get(field).filter(|v| !v.is_empty()).cloned()
}

fn contact_from(record: &Fields) -> Result<ContactInfo> {
    Ok(ContactInfo {
        id: required(record, "Id", "Contact")?,
        account_id: optional(record, "AccountId"),
        name: optional(record, "Name").unwrap_or_default(),
        phone: optional(record, "Phone"),
        email: optional(record, "Email").unwrap_or_default(),
    })
}

#[async_trait]
impl CrmGateway for SalesforceGateway {
    async fn authenticate(&self) -> Result<CrmSession> {
        self.client
            .login(&self.username, &self.login_password)
            .await
            .map_err(|e| {
                if e.is_credential_fault() {
                    BridgeError::Auth(format!(
                        "{} (check the configured Salesforce username, password and security token)",
                        e
                    ))
                } else {
                    BridgeError::Auth(e.to_string())
                }
            })
    }

    async fn find_contact_by_email(
        &self,
        session: &CrmSession,
        email: &str,
    ) -> Result<Option<ContactInfo>> {
        let records = self
            .query(session, CONTACT_FIELDS, "Contact", "Email", email)
            .await?;
        Self::first_match(records, "Contact", email)
            .map(|record| contact_from(&record))
            .transpose()
    }

    async fn find_user_by_email(
        &self,
        session: &CrmSession,
        email: &str,
    ) -> Result<Option<UserInfo>> {
        let records = self
            .query(session, &["Id", "Name"], "User", "Email", email)
            .await?;
        Self::first_match(records, "User", email)
            .map(|record| {
                Ok(UserInfo {
                    id: required(&record, "Id", "User")?,
                    name: optional(&record, "Name").unwrap_or_default(),
                })
            })
            .transpose()
    }

    async fn find_account_by_id(
        &self,
        session: &CrmSession,
        account_id: &str,
    ) -> Result<Option<AccountInfo>> {
        let records = self
            .query(session, &["Name", "OwnerId"], "Account", "Id", account_id)
            .await?;
        Ok(records.into_iter().next().map(|record| AccountInfo {
            name: optional(&record, "Name").unwrap_or_default(),
            owner_id: optional(&record, "OwnerId"),
        }))
    }

    async fn find_user_name_by_id(
        &self,
        session: &CrmSession,
        user_id: &str,
    ) -> Result<Option<String>> {
        let records = self.query(session, &["Name"], "User", "Id", user_id).await?;
        Ok(records
            .into_iter()
            .next()
            .and_then(|record| optional(&record, "Name")))
    }

    async fn create_case(&self, session: &CrmSession, case: &NewCase) -> Result<String> {
        let id = self
            .client
            .create(session, self.case_object(case))
            .await
            .map_err(|e| BridgeError::RemoteWrite(format!("creating case: {}", e)))?;
        info!(case_id = %id, issue = %case.external_key, "Case created");
        Ok(id)
    }

    async fn update_case(
        &self,
        session: &CrmSession,
        case_id: &str,
        update: &CaseUpdate,
    ) -> Result<()> {
        let current = self
            .require_case(session, case_id, &["Id", "ContactId"])
            .await?;
        if current.get("ContactId").map(String::as_str) != Some(update.contact_id.as_str()) {
            debug!(case_id = %case_id, contact_id = %update.contact_id, "Case contact changes");
        }

        self.client
            .update(session, Self::update_object(case_id, update))
            .await
            .map_err(|e| BridgeError::RemoteWrite(format!("updating case {}: {}", case_id, e)))?;
        info!(case_id = %case_id, "Case updated");
        Ok(())
    }

    async fn close_case(&self, session: &CrmSession, case_id: &str) -> Result<()> {
        let current = self
            .require_case(session, case_id, &["Id", "Status"])
            .await?;
        if is_closed(&current) {
            debug!(case_id = %case_id, "Case already closed");
            return Ok(());
        }

        let object = SObject::existing("Case", case_id).with("Status", CaseStatus::Closed.as_str());
        self.client
            .update(session, object)
            .await
            .map_err(|e| BridgeError::RemoteWrite(format!("closing case {}: {}", case_id, e)))?;
        info!(case_id = %case_id, "Case closed");
        Ok(())
    }
}

fn is_closed(case: &Fields) -> bool {
    case.get("Status").map(String::as_str) == Some(CaseStatus::Closed.as_str())
}
