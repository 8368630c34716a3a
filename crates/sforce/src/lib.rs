//! Salesforce SOAP API client for Rust
//!
//! A small, typed interface to the enterprise SOAP endpoint: log in, run SOQL
//! queries, create and update records.
//!
//! # Example
//!
//! ```no_run
//! use sforce::{Client, SObject};
//!
//! # async fn demo() -> sforce::Result<()> {
//! let client = Client::new("https://login.salesforce.com", "59.0")?;
//!
//! // Password and security token are concatenated
//! let session = client.login("ops@example.com", "hunter2TOKEN").await?;
//!
//! let contacts = client
//!     .query(&session, "SELECT Id, Name FROM Contact WHERE Email = 'a@x.com'")
//!     .await?;
//!
//! let case = SObject::new("Case").with("Subject", "Printer on fire");
//! let id = client.create(&session, case).await?;
//! println!("{} contacts, created case {}", contacts.len(), id);
//! # Ok(())
//! # }
//! ```

mod envelope;
pub mod response;
pub mod soql;

pub use envelope::{SObject, QUERY_BATCH_SIZE};
pub use response::Fields;

use reqwest::header::CONTENT_TYPE;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Per-request timeout for login and queries
const QUERY_TIMEOUT: Duration = Duration::from_secs(30);
/// Per-request timeout for create/update calls
const WRITE_TIMEOUT: Duration = Duration::from_secs(15);

/// Login fault codes that point at the configured credentials or org state
/// rather than at a bug.
pub const CREDENTIAL_FAULT_CODES: &[&str] = &[
    "FUNCTIONALITY_NOT_ENABLED",
    "INVALID_CLIENT",
    "INVALID_LOGIN",
    "LOGIN_DURING_RESTRICTED_DOMAIN",
    "LOGIN_DURING_RESTRICTED_TIME",
    "ORG_LOCKED",
    "PASSWORD_LOCKOUT",
    "SERVER_UNAVAILABLE",
    "TRIAL_EXPIRED",
    "UNSUPPORTED_CLIENT",
];

/// Errors that can occur when talking to Salesforce
#[derive(Error, Debug)]
pub enum Error {
    #[error("Login failed ({code}): {message}")]
    LoginFault { code: String, message: String },

    #[error("SOAP fault ({code}): {message}")]
    Fault { code: String, message: String },

    #[error("Save failed ({status_code}): {message}")]
    Save { status_code: String, message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected HTTP status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("XML error: {0}")]
    Xml(String),

    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl Error {
    /// True for login faults caused by credentials, lockouts or org restrictions
    pub fn is_credential_fault(&self) -> bool {
        matches!(self, Error::LoginFault { code, .. } if CREDENTIAL_FAULT_CODES.contains(&code.as_str()))
    }
}

/// Result type for Salesforce operations
pub type Result<T> = std::result::Result<T, Error>;

/// An authenticated API session
///
/// Valid until Salesforce expires it; callers here open one per unit of work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// SOAP endpoint of the org's instance, as returned by login
    pub server_url: String,
    pub session_id: String,
    pub user_id: Option<String>,
    pub password_expired: bool,
}

impl Session {
    /// Scheme and host of the instance (e.g. `https://na2.salesforce.com`),
    /// the base for record links.
    pub fn instance_url(&self) -> &str {
        let after_scheme = self.server_url.find("://").map(|i| i + 3).unwrap_or(0);
        match self.server_url[after_scheme..].find('/') {
            Some(slash) => &self.server_url[..after_scheme + slash],
            None => &self.server_url,
        }
    }
}

/// Salesforce SOAP client
#[derive(Debug, Clone)]
pub struct Client {
    http: reqwest::Client,
    login_endpoint: String,
}

impl Client {
    /// Create a client for the given login host (`https://login.salesforce.com`
    /// or `https://test.salesforce.com`) and API version.
    pub fn new(login_url: &str, api_version: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(QUERY_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            login_endpoint: Self::login_endpoint(login_url, api_version),
        })
    }

    fn login_endpoint(login_url: &str, api_version: &str) -> String {
        format!(
            "{}/services/Soap/c/{}",
            login_url.trim_end_matches('/'),
            api_version
        )
    }

    /// Log in with username and `password + security token`
    pub async fn login(&self, username: &str, password: &str) -> Result<Session> {
        debug!(username = %username, endpoint = %self.login_endpoint, "Logging in to Salesforce");

        let body = envelope::login(username, password);
        let response = match self
            .call(&self.login_endpoint, "login", body, QUERY_TIMEOUT)
            .await
        {
            Err(Error::Fault { code, message }) => {
                return Err(Error::LoginFault { code, message });
            }
            other => other?,
        };

        let result = response.first_result()?;
        let field = |name: &str| {
            result
                .fields
                .get(name)
                .cloned()
                .ok_or_else(|| Error::Protocol(format!("login result is missing {}", name)))
        };

        let session = Session {
            server_url: field("serverUrl")?,
            session_id: field("sessionId")?,
            user_id: result.fields.get("userId").cloned(),
            password_expired: result
                .fields
                .get("passwordExpired")
                .is_some_and(|v| v == "true"),
        };

        if session.password_expired {
            warn!(username = %username, "Salesforce password has expired");
        }
        info!(instance = %session.instance_url(), "Salesforce login successful");
        Ok(session)
    }

    /// Run a SOQL query and return the first batch of records
    pub async fn query(&self, session: &Session, soql: &str) -> Result<Vec<Fields>> {
        debug!(soql = %soql, "Running SOQL query");

        let body = envelope::query(&session.session_id, soql);
        let response = self
            .call(&session.server_url, "query", body, QUERY_TIMEOUT)
            .await
            .inspect_err(|e| warn!(soql = %soql, error = %e, "SOQL query failed"))?;

        let records = response
            .results
            .into_iter()
            .next()
            .map(|result| result.records)
            .unwrap_or_default();
        debug!(returned = records.len(), "SOQL query complete");
        Ok(records)
    }

    /// Create a record, returning its id
    pub async fn create(&self, session: &Session, object: SObject) -> Result<String> {
        let object_type = object.object_type.clone();
        let body = envelope::create(&session.session_id, &[object]);
        let response = self
            .call(&session.server_url, "create", body, WRITE_TIMEOUT)
            .await?;
        let id = Self::save_result(&response)?;
        info!(object = %object_type, id = %id, "Created Salesforce record");
        Ok(id)
    }

    /// Update a record; the object must carry its id
    pub async fn update(&self, session: &Session, object: SObject) -> Result<()> {
        if object.id.is_none() {
            return Err(Error::Protocol("update requires a record id".to_string()));
        }
        let object_type = object.object_type.clone();
        let body = envelope::update(&session.session_id, &[object]);
        let response = self
            .call(&session.server_url, "update", body, WRITE_TIMEOUT)
            .await?;
        let id = Self::save_result(&response)?;
        info!(object = %object_type, id = %id, "Updated Salesforce record");
        Ok(())
    }

    fn save_result(response: &response::Response) -> Result<String> {
        let result = response.first_result()?;
        if let Some(error) = result.errors.first() {
            return Err(Error::Save {
                status_code: error.status_code.clone(),
                message: error.message.clone(),
            });
        }
        match (result.fields.get("success"), result.fields.get("id")) {
            (Some(success), Some(id)) if success == "true" => Ok(id.clone()),
            _ => Err(Error::Protocol(
                "save result reported no success and no errors".to_string(),
            )),
        }
    }

    async fn call(
        &self,
        endpoint: &str,
        action: &str,
        body: String,
        timeout: Duration,
    ) -> Result<response::Response> {
        let response = self
            .http
            .post(endpoint)
            .header(CONTENT_TYPE, "text/xml; charset=UTF-8")
            .header("SOAPAction", action)
            .body(body)
            .timeout(timeout)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;

        // Faults come back as HTTP 500 with a SOAP body
        match response::parse(&text) {
            Ok(parsed) if parsed.fault.is_some() || status.is_success() => parsed.into_result(),
            Ok(_) | Err(_) if !status.is_success() => Err(Error::Status {
                status: status.as_u16(),
                body: text,
            }),
            other => other,
        }
    }
}
