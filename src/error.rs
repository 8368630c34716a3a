//! Error types for casebridge
//!
//! One enum covers every failure mode of an event: CRM authentication, CRM
//! reads and writes, unmatched identities, JIRA field writes, and the ambient
//! configuration/IO errors around them. Uses thiserror for ergonomic error
//! handling.

use thiserror::Error;

/// Result type alias for casebridge operations
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Which side of an issue could not be matched to a CRM record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingParty {
    /// No Contact has the reporter's email
    Contact,
    /// No User has the assignee's email
    User,
}

impl std::fmt::Display for MissingParty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MissingParty::Contact => write!(f, "contact"),
            MissingParty::User => write!(f, "user"),
        }
    }
}

/// Comprehensive error type for casebridge operations
#[derive(Error, Debug)]
pub enum BridgeError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// CRM login failed (bad credentials, locked org, maintenance window)
    #[error("Salesforce authentication failed: {0}")]
    Auth(String),

    /// A CRM query failed
    #[error("Salesforce query failed: {0}")]
    RemoteQuery(String),

    /// A CRM create/update failed
    #[error("Salesforce write failed: {0}")]
    RemoteWrite(String),

    /// No CRM record matches the issue's reporter or assignee
    #[error("No Salesforce {party} found for {email}")]
    MissingMapping { party: MissingParty, email: String },

    /// Reading or writing JIRA failed
    #[error("JIRA error: {0}")]
    Jira(String),

    /// Sending a notification failed
    #[error("Notification error: {0}")]
    Notify(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Other errors
    #[error("{0}")]
    Other(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_mapping_message() {
        let err = BridgeError::MissingMapping {
            party: MissingParty::Contact,
            email: "a@x.com".to_string(),
        };
        assert_eq!(err.to_string(), "No Salesforce contact found for a@x.com");
    }

    #[test]
    fn test_auth_error_message() {
        let err = BridgeError::Auth("INVALID_LOGIN".to_string());
        assert!(err.to_string().contains("INVALID_LOGIN"));
    }
}
