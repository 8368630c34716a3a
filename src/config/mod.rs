//! Configuration system
//!
//! Loads ~/.config/casebridge/config.yaml with support for:
//! - Salesforce credentials (inline or from environment variables)
//! - JIRA connection and custom-field names
//! - Tracked projects and notification recipients
//! - SMTP and webhook listener settings

mod bridge_config;
pub mod validation;

pub use bridge_config::{
    split_list, split_recipients, BridgeConfig, FieldNames, JiraSettings, MailSecurity, MailSettings,
    SalesforceSettings, ServerSettings, SyncConfig, SyncSettings,
};
pub use validation::{validate_config, validate_config_result, ValidationError};
