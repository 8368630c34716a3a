//! Configuration validation
//!
//! Validates casebridge configuration for correctness:
//! - Required credentials resolve
//! - Valid URLs and listen address
//! - At least one tracked project
//! - Distinct custom-field names
//! - Plausible email addresses

use super::bridge_config::BridgeConfig;
use crate::model::CustomField;
use crate::BridgeError;
use std::collections::HashSet;
use std::net::SocketAddr;

/// Validation error details
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validation result
pub type ValidationResult = std::result::Result<(), Vec<ValidationError>>;

/// Validate a casebridge configuration
pub fn validate_config(config: &BridgeConfig) -> ValidationResult {
    let mut errors = Vec::new();

    let sf = &config.salesforce;
    if sf.username.trim().is_empty() {
        errors.push(ValidationError::new(
            "salesforce.username",
            "Username must not be empty",
        ));
    }
    if let Err(BridgeError::Config(msg)) = config.sync_config() {
        errors.push(ValidationError::new("salesforce.password", msg));
    }
    check_url(&mut errors, "salesforce.login_url", &sf.login_url);
    if let Some(ref base) = sf.record_url_base {
        check_url(&mut errors, "salesforce.record_url_base", base);
    }
    if sf.api_version.parse::<f32>().is_err() {
        errors.push(ValidationError::new(
            "salesforce.api_version",
            format!("Invalid API version '{}'", sf.api_version),
        ));
    }
    if sf.case_external_key_field.trim().is_empty() {
        errors.push(ValidationError::new(
            "salesforce.case_external_key_field",
            "Field name must not be empty",
        ));
    }

    check_url(&mut errors, "jira.url", &config.jira.url);
    if config.jira_token().is_none() {
        errors.push(ValidationError::new(
            "jira.token",
            "jira.token or jira.token_env must be set",
        ));
    }

    let mut seen_names = HashSet::new();
    for field in CustomField::ALL {
        let name = config.jira.fields.name(field).trim().to_lowercase();
        if name.is_empty() {
            errors.push(ValidationError::new(
                format!("jira.fields.{:?}", field),
                "Field name must not be empty",
            ));
        } else if !seen_names.insert(name) {
            errors.push(ValidationError::new(
                "jira.fields",
                format!(
                    "Duplicate field name: {}",
                    config.jira.fields.name(field)
                ),
            ));
        }
    }

    if config.sync.tracked_projects.is_empty() {
        errors.push(ValidationError::new(
            "sync.tracked_projects",
            "At least one project key must be tracked",
        ));
    }
    for email in &config.sync.notify_emails {
        if !looks_like_email(email) {
            errors.push(ValidationError::new(
                "sync.notify_emails",
                format!("Invalid email address '{}'", email),
            ));
        }
    }

    if let Some(ref mail) = config.mail {
        if mail.smtp_host.trim().is_empty() {
            errors.push(ValidationError::new(
                "mail.smtp_host",
                "SMTP host must not be empty",
            ));
        }
        if mail.smtp_port == 0 {
            errors.push(ValidationError::new(
                "mail.smtp_port",
                "Port must be greater than 0",
            ));
        }
        if !looks_like_email(&mail.from) {
            errors.push(ValidationError::new(
                "mail.from",
                format!("Invalid sender address '{}'", mail.from),
            ));
        }
    }

    if config.server.listen.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "server.listen",
            format!("Invalid listen address '{}'", config.server.listen),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Validate and convert to the crate's Result type
pub fn validate_config_result(config: &BridgeConfig) -> crate::Result<()> {
    validate_config(config).map_err(|errors| {
        let messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
        BridgeError::Config(format!(
            "Configuration validation failed:\n  - {}",
            messages.join("\n  - ")
        ))
    })
}

fn check_url(errors: &mut Vec<ValidationError>, field: &str, url: &str) {
    if !(url.starts_with("https://") || url.starts_with("http://")) {
        errors.push(ValidationError::new(
            field,
            format!("URL must start with http:// or https://, got '{}'", url),
        ));
    }
}

fn looks_like_email(value: &str) -> bool {
    match value.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.'),
        None => false,
    }
}
