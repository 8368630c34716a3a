//! casebridge configuration file handling
//!
//! Loads and manages the ~/.config/casebridge/config.yaml file.

use crate::model::CustomField;
use crate::{BridgeError, Result};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

/// Salesforce connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SalesforceSettings {
    /// Login username
    pub username: String,

    /// Password (prefer `password_env`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// Environment variable holding the password
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_env: Option<String>,

    /// Security token appended to the password at login
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security_token: Option<String>,

    /// Environment variable holding the security token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security_token_env: Option<String>,

    /// Login host (use https://test.salesforce.com for sandboxes)
    #[serde(default = "default_login_url")]
    pub login_url: String,

    /// SOAP API version
    #[serde(default = "default_api_version")]
    pub api_version: String,

    /// API name of the Case field holding the issue key
    #[serde(default = "default_external_key_field")]
    pub case_external_key_field: String,

    /// Base for account links; defaults to the instance URL returned by login
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record_url_base: Option<String>,
}

fn default_login_url() -> String {
    "https://login.salesforce.com".to_string()
}

fn default_api_version() -> String {
    "59.0".to_string()
}

fn default_external_key_field() -> String {
    "Jira_id__c".to_string()
}

/// Display names of the managed JIRA custom fields
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldNames {
    pub account_name: String,
    pub account_url: String,
    pub account_owner: String,
    pub contact_name: String,
    pub contact_email: String,
    pub contact_phone: String,
    pub case_id: String,
    pub sync_status: String,
}

impl Default for FieldNames {
    fn default() -> Self {
        Self {
            account_name: CustomField::AccountName.default_name().to_string(),
            account_url: CustomField::AccountUrl.default_name().to_string(),
            account_owner: CustomField::AccountOwner.default_name().to_string(),
            contact_name: CustomField::ContactName.default_name().to_string(),
            contact_email: CustomField::ContactEmail.default_name().to_string(),
            contact_phone: CustomField::ContactPhone.default_name().to_string(),
            case_id: CustomField::CaseId.default_name().to_string(),
            sync_status: CustomField::SyncStatus.default_name().to_string(),
        }
    }
}

impl FieldNames {
    pub fn name(&self, field: CustomField) -> &str {
        match field {
            CustomField::AccountName => &self.account_name,
            CustomField::AccountUrl => &self.account_url,
            CustomField::AccountOwner => &self.account_owner,
            CustomField::ContactName => &self.contact_name,
            CustomField::ContactEmail => &self.contact_email,
            CustomField::ContactPhone => &self.contact_phone,
            CustomField::CaseId => &self.case_id,
            CustomField::SyncStatus => &self.sync_status,
        }
    }

    /// Reverse lookup by display name (case-insensitive)
    pub fn field_named(&self, name: &str) -> Option<CustomField> {
        CustomField::ALL
            .into_iter()
            .find(|field| self.name(*field).eq_ignore_ascii_case(name.trim()))
    }
}

/// JIRA connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JiraSettings {
    /// JIRA instance URL
    pub url: String,

    /// Username for basic auth; without it the token is sent as a bearer token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// Environment variable holding the API token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_env: Option<String>,

    #[serde(default)]
    pub fields: FieldNames,
}

impl JiraSettings {
    /// Browser link to an issue
    pub fn issue_url(&self, key: &str) -> String {
        format!("{}/browse/{}", self.url.trim_end_matches('/'), key)
    }
}

/// Which issues to sync and who hears about failures
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncSettings {
    /// Project keys to sync; a list or a delimited string ("PROJ, OPS")
    #[serde(deserialize_with = "delimited_list")]
    pub tracked_projects: Vec<String>,

    /// Notification recipients; a list or a string delimited by `,` or `;`
    #[serde(default, deserialize_with = "recipient_list")]
    pub notify_emails: Vec<String>,
}

/// How the SMTP connection is secured
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MailSecurity {
    #[default]
    Starttls,
    Tls,
    None,
}

/// Outbound mail settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailSettings {
    pub smtp_host: String,

    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,

    #[serde(default)]
    pub security: MailSecurity,

    /// Sender address
    pub from: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_env: Option<String>,
}

fn default_smtp_port() -> u16 {
    587
}

impl MailSettings {
    /// SMTP password, if any is configured
    pub fn resolve_password(&self) -> Option<String> {
        resolve_secret(self.password.as_deref(), self.password_env.as_deref())
    }
}

/// Webhook listener settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Shared secret expected in the `secret` query parameter
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook_secret: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook_secret_env: Option<String>,

    /// Request body size limit in bytes
    #[serde(default = "default_max_body_size")]
    pub max_body_size: usize,
}

fn default_listen() -> String {
    "127.0.0.1:8088".to_string()
}

fn default_max_body_size() -> usize {
    2 * 1024 * 1024
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            webhook_secret: None,
            webhook_secret_env: None,
            max_body_size: default_max_body_size(),
        }
    }
}

impl ServerSettings {
    pub fn resolve_secret(&self) -> Option<String> {
        resolve_secret(
            self.webhook_secret.as_deref(),
            self.webhook_secret_env.as_deref(),
        )
    }
}

/// The settings the event handler runs with, secrets resolved
///
/// Built once at startup and never mutated while events are processed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncConfig {
    pub crm_username: String,
    pub crm_password: String,
    pub crm_security_token: String,
    pub notify_emails: BTreeSet<String>,
    pub tracked_project_keys: BTreeSet<String>,
}

impl SyncConfig {
    /// Whether events for this project should be processed (case-insensitive)
    pub fn tracks_project(&self, project_key: &str) -> bool {
        let key = project_key.trim();
        self.tracked_project_keys
            .iter()
            .any(|tracked| tracked.eq_ignore_ascii_case(key))
    }

    /// Password and security token as Salesforce expects them at login
    pub fn login_password(&self) -> String {
        format!("{}{}", self.crm_password, self.crm_security_token)
    }
}

/// casebridge configuration
///
/// Represents the complete ~/.config/casebridge/config.yaml file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    pub salesforce: SalesforceSettings,

    pub jira: JiraSettings,

    pub sync: SyncSettings,

    /// Outbound mail; without it notifications are only logged
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mail: Option<MailSettings>,

    #[serde(default)]
    pub server: ServerSettings,
}

impl BridgeConfig {
    /// Load configuration from the default path (~/.config/casebridge/config.yaml)
    pub fn load_default() -> Result<Self> {
        let path = Self::default_path();
        Self::load(&path)
    }

    /// Load configuration from a specific path
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(BridgeError::Config(format!(
                "Config file not found: {}",
                path.display()
            )));
        }

        tracing::info!(path = %path.display(), "Loading casebridge configuration");

        let content = fs::read_to_string(path)?;
        let config = Self::parse(&content)?;

        tracing::debug!(
            tracked_projects = config.sync.tracked_projects.len(),
            notify_emails = config.sync.notify_emails.len(),
            mail = config.mail.is_some(),
            "Configuration loaded successfully"
        );

        Ok(config)
    }

    /// Parse configuration from YAML text
    pub fn parse(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Save configuration to a specific path
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        tracing::info!(path = %path.display(), "Saving casebridge configuration");

        let yaml = serde_yaml::to_string(self)?;
        fs::write(path, yaml)?;

        Ok(())
    }

    /// Get the default config path (~/.config/casebridge/config.yaml)
    pub fn default_path() -> PathBuf {
        let mut path = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        path.push(".config");
        path.push("casebridge");
        path.push("config.yaml");
        path
    }

    /// Resolve secrets and build the handler's settings
    pub fn sync_config(&self) -> Result<SyncConfig> {
        let sf = &self.salesforce;
        let crm_password = resolve_secret(sf.password.as_deref(), sf.password_env.as_deref())
            .ok_or_else(|| {
                BridgeError::Config(
                    "salesforce.password or salesforce.password_env must be set".to_string(),
                )
            })?;
        let crm_security_token =
            resolve_secret(sf.security_token.as_deref(), sf.security_token_env.as_deref())
                .unwrap_or_default();

        Ok(SyncConfig {
            crm_username: sf.username.trim().to_string(),
            crm_password,
            crm_security_token,
            notify_emails: self.sync.notify_emails.iter().cloned().collect(),
            tracked_project_keys: self.sync.tracked_projects.iter().cloned().collect(),
        })
    }

    /// JIRA API token, if any is configured
    pub fn jira_token(&self) -> Option<String> {
        resolve_secret(self.jira.token.as_deref(), self.jira.token_env.as_deref())
    }
}

/// An environment variable wins over an inline value; empty values count as unset.
fn resolve_secret(inline: Option<&str>, env_var: Option<&str>) -> Option<String> {
    env_var
        .and_then(|name| std::env::var(name.trim_start_matches('$')).ok())
        .filter(|v| !v.is_empty())
        .or_else(|| inline.map(str::to_string).filter(|v| !v.is_empty()))
}

/// Split a delimited list; commas, semicolons, apostrophes and whitespace all
/// separate entries.
pub fn split_list(raw: &str) -> Vec<String> {
    raw.split(|c: char| c == ',' || c == ';' || c == '\'' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Split a recipient list on commas and semicolons only, so display names
/// such as `Ops Team <ops@example.com>` survive intact.
pub fn split_recipients(raw: &str) -> Vec<String> {
    raw.split([',', ';'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawList {
    One(String),
    Many(Vec<String>),
}

impl RawList {
    fn split(self, split: fn(&str) -> Vec<String>) -> Vec<String> {
        match self {
            RawList::One(s) => split(&s),
            RawList::Many(items) => items.iter().flat_map(|item| split(item)).collect(),
        }
    }
}

fn delimited_list<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(RawList::deserialize(deserializer)?.split(split_list))
}

fn recipient_list<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(RawList::deserialize(deserializer)?.split(split_recipients))
}
