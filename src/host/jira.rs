//! JIRA REST client
//!
//! Reads issues and writes the managed custom fields through the v2 REST API.

use super::{FieldCatalog, FieldDefinition, FieldStore, IssueSource};
use crate::config::JiraSettings;
use crate::model::{CustomField, FieldUpdates, FieldValues, IssueSnapshot};
use crate::{BridgeError, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::time::Duration;
use tracing::{debug, info};

/// Per-request timeout for single issue and field-list fetches
const GET_TIMEOUT: Duration = Duration::from_secs(10);
/// Per-request timeout for field writes
const WRITE_TIMEOUT: Duration = Duration::from_secs(15);

const ISSUE_FIELDS: &[&str] = &[
    "summary",
    "description",
    "issuetype",
    "reporter",
    "assignee",
    "project",
];

enum Auth {
    Basic { username: String, token: String },
    Bearer(String),
    Anonymous,
}

/// JIRA API client
pub struct JiraClient {
    client: Client,
    base_url: String,
    auth: Auth,
    catalog: FieldCatalog,
}

/// Issue as returned by the REST API and embedded in webhook payloads
#[derive(Debug, Clone, Deserialize)]
pub struct JiraIssue {
    pub key: String,
    #[serde(default)]
    pub fields: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct JiraField {
    id: String,
    name: String,
    #[serde(default)]
    schema: Option<JiraFieldSchema>,
}

#[derive(Debug, Deserialize)]
struct JiraFieldSchema {
    #[serde(rename = "type", default)]
    field_type: Option<String>,
}

impl JiraClient {
    /// Create a new JIRA client
    ///
    /// With a username the token is sent as basic-auth password, otherwise as
    /// a bearer token.
    pub fn new(settings: &JiraSettings, token: Option<String>) -> Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;

        let base_url = format!("{}/rest/api/2", settings.url.trim_end_matches('/'));

        let auth = match (settings.username.clone(), token) {
            (Some(username), Some(token)) => Auth::Basic { username, token },
            (None, Some(token)) => Auth::Bearer(token),
            (_, None) => Auth::Anonymous,
        };

        Ok(Self {
            client,
            base_url,
            auth,
            catalog: FieldCatalog::default(),
        })
    }

    /// Attach the resolved custom-field catalog
    pub fn with_catalog(mut self, catalog: FieldCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn catalog(&self) -> &FieldCatalog {
        &self.catalog
    }

    pub fn is_authenticated(&self) -> bool {
        !matches!(self.auth, Auth::Anonymous)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.auth {
            Auth::Basic { username, token } => request.basic_auth(username, Some(token)),
            Auth::Bearer(token) => request.bearer_auth(token),
            Auth::Anonymous => request,
        }
    }

    /// List every field defined on the instance
    pub async fn list_fields(&self) -> Result<Vec<FieldDefinition>> {
        let url = format!("{}/field", self.base_url);

        debug!("Fetching JIRA field list");

        let response = self
            .authorize(self.client.get(&url))
            .timeout(GET_TIMEOUT)
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => {
                let fields: Vec<JiraField> = response.json().await?;
                Ok(fields
                    .into_iter()
                    .map(|field| FieldDefinition {
                        id: field.id,
                        name: field.name,
                        schema_type: field.schema.and_then(|schema| schema.field_type),
                    })
                    .collect())
            }
            StatusCode::UNAUTHORIZED => Err(BridgeError::Jira(
                "JIRA authentication failed".to_string(),
            )),
            status => {
                let error_body = response.text().await.unwrap_or_default();
                Err(BridgeError::Jira(format!(
                    "JIRA API error: HTTP {}: {}",
                    status, error_body
                )))
            }
        }
    }

    /// Fetch an issue, including the managed custom fields
    pub async fn get_issue(&self, key: &str) -> Result<JiraIssue> {
        let url = format!("{}/issue/{}", self.base_url, urlencoding::encode(key));

        let mut fields: Vec<&str> = ISSUE_FIELDS.to_vec();
        fields.extend(self.catalog.iter().map(|(_, entry)| entry.id.as_str()));

        debug!(issue = %key, "Fetching JIRA issue");

        let response = self
            .authorize(self.client.get(&url))
            .query(&[("fields", fields.join(","))])
            .timeout(GET_TIMEOUT)
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => Ok(response.json().await?),
            StatusCode::NOT_FOUND => {
                Err(BridgeError::Jira(format!("JIRA issue not found: {}", key)))
            }
            StatusCode::UNAUTHORIZED => Err(BridgeError::Jira(
                "JIRA authentication failed".to_string(),
            )),
            status => {
                let error_body = response.text().await.unwrap_or_default();
                Err(BridgeError::Jira(format!(
                    "JIRA API error: HTTP {}: {}",
                    status, error_body
                )))
            }
        }
    }

    /// Fetch an issue and convert it to a snapshot
    pub async fn get_snapshot(&self, key: &str) -> Result<IssueSnapshot> {
        let issue = self.get_issue(key).await?;
        Ok(snapshot_from_issue(&issue, &self.catalog))
    }

    /// Request body for a field write
    fn update_body(&self, updates: &FieldUpdates) -> Result<Value> {
        let mut fields = Map::new();
        for (field, value) in updates.iter() {
            let entry = self.catalog.entry(field).ok_or_else(|| {
                BridgeError::Jira(format!("No JIRA field id known for {:?}", field))
            })?;
            let value = if value.is_empty() {
                Value::Null
            } else if entry.option {
                serde_json::json!({ "value": value })
            } else {
                Value::String(value.to_string())
            };
            fields.insert(entry.id.clone(), value);
        }
        Ok(serde_json::json!({ "fields": fields }))
    }
}

#[async_trait]
impl FieldStore for JiraClient {
    async fn write_fields(&self, issue_key: &str, updates: &FieldUpdates) -> Result<()> {
        if updates.is_empty() {
            return Ok(());
        }

        let url = format!("{}/issue/{}", self.base_url, urlencoding::encode(issue_key));
        let body = self.update_body(updates)?;

        let response = self
            .authorize(self.client.put(&url))
            .query(&[("notifyUsers", "false")])
            .json(&body)
            .timeout(WRITE_TIMEOUT)
            .send()
            .await?;

        match response.status() {
            StatusCode::NO_CONTENT | StatusCode::OK => {
                info!(issue = %issue_key, fields = updates.len(), "Custom fields updated");
                Ok(())
            }
            StatusCode::NOT_FOUND => Err(BridgeError::Jira(format!(
                "JIRA issue not found: {}",
                issue_key
            ))),
            status => {
                let error_body = response.text().await.unwrap_or_default();
                Err(BridgeError::Jira(format!(
                    "JIRA API error: HTTP {}: {}",
                    status, error_body
                )))
            }
        }
    }
}

#[async_trait]
impl IssueSource for JiraClient {
    async fn fetch_snapshot(&self, issue_key: &str) -> Result<IssueSnapshot> {
        self.get_snapshot(issue_key).await
    }
}

/// Text of a field value: plain strings, numbers, or `{"value": ..}` options
fn field_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Object(map) => map
            .get("value")
            .or_else(|| map.get("name"))
            .and_then(Value::as_str)
            .map(str::to_string),
        _ => None,
    }
}

fn nested_str<'a>(fields: &'a Map<String, Value>, field: &str, key: &str) -> Option<&'a str> {
    fields.get(field)?.get(key)?.as_str()
}

/// Build the handler's view of an issue
fn snapshot_from_issue(issue: &JiraIssue, catalog: &FieldCatalog) -> IssueSnapshot {
    let fields = &issue.fields;

    let mut mirrored = FieldValues::new();
    for (field, entry) in catalog.iter() {
        if let Some(text) = fields.get(&entry.id).and_then(field_text) {
            mirrored.insert(field, text);
        }
    }

    let project_key = nested_str(fields, "project", "key")
        .map(str::to_string)
        .or_else(|| issue.key.split_once('-').map(|(project, _)| project.to_string()))
        .unwrap_or_default();

    IssueSnapshot {
        key: issue.key.clone(),
        summary: fields
            .get("summary")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        description: fields
            .get("description")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        issue_type_name: nested_str(fields, "issuetype", "name")
            .unwrap_or_default()
            .to_string(),
        reporter_name: nested_str(fields, "reporter", "displayName").map(str::to_string),
        reporter_email: nested_str(fields, "reporter", "emailAddress").map(str::to_string),
        assignee_email: nested_str(fields, "assignee", "emailAddress").map(str::to_string),
        project_key,
        existing_case_id: mirrored.get(&CustomField::CaseId).cloned(),
        mirrored,
    }
}
