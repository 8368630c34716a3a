//! casebridge - JIRA to Salesforce case synchronization
//!
//! Listens for JIRA issue events and keeps a Salesforce Case in step with
//! each issue of the tracked projects. The case's contact, account and owner
//! are written back into JIRA custom fields, and failures are mailed to a
//! notification list.
//!
//! # Architecture
//!
//! - **model**: Issue snapshots, CRM records, managed custom fields
//! - **config**: YAML configuration, secret resolution, validation
//! - **crm**: `CrmGateway` trait and the Salesforce implementation
//! - **host**: JIRA REST client, field catalog, webhook payloads
//! - **notify**: Notification templates and delivery (SMTP or log)
//! - **sync**: Event planning and the per-event handler
//! - **server**: Webhook listener

// Core modules
pub mod config;
pub mod error;
pub mod logging;
pub mod model;

// Collaborators
pub mod crm;
pub mod host;
pub mod notify;

// Event processing
pub mod server;
pub mod sync;

#[cfg(test)]
mod testing;

// Re-exports
pub use error::{BridgeError, Result};
