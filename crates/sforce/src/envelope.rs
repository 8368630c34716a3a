//! SOAP request envelopes for the enterprise endpoint

use quick_xml::escape::escape;

pub(crate) const SOAP_ENV_NS: &str = "http://schemas.xmlsoap.org/soap/envelope/";
pub(crate) const ENTERPRISE_NS: &str = "urn:enterprise.soap.sforce.com";
pub(crate) const SOBJECT_NS: &str = "urn:sobject.enterprise.soap.sforce.com";
pub(crate) const XSI_NS: &str = "http://www.w3.org/2001/XMLSchema-instance";

/// Records requested per query round trip.
pub const QUERY_BATCH_SIZE: u32 = 200;

/// A record to create or update.
///
/// Fields keep insertion order. A field set to `None` is sent in
/// `fieldsToNull`, which is how the enterprise API clears a value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SObject {
    pub object_type: String,
    pub id: Option<String>,
    fields: Vec<(String, Option<String>)>,
}

impl SObject {
    pub fn new(object_type: impl Into<String>) -> Self {
        Self {
            object_type: object_type.into(),
            id: None,
            fields: Vec::new(),
        }
    }

    /// Start an update of an existing record
    pub fn existing(object_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            ..Self::new(object_type)
        }
    }

    pub fn with(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(field, Some(value.into()));
        self
    }

    /// Set a field; `None` or an empty string clears it.
    pub fn set(&mut self, field: impl Into<String>, value: Option<String>) {
        let field = field.into();
        let value = value.filter(|v| !v.is_empty());
        match self.fields.iter_mut().find(|(name, _)| *name == field) {
            Some(slot) => slot.1 = value,
            None => self.fields.push((field, value)),
        }
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(name, _)| name == field)
            .and_then(|(_, value)| value.as_deref())
    }

    fn to_xml(&self) -> String {
        let mut xml = format!(
            "<urn:sObjects xsi:type=\"urn1:{}\">",
            escape(self.object_type.as_str())
        );
        for (name, value) in &self.fields {
            if value.is_none() {
                xml.push_str(&format!(
                    "<urn1:fieldsToNull>{}</urn1:fieldsToNull>",
                    escape(name.as_str())
                ));
            }
        }
        if let Some(ref id) = self.id {
            xml.push_str(&format!("<urn1:Id>{}</urn1:Id>", escape(id.as_str())));
        }
        for (name, value) in &self.fields {
            if let Some(value) = value {
                xml.push_str(&format!(
                    "<urn1:{name}>{}</urn1:{name}>",
                    escape(value.as_str()),
                    name = name
                ));
            }
        }
        xml.push_str("</urn:sObjects>");
        xml
    }
}

fn envelope(header: &str, body: &str) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
         <soapenv:Envelope xmlns:soapenv=\"{SOAP_ENV_NS}\" xmlns:urn=\"{ENTERPRISE_NS}\" \
         xmlns:urn1=\"{SOBJECT_NS}\" xmlns:xsi=\"{XSI_NS}\">\
         <soapenv:Header>{header}</soapenv:Header>\
         <soapenv:Body>{body}</soapenv:Body>\
         </soapenv:Envelope>"
    )
}

fn session_header(session_id: &str) -> String {
    format!(
        "<urn:SessionHeader><urn:sessionId>{}</urn:sessionId></urn:SessionHeader>",
        escape(session_id)
    )
}

pub(crate) fn login(username: &str, password: &str) -> String {
    envelope(
        "",
        &format!(
            "<urn:login><urn:username>{}</urn:username><urn:password>{}</urn:password></urn:login>",
            escape(username),
            escape(password)
        ),
    )
}

pub(crate) fn query(session_id: &str, soql: &str) -> String {
    let header = format!(
        "{}<urn:QueryOptions><urn:batchSize>{}</urn:batchSize></urn:QueryOptions>",
        session_header(session_id),
        QUERY_BATCH_SIZE
    );
    envelope(
        &header,
        &format!(
            "<urn:query><urn:queryString>{}</urn:queryString></urn:query>",
            escape(soql)
        ),
    )
}

pub(crate) fn create(session_id: &str, objects: &[SObject]) -> String {
    save_call("create", session_id, objects)
}

pub(crate) fn update(session_id: &str, objects: &[SObject]) -> String {
    save_call("update", session_id, objects)
}

fn save_call(operation: &str, session_id: &str, objects: &[SObject]) -> String {
    let records: String = objects.iter().map(SObject::to_xml).collect();
    envelope(
        &session_header(session_id),
        &format!("<urn:{operation}>{records}</urn:{operation}>"),
    )
}
