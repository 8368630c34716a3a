//! SOAP response parsing
//!
//! Salesforce responses are shallow: a `result` element holding scalar
//! children, optionally `records` (query) or `errors` (create/update) children
//! which are themselves flat. The parser walks the event stream once and
//! collects those shapes by local name, ignoring namespace prefixes.

use crate::{Error, Result};
use quick_xml::events::Event;
use quick_xml::escape::unescape;
use quick_xml::Reader;
use std::collections::BTreeMap;

/// Flat field map of one record or result element
pub type Fields = BTreeMap<String, String>;

/// A SOAP fault
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fault {
    pub code: String,
    pub message: String,
    /// `exceptionCode` from the fault detail (e.g. `INVALID_LOGIN`)
    pub exception_code: Option<String>,
}

/// One `errors` entry of a save result
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SaveError {
    pub status_code: String,
    pub message: String,
}

/// One `result` element
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResultElement {
    pub fields: Fields,
    pub records: Vec<Fields>,
    pub errors: Vec<SaveError>,
}

/// Parsed SOAP response body
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Response {
    pub fault: Option<Fault>,
    pub results: Vec<ResultElement>,
}

impl Response {
    /// Turn a fault into an error, otherwise hand back the response
    pub fn into_result(self) -> Result<Self> {
        match self.fault {
            Some(fault) => Err(Error::Fault {
                code: fault.exception_code.unwrap_or(fault.code),
                message: fault.message,
            }),
            None => Ok(self),
        }
    }

    pub fn first_result(&self) -> Result<&ResultElement> {
        self.results
            .first()
            .ok_or_else(|| Error::Protocol("response has no result element".to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scope {
    Fault,
    Result,
    Record,
    SaveError,
    Other,
}

struct Frame {
    name: String,
    scope: Scope,
    has_children: bool,
    text: String,
}

/// Parse a SOAP response document
pub fn parse(xml: &str) -> Result<Response> {
    let mut reader = Reader::from_str(xml);

    let mut response = Response::default();
    let mut stack: Vec<Frame> = Vec::new();
    let mut fault: Option<Fault> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                let parent = stack.last_mut();
                let parent_scope = parent.as_ref().map(|f| f.scope).unwrap_or(Scope::Other);
                if let Some(parent) = parent {
                    parent.has_children = true;
                }

                let scope = match (name.as_str(), parent_scope) {
                    ("Fault", _) => {
                        fault = Some(Fault::default());
                        Scope::Fault
                    }
                    ("result", Scope::Other) => {
                        response.results.push(ResultElement::default());
                        Scope::Result
                    }
                    ("records", Scope::Result) => {
                        if let Some(result) = response.results.last_mut() {
                            result.records.push(Fields::new());
                        }
                        Scope::Record
                    }
                    ("errors", Scope::Result) => {
                        if let Some(result) = response.results.last_mut() {
                            result.errors.push(SaveError::default());
                        }
                        Scope::SaveError
                    }
                    (_, Scope::Fault) => Scope::Fault,
                    _ => Scope::Other,
                };

                stack.push(Frame {
                    name,
                    scope,
                    has_children: false,
                    text: String::new(),
                });
            }
            Ok(Event::Empty(_)) => {
                if let Some(parent) = stack.last_mut() {
                    parent.has_children = true;
                }
            }
            Ok(Event::Text(ref e)) => {
                if let Some(frame) = stack.last_mut() {
                    let raw = String::from_utf8_lossy(e.as_ref());
                    let text = unescape(&raw)
                        .map_err(|err| Error::Xml(format!("invalid text: {}", err)))?;
                    frame.text.push_str(&text);
                }
            }
            Ok(Event::CData(ref e)) => {
                if let Some(frame) = stack.last_mut() {
                    frame.text.push_str(&String::from_utf8_lossy(e.as_ref()));
                }
            }
            Ok(Event::GeneralRef(ref e)) => {
                if let Some(frame) = stack.last_mut() {
                    let entity = format!("&{};", String::from_utf8_lossy(e.as_ref()));
                    let text = unescape(&entity)
                        .map_err(|err| Error::Xml(format!("invalid entity {}: {}", entity, err)))?;
                    frame.text.push_str(&text);
                }
            }
            Ok(Event::End(_)) => {
                let Some(frame) = stack.pop() else {
                    return Err(Error::Xml("unbalanced end tag".to_string()));
                };
                if frame.has_children {
                    continue;
                }
                let parent_scope = stack.last().map(|f| f.scope).unwrap_or(Scope::Other);
                store_leaf(&mut response, &mut fault, parent_scope, frame);
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(Error::Xml(format!(
                    "error at position {}: {}",
                    reader.buffer_position(),
                    e
                )));
            }
            _ => {}
        }
    }

    response.fault = fault;
    Ok(response)
}

fn store_leaf(response: &mut Response, fault: &mut Option<Fault>, parent: Scope, frame: Frame) {
    match parent {
        Scope::Fault => {
            if let Some(fault) = fault.as_mut() {
                match frame.name.as_str() {
                    "faultcode" => fault.code = frame.text,
                    "faultstring" => fault.message = frame.text,
                    "exceptionCode" => fault.exception_code = Some(frame.text),
                    "exceptionMessage" if fault.message.is_empty() => fault.message = frame.text,
                    _ => {}
                }
            }
        }
        Scope::Result => {
            if let Some(result) = response.results.last_mut() {
                result.fields.entry(frame.name).or_insert(frame.text);
            }
        }
        Scope::Record => {
            if let Some(record) = response
                .results
                .last_mut()
                .and_then(|result| result.records.last_mut())
            {
                record.entry(frame.name).or_insert(frame.text);
            }
        }
        Scope::SaveError => {
            if let Some(error) = response
                .results
                .last_mut()
                .and_then(|result| result.errors.last_mut())
            {
                match frame.name.as_str() {
                    "statusCode" => error.status_code = frame.text,
                    "message" => error.message = frame.text,
                    _ => {}
                }
            }
        }
        Scope::Other => {}
    }
}
