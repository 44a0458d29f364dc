//! Add, edit, and delete operations on a document
//!
//! Every operation takes the current document by reference and returns a new
//! one, so a failed operation never leaves a half-applied change behind. The
//! common section is carried over untouched.

use crate::parser::{decode_list, decode_string};
use crate::{validate_proxy_name, Document, Error, ProtocolType, ProxyEntry, Result};
use serde::{Deserialize, Serialize};

/// Field-level changes for [`edit_proxy`]; `None` leaves a field as it is
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyChanges {
    pub name: Option<String>,
    pub protocol_type: Option<ProtocolType>,
    pub local_address: Option<String>,
    pub local_port: Option<u32>,
    pub remote_port: Option<u32>,
    pub custom_domains: Option<Vec<String>>,
}

impl ProxyChanges {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// A single requested change to a document
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Add(ProxyEntry),
    Edit { name: String, changes: ProxyChanges },
    Delete { name: String },
}

impl Operation {
    pub fn apply(&self, doc: &Document) -> Result<Document> {
        match self {
            Operation::Add(entry) => add_proxy(doc, entry.clone()),
            Operation::Edit { name, changes } => edit_proxy(doc, name, changes),
            Operation::Delete { name } => delete_proxy(doc, name),
        }
    }

    /// Name of the proxy the operation targets
    pub fn target(&self) -> &str {
        match self {
            Operation::Add(entry) => &entry.name,
            Operation::Edit { name, .. } | Operation::Delete { name } => name,
        }
    }

    pub fn verb(&self) -> &'static str {
        match self {
            Operation::Add(_) => "add",
            Operation::Edit { .. } => "edit",
            Operation::Delete { .. } => "delete",
        }
    }
}

/// Append a new proxy
pub fn add_proxy(doc: &Document, entry: ProxyEntry) -> Result<Document> {
    if doc.contains(&entry.name) {
        return Err(Error::DuplicateName(entry.name));
    }
    entry.validate()?;

    let mut next = doc.clone();
    next.proxies.push(entry);
    Ok(next)
}

/// Apply field-level changes to the proxy called `name`.
///
/// Switching protocol clears fields the new protocol does not carry and
/// defaults the local address for tcp/udp. A `local_ip` or `custom_domains`
/// key that was carried through because the old protocol did not use it
/// becomes the new field's value unless the change sets that field itself.
/// The name is only checked when it changes, so legacy names stay editable.
pub fn edit_proxy(doc: &Document, name: &str, changes: &ProxyChanges) -> Result<Document> {
    let index = doc
        .position(name)
        .ok_or_else(|| Error::NotFound(name.to_string()))?;

    let mut entry = doc.proxies[index].clone();

    if let Some(new_name) = &changes.name {
        if new_name != name {
            validate_proxy_name(new_name)?;
            if doc.contains(new_name) {
                return Err(Error::DuplicateName(new_name.clone()));
            }
            entry.name = new_name.clone();
        }
    }
    if let Some(protocol) = changes.protocol_type {
        entry.protocol_type = protocol;
    }
    if let Some(address) = &changes.local_address {
        entry.local_address = Some(address.clone());
    }
    if let Some(port) = changes.local_port {
        entry.local_port = port;
    }
    if let Some(port) = changes.remote_port {
        entry.remote_port = port;
    }
    if let Some(domains) = &changes.custom_domains {
        entry.custom_domains = domains.clone();
    }

    // Explicitly requested fields that the protocol cannot carry are an error;
    // leftovers from the previous protocol are dropped
    if changes.local_address.is_some() && !entry.protocol_type.uses_local_address() {
        return Err(Error::validation(format!(
            "{} proxies do not take a local address",
            entry.protocol_type
        )));
    }
    let domains_requested = changes
        .custom_domains
        .as_ref()
        .is_some_and(|d| !d.is_empty());
    if domains_requested && !entry.protocol_type.supports_custom_domains() {
        return Err(Error::validation(format!(
            "{} proxies do not take custom domains",
            entry.protocol_type
        )));
    }
    promote_pass_through(&mut entry, changes);
    entry.normalize();
    entry.validate_fields()?;

    let mut next = doc.clone();
    next.proxies[index] = entry;
    Ok(next)
}

fn promote_pass_through(entry: &mut ProxyEntry, changes: &ProxyChanges) {
    if entry.protocol_type.uses_local_address() && changes.local_address.is_none() {
        if let Some(address) = entry.take_extra("local_ip").and_then(|raw| decode_string(&raw)) {
            entry.local_address = Some(address);
        }
    }
    if entry.protocol_type.supports_custom_domains() && changes.custom_domains.is_none() {
        if let Some(raw) = entry.take_extra("custom_domains") {
            entry.custom_domains = decode_list(&raw);
        }
    }
}

/// Remove the proxy called `name`; the remaining proxies keep their order and
/// their names
pub fn delete_proxy(doc: &Document, name: &str) -> Result<Document> {
    let index = doc
        .position(name)
        .ok_or_else(|| Error::NotFound(name.to_string()))?;

    let mut next = doc.clone();
    next.proxies.remove(index);
    Ok(next)
}
