//! Domain model types for reverse-tunnel client documents

use crate::{Error, Result};
use regex::Regex;
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Loopback address used when a tcp/udp proxy does not name one
pub const DEFAULT_LOCAL_IP: &str = "127.0.0.1";

/// Header name of the connection-level section
pub const COMMON_SECTION: &str = "common";

pub const MIN_PORT: u32 = 1;
pub const MAX_PORT: u32 = 65535;

/// Protocol of a forwarded port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolType {
    #[default]
    Tcp,
    Udp,
    Http,
    Https,
}

impl ProtocolType {
    pub const ALL: [ProtocolType; 4] = [
        ProtocolType::Tcp,
        ProtocolType::Udp,
        ProtocolType::Http,
        ProtocolType::Https,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProtocolType::Tcp => "tcp",
            ProtocolType::Udp => "udp",
            ProtocolType::Http => "http",
            ProtocolType::Https => "https",
        }
    }

    /// tcp/udp proxies forward to a local address; http/https are routed by domain
    pub fn uses_local_address(&self) -> bool {
        matches!(self, ProtocolType::Tcp | ProtocolType::Udp)
    }

    pub fn supports_custom_domains(&self) -> bool {
        matches!(self, ProtocolType::Http | ProtocolType::Https)
    }
}

impl fmt::Display for ProtocolType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProtocolType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "tcp" => Ok(ProtocolType::Tcp),
            "udp" => Ok(ProtocolType::Udp),
            "http" => Ok(ProtocolType::Http),
            "https" => Ok(ProtocolType::Https),
            other => Err(Error::validation(format!(
                "Unknown proxy type '{}' (expected tcp, udp, http or https)",
                other
            ))),
        }
    }
}

/// Ordered key/value pairs of the `[common]` section.
///
/// Values are kept as the raw text found after `=`, so settings this tool
/// does not understand survive a rewrite unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommonSection {
    entries: Vec<(String, String)>,
}

impl CommonSection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Set a raw value, replacing in place when the key already exists
    pub fn set(&mut self, key: impl Into<String>, raw_value: impl Into<String>) {
        let key = key.into();
        let raw_value = raw_value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = raw_value,
            None => self.entries.push((key, raw_value)),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Serialize for CommonSection {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, value) in &self.entries {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

/// One forwarded port definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProxyEntry {
    pub name: String,
    #[serde(rename = "type")]
    pub protocol_type: ProtocolType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_address: Option<String>,
    pub local_port: u32,
    pub remote_port: u32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub custom_domains: Vec<String>,
    /// Keys this tool does not model, kept verbatim
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub extra: Vec<(String, String)>,
}

impl ProxyEntry {
    pub fn new(
        name: impl Into<String>,
        protocol_type: ProtocolType,
        local_port: u32,
        remote_port: u32,
    ) -> Self {
        let local_address = protocol_type
            .uses_local_address()
            .then(|| DEFAULT_LOCAL_IP.to_string());
        Self {
            name: name.into(),
            protocol_type,
            local_address,
            local_port,
            remote_port,
            custom_domains: Vec::new(),
            extra: Vec::new(),
        }
    }

    pub fn with_local_address(mut self, address: impl Into<String>) -> Self {
        self.local_address = Some(address.into());
        self
    }

    pub fn with_custom_domains<I, S>(mut self, domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.custom_domains = domains.into_iter().map(Into::into).collect();
        self
    }

    /// Drop or default the fields whose presence depends on the protocol
    pub fn normalize(&mut self) {
        if self.protocol_type.uses_local_address() {
            if self.local_address.is_none() {
                self.local_address = Some(DEFAULT_LOCAL_IP.to_string());
            }
        } else {
            self.local_address = None;
        }
        if !self.protocol_type.supports_custom_domains() {
            self.custom_domains.clear();
        }

        // A pass-through key must not shadow a field the protocol now models
        let protocol = self.protocol_type;
        self.extra.retain(|(key, _)| match key.as_str() {
            "local_ip" => !protocol.uses_local_address(),
            "custom_domains" => !protocol.supports_custom_domains(),
            _ => true,
        });
    }

    /// Remove a pass-through key, returning its raw value
    pub fn take_extra(&mut self, key: &str) -> Option<String> {
        let index = self.extra.iter().position(|(k, _)| k == key)?;
        Some(self.extra.remove(index).1)
    }

    /// Check ports, name, and the protocol-dependent field rules
    pub fn validate(&self) -> Result<()> {
        validate_proxy_name(&self.name)?;
        self.validate_fields()
    }

    /// Same as [`validate`](Self::validate) without the name check, for
    /// entries that keep a name read from an existing document
    pub fn validate_fields(&self) -> Result<()> {
        validate_port("local_port", self.local_port)?;
        validate_port("remote_port", self.remote_port)?;

        match (&self.local_address, self.protocol_type.uses_local_address()) {
            (None, true) => {
                return Err(Error::validation(format!(
                    "{} proxy '{}' requires a local address",
                    self.protocol_type, self.name
                )))
            }
            (Some(_), false) => {
                return Err(Error::validation(format!(
                    "{} proxy '{}' cannot have a local address",
                    self.protocol_type, self.name
                )))
            }
            (Some(addr), true) if addr.trim().is_empty() => {
                return Err(Error::validation("Local address cannot be empty"));
            }
            _ => {}
        }

        if !self.custom_domains.is_empty() {
            if !self.protocol_type.supports_custom_domains() {
                return Err(Error::validation(format!(
                    "Custom domains are only allowed on http/https proxies, '{}' is {}",
                    self.name, self.protocol_type
                )));
            }
            for domain in &self.custom_domains {
                validate_domain(domain)?;
            }
        }

        Ok(())
    }
}

/// Parsed client document: one common section plus ordered proxies
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Document {
    pub common: CommonSection,
    pub proxies: Vec<ProxyEntry>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&ProxyEntry> {
        self.proxies.iter().find(|p| p.name == name)
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.proxies.iter().position(|p| p.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    pub fn names(&self) -> Vec<&str> {
        self.proxies.iter().map(|p| p.name.as_str()).collect()
    }

    /// Generate `{protocol}_{client}_{n}` for the next proxy.
    ///
    /// `n` starts at the current proxy count plus one and skips names that are
    /// already taken, so existing names never have to be renumbered.
    pub fn next_proxy_name(&self, protocol: ProtocolType, client: &str) -> String {
        let mut sequence = self.proxies.len() + 1;
        loop {
            let candidate = format!("{}_{}_{}", protocol.as_str(), client, sequence);
            if !self.contains(&candidate) {
                return candidate;
            }
            sequence += 1;
        }
    }
}

pub fn validate_port(field: &'static str, value: u32) -> Result<()> {
    if !(MIN_PORT..=MAX_PORT).contains(&value) {
        return Err(Error::InvalidPort { field, value });
    }
    Ok(())
}

fn regex(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| Error::validation(format!("Invalid pattern: {}", e)))
}

/// Proxy names double as section headers, so keep them to a safe alphabet
pub fn validate_proxy_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::validation("Proxy name cannot be empty"));
    }
    if name == COMMON_SECTION {
        return Err(Error::validation("'common' is reserved and cannot name a proxy"));
    }

    let re = regex(r"^[A-Za-z0-9_.-]+$")?;
    if !re.is_match(name) {
        return Err(Error::validation(format!(
            "Proxy name '{}' must contain only letters, numbers, '_', '.', and '-'",
            name
        )));
    }

    if name.len() > 64 {
        return Err(Error::validation("Proxy name must be 64 characters or less"));
    }

    Ok(())
}

/// Hostname check for custom domains; a leading `*.` wildcard is allowed
pub fn validate_domain(domain: &str) -> Result<()> {
    let re = regex(
        r"^(\*\.)?([A-Za-z0-9]([A-Za-z0-9-]{0,61}[A-Za-z0-9])?\.)*[A-Za-z0-9]([A-Za-z0-9-]{0,61}[A-Za-z0-9])?$",
    )?;
    if domain.len() > 253 || !re.is_match(domain) {
        return Err(Error::validation(format!(
            "'{}' is not a valid domain name",
            domain
        )));
    }
    Ok(())
}
