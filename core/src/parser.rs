//! Parser for client documents
//!
//! Documents are a flat subset of TOML: one `[common]` section of raw
//! `key = value` settings followed by one named section per proxy. The parser
//! is a small state machine over lines and never fails: lines it cannot make
//! sense of are skipped and reported as [`ParseWarning`]s.

use crate::{validate_proxy_name, Document, ProtocolType, ProxyEntry, COMMON_SECTION};
use std::fmt;

/// A non-fatal problem found while parsing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseWarning {
    /// 1-based line number
    pub line: usize,
    pub message: String,
}

impl ParseWarning {
    fn new(line: usize, message: impl Into<String>) -> Self {
        Self {
            line,
            message: message.into(),
        }
    }
}

impl fmt::Display for ParseWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {}", self.line, self.message)
    }
}

/// Parse document text, discarding warnings
pub fn parse(text: &str) -> Document {
    parse_with_warnings(text).0
}

/// Parse document text and collect the lines that were skipped
pub fn parse_with_warnings(text: &str) -> (Document, Vec<ParseWarning>) {
    let mut parser = Parser::default();
    for (idx, line) in text.lines().enumerate() {
        parser.feed(idx + 1, line);
    }
    parser.finish()
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
enum State {
    #[default]
    None,
    InCommon,
    InProxy(String),
}

enum Line<'a> {
    Blank,
    Header(&'a str),
    /// Starts like a header but is not one, e.g. `[[proxies]]`
    BadHeader,
    Pair(&'a str, &'a str),
    Malformed,
}

fn classify(line: &str) -> Line<'_> {
    let line = line.trim();

    if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
        return Line::Blank;
    }

    if line.starts_with('[') {
        // Headers cannot contain '#', so anything after it is a comment
        let header = line.split('#').next().unwrap_or(line).trim_end();
        return match header.strip_prefix('[').and_then(|h| h.strip_suffix(']')) {
            Some(name) if !name.trim().is_empty() && !name.contains(['[', ']']) => {
                Line::Header(name.trim())
            }
            _ => Line::BadHeader,
        };
    }

    match line.split_once('=') {
        Some((key, value)) => {
            let key = key.trim();
            let valid_key = !key.is_empty()
                && key
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.');
            if valid_key {
                Line::Pair(key, value.trim())
            } else {
                Line::Malformed
            }
        }
        None => Line::Malformed,
    }
}

/// Raw key/value lines collected for one proxy section
#[derive(Debug)]
struct PendingProxy {
    header: String,
    line: usize,
    pairs: Vec<(usize, String, String)>,
}

#[derive(Default)]
struct Parser {
    state: State,
    document: Document,
    pending: Option<PendingProxy>,
    warnings: Vec<ParseWarning>,
}

impl Parser {
    fn feed(&mut self, line_no: usize, line: &str) {
        match classify(line) {
            Line::Blank => {}
            Line::Header(name) => {
                self.flush_proxy();
                if name == COMMON_SECTION {
                    self.state = State::InCommon;
                } else {
                    self.state = State::InProxy(name.to_string());
                    self.pending = Some(PendingProxy {
                        header: name.to_string(),
                        line: line_no,
                        pairs: Vec::new(),
                    });
                }
            }
            Line::Pair(key, value) => match &self.state {
                State::None => self.warnings.push(ParseWarning::new(
                    line_no,
                    format!("'{}' is outside any recognized section, skipped", key),
                )),
                State::InCommon => self.document.common.set(key, value),
                State::InProxy(section) => {
                    log::trace!("[{}] {} = {}", section, key, value);
                    if let Some(pending) = self.pending.as_mut() {
                        pending
                            .pairs
                            .push((line_no, key.to_string(), value.to_string()));
                    }
                }
            },
            Line::BadHeader => {
                // The keys below belong to a section we cannot represent
                self.flush_proxy();
                self.state = State::None;
                self.warn(
                    line_no,
                    format!("unrecognized section header '{}', skipped", line.trim()),
                );
            }
            Line::Malformed => self.warn(
                line_no,
                format!("unrecognized line '{}', skipped", line.trim()),
            ),
        }
    }

    fn finish(mut self) -> (Document, Vec<ParseWarning>) {
        self.flush_proxy();
        (self.document, self.warnings)
    }

    fn warn(&mut self, line: usize, message: impl Into<String>) {
        self.warnings.push(ParseWarning::new(line, message));
    }

    fn flush_proxy(&mut self) {
        let Some(pending) = self.pending.take() else {
            return;
        };
        let line = pending.line;
        match build_entry(pending, &mut self.warnings) {
            Some(entry) => {
                if self.document.contains(&entry.name) {
                    self.warn(line, format!("duplicate proxy name '{}'", entry.name));
                }
                self.document.proxies.push(entry);
            }
            None => self.warn(line, "proxy section skipped"),
        }
    }
}

/// Turn a collected section into an entry, or `None` if it lacks a usable
/// type or port
fn build_entry(pending: PendingProxy, warnings: &mut Vec<ParseWarning>) -> Option<ProxyEntry> {
    let PendingProxy {
        header,
        line,
        pairs,
    } = pending;

    let mut name: Option<String> = None;
    let mut protocol: Option<ProtocolType> = None;
    let mut local_ip: Option<(String, String)> = None;
    let mut local_port: Option<u32> = None;
    let mut remote_port: Option<u32> = None;
    let mut domains: Option<(Vec<String>, String)> = None;
    let mut extra: Vec<(String, String)> = Vec::new();

    for (line_no, key, raw) in pairs {
        match key.as_str() {
            "name" => match decode_string(&raw) {
                Some(value) => name = Some(value),
                None => warnings.push(ParseWarning::new(line_no, "invalid name value")),
            },
            "type" => match decode_string(&raw).and_then(|t| t.parse::<ProtocolType>().ok()) {
                Some(value) => protocol = Some(value),
                None => warnings.push(ParseWarning::new(
                    line_no,
                    format!("unsupported proxy type {}", raw),
                )),
            },
            "local_ip" => match decode_string(&raw) {
                Some(value) => local_ip = Some((value, raw)),
                None => warnings.push(ParseWarning::new(line_no, "invalid local_ip value")),
            },
            "local_port" => match decode_port(&raw) {
                Some(port) => local_port = Some(port),
                None => warnings.push(ParseWarning::new(
                    line_no,
                    format!("invalid local_port {}", raw),
                )),
            },
            "remote_port" => match decode_port(&raw) {
                Some(port) => remote_port = Some(port),
                None => warnings.push(ParseWarning::new(
                    line_no,
                    format!("invalid remote_port {}", raw),
                )),
            },
            "custom_domains" => domains = Some((decode_list(&raw), raw)),
            _ => extra.push((key, raw)),
        }
    }

    let name = match name {
        Some(name) if name == header => name,
        Some(name) => match validate_proxy_name(&name) {
            Ok(()) => {
                warnings.push(ParseWarning::new(
                    line,
                    format!("section [{}] declares name '{}', using the name", header, name),
                ));
                name
            }
            Err(e) => {
                warnings.push(ParseWarning::new(
                    line,
                    format!(
                        "section [{}] declares unusable name '{}' ({}), using the header",
                        header, name, e
                    ),
                ));
                header
            }
        },
        None => header,
    };

    let Some(protocol) = protocol else {
        warnings.push(ParseWarning::new(line, format!("proxy '{}' has no type", name)));
        return None;
    };
    let (Some(local_port), Some(remote_port)) = (local_port, remote_port) else {
        warnings.push(ParseWarning::new(
            line,
            format!("proxy '{}' is missing local_port or remote_port", name),
        ));
        return None;
    };

    let mut entry = ProxyEntry::new(name, protocol, local_port, remote_port);

    // Fields that do not apply to this protocol are carried through untouched
    if let Some((address, raw)) = local_ip {
        if protocol.uses_local_address() {
            entry.local_address = Some(address);
        } else {
            extra.insert(0, ("local_ip".to_string(), raw));
        }
    }
    if let Some((list, raw)) = domains {
        if protocol.supports_custom_domains() {
            entry.custom_domains = list;
        } else {
            extra.push(("custom_domains".to_string(), raw));
        }
    }
    entry.extra = extra;

    Some(entry)
}

/// Decode a raw value with TOML's value grammar
fn decode_value(raw: &str) -> Option<toml::Value> {
    let mut table: toml::Table = toml::from_str(&format!("value = {}", raw)).ok()?;
    table.remove("value")
}

/// Unquoted legacy values such as `type = tcp` fall back to the bare text
fn bare(raw: &str) -> Option<String> {
    let text = raw.split('#').next().unwrap_or(raw).trim();
    let quoted = text.starts_with('"') || text.starts_with('\'') || text.starts_with('[');
    (!text.is_empty() && !quoted).then(|| text.to_string())
}

pub(crate) fn decode_string(raw: &str) -> Option<String> {
    match decode_value(raw) {
        Some(toml::Value::String(s)) => Some(s),
        Some(_) => None,
        None => bare(raw),
    }
}

fn decode_port(raw: &str) -> Option<u32> {
    match decode_value(raw) {
        Some(toml::Value::Integer(i)) => u32::try_from(i).ok(),
        Some(toml::Value::String(s)) => s.trim().parse().ok(),
        Some(_) => None,
        None => bare(raw).and_then(|s| s.parse().ok()),
    }
}

/// Accepts a TOML string array or a comma separated list
pub(crate) fn decode_list(raw: &str) -> Vec<String> {
    let items: Vec<String> = match decode_value(raw) {
        Some(toml::Value::Array(values)) => values
            .into_iter()
            .filter_map(|v| match v {
                toml::Value::String(s) => Some(s),
                _ => None,
            })
            .collect(),
        Some(toml::Value::String(s)) => s.split(',').map(str::to_string).collect(),
        Some(_) => Vec::new(),
        None => bare(raw)
            .map(|s| s.split(',').map(str::to_string).collect())
            .unwrap_or_default(),
    };

    items
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
