//! Document text generation

use crate::{Document, ProxyEntry, COMMON_SECTION};

/// Render a document back to text.
///
/// The common section comes first in stored order, then one section per proxy
/// with its fields in a fixed order followed by any pass-through keys.
pub fn serialize(doc: &Document) -> String {
    let mut lines = Vec::new();

    lines.push(format!("[{}]", COMMON_SECTION));
    for (key, raw) in doc.common.iter() {
        lines.push(format!("{} = {}", key, raw));
    }

    for proxy in &doc.proxies {
        lines.push(String::new());
        push_proxy(&mut lines, proxy);
    }

    lines.push(String::new());
    lines.join("\n")
}

fn push_proxy(lines: &mut Vec<String>, proxy: &ProxyEntry) {
    lines.push(format!("[{}]", proxy.name));
    lines.push(format!("name = {}", quote(&proxy.name)));
    lines.push(format!("type = {}", quote(proxy.protocol_type.as_str())));
    if let Some(address) = &proxy.local_address {
        lines.push(format!("local_ip = {}", quote(address)));
    }
    lines.push(format!("local_port = {}", proxy.local_port));
    lines.push(format!("remote_port = {}", proxy.remote_port));
    if !proxy.custom_domains.is_empty() {
        let domains: Vec<String> = proxy.custom_domains.iter().map(|d| quote(d)).collect();
        lines.push(format!("custom_domains = [{}]", domains.join(", ")));
    }
    for (key, raw) in &proxy.extra {
        lines.push(format!("{} = {}", key, raw));
    }
}

/// TOML string literal, escaped by the toml crate
fn quote(value: &str) -> String {
    toml::Value::String(value.to_string()).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{parse, parse_with_warnings, ProtocolType};

    fn sample() -> Document {
        let mut doc = Document::new();
        doc.common.set("server_addr", "\"1.2.3.4\"");
        doc.common.set("server_port", "7000");
        doc.proxies
            .push(ProxyEntry::new("tcp_myclient_1", ProtocolType::Tcp, 8080, 80));
        doc.proxies.push(
            ProxyEntry::new("http_myclient_2", ProtocolType::Http, 8081, 8081)
                .with_custom_domains(["a.example.com", "b.example.com"]),
        );
        doc
    }

    #[test]
    fn test_serialize_layout() {
        let text = serialize(&sample());
        let expected = r#"[common]
server_addr = "1.2.3.4"
server_port = 7000

[tcp_myclient_1]
name = "tcp_myclient_1"
type = "tcp"
local_ip = "127.0.0.1"
local_port = 8080
remote_port = 80

[http_myclient_2]
name = "http_myclient_2"
type = "http"
local_port = 8081
remote_port = 8081
custom_domains = ["a.example.com", "b.example.com"]
"#;
        assert_eq!(text, expected);
    }

    #[test]
    fn test_empty_document() {
        assert_eq!(serialize(&Document::new()), "[common]\n");
    }

    #[test]
    fn test_round_trip() {
        let doc = sample();
        let text = serialize(&doc);
        let (parsed, warnings) = parse_with_warnings(&text);
        assert!(warnings.is_empty(), "{:?}", warnings);
        assert_eq!(parsed, doc);
        assert_eq!(serialize(&parsed), text);
    }

    #[test]
    fn test_pass_through_keys_survive() {
        let text = "[common]\nserver_port = 7000\ntls_enable = true\n\n[web]\ntype = \"https\"\nlocal_port = 443\nremote_port = 443\nhost_header_rewrite = \"internal\"\n";
        let once = serialize(&parse(text));
        assert!(once.contains("tls_enable = true"));
        assert!(once.contains("host_header_rewrite = \"internal\""));
        assert_eq!(serialize(&parse(&once)), once);
    }

    #[test]
    fn test_misplaced_fields_round_trip() {
        let text = "[web]\ntype = \"http\"\nlocal_ip = \"10.0.0.5\"\nlocal_port = 80\nremote_port = 80\n";
        let doc = parse(text);
        let reparsed = parse(&serialize(&doc));
        assert_eq!(reparsed, doc);
        assert!(reparsed.proxies[0].local_address.is_none());
    }
}
