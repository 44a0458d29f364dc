//! CLI output for tunnel-config

use serde_json::{json, Value};
use std::path::Path;
use tunnel_config_core::{
    ChangeReport, Document, Error, Operation, ParseWarning, ProxyEntry, RestartOutcome,
};

fn local_endpoint(proxy: &ProxyEntry) -> String {
    match &proxy.local_address {
        Some(address) => format!("{}:{}", address, proxy.local_port),
        None => format!(":{}", proxy.local_port),
    }
}

/// Render the proxy list as an aligned table
pub fn format_proxy_table(doc: &Document) -> String {
    if doc.proxies.is_empty() {
        return "No proxies configured.".to_string();
    }

    let rows: Vec<[String; 5]> = doc
        .proxies
        .iter()
        .map(|p| {
            [
                p.name.clone(),
                p.protocol_type.to_string(),
                local_endpoint(p),
                p.remote_port.to_string(),
                p.custom_domains.join(","),
            ]
        })
        .collect();

    let header = ["NAME", "TYPE", "LOCAL", "REMOTE", "DOMAINS"];
    let mut widths = header.map(str::len);
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row.iter()) {
            *width = (*width).max(cell.len());
        }
    }

    let render = |cells: [&str; 5]| -> String {
        let line: Vec<String> = cells
            .iter()
            .zip(widths.iter())
            .map(|(cell, width)| format!("{:<width$}", cell, width = *width))
            .collect();
        line.join("  ").trim_end().to_string()
    };

    let mut lines = vec![render(header)];
    for row in &rows {
        lines.push(render([
            row[0].as_str(),
            row[1].as_str(),
            row[2].as_str(),
            row[3].as_str(),
            row[4].as_str(),
        ]));
    }
    lines.join("\n")
}

/// Render one proxy as `key: value` lines
pub fn format_proxy(proxy: &ProxyEntry) -> String {
    let mut lines = vec![
        format!("name:        {}", proxy.name),
        format!("type:        {}", proxy.protocol_type),
    ];
    if let Some(address) = &proxy.local_address {
        lines.push(format!("local_ip:    {}", address));
    }
    lines.push(format!("local_port:  {}", proxy.local_port));
    lines.push(format!("remote_port: {}", proxy.remote_port));
    if !proxy.custom_domains.is_empty() {
        lines.push(format!("domains:     {}", proxy.custom_domains.join(", ")));
    }
    for (key, raw) in &proxy.extra {
        lines.push(format!("{}: {}", key, raw));
    }
    lines.join("\n")
}

fn restart_json(outcome: &RestartOutcome) -> Value {
    match outcome {
        RestartOutcome::Restarted => json!("restarted"),
        RestartOutcome::Skipped => json!("skipped"),
        RestartOutcome::Failed(message) => json!({ "failed": message }),
    }
}

fn warnings_json(warnings: &[ParseWarning]) -> Value {
    warnings
        .iter()
        .map(|w| json!({ "line": w.line, "message": w.message }))
        .collect()
}

pub fn change_json(
    operation: &Operation,
    report: &ChangeReport,
    artifact_path: &Path,
    unit: &str,
) -> Value {
    json!({
        "ok": true,
        "operation": operation.verb(),
        "proxy": operation.target(),
        "artifact": artifact_path.display().to_string(),
        "unit": unit,
        "restart": restart_json(&report.restart),
        "warnings": warnings_json(&report.warnings),
    })
}

pub fn error_json(error: &Error) -> Value {
    json!({
        "ok": false,
        "kind": error.kind(),
        "message": error.to_string(),
    })
}

fn print_warnings(warnings: &[ParseWarning]) {
    for warning in warnings {
        eprintln!("warning: {}", warning);
    }
}

pub fn print_document(
    doc: &Document,
    warnings: &[ParseWarning],
    as_json: bool,
) -> serde_json::Result<()> {
    if as_json {
        let value = json!({
            "common": doc.common,
            "proxies": doc.proxies,
            "warnings": warnings_json(warnings),
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        print_warnings(warnings);
        println!("{}", format_proxy_table(doc));
    }
    Ok(())
}

pub fn print_proxy(proxy: &ProxyEntry, as_json: bool) -> serde_json::Result<()> {
    if as_json {
        println!("{}", serde_json::to_string_pretty(proxy)?);
    } else {
        println!("{}", format_proxy(proxy));
    }
    Ok(())
}

pub fn print_change(
    operation: &Operation,
    report: &ChangeReport,
    artifact_path: &Path,
    unit: &str,
    as_json: bool,
) -> serde_json::Result<()> {
    if as_json {
        let value = change_json(operation, report, artifact_path, unit);
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    print_warnings(&report.warnings);
    let past = match operation {
        Operation::Add(_) => "Added",
        Operation::Edit { .. } => "Updated",
        Operation::Delete { .. } => "Deleted",
    };
    println!(
        "{} proxy '{}' in {}",
        past,
        operation.target(),
        artifact_path.display()
    );
    match &report.restart {
        RestartOutcome::Restarted => println!("Restarted {}", unit),
        RestartOutcome::Skipped => println!("Restart skipped; run `tunnel-config restart` to apply"),
        RestartOutcome::Failed(message) => {
            eprintln!("The change was saved, but restarting {} failed: {}", unit, message);
            eprintln!("Retry with `tunnel-config restart` or `systemctl restart {}`", unit);
        }
    }
    Ok(())
}

pub fn print_clients(clients: &[String], dir: &Path, as_json: bool) -> serde_json::Result<()> {
    if as_json {
        println!("{}", serde_json::to_string_pretty(clients)?);
    } else if clients.is_empty() {
        println!("No client documents found in {}", dir.display());
    } else {
        for client in clients {
            println!("{}", client);
        }
    }
    Ok(())
}

pub fn print_status(unit: &str, active: bool, as_json: bool) -> serde_json::Result<()> {
    if as_json {
        let value = json!({ "unit": unit, "active": active });
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        println!("{}: {}", unit, if active { "active" } else { "inactive" });
    }
    Ok(())
}

pub fn print_error(error: &Error, as_json: bool) {
    if as_json {
        println!("{}", error_json(error));
    } else {
        eprintln!("tunnel-config: {}", error);
    }
}
