//! tunnel-config - manage the proxies of a reverse-tunnel client
//!
//! Every change is read, applied, written back atomically, and followed by a
//! restart of the client service.

mod cli;
mod output;

use clap::Parser;
use cli::{AddArgs, Cli, Commands};
use std::path::PathBuf;
use std::process::ExitCode;
use tunnel_config_core::{
    unit_for_artifact, Error, FileStore, LifecycleCoordinator, LocalFileStore, ManagerConfig,
    Operation, ProcessSupervisor, ProxyEntry, Result, SystemdSupervisor,
};

/// The document changed but the service did not restart
const EXIT_RESTART_FAILED: u8 = 2;

/// Where a command operates
#[derive(Debug, Clone, PartialEq, Eq)]
struct Target {
    artifact_path: PathBuf,
    unit: String,
    /// Used when generating proxy names
    client: String,
}

fn resolve_target(cli: &Cli, config: &ManagerConfig) -> Result<Target> {
    let target = match &cli.file {
        Some(path) => {
            let stem = unit_for_artifact(path)?;
            let client = stem
                .strip_prefix(&format!("{}_", config.artifact_prefix))
                .unwrap_or(&config.client_name)
                .to_string();
            Target {
                artifact_path: path.clone(),
                unit: stem,
                client,
            }
        }
        None => {
            let client = cli.client.clone().unwrap_or_else(|| config.client_name.clone());
            Target {
                artifact_path: config.artifact_path(&client),
                unit: config.unit_name(&client),
                client,
            }
        }
    };

    Ok(match &cli.unit {
        Some(unit) => Target {
            unit: unit.clone(),
            ..target
        },
        None => target,
    })
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let as_json = cli.json;
    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            log::debug!("command failed: {:?}", e);
            output::print_error(&e, as_json);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    let config_path = cli.config.clone().unwrap_or_else(ManagerConfig::default_path);
    let config = ManagerConfig::load_or_default(&config_path)?;
    let target = resolve_target(&cli, &config)?;
    log::debug!("target: {:?}", target);

    let store = LocalFileStore::new().with_backup(config.backup_before_write);
    let supervisor = SystemdSupervisor::with_binary(config.systemctl.clone());
    let coordinator = LifecycleCoordinator::new(store, supervisor)
        .with_restart(config.restart_after_change && !cli.no_restart);

    let as_json = cli.json;
    match cli.command {
        Commands::List => {
            let (doc, warnings) = coordinator.load(&target.artifact_path)?;
            output::print_document(&doc, &warnings, as_json).map_err(std::io::Error::from)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Show { name } => {
            let (doc, _) = coordinator.load(&target.artifact_path)?;
            let proxy = doc.get(&name).ok_or(Error::NotFound(name.clone()))?;
            output::print_proxy(proxy, as_json).map_err(std::io::Error::from)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Add(args) => {
            // The generated name comes from this read; apply_change reads the
            // document again, and a name taken in between fails as DuplicateName
            let (doc, _) = coordinator.load(&target.artifact_path)?;
            let operation = Operation::Add(build_entry(args, &doc, &target.client));
            apply(&coordinator, &target, operation, as_json)
        }
        Commands::Edit(args) => {
            let changes = args.changes();
            if changes.is_empty() {
                return Err(Error::validation("Nothing to change; pass at least one field"));
            }
            let operation = Operation::Edit {
                name: args.name,
                changes,
            };
            apply(&coordinator, &target, operation, as_json)
        }
        Commands::Delete { name } => {
            apply(&coordinator, &target, Operation::Delete { name }, as_json)
        }
        Commands::Clients => {
            let clients = config.discover_clients()?;
            output::print_clients(&clients, &config.artifact_dir, as_json)
                .map_err(std::io::Error::from)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Status => {
            let active = coordinator.supervisor().is_active(&target.unit)?;
            output::print_status(&target.unit, active, as_json).map_err(std::io::Error::from)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Restart => {
            coordinator.supervisor().restart(&target.unit)?;
            if !as_json {
                println!("Restarted {}", target.unit);
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn build_entry(args: AddArgs, doc: &tunnel_config_core::Document, client: &str) -> ProxyEntry {
    let protocol = args.protocol.into();
    let name = args
        .name
        .unwrap_or_else(|| doc.next_proxy_name(protocol, client));

    let mut entry = ProxyEntry::new(name, protocol, args.local_port, args.remote_port)
        .with_custom_domains(args.domains);
    if let Some(address) = args.local_ip {
        entry = entry.with_local_address(address);
    }
    entry
}

fn apply<F: FileStore, P: ProcessSupervisor>(
    coordinator: &LifecycleCoordinator<F, P>,
    target: &Target,
    operation: Operation,
    as_json: bool,
) -> Result<ExitCode> {
    let report = coordinator.apply_change(&target.artifact_path, &target.unit, &operation)?;
    output::print_change(
        &operation,
        &report,
        &target.artifact_path,
        &target.unit,
        as_json,
    )
    .map_err(std::io::Error::from)?;

    if report.restart_failed() {
        Ok(ExitCode::from(EXIT_RESTART_FAILED))
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use tunnel_config_core::{Document, ProtocolType};

    fn parse(args: &[&str]) -> Cli {
        let mut full = vec!["tunnel-config"];
        full.extend_from_slice(args);
        Cli::parse_from(full)
    }

    fn config() -> ManagerConfig {
        ManagerConfig {
            artifact_dir: PathBuf::from("/etc/frp"),
            client_name: "home".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_target_from_config() {
        let target = resolve_target(&parse(&["list"]), &config()).unwrap();
        assert_eq!(target.artifact_path, Path::new("/etc/frp/frpc_home.toml"));
        assert_eq!(target.unit, "frpc_home");
        assert_eq!(target.client, "home");

        let target = resolve_target(&parse(&["-c", "office", "list"]), &config()).unwrap();
        assert_eq!(target.artifact_path, Path::new("/etc/frp/frpc_office.toml"));
        assert_eq!(target.unit, "frpc_office");
    }

    #[test]
    fn test_target_from_file() {
        let target =
            resolve_target(&parse(&["-f", "/srv/frpc_lab.toml", "list"]), &config()).unwrap();
        assert_eq!(target.unit, "frpc_lab");
        assert_eq!(target.client, "lab");

        let target = resolve_target(
            &parse(&["-f", "/srv/tunnel.toml", "--unit", "frpc", "list"]),
            &config(),
        )
        .unwrap();
        assert_eq!(target.unit, "frpc");
        assert_eq!(target.client, "home");
    }

    #[test]
    fn test_build_entry_generates_name() {
        let cli = parse(&[
            "add", "--type", "udp", "--local-port", "53", "--remote-port", "5353",
        ]);
        let Commands::Add(args) = cli.command else {
            panic!("expected add");
        };
        let entry = build_entry(args, &Document::new(), "home");
        assert_eq!(entry.name, "udp_home_1");
        assert_eq!(entry.protocol_type, ProtocolType::Udp);
        assert_eq!(entry.local_address.as_deref(), Some("127.0.0.1"));
    }

    #[test]
    fn test_add_and_list_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = dir.path().join("frpc_home.toml");
        std::fs::write(&artifact, "[common]\nserver_addr = \"1.2.3.4\"\nserver_port = 7000\n")
            .unwrap();
        let path = artifact.to_str().unwrap();
        let settings = dir.path().join("settings.toml");
        let settings = settings.to_str().unwrap();

        let cli = parse(&[
            "--config", settings, "-f", path, "--no-restart", "add", "--type", "tcp",
            "--local-port", "22", "--remote-port", "6000",
        ]);
        assert!(run(cli).is_ok());

        let text = std::fs::read_to_string(&artifact).unwrap();
        assert!(text.starts_with("[common]\nserver_addr = \"1.2.3.4\"\nserver_port = 7000\n"));
        assert!(text.contains("[tcp_home_1]"));

        // names are generated from the document as it is on disk
        let cli = parse(&[
            "--config", settings, "-f", path, "--no-restart", "add", "--type", "tcp",
            "--local-port", "23", "--remote-port", "6001",
        ]);
        assert!(run(cli).is_ok());
        let text = std::fs::read_to_string(&artifact).unwrap();
        assert!(text.contains("[tcp_home_2]"));

        let cli = parse(&[
            "--config", settings, "-f", path, "--no-restart", "add", "--type", "tcp",
            "--local-port", "24", "--remote-port", "6002", "--name", "tcp_home_1",
        ]);
        assert!(matches!(run(cli), Err(Error::DuplicateName(_))));

        let cli = parse(&["--config", settings, "-f", path, "delete", "ghost"]);
        assert!(matches!(run(cli), Err(Error::NotFound(_))));
    }
}
