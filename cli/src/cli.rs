//! CLI argument definitions for tunnel-config
//!
//! Uses clap for argument parsing. This module defines all subcommands
//! and their options.

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tunnel_config_core::{ProtocolType, ProxyChanges};

/// tunnel-config - manage the proxies of a reverse-tunnel client
///
/// Edits the client document in place and restarts the client service so the
/// running tunnel picks up the change.
#[derive(Parser, Debug)]
#[command(name = "tunnel-config")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Manager settings file (defaults to the user config directory)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Client whose document is managed (defaults to `client_name` in settings)
    #[arg(long, short = 'c', global = true)]
    pub client: Option<String>,

    /// Operate on this document directly instead of a named client
    #[arg(long, short = 'f', global = true, value_name = "PATH", conflicts_with = "client")]
    pub file: Option<PathBuf>,

    /// Service to restart after a change
    #[arg(long, global = true)]
    pub unit: Option<String>,

    /// Write the change without restarting the service
    #[arg(long, global = true)]
    pub no_restart: bool,

    /// Print machine-readable JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Enable debug logging
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List the proxies in the document
    List,

    /// Show one proxy
    Show {
        /// Proxy name
        name: String,
    },

    /// Add a proxy
    #[command(after_help = "EXAMPLES:
    # Forward local SSH to remote port 6000 (name generated as tcp_<client>_<n>)
    tunnel-config add --type tcp --local-port 22 --remote-port 6000

    # Expose a local web app under a domain
    tunnel-config add --type http --local-port 8080 --remote-port 80 --domain app.example.com
")]
    Add(AddArgs),

    /// Change fields of an existing proxy
    Edit(EditArgs),

    /// Delete a proxy
    Delete {
        /// Proxy name
        name: String,
    },

    /// List clients that have a document in the artifact directory
    Clients,

    /// Show whether the client service is running
    Status,

    /// Restart the client service without changing the document
    Restart,
}

#[derive(Args, Debug)]
pub struct AddArgs {
    /// Proxy protocol
    #[arg(long = "type", short = 't', value_enum)]
    pub protocol: ProtocolArg,

    /// Port of the local service
    #[arg(long)]
    pub local_port: u32,

    /// Port exposed on the server
    #[arg(long)]
    pub remote_port: u32,

    /// Address of the local service (tcp/udp only)
    #[arg(long)]
    pub local_ip: Option<String>,

    /// Custom domain (http/https only, repeatable)
    #[arg(long = "domain", short = 'd')]
    pub domains: Vec<String>,

    /// Proxy name (generated when omitted)
    #[arg(long)]
    pub name: Option<String>,
}

#[derive(Args, Debug)]
pub struct EditArgs {
    /// Proxy to change
    pub name: String,

    /// New proxy name
    #[arg(long)]
    pub rename: Option<String>,

    /// New protocol; fields the protocol does not use are dropped
    #[arg(long = "type", short = 't', value_enum)]
    pub protocol: Option<ProtocolArg>,

    #[arg(long)]
    pub local_ip: Option<String>,

    #[arg(long)]
    pub local_port: Option<u32>,

    #[arg(long)]
    pub remote_port: Option<u32>,

    /// Replace the custom domains (repeatable)
    #[arg(long = "domain", short = 'd', conflicts_with = "clear_domains")]
    pub domains: Vec<String>,

    /// Remove all custom domains
    #[arg(long)]
    pub clear_domains: bool,
}

impl EditArgs {
    pub fn changes(&self) -> ProxyChanges {
        let custom_domains = if self.clear_domains {
            Some(Vec::new())
        } else if !self.domains.is_empty() {
            Some(self.domains.clone())
        } else {
            None
        };

        ProxyChanges {
            name: self.rename.clone(),
            protocol_type: self.protocol.map(Into::into),
            local_address: self.local_ip.clone(),
            local_port: self.local_port,
            remote_port: self.remote_port,
            custom_domains,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ProtocolArg {
    Tcp,
    Udp,
    Http,
    Https,
}

impl From<ProtocolArg> for ProtocolType {
    fn from(arg: ProtocolArg) -> Self {
        match arg {
            ProtocolArg::Tcp => ProtocolType::Tcp,
            ProtocolArg::Udp => ProtocolType::Udp,
            ProtocolArg::Http => ProtocolType::Http,
            ProtocolArg::Https => ProtocolType::Https,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_add() {
        let cli = Cli::parse_from([
            "tunnel-config",
            "--client",
            "home",
            "add",
            "--type",
            "http",
            "--local-port",
            "8080",
            "--remote-port",
            "80",
            "-d",
            "a.example.com",
            "-d",
            "b.example.com",
        ]);
        assert_eq!(cli.client.as_deref(), Some("home"));
        match cli.command {
            Commands::Add(args) => {
                assert_eq!(args.protocol, ProtocolArg::Http);
                assert_eq!(args.local_port, 8080);
                assert_eq!(args.domains, vec!["a.example.com", "b.example.com"]);
                assert!(args.name.is_none());
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_edit_changes() {
        let cli = Cli::parse_from([
            "tunnel-config",
            "edit",
            "web",
            "--type",
            "tcp",
            "--remote-port",
            "9000",
            "--no-restart",
        ]);
        assert!(cli.no_restart);
        let Commands::Edit(args) = cli.command else {
            panic!("expected edit");
        };
        let changes = args.changes();
        assert_eq!(changes.protocol_type, Some(ProtocolType::Tcp));
        assert_eq!(changes.remote_port, Some(9000));
        assert!(changes.custom_domains.is_none());

        let cli = Cli::parse_from(["tunnel-config", "edit", "web", "--clear-domains"]);
        let Commands::Edit(args) = cli.command else {
            panic!("expected edit");
        };
        assert_eq!(args.changes().custom_domains, Some(Vec::new()));
    }

    #[test]
    fn test_file_conflicts_with_client() {
        let result = Cli::try_parse_from([
            "tunnel-config",
            "--client",
            "a",
            "--file",
            "/tmp/x.toml",
            "list",
        ]);
        assert!(result.is_err());
    }
}
