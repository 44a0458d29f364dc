//! Tunnel service control via systemd

use crate::{Error, Result};
use std::process::{Command, Output};

/// Controls the service that runs a tunnel client
pub trait ProcessSupervisor {
    fn restart(&self, unit: &str) -> Result<()>;

    fn is_active(&self, unit: &str) -> Result<bool>;
}

/// Output from a command execution
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// [`ProcessSupervisor`] that shells out to `systemctl`
#[derive(Debug, Clone)]
pub struct SystemdSupervisor {
    /// Binary used for unit control
    pub systemctl: String,
}

impl Default for SystemdSupervisor {
    fn default() -> Self {
        Self {
            systemctl: "systemctl".to_string(),
        }
    }
}

impl SystemdSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_binary(systemctl: impl Into<String>) -> Self {
        Self {
            systemctl: systemctl.into(),
        }
    }

    /// Run the control binary and capture output
    pub fn run_cmd(&self, args: &[&str]) -> Result<CommandOutput> {
        let output = Command::new(&self.systemctl).args(args).output().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::CommandNotFound(self.systemctl.clone())
            } else {
                Error::process(
                    args.last().copied().unwrap_or_default(),
                    format!("{} {}: {}", self.systemctl, args.join(" "), e),
                )
            }
        })?;

        Ok(parse_output(output))
    }

    pub fn build_restart_args(unit: &str) -> Vec<&str> {
        vec!["restart", unit]
    }

    pub fn build_is_active_args(unit: &str) -> Vec<&str> {
        vec!["is-active", "--quiet", unit]
    }
}

fn parse_output(output: Output) -> CommandOutput {
    CommandOutput {
        exit_code: output.status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
    }
}

fn check_unit(unit: &str) -> Result<()> {
    if unit.is_empty() || unit.starts_with('-') || unit.contains(char::is_whitespace) {
        return Err(Error::validation(format!("Invalid unit name '{}'", unit)));
    }
    Ok(())
}

impl ProcessSupervisor for SystemdSupervisor {
    fn restart(&self, unit: &str) -> Result<()> {
        check_unit(unit)?;
        let output = self.run_cmd(&Self::build_restart_args(unit))?;
        if !output.success() {
            let reason = match output.stderr.trim() {
                "" => format!("exit code {}", output.exit_code),
                stderr => stderr.to_string(),
            };
            return Err(Error::process(unit, reason));
        }
        Ok(())
    }

    fn is_active(&self, unit: &str) -> Result<bool> {
        check_unit(unit)?;
        let output = self.run_cmd(&Self::build_is_active_args(unit))?;
        Ok(output.success())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_restart_args() {
        assert_eq!(
            SystemdSupervisor::build_restart_args("frpc_home"),
            vec!["restart", "frpc_home"]
        );
        assert_eq!(
            SystemdSupervisor::build_is_active_args("frpc_home"),
            vec!["is-active", "--quiet", "frpc_home"]
        );
    }

    #[test]
    fn test_rejects_bad_unit_names() {
        let supervisor = SystemdSupervisor::with_binary("true");
        assert!(matches!(supervisor.restart(""), Err(Error::Validation(_))));
        assert!(matches!(supervisor.restart("--all"), Err(Error::Validation(_))));
        assert!(matches!(supervisor.is_active("a b"), Err(Error::Validation(_))));
    }

    #[test]
    fn test_missing_binary() {
        let supervisor = SystemdSupervisor::with_binary("definitely-not-a-real-systemctl");
        assert!(matches!(
            supervisor.restart("frpc"),
            Err(Error::CommandNotFound(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_exit_status_mapping() {
        assert!(SystemdSupervisor::with_binary("true").restart("frpc").is_ok());
        assert!(SystemdSupervisor::with_binary("true").is_active("frpc").unwrap());

        let failing = SystemdSupervisor::with_binary("false");
        assert!(matches!(
            failing.restart("frpc"),
            Err(Error::Process { unit, .. }) if unit == "frpc"
        ));
        assert!(!failing.is_active("frpc").unwrap());
    }
}
