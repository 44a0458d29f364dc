//! Load, mutate, persist, and restart as one operation
//!
//! A document never outlives a single call: it is read from disk, changed in
//! memory once, written back through an atomic replace, and the tunnel
//! service is restarted so the running client picks up the change.

use crate::{
    parse_with_warnings, serialize, Document, FileStore, Operation, ParseWarning,
    ProcessSupervisor, Result,
};
use std::fmt;
use std::path::Path;

/// Progress of one change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Idle,
    Loaded,
    Mutated,
    Persisted,
    Restarted,
    Done,
    Failed,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Idle => "idle",
            Stage::Loaded => "loaded",
            Stage::Mutated => "mutated",
            Stage::Persisted => "persisted",
            Stage::Restarted => "restarted",
            Stage::Done => "done",
            Stage::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// What happened to the service after the document was written
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestartOutcome {
    Restarted,
    Skipped,
    /// The document change is on disk; only the restart needs retrying
    Failed(String),
}

/// Result of a successful change
#[derive(Debug, Clone)]
pub struct ChangeReport {
    /// Document as written to disk
    pub document: Document,
    /// Lines skipped while reading the previous document
    pub warnings: Vec<ParseWarning>,
    pub restart: RestartOutcome,
    pub stages: Vec<Stage>,
}

impl ChangeReport {
    pub fn restart_failed(&self) -> bool {
        matches!(self.restart, RestartOutcome::Failed(_))
    }
}

#[derive(Debug)]
struct Progress {
    stages: Vec<Stage>,
}

impl Progress {
    fn new() -> Self {
        Self {
            stages: vec![Stage::Idle],
        }
    }

    fn advance(&mut self, stage: Stage) {
        if let Some(prev) = self.stages.last() {
            log::debug!("{} -> {}", prev, stage);
        }
        self.stages.push(stage);
    }

    fn current(&self) -> Stage {
        self.stages.last().copied().unwrap_or(Stage::Idle)
    }
}

/// Sequences document changes against a file store and a service supervisor
#[derive(Debug, Clone)]
pub struct LifecycleCoordinator<F, P> {
    store: F,
    supervisor: P,
    restart_after_change: bool,
}

impl<F: FileStore, P: ProcessSupervisor> LifecycleCoordinator<F, P> {
    pub fn new(store: F, supervisor: P) -> Self {
        Self {
            store,
            supervisor,
            restart_after_change: true,
        }
    }

    pub fn with_restart(mut self, restart_after_change: bool) -> Self {
        self.restart_after_change = restart_after_change;
        self
    }

    pub fn store(&self) -> &F {
        &self.store
    }

    pub fn supervisor(&self) -> &P {
        &self.supervisor
    }

    /// Read and parse a document without changing it
    pub fn load(&self, artifact_path: &Path) -> Result<(Document, Vec<ParseWarning>)> {
        let text = self.store.read(artifact_path)?;
        let (document, warnings) = parse_with_warnings(&text);
        for warning in &warnings {
            log::warn!("{}: {}", artifact_path.display(), warning);
        }
        Ok((document, warnings))
    }

    /// Apply one operation to the document at `artifact_path` and restart `unit`.
    ///
    /// Errors before the write leave the file untouched. A failed restart does
    /// not fail the call; it is reported in [`ChangeReport::restart`].
    pub fn apply_change(
        &self,
        artifact_path: &Path,
        unit: &str,
        operation: &Operation,
    ) -> Result<ChangeReport> {
        let mut progress = Progress::new();
        match self.run(artifact_path, unit, operation, &mut progress) {
            Ok((document, warnings, restart)) => {
                progress.advance(Stage::Done);
                Ok(ChangeReport {
                    document,
                    warnings,
                    restart,
                    stages: progress.stages,
                })
            }
            Err(e) => {
                log::error!(
                    "{} '{}' failed after stage {}: {}",
                    operation.verb(),
                    operation.target(),
                    progress.current(),
                    e
                );
                progress.advance(Stage::Failed);
                Err(e)
            }
        }
    }

    fn run(
        &self,
        artifact_path: &Path,
        unit: &str,
        operation: &Operation,
        progress: &mut Progress,
    ) -> Result<(Document, Vec<ParseWarning>, RestartOutcome)> {
        let (loaded, warnings) = self.load(artifact_path)?;
        progress.advance(Stage::Loaded);

        let document = operation.apply(&loaded)?;
        progress.advance(Stage::Mutated);

        self.store
            .write_atomic(artifact_path, &serialize(&document))?;
        progress.advance(Stage::Persisted);
        log::info!(
            "{} '{}' written to {}",
            operation.verb(),
            operation.target(),
            artifact_path.display()
        );

        let restart = if self.restart_after_change {
            match self.supervisor.restart(unit) {
                Ok(()) => {
                    progress.advance(Stage::Restarted);
                    log::info!("Restarted {}", unit);
                    RestartOutcome::Restarted
                }
                Err(e) => {
                    log::warn!("Change saved but restarting {} failed: {}", unit, e);
                    RestartOutcome::Failed(e.to_string())
                }
            }
        } else {
            log::debug!("Restart of {} skipped", unit);
            RestartOutcome::Skipped
        };

        Ok((document, warnings, restart))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        Error, LocalFileStore, ProtocolType, ProxyChanges, ProxyEntry, DEFAULT_LOCAL_IP,
    };
    use std::cell::RefCell;
    use std::collections::HashMap;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::tempdir;

    const DOC: &str = r#"[common]
server_addr = "1.2.3.4"
server_port = 7000

[tcp_myclient_1]
name = "tcp_myclient_1"
type = "tcp"
local_ip = "127.0.0.1"
local_port = 8080
remote_port = 80
"#;

    #[derive(Default)]
    struct MemoryStore {
        files: RefCell<HashMap<PathBuf, String>>,
        fail_writes: bool,
    }

    impl MemoryStore {
        fn with(path: &Path, text: &str) -> Self {
            let store = Self::default();
            store
                .files
                .borrow_mut()
                .insert(path.to_path_buf(), text.to_string());
            store
        }

        fn get(&self, path: &Path) -> Option<String> {
            self.files.borrow().get(path).cloned()
        }
    }

    impl FileStore for MemoryStore {
        fn read(&self, path: &Path) -> Result<String> {
            self.get(path).ok_or_else(|| {
                Error::Io(std::io::Error::new(std::io::ErrorKind::NotFound, "missing"))
            })
        }

        fn write_atomic(&self, path: &Path, contents: &str) -> Result<()> {
            if self.fail_writes {
                return Err(Error::Io(std::io::Error::new(
                    std::io::ErrorKind::PermissionDenied,
                    "read-only",
                )));
            }
            self.files
                .borrow_mut()
                .insert(path.to_path_buf(), contents.to_string());
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingSupervisor {
        restarted: RefCell<Vec<String>>,
        fail: bool,
    }

    impl ProcessSupervisor for RecordingSupervisor {
        fn restart(&self, unit: &str) -> Result<()> {
            if self.fail {
                return Err(Error::process(unit, "unit not loaded"));
            }
            self.restarted.borrow_mut().push(unit.to_string());
            Ok(())
        }

        fn is_active(&self, _unit: &str) -> Result<bool> {
            Ok(!self.fail)
        }
    }

    fn path() -> PathBuf {
        PathBuf::from("/etc/frp/frpc_myclient.toml")
    }

    fn add_http() -> Operation {
        Operation::Add(
            ProxyEntry::new("http_myclient_2", ProtocolType::Http, 8081, 8081)
                .with_custom_domains(["a.example.com"]),
        )
    }

    #[test]
    fn test_apply_add_persists_and_restarts() {
        let coordinator = LifecycleCoordinator::new(
            MemoryStore::with(&path(), DOC),
            RecordingSupervisor::default(),
        );

        let report = coordinator
            .apply_change(&path(), "frpc_myclient", &add_http())
            .unwrap();

        assert_eq!(report.restart, RestartOutcome::Restarted);
        assert_eq!(
            report.stages,
            vec![
                Stage::Idle,
                Stage::Loaded,
                Stage::Mutated,
                Stage::Persisted,
                Stage::Restarted,
                Stage::Done
            ]
        );
        assert_eq!(
            *coordinator.supervisor().restarted.borrow(),
            vec!["frpc_myclient"]
        );

        let written = coordinator.store().get(&path()).unwrap();
        assert!(written.contains("[http_myclient_2]"));
        assert!(written.contains("custom_domains = [\"a.example.com\"]"));
        assert_eq!(serialize(&crate::parse(&written)), written);
        assert_eq!(report.document.names(), vec!["tcp_myclient_1", "http_myclient_2"]);
    }

    #[test]
    fn test_mutation_failure_leaves_file_untouched() {
        let coordinator = LifecycleCoordinator::new(
            MemoryStore::with(&path(), DOC),
            RecordingSupervisor::default(),
        );
        let op = Operation::Delete {
            name: "ghost".to_string(),
        };

        let err = coordinator.apply_change(&path(), "frpc", &op).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
        assert_eq!(coordinator.store().get(&path()).unwrap(), DOC);
        assert!(coordinator.supervisor().restarted.borrow().is_empty());
    }

    #[test]
    fn test_unreadable_artifact_is_io_error() {
        let coordinator =
            LifecycleCoordinator::new(MemoryStore::default(), RecordingSupervisor::default());
        let err = coordinator
            .apply_change(&path(), "frpc", &add_http())
            .unwrap_err();
        assert_eq!(err.kind(), "io");
    }

    #[test]
    fn test_write_failure_skips_restart() {
        let mut store = MemoryStore::with(&path(), DOC);
        store.fail_writes = true;
        let coordinator = LifecycleCoordinator::new(store, RecordingSupervisor::default());

        let err = coordinator
            .apply_change(&path(), "frpc", &add_http())
            .unwrap_err();
        assert!(matches!(err, Error::Io(_)));
        assert_eq!(coordinator.store().get(&path()).unwrap(), DOC);
        assert!(coordinator.supervisor().restarted.borrow().is_empty());
    }

    #[test]
    fn test_restart_failure_is_not_fatal() {
        let supervisor = RecordingSupervisor {
            fail: true,
            ..Default::default()
        };
        let coordinator = LifecycleCoordinator::new(MemoryStore::with(&path(), DOC), supervisor);

        let report = coordinator
            .apply_change(&path(), "frpc_myclient", &add_http())
            .unwrap();
        assert!(report.restart_failed());
        assert!(!report.stages.contains(&Stage::Restarted));
        assert!(coordinator
            .store()
            .get(&path())
            .unwrap()
            .contains("[http_myclient_2]"));
    }

    #[test]
    fn test_restart_can_be_skipped() {
        let coordinator = LifecycleCoordinator::new(
            MemoryStore::with(&path(), DOC),
            RecordingSupervisor::default(),
        )
        .with_restart(false);

        let report = coordinator
            .apply_change(&path(), "frpc", &add_http())
            .unwrap();
        assert_eq!(report.restart, RestartOutcome::Skipped);
        assert!(coordinator.supervisor().restarted.borrow().is_empty());
    }

    #[test]
    fn test_edit_and_delete_on_disk() {
        let dir = tempdir().unwrap();
        let artifact = dir.path().join("frpc_myclient.toml");
        fs::write(&artifact, DOC).unwrap();

        let coordinator =
            LifecycleCoordinator::new(LocalFileStore::new(), RecordingSupervisor::default());

        coordinator
            .apply_change(&artifact, "frpc_myclient", &add_http())
            .unwrap();

        let edit = Operation::Edit {
            name: "http_myclient_2".to_string(),
            changes: ProxyChanges {
                protocol_type: Some(ProtocolType::Tcp),
                ..Default::default()
            },
        };
        coordinator
            .apply_change(&artifact, "frpc_myclient", &edit)
            .unwrap();

        let (doc, _) = coordinator.load(&artifact).unwrap();
        let edited = doc.get("http_myclient_2").unwrap();
        assert!(edited.custom_domains.is_empty());
        assert_eq!(edited.local_address.as_deref(), Some(DEFAULT_LOCAL_IP));

        let delete = Operation::Delete {
            name: "tcp_myclient_1".to_string(),
        };
        let report = coordinator
            .apply_change(&artifact, "frpc_myclient", &delete)
            .unwrap();
        assert_eq!(report.document.names(), vec!["http_myclient_2"]);
        assert_eq!(report.document.common.get("server_addr"), Some("\"1.2.3.4\""));
        assert_eq!(report.document.common.get("server_port"), Some("7000"));
        assert_eq!(coordinator.supervisor().restarted.borrow().len(), 3);
    }
}
