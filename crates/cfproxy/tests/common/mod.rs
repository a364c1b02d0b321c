use assert_cmd::Command;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

/// Scratch directory for state files and reports, with a clean environment
pub struct TestWorkspace {
    pub root: TempDir,
}

impl TestWorkspace {
    pub fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        Self { root }
    }

    pub fn path(&self) -> PathBuf {
        self.root.path().to_path_buf()
    }

    pub fn state_file(&self) -> PathBuf {
        self.root.path().join("proxy_state.json")
    }

    pub fn report_dir(&self) -> PathBuf {
        self.root.path().join("reports")
    }

    pub fn write_state(&self, content: &str) {
        fs::write(self.state_file(), content).unwrap();
    }

    pub fn reports(&self) -> Vec<String> {
        match fs::read_dir(self.report_dir()) {
            Ok(entries) => {
                let mut names: Vec<String> = entries
                    .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
                    .collect();
                names.sort();
                names
            }
            Err(_) => Vec::new(),
        }
    }

    /// `cfproxy` with no inherited credentials, pointed at this workspace
    #[allow(deprecated)]
    pub fn command(&self) -> Command {
        let mut cmd = Command::cargo_bin("cfproxy").unwrap();
        cmd.env_clear()
            .current_dir(self.path())
            .arg("--state-file")
            .arg(self.state_file())
            .arg("--report-dir")
            .arg(self.report_dir());
        cmd
    }
}
