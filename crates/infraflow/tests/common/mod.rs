#![allow(deprecated)] // Command::cargo_bin

use assert_cmd::Command;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub const ACI_GATEWAY: &str =
    include_str!("../../../infraflow-core/src/parser/fixtures/aci_gateway.kdl");

pub struct TestProject {
    pub root: TempDir,
}

impl TestProject {
    pub fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        Self { root }
    }

    pub fn write_stack_kdl(&self, content: &str) {
        fs::write(self.root.path().join("stack.kdl"), content).unwrap();
    }

    #[allow(dead_code)]
    pub fn write_resource_file(&self, name: &str, content: &str) {
        let dir = self.root.path().join("resources");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(format!("{}.kdl", name)), content).unwrap();
    }

    pub fn path(&self) -> PathBuf {
        self.root.path().to_path_buf()
    }

    #[allow(dead_code)]
    pub fn state_file(&self) -> PathBuf {
        self.root.path().join(".infraflow").join("state.json")
    }

    /// `infra` running inside the project, isolated from the caller's environment
    pub fn infra(&self) -> Command {
        infra_in(self.root.path())
    }
}

pub fn infra_in(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("infra").unwrap();
    cmd.current_dir(dir)
        .env_remove("INFRA_STATE_DIR")
        .env_remove("INFRA_PARALLELISM")
        .env_remove("INFRAFLOW_STACK_PATH")
        .env_remove("INFRAFLOW_PROJECT_ROOT")
        .env("NO_COLOR", "1");
    cmd
}
