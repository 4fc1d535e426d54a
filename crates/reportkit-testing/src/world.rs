//! Isolated environment for CLI integration tests.
//!
//! Every world owns a temp directory holding the workspace (`reportkit.toml`
//! plus the SQLite database) so tests never touch the user's data dir.

use anyhow::Result;
use assert_cmd::Command;
use reportkit_store::{Backend, SqliteBackend};
use reportkit_types::Schema;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

const CONFIG_FILE: &str = "reportkit.toml";
const DATABASE_FILE: &str = "reportkit.db";

pub struct TestWorld {
    temp_dir: TempDir,
    data_dir: PathBuf,
    env_vars: HashMap<String, String>,
}

impl Default for TestWorld {
    fn default() -> Self {
        Self::new()
    }
}

impl TestWorld {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let data_dir = temp_dir.path().join(".reportkit");
        std::fs::create_dir_all(&data_dir).expect("Failed to create data dir");

        Self {
            temp_dir,
            data_dir,
            env_vars: HashMap::new(),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn temp_dir(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(DATABASE_FILE)
    }

    /// Set an environment variable for CLI execution.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env_vars.insert(key.into(), value.into());
        self
    }

    /// Write `reportkit.toml` into the data dir.
    pub fn with_config(self, toml: &str) -> Self {
        std::fs::write(self.data_dir.join(CONFIG_FILE), toml).expect("Failed to write config");
        self
    }

    /// Open the workspace database with `schemas` registered, for seeding.
    pub fn open_backend(&self, schemas: &[Arc<Schema>]) -> Result<SqliteBackend> {
        let backend = SqliteBackend::open(&self.database_path())?;
        for schema in schemas {
            backend.register(schema.clone())?;
        }
        Ok(backend)
    }

    /// Configure a CLI command with this world's data dir and env vars.
    pub fn configure_command<'a>(&self, cmd: &'a mut Command) -> &'a mut Command {
        cmd.arg("--data-dir").arg(self.data_dir());
        cmd.current_dir(self.temp_dir.path());
        for (key, value) in &self.env_vars {
            cmd.env(key, value);
        }
        cmd
    }

    /// Run the `reportkit` binary inside this world.
    #[allow(deprecated)]
    pub fn run(&self, args: &[&str]) -> Result<CliResult> {
        let mut cmd = Command::cargo_bin("reportkit")
            .map_err(|e| anyhow::anyhow!("Failed to find reportkit binary: {}", e))?;
        self.configure_command(&mut cmd);
        cmd.args(args);
        let output = cmd.output()?;

        Ok(CliResult {
            status: output.status,
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stdout_bytes: output.stdout,
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}

#[derive(Debug)]
pub struct CliResult {
    pub status: std::process::ExitStatus,
    pub stdout: String,
    pub stdout_bytes: Vec<u8>,
    pub stderr: String,
}

impl CliResult {
    pub fn success(&self) -> bool {
        self.status.success()
    }

    pub fn stdout(&self) -> &str {
        &self.stdout
    }

    pub fn stderr(&self) -> &str {
        &self.stderr
    }
}
