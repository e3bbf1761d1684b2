/// Common test utilities and helpers for starwatch tests

use assert_fs::prelude::*;
use assert_fs::TempDir;
use std::path::PathBuf;
use std::process::{Command, Output};

/// Variables that must not leak from the developer's shell into test runs
const SCRUBBED_VARS: &[&str] = &[
    "GITHUB_TOKEN",
    "EMAIL_ADDRESS",
    "EMAIL_RECEIVER",
    "EMAIL_PASSWORD",
    "RUST_LOG",
];

/// Isolated config, state and log locations for one CLI invocation
pub struct TestEnvironment {
    pub temp_dir: TempDir,
}

impl TestEnvironment {
    pub fn new() -> Self {
        Self {
            temp_dir: TempDir::new().expect("Failed to create temp dir"),
        }
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.temp_dir.child(name).path().to_path_buf()
    }

    /// Write a config whose files all live in the temp dir
    ///
    /// `api_url` points at an address nothing listens on, so an accidental
    /// network call fails fast instead of reaching GitHub.
    pub fn create_config(&self, extra_yaml: &str) -> PathBuf {
        let dir = self.temp_dir.path().display().to_string();
        let content = format!(
            r#"
github:
  account: "octocat"
  api_url: "http://127.0.0.1:9"
  timeout_secs: 2
state:
  counts_file: "{dir}/counts.json"
  checkpoint_file: "{dir}/last.txt"
status_log:
  path: "{dir}/status.log"
  max_lines: 5
{extra_yaml}
"#
        );

        let config = self.temp_dir.child("config.yml");
        config
            .write_str(&content)
            .expect("Failed to write test config");
        config.path().to_path_buf()
    }

    /// Run the starwatch binary with a scrubbed environment
    pub fn run(&self, args: &[&str], env: &[(&str, &str)]) -> Output {
        let mut command = Command::new(env!("CARGO_BIN_EXE_starwatch"));
        command
            .args(args)
            .env("XDG_CONFIG_HOME", self.temp_dir.path())
            .env("HOME", self.temp_dir.path());

        for var in SCRUBBED_VARS {
            command.env_remove(var);
        }
        for (key, value) in env {
            command.env(key, value);
        }

        command.output().expect("Failed to execute starwatch")
    }
}
