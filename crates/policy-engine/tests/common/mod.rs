#![allow(dead_code)]

use std::fs;
use std::os::unix::fs::symlink;
use std::path::PathBuf;

use tempfile::TempDir;
use time::OffsetDateTime;

use policy_engine::{MediationEngine, MemorySink};
use winewarden_core::config::{Config, ConfigPaths};
use winewarden_core::types::{AccessAttempt, Operation};

/// A throwaway home directory with a Wine prefix inside it:
///
/// ```text
/// home/user/
///   .ssh/id_rsa
///   Documents/
///   game/prefix/
///     drive_c/users/steamuser/Documents/
///     drive_c/link_out -> home/user/.ssh
///     drive_c/loop_a -> loop_b -> loop_a
///     dosdevices/z: -> /
/// ```
pub struct Fixture {
    _dir: TempDir,
    pub root: PathBuf,
    pub home: PathBuf,
    pub prefix: PathBuf,
}

impl Fixture {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let root = dir.path().canonicalize().unwrap();
        let home = root.join("home/user");
        let prefix = home.join("game/prefix");
        let drive_c = prefix.join("drive_c");

        fs::create_dir_all(home.join(".ssh")).unwrap();
        fs::write(home.join(".ssh/id_rsa"), b"secret").unwrap();
        fs::create_dir_all(home.join("Documents")).unwrap();
        fs::create_dir_all(drive_c.join("users/steamuser/Documents")).unwrap();
        fs::create_dir_all(prefix.join("dosdevices")).unwrap();
        symlink(home.join(".ssh"), drive_c.join("link_out")).unwrap();
        symlink(drive_c.join("loop_b"), drive_c.join("loop_a")).unwrap();
        symlink(drive_c.join("loop_a"), drive_c.join("loop_b")).unwrap();
        symlink("/", prefix.join("dosdevices/z:")).unwrap();

        Self {
            _dir: dir,
            root,
            home,
            prefix,
        }
    }

    pub fn paths(&self) -> ConfigPaths {
        ConfigPaths::rooted(&self.root.join("config"), &self.root.join("data"))
    }

    pub fn engine(&self, config: Config, sink: MemorySink) -> MediationEngine {
        MediationEngine::builder(config, self.paths())
            .home(&self.home)
            .sink(sink)
            .build()
            .unwrap()
    }

    pub fn default_engine(&self) -> (MediationEngine, MemorySink) {
        let sink = MemorySink::new();
        let engine = self.engine(Config::default_config(), sink.handle());
        (engine, sink)
    }

    pub fn in_prefix(&self, relative: &str) -> String {
        self.prefix.join(relative).to_string_lossy().into_owned()
    }

    pub fn in_home(&self, relative: &str) -> String {
        self.home.join(relative).to_string_lossy().into_owned()
    }
}

pub fn attempt(pid: u32, operation: Operation, target: impl Into<String>) -> AccessAttempt {
    AccessAttempt {
        timestamp: OffsetDateTime::UNIX_EPOCH,
        pid,
        operation,
        target: target.into(),
    }
}
