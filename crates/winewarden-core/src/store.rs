use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use time::OffsetDateTime;

use crate::ids::SessionKey;
use crate::trust::TrustTier;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutableIdentity {
    pub path: PathBuf,
    pub sha256: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrustRecord {
    pub session: SessionKey,
    pub executable: Option<PathBuf>,
    pub tier: TrustTier,
    pub runs: u32,
    pub last_seen: OffsetDateTime,
}

/// Persisted per-game trust tiers (`trust.json`).
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct TrustStore {
    pub records: HashMap<SessionKey, TrustRecord>,
}

impl ExecutableIdentity {
    pub fn from_path(path: &Path) -> Result<Self> {
        let bytes = fs::read(path)
            .with_context(|| format!("read executable {}", path.display()))?;
        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        let hash = hasher.finalize();
        let sha256 = hex::encode(hash);
        Ok(Self {
            path: path.to_path_buf(),
            sha256,
        })
    }

    pub fn session_key(&self) -> SessionKey {
        SessionKey::new(self.sha256.clone())
    }
}

/// Resolves a CLI game argument: an existing file is identified by its hash,
/// anything else is taken as a literal game id.
pub fn session_key_for(game: &str) -> Result<(SessionKey, Option<PathBuf>)> {
    let path = Path::new(game);
    if path.is_file() {
        let identity = ExecutableIdentity::from_path(path)?;
        return Ok((identity.session_key(), Some(identity.path)));
    }
    Ok((SessionKey::new(game), None))
}

impl TrustStore {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(path)
            .with_context(|| format!("read trust store {}", path.display()))?;
        let store = serde_json::from_str(&contents).context("parse trust store JSON")?;
        Ok(store)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create trust dir {}", parent.display()))?;
        }
        let contents = serde_json::to_string_pretty(self).context("render trust store JSON")?;
        fs::write(path, contents)
            .with_context(|| format!("write trust store {}", path.display()))?;
        Ok(())
    }

    pub fn record_run(&mut self, session: &SessionKey, tier: TrustTier) {
        let now = OffsetDateTime::now_utc();
        let entry = self.entry(session, tier, now);
        entry.runs = entry.runs.saturating_add(1);
        entry.last_seen = now;
    }

    pub fn get_tier(&self, session: &SessionKey) -> Option<TrustTier> {
        self.records.get(session).map(|record| record.tier)
    }

    pub fn set_tier(&mut self, session: &SessionKey, executable: Option<PathBuf>, tier: TrustTier) {
        let now = OffsetDateTime::now_utc();
        let entry = self.entry(session, tier, now);
        entry.tier = tier;
        entry.last_seen = now;
        if executable.is_some() {
            entry.executable = executable;
        }
    }

    pub fn tiers(&self) -> impl Iterator<Item = (&SessionKey, TrustTier)> {
        self.records.iter().map(|(key, record)| (key, record.tier))
    }

    fn entry(&mut self, session: &SessionKey, tier: TrustTier, now: OffsetDateTime) -> &mut TrustRecord {
        self.records.entry(session.clone()).or_insert_with(|| TrustRecord {
            session: session.clone(),
            executable: None,
            tier,
            runs: 0,
            last_seen: now,
        })
    }
}
