use std::path::PathBuf;

use anyhow::Result;

use winewarden_core::config::{Config, ConfigPaths};
use winewarden_core::store::{session_key_for, TrustStore};
use winewarden_core::trust::TrustTier;

#[derive(Debug)]
pub enum TrustAction {
    Get { game: String },
    Set { game: String, tier: TrustTier },
}

pub fn execute(config_path: Option<PathBuf>, action: TrustAction) -> Result<()> {
    let paths = ConfigPaths::resolve()?;
    let mut store = TrustStore::load(&paths.trust_db_path)?;

    match action {
        TrustAction::Get { game } => {
            let (session, _) = session_key_for(&game)?;
            let tier = match store.get_tier(&session) {
                Some(tier) => tier,
                None => default_tier(config_path, &paths),
            };
            println!("Trust: {} ({}, {})", tier, tier.calm_label(), game);
        }
        TrustAction::Set { game, tier } => {
            let (session, executable) = session_key_for(&game)?;
            store.set_tier(&session, executable, tier);
            store.save(&paths.trust_db_path)?;
            println!("Trust updated to {}", tier);
        }
    }
    Ok(())
}

/// Unknown games fall back to the configured default, or the built-in one
/// when no config exists yet.
fn default_tier(config_path: Option<PathBuf>, paths: &ConfigPaths) -> TrustTier {
    let path = config_path.unwrap_or_else(|| paths.config_path.clone());
    Config::load(&path)
        .map(|config| config.trust.default_tier)
        .unwrap_or_else(|_| Config::default_config().trust.default_tier)
}
