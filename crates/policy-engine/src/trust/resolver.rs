use std::collections::HashMap;

use parking_lot::RwLock;
use tracing::info;

use winewarden_core::config::TrustConfig;
use winewarden_core::ids::SessionKey;
use winewarden_core::store::TrustStore;
use winewarden_core::trust::TrustTier;

/// Active trust tier per session.
///
/// `set` only affects attempts resolved afterwards; the engine reads the
/// tier once when an attempt starts.
#[derive(Debug)]
pub struct TrustResolver {
    default_tier: TrustTier,
    pirate_safe: bool,
    tiers: RwLock<HashMap<SessionKey, TrustTier>>,
}

impl TrustResolver {
    pub fn new(default_tier: TrustTier, pirate_safe: bool) -> Self {
        Self {
            default_tier,
            pirate_safe,
            tiers: RwLock::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &TrustConfig) -> Self {
        Self::new(config.default_tier, config.pirate_safe)
    }

    pub fn seed(&self, store: &TrustStore) {
        let mut tiers = self.tiers.write();
        for (session, tier) in store.tiers() {
            tiers.insert(session.clone(), tier);
        }
    }

    /// Tier last set for the session, or the configured default.
    pub fn get(&self, session: &SessionKey) -> TrustTier {
        self.tiers
            .read()
            .get(session)
            .copied()
            .unwrap_or(self.default_tier)
    }

    pub fn set(&self, session: &SessionKey, tier: TrustTier) {
        let previous = self.tiers.write().insert(session.clone(), tier);
        info!(session = %session, tier = %tier, previous = ?previous, "trust tier set");
    }

    /// The tier evaluation runs under; pirate-safe mode is one step stricter.
    pub fn resolve(&self, session: &SessionKey) -> TrustTier {
        let tier = self.get(session);
        if self.pirate_safe {
            tier.downgrade()
        } else {
            tier
        }
    }

    pub fn default_tier(&self) -> TrustTier {
        self.default_tier
    }

    pub fn pirate_safe(&self) -> bool {
        self.pirate_safe
    }
}
