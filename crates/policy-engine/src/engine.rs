//! The mediation engine: classify, resolve trust, decide, audit.
//!
//! `mediate` is synchronous and safe to call from many threads. Each call
//! captures the live policy snapshot once and evaluates against it without
//! holding any lock, so a concurrent reload is seen entirely or not at all.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use winewarden_core::config::{Config, ConfigPaths};
use winewarden_core::error::WineWardenError;
use winewarden_core::ids::SessionKey;
use winewarden_core::paths::{home_dir, Zone};
use winewarden_core::store::TrustStore;
use winewarden_core::types::AccessAttempt;

use crate::audit::{AuditInput, AuditRecord, AuditSink, AuditTrail, MemorySink};
use crate::cache::{CacheKey, CacheStats, DecisionCache};
use crate::decision::PolicyDecision;
use crate::policy::{PolicySnapshot, PolicyVersion};
use crate::rules::{evaluate, AttemptFacts};
use crate::trust::TrustResolver;
use crate::zones::canonical::{FsView, HostFs};

/// Per-session facts passed into every evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvaluationContext {
    pub session: SessionKey,
    /// Already canonical; see [`MediationEngine::context`].
    pub prefix_root: PathBuf,
}

/// Outcome of one attempt: the verdict and the audit record it produced.
#[derive(Debug, Clone)]
pub struct Mediation {
    pub decision: PolicyDecision,
    pub record: AuditRecord,
}

pub struct EngineBuilder {
    config: Config,
    paths: ConfigPaths,
    home: Option<PathBuf>,
    fs: Option<Arc<dyn FsView>>,
    sink: Option<Box<dyn AuditSink>>,
    trust_store: Option<TrustStore>,
}

impl EngineBuilder {
    pub fn home(mut self, home: impl Into<PathBuf>) -> Self {
        self.home = Some(home.into());
        self
    }

    pub fn fs(mut self, fs: Arc<dyn FsView>) -> Self {
        self.fs = Some(fs);
        self
    }

    pub fn sink(mut self, sink: impl AuditSink + 'static) -> Self {
        self.sink = Some(Box::new(sink));
        self
    }

    pub fn trust_store(mut self, store: TrustStore) -> Self {
        self.trust_store = Some(store);
        self
    }

    pub fn build(self) -> Result<MediationEngine, WineWardenError> {
        let home = self.home.unwrap_or_else(home_dir);
        let fs = self.fs.unwrap_or_else(|| Arc::new(HostFs));
        let snapshot = PolicySnapshot::compile(
            PolicyVersion::INITIAL,
            &self.config,
            &self.paths,
            &home,
            fs.clone(),
        )?;

        let capacity = if self.config.engine.cache_enabled {
            self.config.engine.cache_capacity
        } else {
            0
        };
        let trust = TrustResolver::from_config(&self.config.trust);
        if let Some(store) = &self.trust_store {
            trust.seed(store);
        }
        let sink = self.sink.unwrap_or_else(|| Box::new(MemorySink::new()));

        info!(
            version = %snapshot.version,
            cache_capacity = capacity,
            default_tier = %self.config.trust.default_tier,
            pirate_safe = self.config.trust.pirate_safe,
            "mediation engine ready"
        );
        Ok(MediationEngine {
            cache: DecisionCache::new(capacity, snapshot.version),
            snapshot: RwLock::new(Arc::new(snapshot)),
            reload_lock: Mutex::new(()),
            paths: self.paths,
            home,
            fs,
            trust,
            audit: AuditTrail::new(sink, self.config.audit.clone()),
        })
    }
}

pub struct MediationEngine {
    snapshot: RwLock<Arc<PolicySnapshot>>,
    reload_lock: Mutex<()>,
    paths: ConfigPaths,
    home: PathBuf,
    fs: Arc<dyn FsView>,
    trust: TrustResolver,
    cache: DecisionCache,
    audit: AuditTrail,
}

impl std::fmt::Debug for MediationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediationEngine")
            .field("version", &self.policy_version())
            .field("home", &self.home)
            .field("cache", &self.cache)
            .field("audit", &self.audit)
            .finish_non_exhaustive()
    }
}

impl MediationEngine {
    pub fn builder(config: Config, paths: ConfigPaths) -> EngineBuilder {
        EngineBuilder {
            config,
            paths,
            home: None,
            fs: None,
            sink: None,
            trust_store: None,
        }
    }

    pub fn snapshot(&self) -> Arc<PolicySnapshot> {
        self.snapshot.read().clone()
    }

    pub fn policy_version(&self) -> PolicyVersion {
        self.snapshot.read().version
    }

    pub fn trust(&self) -> &TrustResolver {
        &self.trust
    }

    /// Builds a session context with the prefix root canonicalized once.
    pub fn context(&self, session: SessionKey, prefix_root: &Path) -> EvaluationContext {
        let prefix_root = self.snapshot().classifier.canonical_prefix(prefix_root);
        EvaluationContext {
            session,
            prefix_root,
        }
    }

    pub fn mediate(
        &self,
        attempt: AccessAttempt,
        ctx: &EvaluationContext,
    ) -> Result<Mediation, WineWardenError> {
        let tier = self.trust.resolve(&ctx.session);
        let snapshot = self.snapshot();
        let classification = snapshot
            .classifier
            .classify_in(&attempt.target, &ctx.prefix_root);

        let decision = if classification.is_ambiguous() {
            PolicyDecision::no_match(Zone::Unclassified)
        } else {
            let target = &classification.target;
            let facts = AttemptFacts {
                zone: classification.zone,
                operation: attempt.operation,
                tier,
                target: (!target.identifier).then_some(target.path.as_path()),
                prefix_root: Some(&ctx.prefix_root),
            };
            let key = CacheKey {
                target: target.path.clone(),
                prefix_root: ctx.prefix_root.clone(),
                operation: attempt.operation,
                tier,
                version: snapshot.version,
            };
            self.cache
                .get_or_compute(key, || evaluate(&facts, &snapshot.ruleset))
        };

        debug!(
            pid = attempt.pid,
            operation = %attempt.operation,
            target = %classification.target.display(),
            zone = %classification.zone,
            tier = %tier,
            action = decision.action.kind(),
            rule = %decision.rule_id,
            "attempt mediated"
        );

        let record = self.audit.record(AuditInput {
            session: ctx.session.clone(),
            canonical_target: classification.target.display(),
            zone: classification.zone,
            classification_note: classification.ambiguity,
            trust_tier: tier,
            decision: decision.clone(),
            policy_version: snapshot.version,
            attempt,
        })?;
        Ok(Mediation { decision, record })
    }

    /// Compiles `config` into the next policy version and swaps it in.
    ///
    /// On failure the live snapshot is untouched.
    pub fn reload(&self, config: &Config) -> Result<PolicyVersion, WineWardenError> {
        let _reloading = self.reload_lock.lock();
        let next = self.policy_version().next();
        let snapshot = match PolicySnapshot::compile(next, config, &self.paths, &self.home, self.fs.clone()) {
            Ok(snapshot) => snapshot,
            Err(err) => {
                warn!(error = %err, live = %self.policy_version(), "policy reload rejected");
                return Err(err);
            }
        };
        *self.snapshot.write() = Arc::new(snapshot);
        self.cache.invalidate(next);
        info!(version = %next, "policy reloaded");
        Ok(next)
    }

    pub fn reload_from(&self, path: &Path) -> Result<PolicyVersion, WineWardenError> {
        let config = Config::load(path)
            .map_err(|err| WineWardenError::InvalidConfig(format!("{err:#}")))?;
        self.reload(&config)
    }

    pub fn flush_audit(&self) -> Result<(), WineWardenError> {
        self.audit.flush()
    }

    pub fn audit_pending(&self) -> usize {
        self.audit.pending()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::OffsetDateTime;
    use winewarden_core::trust::TrustTier;
    use winewarden_core::types::Operation;

    use crate::decision::DecisionAction;

    fn engine(sink: MemorySink) -> MediationEngine {
        let paths = ConfigPaths::rooted(Path::new("/cfg"), Path::new("/data"));
        MediationEngine::builder(Config::default_config(), paths)
            .home("/home/user")
            .sink(sink)
            .build()
            .unwrap()
    }

    fn attempt(operation: Operation, target: &str) -> AccessAttempt {
        AccessAttempt {
            timestamp: OffsetDateTime::UNIX_EPOCH,
            pid: 100,
            operation,
            target: target.to_string(),
        }
    }

    #[test]
    fn test_engine_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<MediationEngine>();
    }

    #[test]
    fn test_tier_change_applies_to_later_attempts() {
        let engine = engine(MemorySink::new());
        let ctx = engine.context(SessionKey::new("game"), Path::new("/home/user/game/prefix"));
        let target = "/home/user/game/prefix/drive_c/save.dat";

        let first = engine.mediate(attempt(Operation::Write, target), &ctx).unwrap();
        assert_eq!(first.decision.rule_id, "prefix_internal_yellow");

        engine.trust().set(&ctx.session, TrustTier::Red);
        let second = engine.mediate(attempt(Operation::Write, target), &ctx).unwrap();
        assert_eq!(second.decision.action, DecisionAction::Deny);
        assert_eq!(second.record.trust_tier, TrustTier::Red);
    }

    #[test]
    fn test_ambiguous_target_fails_closed_and_is_noted() {
        let sink = MemorySink::new();
        let engine = engine(sink.handle());
        let ctx = engine.context(SessionKey::new("game"), Path::new("/home/user/game/prefix"));
        let mediation = engine.mediate(attempt(Operation::Read, "save.dat"), &ctx).unwrap();
        assert_eq!(mediation.decision.rule_id, "no_match");
        assert_eq!(mediation.record.zone, Zone::Unclassified);
        assert!(mediation.record.classification_note.is_some());
        assert_eq!(engine.cache_stats().misses, 0);
        assert_eq!(sink.len(), 1);
    }

    #[test]
    fn test_failed_reload_keeps_live_policy() {
        let engine = engine(MemorySink::new());
        let mut broken = Config::default_config();
        broken.rules.clear();
        let err = engine.reload(&broken).unwrap_err();
        assert!(matches!(err, WineWardenError::UnloadableRuleset(_)));
        assert_eq!(engine.policy_version(), PolicyVersion(1));

        let version = engine.reload(&Config::default_config()).unwrap();
        assert_eq!(version, PolicyVersion(2));
        assert_eq!(engine.policy_version(), PolicyVersion(2));
    }
}
