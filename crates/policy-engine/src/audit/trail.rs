//! Ordered, buffered delivery of audit records.
//!
//! Sequence numbers and chain hashes are assigned under the same lock that
//! appends to the pending buffer, so delivery order is arrival order. The
//! per-attempt path only hands records to the sink; the sink's own flush
//! runs from `flush`. A sink outage leaves records buffered; they are
//! retried on the next append and by `flush`. The buffer is bounded and
//! exhaustion is fatal: records are never dropped silently.

use std::collections::VecDeque;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, error, warn};

use winewarden_core::config::AuditConfig;
use winewarden_core::error::WineWardenError;

use super::record::{AuditInput, AuditRecord, GENESIS_HASH};
use super::sink::AuditSink;

struct TrailState {
    sink: Box<dyn AuditSink>,
    pending: VecDeque<AuditRecord>,
    next_sequence: u64,
    last_hash: String,
    delivered: u64,
}

impl TrailState {
    /// Hands pending records to the sink front to back, stopping at the
    /// first failure. Sinks may buffer; durability comes from `flush`.
    fn drain(&mut self) -> Result<(), WineWardenError> {
        while let Some(record) = self.pending.front() {
            self.sink.append(record)?;
            self.pending.pop_front();
            self.delivered += 1;
        }
        Ok(())
    }
}

pub struct AuditTrail {
    state: Mutex<TrailState>,
    config: AuditConfig,
}

impl std::fmt::Debug for AuditTrail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditTrail")
            .field("pending", &self.pending())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl AuditTrail {
    pub fn new(sink: Box<dyn AuditSink>, config: AuditConfig) -> Self {
        Self {
            state: Mutex::new(TrailState {
                sink,
                pending: VecDeque::new(),
                next_sequence: 0,
                last_hash: GENESIS_HASH.to_string(),
                delivered: 0,
            }),
            config,
        }
    }

    pub fn record(&self, input: AuditInput) -> Result<AuditRecord, WineWardenError> {
        let mut state = self.state.lock();

        if state.pending.len() >= self.config.buffer_capacity {
            if let Err(err) = state.drain() {
                debug!(error = %err, "audit sink still unavailable");
            }
            if state.pending.len() >= self.config.buffer_capacity {
                error!(
                    capacity = self.config.buffer_capacity,
                    "audit buffer exhausted; session must stop"
                );
                return Err(WineWardenError::AuditBufferExhausted {
                    capacity: self.config.buffer_capacity,
                });
            }
        }

        let sequence = state.next_sequence;
        let prev_hash = state.last_hash.clone();
        let record = AuditRecord::seal(input, sequence, prev_hash);
        state.next_sequence += 1;
        state.last_hash = record.record_hash.clone();
        state.pending.push_back(record.clone());

        if let Err(err) = state.drain() {
            warn!(
                error = %err,
                pending = state.pending.len(),
                "audit sink unavailable; buffering records"
            );
        }
        Ok(record)
    }

    /// Drains the buffer, retrying with exponential backoff.
    pub fn flush(&self) -> Result<(), WineWardenError> {
        let mut backoff = Duration::from_millis(self.config.retry_backoff_ms);
        let mut attempt = 0;
        loop {
            let outcome = {
                let mut state = self.state.lock();
                state.drain().and_then(|()| state.sink.flush())
            };
            match outcome {
                Ok(()) => return Ok(()),
                Err(err) if attempt >= self.config.max_retries => {
                    error!(
                        error = %err,
                        pending = self.pending(),
                        attempts = attempt + 1,
                        "audit sink unavailable after retries"
                    );
                    return Err(WineWardenError::AuditSinkUnavailable(err.to_string()));
                }
                Err(err) => {
                    warn!(error = %err, attempt, "audit flush failed; retrying");
                    std::thread::sleep(backoff);
                    backoff = backoff.saturating_mul(2);
                    attempt += 1;
                }
            }
        }
    }

    pub fn pending(&self) -> usize {
        self.state.lock().pending.len()
    }

    pub fn delivered(&self) -> u64 {
        self.state.lock().delivered
    }

    pub fn next_sequence(&self) -> u64 {
        self.state.lock().next_sequence
    }

    pub fn last_hash(&self) -> String {
        self.state.lock().last_hash.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;
    use time::OffsetDateTime;

    use crate::audit::sink::MemorySink;
    use crate::decision::PolicyDecision;
    use crate::policy::PolicyVersion;
    use winewarden_core::ids::SessionKey;
    use winewarden_core::paths::Zone;
    use winewarden_core::trust::TrustTier;
    use winewarden_core::types::{AccessAttempt, Operation};

    /// Memory sink that can be switched off.
    struct FlakySink {
        inner: MemorySink,
        down: Arc<AtomicBool>,
        flushes: Arc<AtomicUsize>,
    }

    impl AuditSink for FlakySink {
        fn append(&mut self, record: &AuditRecord) -> Result<(), WineWardenError> {
            if self.down.load(Ordering::SeqCst) {
                return Err(WineWardenError::AuditSinkUnavailable("disk gone".to_string()));
            }
            self.inner.append(record)
        }

        fn flush(&mut self) -> Result<(), WineWardenError> {
            self.flushes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn input(pid: u32) -> AuditInput {
        AuditInput {
            session: SessionKey::new("game"),
            attempt: AccessAttempt {
                timestamp: OffsetDateTime::UNIX_EPOCH,
                pid,
                operation: Operation::Read,
                target: "/usr/lib/libc.so.6".to_string(),
            },
            canonical_target: "/usr/lib/libc.so.6".to_string(),
            zone: Zone::Unclassified,
            classification_note: None,
            trust_tier: TrustTier::Yellow,
            decision: PolicyDecision::no_match(Zone::Unclassified),
            policy_version: PolicyVersion(1),
        }
    }

    fn config(buffer_capacity: usize) -> AuditConfig {
        AuditConfig {
            buffer_capacity,
            max_retries: 2,
            retry_backoff_ms: 1,
        }
    }

    fn flaky(down: bool) -> (FlakySink, MemorySink, Arc<AtomicBool>) {
        let inner = MemorySink::new();
        let flag = Arc::new(AtomicBool::new(down));
        let sink = FlakySink {
            inner: inner.handle(),
            down: flag.clone(),
            flushes: Arc::new(AtomicUsize::new(0)),
        };
        (sink, inner, flag)
    }

    #[test]
    fn test_sequence_and_chain() {
        let sink = MemorySink::new();
        let trail = AuditTrail::new(Box::new(sink.handle()), config(16));
        for pid in 0..3 {
            trail.record(input(pid)).unwrap();
        }
        let records = sink.records();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].prev_hash, GENESIS_HASH);
        for (index, pair) in records.windows(2).enumerate() {
            assert_eq!(pair[0].sequence, index as u64);
            assert_eq!(pair[1].prev_hash, pair[0].record_hash);
        }
        assert_eq!(trail.last_hash(), records[2].record_hash);
    }

    #[test]
    fn test_outage_buffers_then_delivers_in_order() {
        let (sink, delivered, down) = flaky(true);
        let trail = AuditTrail::new(Box::new(sink), config(16));
        for pid in 0..4 {
            trail.record(input(pid)).unwrap();
        }
        assert_eq!(trail.pending(), 4);
        assert!(delivered.is_empty());

        down.store(false, Ordering::SeqCst);
        trail.record(input(4)).unwrap();
        assert_eq!(trail.pending(), 0);
        let pids: Vec<u32> = delivered.records().iter().map(|r| r.attempt.pid).collect();
        assert_eq!(pids, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_buffer_exhaustion_is_fatal() {
        let (sink, _, _) = flaky(true);
        let trail = AuditTrail::new(Box::new(sink), config(2));
        trail.record(input(0)).unwrap();
        trail.record(input(1)).unwrap();
        let err = trail.record(input(2)).unwrap_err();
        assert!(matches!(err, WineWardenError::AuditBufferExhausted { capacity: 2 }));
        assert!(err.is_fatal());
        assert_eq!(trail.next_sequence(), 2);
    }

    #[test]
    fn test_flush_gives_up_after_retries() {
        let (sink, _, _) = flaky(true);
        let trail = AuditTrail::new(Box::new(sink), config(8));
        trail.record(input(0)).unwrap();
        let err = trail.flush().unwrap_err();
        assert!(matches!(err, WineWardenError::AuditSinkUnavailable(_)));
        assert_eq!(trail.pending(), 1);
    }

    #[test]
    fn test_flush_recovers() {
        let (sink, delivered, down) = flaky(true);
        let trail = AuditTrail::new(Box::new(sink), config(8));
        trail.record(input(0)).unwrap();
        down.store(false, Ordering::SeqCst);
        trail.flush().unwrap();
        assert_eq!(delivered.len(), 1);
        assert_eq!(trail.delivered(), 1);
    }

    #[test]
    fn test_record_appends_without_flushing_the_sink() {
        let (sink, delivered, _) = flaky(false);
        let flushes = sink.flushes.clone();
        let trail = AuditTrail::new(Box::new(sink), config(8));
        for pid in 0..5 {
            trail.record(input(pid)).unwrap();
        }
        assert_eq!(delivered.len(), 5);
        assert_eq!(flushes.load(Ordering::SeqCst), 0);

        trail.flush().unwrap();
        assert_eq!(flushes.load(Ordering::SeqCst), 1);
        assert_eq!(trail.delivered(), 5);
    }
}
