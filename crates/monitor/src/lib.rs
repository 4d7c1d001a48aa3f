use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::{info, warn};

use policy_engine::MediationEngine;
use reporting::{RunMetadata, SessionReport};
use winewarden_core::error::WineWardenError;
use winewarden_core::ids::{RunId, SessionKey};
use winewarden_core::types::AccessAttempt;

pub trait EventSource {
    fn next_event(&mut self) -> Result<Option<AccessAttempt>>;

    /// Malformed events dropped so far.
    fn skipped(&self) -> u64 {
        0
    }
}

pub struct NoopEventSource;

impl EventSource for NoopEventSource {
    fn next_event(&mut self) -> Result<Option<AccessAttempt>> {
        Ok(None)
    }
}

/// Reads the Monitor's JSON-lines event format. Blank lines are ignored;
/// malformed lines are logged, counted and skipped.
pub struct JsonlEventSource<R = BufReader<File>> {
    reader: R,
    line: usize,
    skipped: u64,
}

impl JsonlEventSource {
    pub fn from_path(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("open event log {}", path.display()))?;
        Ok(Self::from_reader(BufReader::new(file)))
    }
}

impl<R: BufRead> JsonlEventSource<R> {
    pub fn from_reader(reader: R) -> Self {
        Self {
            reader,
            line: 0,
            skipped: 0,
        }
    }
}

impl<R: BufRead> EventSource for JsonlEventSource<R> {
    fn next_event(&mut self) -> Result<Option<AccessAttempt>> {
        loop {
            let mut buffer = String::new();
            let bytes = self
                .reader
                .read_line(&mut buffer)
                .with_context(|| format!("read event log line {}", self.line + 1))?;
            if bytes == 0 {
                return Ok(None);
            }
            self.line += 1;
            if buffer.trim().is_empty() {
                continue;
            }
            match parse_event(self.line, &buffer) {
                Ok(event) => return Ok(Some(event)),
                Err(err) => {
                    self.skipped += 1;
                    warn!(error = %err, "skipping malformed event");
                }
            }
        }
    }

    fn skipped(&self) -> u64 {
        self.skipped
    }
}

pub fn parse_event(line: usize, text: &str) -> Result<AccessAttempt, WineWardenError> {
    serde_json::from_str(text.trim()).map_err(|err| WineWardenError::MalformedAttempt {
        line,
        reason: err.to_string(),
    })
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayRequest {
    pub run_id: RunId,
    pub event_log: PathBuf,
    pub prefix_root: PathBuf,
    pub session: SessionKey,
    pub executable: Option<PathBuf>,
}

/// Drives recorded events through the engine ("no execution" mode).
pub struct Monitor {
    engine: Arc<MediationEngine>,
}

impl Monitor {
    pub fn new(engine: Arc<MediationEngine>) -> Self {
        Self { engine }
    }

    pub fn replay(&self, request: &ReplayRequest) -> Result<SessionReport> {
        let mut source = JsonlEventSource::from_path(&request.event_log)?;
        self.replay_source(request, &mut source)
    }

    pub fn replay_source(&self, request: &ReplayRequest, source: &mut dyn EventSource) -> Result<SessionReport> {
        let started_at = OffsetDateTime::now_utc();
        let ctx = self.engine.context(request.session.clone(), &request.prefix_root);
        let trust_tier = self.engine.trust().resolve(&ctx.session);
        info!(
            run = %request.run_id,
            session = %ctx.session,
            prefix = %ctx.prefix_root.display(),
            tier = %trust_tier,
            "replay started"
        );

        let mut records = Vec::new();
        while let Some(attempt) = source.next_event()? {
            let mediation = self
                .engine
                .mediate(attempt, &ctx)
                .context("mediate replayed attempt")?;
            records.push(mediation.record);
        }
        self.engine.flush_audit().context("flush audit trail")?;

        let metadata = RunMetadata {
            run_id: request.run_id,
            session: ctx.session,
            executable: request.executable.clone(),
            prefix_root: ctx.prefix_root,
            started_at,
            ended_at: Some(OffsetDateTime::now_utc()),
            trust_tier,
        };
        info!(
            attempts = records.len(),
            skipped = source.skipped(),
            "replay finished"
        );
        Ok(SessionReport::new(metadata, records).with_skipped(source.skipped()))
    }
}
