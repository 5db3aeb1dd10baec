use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::clock::{Clock, SystemClock};
use crate::dispatch::{self, LogSink, NoticeSink};
use crate::engine::{BookingPolicy, Engine};
use crate::jobs;
use crate::limits::*;
use crate::notify::NotifyHub;

const DEFAULT_REMINDER_EVERY: Duration = Duration::from_secs(3600);

/// Manages per-tenant engines. Each tenant (a gym, or the demo) gets its own
/// Engine + WAL + reminder sweep + compactor + notice dispatcher.
pub struct TenantManager {
    engines: DashMap<String, Arc<Engine>>,
    data_dir: PathBuf,
    compact_threshold: u64,
    policy: BookingPolicy,
    clock: Arc<dyn Clock>,
    sink: Arc<dyn NoticeSink>,
    reminder_every: Duration,
}

impl TenantManager {
    pub fn new(data_dir: PathBuf, compact_threshold: u64, policy: BookingPolicy) -> Self {
        Self {
            engines: DashMap::new(),
            data_dir,
            compact_threshold,
            policy,
            clock: Arc::new(SystemClock),
            sink: Arc::new(LogSink),
            reminder_every: DEFAULT_REMINDER_EVERY,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn NoticeSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_reminder_interval(mut self, every: Duration) -> Self {
        self.reminder_every = every;
        self
    }

    /// Get or lazily create an engine for the given tenant.
    pub fn get_or_create(&self, tenant: &str) -> std::io::Result<Arc<Engine>> {
        if let Some(engine) = self.engines.get(tenant) {
            return Ok(engine.value().clone());
        }
        if tenant.len() > MAX_TENANT_NAME_LEN {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "tenant name too long",
            ));
        }
        if self.engines.len() >= MAX_TENANTS {
            return Err(std::io::Error::other("too many tenants"));
        }

        // Sanitize tenant name to prevent path traversal
        let safe_name: String = tenant
            .chars()
            .filter(|c| c.is_alphanumeric() || *c == '_' || *c == '-')
            .collect();
        if safe_name.is_empty() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "empty tenant name",
            ));
        }

        // The entry holds its shard locked, so a racing first call for the
        // same tenant waits here instead of opening the WAL a second time.
        let engine = match self.engines.entry(tenant.to_string()) {
            Entry::Occupied(e) => return Ok(e.get().clone()),
            Entry::Vacant(slot) => {
                let engine = self.open_engine(&safe_name)?;
                slot.insert(engine.clone());
                engine
            }
        };
        metrics::gauge!(crate::observability::TENANTS_ACTIVE).set(self.engines.len() as f64);
        tracing::info!("tenant {tenant} loaded");
        Ok(engine)
    }

    fn open_engine(&self, safe_name: &str) -> std::io::Result<Arc<Engine>> {
        let wal_path = self.data_dir.join(format!("{safe_name}.wal"));
        let notify = Arc::new(NotifyHub::new());
        let rx = notify.subscribe_all();
        let engine = Arc::new(Engine::new(
            wal_path,
            notify,
            self.clock.clone(),
            self.policy,
        )?);

        tokio::spawn(dispatch::run_dispatcher(rx, self.sink.clone()));
        tokio::spawn(jobs::run_reminders(engine.clone(), self.reminder_every));
        tokio::spawn(jobs::run_compactor(engine.clone(), self.compact_threshold));
        Ok(engine)
    }

    /// Every loaded tenant, by name.
    pub fn engines(&self) -> Vec<(String, Arc<Engine>)> {
        let mut out: Vec<_> = self
            .engines
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }
}
