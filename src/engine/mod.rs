mod availability;
mod conflict;
mod error;
pub mod grid;
mod mutations;
pub mod policy;
mod queries;

pub use availability::{available_times_for_date, merge_overlapping};
pub use conflict::{check_booking_window, resolve_bookable_slots};
pub use error::EngineError;
pub use grid::SlotGrid;
pub use mutations::{BookingRequest, CoachBookingRequest};
pub use policy::{BookingPolicy, PastCutoff, SlotFit};
pub use queries::{CoachInfo, LOW_SESSIONS_THRESHOLD};

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot, Mutex, RwLock};
use ulid::Ulid;

use crate::clock::Clock;
use crate::model::*;
use crate::notify::NotifyHub;
use crate::observability;
use crate::wal::Wal;

pub type SharedCoachState = Arc<RwLock<CoachState>>;

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

type PendingAppend = (Event, oneshot::Sender<io::Result<()>>);

/// Background task that owns the WAL and batches appends for group commit:
/// block for the first append, drain whatever else is already queued,
/// fsync once, answer every sender.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        let WalCommand::Append { event, response } = cmd else {
            handle_non_append(&mut wal, cmd);
            continue;
        };
        let mut batch = vec![(event, response)];
        let mut deferred = None;
        loop {
            match rx.try_recv() {
                Ok(WalCommand::Append { event, response }) => batch.push((event, response)),
                Ok(other) => {
                    deferred = Some(other);
                    break;
                }
                Err(_) => break,
            }
        }
        commit_batch(&mut wal, &mut batch);
        if let Some(cmd) = deferred {
            handle_non_append(&mut wal, cmd);
        }
    }
}

fn commit_batch(wal: &mut Wal, batch: &mut Vec<PendingAppend>) {
    metrics::histogram!(observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let started = Instant::now();
    let result = flush_batch(wal, batch);
    metrics::histogram!(observability::WAL_FLUSH_DURATION_SECONDS)
        .record(started.elapsed().as_secs_f64());
    if let Err(e) = &result {
        tracing::error!("WAL flush of {} events failed: {e}", batch.len());
    }
    for (_, tx) in batch.drain(..) {
        let r = match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn flush_batch(wal: &mut Wal, batch: &[PendingAppend]) -> io::Result<()> {
    let append_result = batch
        .iter()
        .try_for_each(|(event, _)| wal.append_buffered(event));
    // Flush even after a failed append so half-buffered bytes don't leak
    // into the next batch.
    let flush_result = wal.flush_sync();
    append_result.and(flush_result)
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { event, response } => {
            let mut batch = vec![(event, response)];
            commit_batch(wal, &mut batch);
        }
    }
}

/// In-process persistence for one tenant's coaches, availability, packages
/// and bookings. Every mutation is logged before it is applied.
pub struct Engine {
    pub state: DashMap<CoachId, SharedCoachState>,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    pub notify: Arc<NotifyHub>,
    /// Reverse lookup: booking/package id → coach id
    pub(super) entity_to_coach: DashMap<Ulid, CoachId>,
    pub(super) clock: Arc<dyn Clock>,
    /// Held by coach registration and by compaction so a brand-new coach is
    /// never appended to a log that is about to be replaced.
    pub(super) registration: Mutex<()>,
    pub policy: BookingPolicy,
}

/// Apply an event to a coach (no locking, caller holds the lock).
fn apply_to_coach(cs: &mut CoachState, event: &Event, entity_map: &DashMap<Ulid, CoachId>) {
    match event {
        Event::CoachRegistered { name, .. } => cs.name = name.clone(),
        Event::AvailabilitySet { row } => cs.upsert_availability(row.clone()),
        Event::PackageGranted { package } => {
            cs.packages.retain(|p| p.id != package.id);
            cs.packages.push(package.clone());
            entity_map.insert(package.id, cs.id);
        }
        Event::PackageExpired { id, .. } => {
            if let Some(p) = cs.package_mut(*id) {
                p.status = PackageStatus::Expired;
            }
        }
        Event::BookingCreated { booking } => {
            cs.remove_booking(booking.id);
            cs.insert_booking(booking.clone());
            entity_map.insert(booking.id, cs.id);
        }
        Event::BookingStatusChanged {
            id,
            status,
            consumed_package,
            ..
        } => {
            if let Some(b) = cs.booking_mut(*id) {
                b.status = *status;
            }
            if let Some(pid) = consumed_package
                && let Some(p) = cs.package_mut(*pid) {
                    p.consume_one();
                }
        }
        Event::BookingDeleted { id, .. } => {
            cs.remove_booking(*id);
            entity_map.remove(id);
        }
    }
}

impl Engine {
    pub fn new(
        wal_path: PathBuf,
        notify: Arc<NotifyHub>,
        clock: Arc<dyn Clock>,
        policy: BookingPolicy,
    ) -> io::Result<Self> {
        policy
            .validate()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e.to_string()))?;
        let events = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let engine = Self {
            state: DashMap::new(),
            wal_tx,
            notify,
            entity_to_coach: DashMap::new(),
            clock,
            registration: Mutex::new(()),
            policy,
        };

        // We're the sole owner of these Arcs during replay, so try_write never
        // contends. blocking_write would panic inside an async context.
        for event in &events {
            let coach_id = event.coach_id();
            if let Event::CoachRegistered { id, name } = event
                && !engine.state.contains_key(id) {
                    let cs = CoachState::new(*id, name.clone());
                    engine.state.insert(*id, Arc::new(RwLock::new(cs)));
                    continue;
                }
            let Some(entry) = engine.state.get(&coach_id) else {
                tracing::warn!("replay: event for unknown coach {coach_id} skipped");
                continue;
            };
            let cs = entry.clone();
            drop(entry);
            let Ok(mut guard) = cs.try_write() else {
                return Err(io::Error::other("replay: coach state unexpectedly locked"));
            };
            apply_to_coach(&mut guard, event, &engine.entity_to_coach);
        }
        if !events.is_empty() {
            tracing::info!(
                "replayed {} events for {} coaches",
                events.len(),
                engine.state.len()
            );
        }

        Ok(engine)
    }

    pub fn now_ms(&self) -> Ms {
        self.clock.now_ms()
    }

    /// Write event to WAL via the background group-commit writer.
    async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    pub fn get_coach(&self, id: &CoachId) -> Option<SharedCoachState> {
        self.state.get(id).map(|e| e.value().clone())
    }

    pub fn get_coach_for_entity(&self, entity_id: &Ulid) -> Option<CoachId> {
        self.entity_to_coach.get(entity_id).map(|e| *e.value())
    }

    /// WAL-append then apply. A failed append leaves the state untouched.
    pub(super) async fn persist_and_apply(
        &self,
        cs: &mut CoachState,
        event: &Event,
    ) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        apply_to_coach(cs, event, &self.entity_to_coach);
        Ok(())
    }

    /// Lookup entity → coach, get coach, acquire write lock.
    pub(super) async fn resolve_entity_write(
        &self,
        entity_id: &Ulid,
    ) -> Result<tokio::sync::OwnedRwLockWriteGuard<CoachState>, EngineError> {
        let coach_id = self
            .get_coach_for_entity(entity_id)
            .ok_or(EngineError::NotFound(*entity_id))?;
        let cs = self
            .get_coach(&coach_id)
            .ok_or(EngineError::NotFound(coach_id))?;
        Ok(cs.write_owned().await)
    }

    /// Rewrite the WAL with only the events needed to rebuild the current state.
    ///
    /// Every coach stays read-locked until the new log is in place, so no
    /// mutation can land in the old file after the snapshot was taken.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let _registration = self.registration.lock().await;
        let coaches: Vec<SharedCoachState> = self.state.iter().map(|e| e.value().clone()).collect();
        let mut guards = Vec::with_capacity(coaches.len());
        let mut events = Vec::new();
        for cs in coaches {
            let guard = cs.read_owned().await;
            events.push(Event::CoachRegistered {
                id: guard.id,
                name: guard.name.clone(),
            });
            events.extend(guard.weekly.iter().map(|row| Event::AvailabilitySet { row: row.clone() }));
            events.extend(guard.packages.iter().map(|p| Event::PackageGranted { package: p.clone() }));
            events.extend(guard.bookings.iter().map(|b| Event::BookingCreated { booking: b.clone() }));
            guards.push(guard);
        }

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        let result = rx
            .await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()));
        drop(guards);
        if result.is_ok() {
            tracing::info!("WAL compacted");
        }
        result
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}
