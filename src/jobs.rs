use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::engine::{Engine, EngineError};
use crate::model::{BookingId, PackageId};
use crate::notify::Notice;

const COMPACT_CHECK_EVERY: Duration = Duration::from_secs(30);

/// What a sweep has already announced, so repeated sweeps stay quiet.
#[derive(Debug, Default)]
pub struct ReminderLedger {
    reminded: HashSet<BookingId>,
    /// Remaining count at the last "running low" notice per package.
    low_at: HashMap<PackageId, u32>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub reminders: usize,
    pub low_packages: usize,
}

/// Publish session reminders for tomorrow and "running low" notices for
/// packages with one or two sessions left. Each booking is reminded once;
/// a package is announced again only when its remaining count drops.
pub async fn sweep(engine: &Engine, ledger: &mut ReminderLedger) -> Result<SweepReport, EngineError> {
    let mut report = SweepReport::default();

    let due = engine.due_reminders().await?;
    let due_ids: HashSet<BookingId> = due.iter().map(|b| b.id).collect();
    for booking in due {
        if ledger.reminded.insert(booking.id) {
            engine.notify.publish(Notice::SessionReminder { booking });
            report.reminders += 1;
        }
    }
    ledger.reminded.retain(|id| due_ids.contains(id));

    let low = engine.low_packages().await;
    let low_ids: HashSet<PackageId> = low.iter().map(|p| p.id).collect();
    for package in low {
        if ledger.low_at.get(&package.id) == Some(&package.remaining_sessions) {
            continue;
        }
        ledger.low_at.insert(package.id, package.remaining_sessions);
        engine.notify.publish(Notice::SessionsLow { package });
        report.low_packages += 1;
    }
    ledger.low_at.retain(|id, _| low_ids.contains(id));

    Ok(report)
}

/// Background task that sweeps for reminders every `every`, starting one
/// interval after launch.
pub async fn run_reminders(engine: Arc<Engine>, every: Duration) {
    let mut ledger = ReminderLedger::default();
    let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + every, every);
    loop {
        interval.tick().await;
        match sweep(&engine, &mut ledger).await {
            Ok(r) if r.reminders + r.low_packages > 0 => info!(
                "sent {} session reminders, {} low-package notices",
                r.reminders, r.low_packages
            ),
            Ok(_) => {}
            Err(e) => tracing::error!("reminder sweep failed: {e}"),
        }
    }
}

/// Background task that rewrites the WAL once enough appends piled up.
pub async fn run_compactor(engine: Arc<Engine>, threshold: u64) {
    let mut interval = tokio::time::interval(COMPACT_CHECK_EVERY);
    loop {
        interval.tick().await;
        let appends = engine.wal_appends_since_compact().await;
        if appends < threshold {
            continue;
        }
        debug!("{appends} appends since last compaction, compacting");
        if let Err(e) = engine.compact_wal().await {
            tracing::error!("WAL compaction failed: {e}");
        }
    }
}
