//! Refresh coordinator.
//! Owns the reconciliation loop of one account: fetch the anchor, fetch a month of deltas,
//! store, reconstruct, publish, then probe the oldest remaining gap after a jittered delay.
//!
//! The coordinator is an actor. Timer ticks, refresh requests and probes are serialized on
//! its command queue, so two cycles never run at the same time and the blacklist needs no lock.
//! The snapshot is published on a watch channel, so a refresh request never waits for a cycle.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rand::Rng;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use super::gaps;
use super::statistics::StatisticsPublisher;
use crate::core::entry::{ConfigEntry, EntryFile};
use crate::integration::saur::{self, ErrorKind};
use crate::models::{BaseData, MonthBlacklist, YearMonth};
use crate::storage::{self, Store};

const COMMAND_QUEUE_SIZE: usize = 16;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Store error: {0}")]
    Store(#[from] storage::Error),
    #[error("SAUR API error: {0}")]
    Saur(#[from] saur::Error),
    #[error("SAUR returned no delivery point")]
    MissingDeliveryPoint,
    #[error("Coordinator stopped")]
    Stopped,
}

pub type Result<T> = std::result::Result<T, Error>;

/// Timing knobs of the coordinator.
#[derive(Debug, Clone)]
pub struct Settings {
    pub polling_interval: Duration,
    pub update_debounce: Duration,
    pub probe_delay_min: Duration,
    pub probe_delay_max: Duration,
}

impl Settings {
    /// Uniform random delay before a gap probe.
    pub fn probe_delay(&self) -> Duration {
        if self.probe_delay_max <= self.probe_delay_min {
            return self.probe_delay_min;
        }
        rand::thread_rng().gen_range(self.probe_delay_min..=self.probe_delay_max)
    }
}

/// What started a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleTrigger {
    /// Timer tick, refresh request or startup: targets the current month.
    Scheduled,
    /// Gap probe: targets an older month.
    Probe,
}

#[derive(Debug)]
enum Command {
    Refresh,
    Cycle {
        target: YearMonth,
        trigger: CycleTrigger,
    },
}

/// Result of one background cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleOutcome {
    pub deltas_written: usize,
    pub points: usize,
    pub next_probe: Option<YearMonth>,
}

/// Cloneable entry point to a running coordinator.
#[derive(Clone)]
pub struct CoordinatorHandle {
    tx: mpsc::Sender<Command>,
    snapshot: watch::Receiver<BaseData>,
}

impl CoordinatorHandle {
    /// Request a refresh and return the cached snapshot right away.
    /// A cycle starts in the background if the debounce window elapsed.
    /// Never blocks, so it can be called from the runtime or from a worker thread.
    pub fn refresh(&self) -> Result<BaseData> {
        match self.tx.try_send(Command::Refresh) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => log::debug!("Command queue full, refresh not queued"),
            Err(TrySendError::Closed(_)) => return Err(Error::Stopped),
        }
        Ok(self.snapshot.borrow().clone())
    }

    /// Queue a probe cycle for the given month.
    pub async fn probe(&self, month: YearMonth) -> Result<()> {
        self.tx
            .send(Self::probe_command(month))
            .await
            .map_err(|_| Error::Stopped)
    }

    /// Same as `probe`, for worker threads outside the runtime.
    pub fn blocking_probe(&self, month: YearMonth) -> Result<()> {
        self.tx
            .blocking_send(Self::probe_command(month))
            .map_err(|_| Error::Stopped)
    }

    fn probe_command(month: YearMonth) -> Command {
        Command::Cycle {
            target: month,
            trigger: CycleTrigger::Probe,
        }
    }
}

pub struct Coordinator {
    saur: Arc<saur::Client>,
    store: Store,
    publisher: Arc<StatisticsPublisher>,
    settings: Settings,
    entry: ConfigEntry,
    entry_file: EntryFile,
    base_data: BaseData,
    blacklist: MonthBlacklist,
    last_cycle: Instant,
    probe_pending: bool,
    rx: mpsc::Receiver<Command>,
    snapshot: watch::Sender<BaseData>,
    handle: CoordinatorHandle,
    tracker: TaskTracker,
    cancel: CancellationToken,
}

impl Coordinator {
    /// Creates a new instance of `Coordinator`. It stops once `cancel` is cancelled.
    pub fn new(
        saur: Arc<saur::Client>,
        store: Store,
        publisher: Arc<StatisticsPublisher>,
        settings: Settings,
        entry: ConfigEntry,
        entry_file: EntryFile,
        cancel: CancellationToken,
    ) -> Self {
        let (tx, rx) = mpsc::channel(COMMAND_QUEUE_SIZE);
        let base_data = BaseData::new(entry.section_id.clone(), entry.meter.clone());
        let (snapshot, snapshot_rx) = watch::channel(base_data.clone());
        Coordinator {
            saur,
            store,
            publisher,
            settings,
            entry,
            entry_file,
            base_data,
            blacklist: MonthBlacklist::new(),
            last_cycle: Instant::now(),
            probe_pending: false,
            rx,
            snapshot,
            handle: CoordinatorHandle {
                tx,
                snapshot: snapshot_rx,
            },
            tracker: TaskTracker::new(),
            cancel,
        }
    }

    pub fn handle(&self) -> CoordinatorHandle {
        self.handle.clone()
    }

    pub fn base_data(&self) -> &BaseData {
        &self.base_data
    }

    pub fn blacklist(&self) -> &MonthBlacklist {
        &self.blacklist
    }

    /// Bootstrap: create the schema, fetch the device metadata and the anchor, publish the sensor
    /// and queue the fetch of the current month.
    /// Fails if the schema or the delivery point cannot be obtained.
    pub async fn first_refresh(&mut self) -> Result<BaseData> {
        self.store.init().await?;

        let meter = self
            .saur
            .get_delivery_point()
            .await?
            .ok_or(Error::MissingDeliveryPoint)?;
        self.base_data.meter = meter;
        self.snapshot.send_replace(self.base_data.clone());
        self.save_rotated_token().await;

        if let Err(e) = self.refresh_anchor().await {
            log::warn!("Cannot fetch last reading during bootstrap: {e}");
        }
        self.publish_sensor().await;

        let target = gaps::current_target_month(Utc::now().naive_utc());
        if let Err(e) = self.handle.tx.try_send(Command::Cycle {
            target,
            trigger: CycleTrigger::Scheduled,
        }) {
            log::error!("Cannot queue the fetch of {target}: {e}");
        }
        log::info!(
            "Coordinator bootstrapped for section {}",
            self.base_data.section_id
        );
        Ok(self.base_data.clone())
    }

    /// Process timer ticks and commands until cancelled, then release resources.
    pub async fn run(mut self) {
        let cancel = self.cancel.clone();
        let period = self.settings.polling_interval;
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => self.on_refresh().await,
                command = self.rx.recv() => match command {
                    Some(Command::Refresh) => self.on_refresh().await,
                    Some(Command::Cycle { target, trigger }) => {
                        if trigger == CycleTrigger::Probe {
                            self.probe_pending = false;
                        }
                        self.run_cycle(target, trigger).await;
                    }
                    None => break,
                },
            }
        }
        self.shutdown().await;
    }

    /// One background cycle targeting `target`.
    pub async fn cycle(&mut self, target: YearMonth, trigger: CycleTrigger) -> Result<CycleOutcome> {
        let section_id = self.base_data.section_id.clone();
        log::debug!("Starting {trigger:?} cycle for {target}");

        match self.refresh_anchor().await {
            Ok(true) => self.publish_sensor().await,
            Ok(false) => log::debug!("No last reading available"),
            Err(Error::Saur(e)) if e.kind() == ErrorKind::TransientNetwork => return Err(e.into()),
            Err(e) => log::warn!("Cannot refresh last reading: {e}"),
        }

        let deltas_written = self.fetch_month(target, trigger).await?;

        let points = self.store.reconstruct_all(&section_id).await?;
        if let Err(e) = self.publisher.publish(&section_id, &points).await {
            log::error!("Cannot publish statistics: {e}");
        }

        let missing = gaps::find_missing_dates(&points);
        let mut probes = gaps::compact(&missing, &self.blacklist);
        if trigger == CycleTrigger::Probe
            && probes.first().is_some_and(|date| date.year_month() == target)
        {
            log::warn!("No data upstream for the gaps of {target}, month skipped for this run");
            self.blacklist.insert(target);
            probes = gaps::compact(&missing, &self.blacklist);
        }
        let next_probe = probes.first().map(|date| date.year_month());
        if let Some(month) = next_probe {
            self.schedule_probe(month);
        }

        self.save_rotated_token().await;
        Ok(CycleOutcome {
            deltas_written,
            points: points.len(),
            next_probe,
        })
    }

    /// Private methods --------------------------------------------------------

    async fn on_refresh(&mut self) {
        if self.last_cycle.elapsed() < self.settings.update_debounce {
            log::debug!("Refresh skipped, last cycle is too recent");
            return;
        }
        self.last_cycle = Instant::now();
        let target = gaps::current_target_month(Utc::now().naive_utc());
        self.run_cycle(target, CycleTrigger::Scheduled).await;
    }

    async fn run_cycle(&mut self, target: YearMonth, trigger: CycleTrigger) {
        let cancel = self.cancel.clone();
        tokio::select! {
            _ = cancel.cancelled() => log::debug!("Cycle for {target} interrupted by shutdown"),
            outcome = self.cycle(target, trigger) => match outcome {
                Ok(outcome) => log::info!(
                    "Cycle for {target} done: {} deltas written, {} points, next probe {:?}",
                    outcome.deltas_written,
                    outcome.points,
                    outcome.next_probe
                ),
                Err(e) => log::error!("Cycle for {target} failed: {e}"),
            },
        }
    }

    /// Fetch the anchor and store it. Returns `false` when the API has none.
    async fn refresh_anchor(&mut self) -> Result<bool> {
        let Some(reading) = self.saur.get_last_reading().await? else {
            return Ok(false);
        };
        self.store
            .update_anchor(&reading, &self.base_data.section_id)
            .await?;
        log::info!("Anchor updated: {} on {}", reading.value, reading.date);
        self.base_data.last_reading = Some(reading);
        self.snapshot.send_replace(self.base_data.clone());
        Ok(true)
    }

    /// Fetch and store one month. Blacklists the month when the API fails for it.
    async fn fetch_month(&mut self, target: YearMonth, trigger: CycleTrigger) -> Result<usize> {
        // Scheduled cycles always retry the current month, it fills up day by day.
        if trigger == CycleTrigger::Probe && self.blacklist.contains(&target) {
            log::debug!("Month {target} is blacklisted, fetch skipped");
            return Ok(0);
        }
        let deltas = match self.saur.get_month_consumptions(target).await {
            Ok(deltas) => deltas,
            Err(e) if matches!(e.kind(), ErrorKind::TransientNetwork | ErrorKind::Auth) => {
                return Err(e.into());
            }
            Err(e) => {
                self.blacklist.insert(target);
                log::warn!("Month {target} blacklisted after fetch failure: {e}");
                return Ok(0);
            }
        };
        if self.blacklist.remove(&target) {
            log::info!("Month {target} is available again");
        }
        match self
            .store
            .write_deltas(&deltas, &self.base_data.section_id)
            .await
        {
            Ok(written) => Ok(written),
            Err(e) => {
                log::error!("Cannot store consumptions of {target}: {e}");
                Ok(0)
            }
        }
    }

    /// Send a probe for `month` after a jittered delay, unless one is already waiting.
    fn schedule_probe(&mut self, month: YearMonth) {
        if self.probe_pending {
            log::debug!("Probe already pending, {month} not scheduled");
            return;
        }
        self.probe_pending = true;
        let delay = self.settings.probe_delay();
        log::debug!("Probing {month} in {delay:?}");
        let handle = self.handle.clone();
        let cancel = self.cancel.clone();
        self.tracker.spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    if let Err(e) = handle.probe(month).await {
                        log::debug!("Probe of {month} dropped: {e}");
                    }
                }
            }
        });
    }

    async fn publish_sensor(&self) {
        if let Err(e) = self.publisher.publish_sensor(&self.base_data).await {
            log::error!("Cannot publish water meter sensor: {e}");
        }
    }

    /// Persist the access token when the client renewed it.
    async fn save_rotated_token(&mut self) {
        let Some(token) = self.saur.access_token().await else {
            return;
        };
        if token == self.entry.token {
            return;
        }
        self.entry.token = token;
        match self.entry_file.save(&self.entry).await {
            Ok(()) => log::info!("Access token renewed, entry updated"),
            Err(e) => log::error!("Cannot save renewed access token: {e}"),
        }
    }

    async fn shutdown(self) {
        log::debug!("Stopping coordinator");
        self.tracker.close();
        self.cancel.cancel();
        self.tracker.wait().await;
        self.saur.close().await;
        if let Err(e) = self.store.close().await {
            log::warn!("Cannot close store: {e}");
        }
        log::info!("Coordinator stopped");
    }
}
