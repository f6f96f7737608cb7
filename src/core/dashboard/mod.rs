pub mod sort;

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::core::feed::fetcher::{FeedSource, FetchError};
use crate::core::feed::parser::parse_trends;
use crate::core::feed::samples::sample_trends;
use crate::core::feed::types::{FeedData, Geo, TrendItem};

use sort::{sort_trends, SortOrder};

/// The only failure text a user ever sees.
pub const FALLBACK_NOTICE: &str = "Live connection failed, showing cached data.";

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("feed for geo {geo} contained no trends")]
    EmptyFeed { geo: Geo },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TrendPair {
    pub bangladesh: Vec<TrendItem>,
    pub united_kingdom: Vec<TrendItem>,
}

impl TrendPair {
    pub fn samples() -> Self {
        Self {
            bangladesh: sample_trends(Geo::Bangladesh),
            united_kingdom: sample_trends(Geo::UnitedKingdom),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    Live(TrendPair),
    Fallback(TrendPair),
}

/// Ordering token handed out at the start of every load. Only a ticket newer
/// than the last committed one may overwrite the state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct LoadTicket(u64);

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DashboardSnapshot {
    pub loading: bool,
    pub is_live: bool,
    pub error_message: Option<String>,
    pub last_updated: Option<DateTime<Utc>>,
    pub trends: TrendPair,
}

impl DashboardSnapshot {
    pub fn items(&self, geo: Geo) -> &[TrendItem] {
        match geo {
            Geo::Bangladesh => &self.trends.bangladesh,
            Geo::UnitedKingdom => &self.trends.united_kingdom,
        }
    }

    pub fn feed(&self, geo: Geo) -> FeedData {
        FeedData {
            country: geo.code().to_string(),
            items: self.items(geo).to_vec(),
            last_updated: self
                .last_updated
                .map(|timestamp| timestamp.to_rfc3339())
                .unwrap_or_default(),
        }
    }

    pub fn sorted(&self, order: SortOrder) -> Self {
        Self {
            trends: TrendPair {
                bangladesh: sort_trends(&self.trends.bangladesh, order),
                united_kingdom: sort_trends(&self.trends.united_kingdom, order),
            },
            ..self.clone()
        }
    }
}

#[derive(Debug, Default)]
struct DashboardState {
    snapshot: DashboardSnapshot,
    issued: u64,
    committed: u64,
    in_flight: usize,
}

/// Shared dashboard state. Cloning hands out another handle to the same state.
#[derive(Debug, Clone)]
pub struct Dashboard {
    state: Arc<Mutex<DashboardState>>,
    revision: Arc<watch::Sender<u64>>,
}

impl Default for Dashboard {
    fn default() -> Self {
        Self::new()
    }
}

impl Dashboard {
    pub fn new() -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            state: Arc::new(Mutex::new(DashboardState::default())),
            revision: Arc::new(revision),
        }
    }

    pub fn snapshot(&self) -> DashboardSnapshot {
        self.lock().snapshot.clone()
    }

    /// Receiver that changes whenever the snapshot does.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    pub fn begin_load(&self) -> LoadTicket {
        let ticket = {
            let mut state = self.lock();
            state.issued += 1;
            state.in_flight += 1;
            state.snapshot.loading = true;
            state.snapshot.error_message = None;
            LoadTicket(state.issued)
        };
        self.notify();
        ticket
    }

    /// Applies `outcome` unless a newer load already committed. Returns whether it was applied.
    pub fn commit(&self, ticket: LoadTicket, outcome: LoadOutcome) -> bool {
        {
            let mut state = self.lock();
            if ticket.0 <= state.committed {
                tracing::debug!(
                    ticket = ticket.0,
                    committed = state.committed,
                    "discarding stale load result"
                );
                return false;
            }
            state.committed = ticket.0;

            let snapshot = &mut state.snapshot;
            snapshot.last_updated = Some(Utc::now());
            match outcome {
                LoadOutcome::Live(trends) => {
                    snapshot.trends = trends;
                    snapshot.is_live = true;
                    snapshot.error_message = None;
                }
                LoadOutcome::Fallback(trends) => {
                    snapshot.trends = trends;
                    snapshot.is_live = false;
                    snapshot.error_message = Some(FALLBACK_NOTICE.to_string());
                }
            }
        }
        self.notify();
        true
    }

    pub fn finish_load(&self, ticket: LoadTicket) {
        {
            let mut state = self.lock();
            state.in_flight = state.in_flight.saturating_sub(1);
            state.snapshot.loading = state.in_flight > 0;
            tracing::debug!(
                ticket = ticket.0,
                still_in_flight = state.in_flight,
                "load finished"
            );
        }
        self.notify();
    }

    /// Runs one full load: both geographies live, or both bundled samples.
    /// Returns whether this load's result was committed.
    pub async fn load_data<S: FeedSource>(&self, source: &S) -> bool {
        let ticket = self.begin_load();
        let _in_flight = InFlight {
            dashboard: self,
            ticket,
        };

        let outcome = match fetch_live(source).await {
            Ok(trends) => {
                tracing::info!(
                    bd = trends.bangladesh.len(),
                    gb = trends.united_kingdom.len(),
                    "live trends loaded"
                );
                LoadOutcome::Live(trends)
            }
            Err(error) => {
                tracing::warn!(error = %error, "live load failed, falling back to bundled samples");
                LoadOutcome::Fallback(TrendPair::samples())
            }
        };
        self.commit(ticket, outcome)
    }

    fn lock(&self) -> MutexGuard<'_, DashboardState> {
        // Writes under this lock cannot panic halfway, so poisoned state is still consistent.
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn notify(&self) {
        self.revision.send_modify(|revision| *revision += 1);
    }
}

/// Releases the in-flight mark even when the load future is dropped mid-fetch.
struct InFlight<'a> {
    dashboard: &'a Dashboard,
    ticket: LoadTicket,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.dashboard.finish_load(self.ticket);
    }
}

async fn fetch_live<S: FeedSource>(source: &S) -> Result<TrendPair, LoadError> {
    let (bd_xml, gb_xml) = tokio::try_join!(
        source.fetch(Geo::Bangladesh),
        source.fetch(Geo::UnitedKingdom)
    )?;

    let bangladesh = parse_trends(&bd_xml);
    if bangladesh.is_empty() {
        return Err(LoadError::EmptyFeed {
            geo: Geo::Bangladesh,
        });
    }
    let united_kingdom = parse_trends(&gb_xml);
    if united_kingdom.is_empty() {
        return Err(LoadError::EmptyFeed {
            geo: Geo::UnitedKingdom,
        });
    }

    Ok(TrendPair {
        bangladesh,
        united_kingdom,
    })
}

/// Starts a load on its own task so it outlives whoever asked for it.
pub fn spawn_load<S>(dashboard: &Dashboard, source: &Arc<S>) -> JoinHandle<bool>
where
    S: FeedSource + 'static,
{
    let dashboard = dashboard.clone();
    let source = Arc::clone(source);
    tokio::spawn(async move { dashboard.load_data(source.as_ref()).await })
}

/// Periodic refresh timer. Dropping the handle stops the timer; loads that are
/// already running finish on their own.
#[derive(Debug)]
pub struct RefreshHandle {
    timer: JoinHandle<()>,
}

impl RefreshHandle {
    pub fn shutdown(self) {
        self.timer.abort();
    }
}

impl Drop for RefreshHandle {
    fn drop(&mut self) {
        self.timer.abort();
    }
}

/// Loads immediately, then once per `period`.
pub fn spawn_refresh_loop<S>(dashboard: &Dashboard, source: Arc<S>, period: Duration) -> RefreshHandle
where
    S: FeedSource + 'static,
{
    let dashboard = dashboard.clone();
    let timer = tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            tracing::debug!(period_secs = period.as_secs(), "scheduled refresh");
            spawn_load(&dashboard, &source);
        }
    });
    RefreshHandle { timer }
}
