//! Per-locale request supersession and the primary/timeout race.
//!
//! Each locale has a single slot. Beginning a request cancels whatever the
//! slot currently holds, so at most one primary request per locale is live.
//! Generations are strictly increasing across locales and order requests by
//! issuance.
//!
//! ```text
//!  begin(de) ─► gen 7 ──── race ───────────────► Superseded ─► await_successor
//!                     \
//!  begin(de) ─► gen 8 ─┴─ cancels 7 ─ race ─► Completed ─► publish(gen 8)
//! ```
//!
//! A request dropped before publishing posts [`Successor::Abandoned`] instead,
//! so older waiters never outlive the request they wait on.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use fxhash::FxHashMap;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::primary::PrimaryError;
use crate::model::types::{Locale, SearchResultSet};

/// Handle for one registered request.
#[derive(Debug, Clone)]
pub struct Ticket {
    pub locale: Locale,
    pub generation: u64,
    token: CancellationToken,
}

impl Ticket {
    /// Token to hand to the transport call.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// How a raced primary request ended.
#[derive(Debug)]
pub enum RaceOutcome<T> {
    Completed(T),
    /// Timed out, errored, or was refused by the backend.
    Failed(PrimaryError),
    /// A newer request for the same locale took over.
    Superseded,
}

/// What a superseded request receives from the request that replaced it.
#[derive(Debug, Clone)]
pub enum Successor {
    Settled(Arc<SearchResultSet>),
    /// The newer request was dropped before it settled.
    Abandoned,
}

#[derive(Debug, Clone)]
struct Published {
    generation: u64,
    successor: Successor,
}

#[derive(Debug)]
struct LocaleSlot {
    latest_generation: u64,
    in_flight: Option<(u64, CancellationToken)>,
    settled: watch::Sender<Option<Published>>,
}

impl LocaleSlot {
    fn new() -> Self {
        let (settled, _) = watch::channel(None);
        Self {
            latest_generation: 0,
            in_flight: None,
            settled,
        }
    }

    /// Post `successor` for `generation` unless something at least as new is
    /// already posted.
    fn post(&self, generation: u64, successor: Successor) -> bool {
        self.settled.send_if_modified(|current| {
            if current
                .as_ref()
                .is_some_and(|published| published.generation >= generation)
            {
                return false;
            }
            *current = Some(Published {
                generation,
                successor,
            });
            true
        })
    }

    fn release(&mut self, generation: u64) {
        if self
            .in_flight
            .as_ref()
            .is_some_and(|(current, _)| *current == generation)
        {
            self.in_flight = None;
        }
    }
}

/// Releases a raced ticket's slot however the race future ends.
struct ReleaseOnDrop<'a> {
    coordinator: &'a RequestCoordinator,
    ticket: &'a Ticket,
}

impl Drop for ReleaseOnDrop<'_> {
    fn drop(&mut self) {
        self.coordinator.release(self.ticket);
    }
}

/// Marks a ticket abandoned if its owner goes away before publishing.
///
/// Returned by [`RequestCoordinator::settle_on_drop`]. Dropping it after
/// [`RequestCoordinator::publish`] or after a newer request began is a no-op.
#[must_use = "the guard settles the ticket when dropped"]
pub struct SettleOnDrop<'a> {
    coordinator: &'a RequestCoordinator,
    ticket: &'a Ticket,
}

impl Drop for SettleOnDrop<'_> {
    fn drop(&mut self) {
        self.coordinator.abandon(self.ticket);
    }
}

#[derive(Debug)]
pub struct RequestCoordinator {
    timeout: Duration,
    next_generation: AtomicU64,
    slots: Mutex<FxHashMap<Locale, LocaleSlot>>,
}

impl RequestCoordinator {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            next_generation: AtomicU64::new(0),
            slots: Mutex::new(FxHashMap::default()),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Cancel the locale's current request, if any, and register a new one.
    pub fn begin(&self, locale: Locale) -> Ticket {
        let generation = self.next_generation.fetch_add(1, Ordering::SeqCst) + 1;
        let token = CancellationToken::new();

        let mut slots = self.slots.lock();
        let slot = slots.entry(locale).or_insert_with(LocaleSlot::new);
        if let Some((previous, previous_token)) = slot.in_flight.take() {
            previous_token.cancel();
            debug!(%locale, superseded = previous, by = generation, "cancelled in-flight request");
        }
        slot.latest_generation = generation;
        slot.in_flight = Some((generation, token.clone()));

        Ticket {
            locale,
            generation,
            token,
        }
    }

    /// Race `request` against the timeout.
    ///
    /// `request` should observe [`Ticket::token`]; it is cancelled when the
    /// timer wins. The ticket's in-flight entry is released on every outcome.
    pub async fn race<T, F>(&self, ticket: &Ticket, request: F) -> RaceOutcome<T>
    where
        F: Future<Output = Result<T, PrimaryError>>,
    {
        let started = Instant::now();
        let _release = ReleaseOnDrop {
            coordinator: self,
            ticket,
        };
        let outcome = tokio::select! {
            biased;
            () = ticket.token.cancelled() => RaceOutcome::Superseded,
            result = tokio::time::timeout(self.timeout, request) => match result {
                Ok(Ok(value)) => RaceOutcome::Completed(value),
                Ok(Err(_)) if ticket.token.is_cancelled() => RaceOutcome::Superseded,
                Ok(Err(err)) => RaceOutcome::Failed(err),
                Err(_) => {
                    ticket.token.cancel();
                    RaceOutcome::Failed(PrimaryError::TimedOut(self.timeout))
                }
            },
        };

        if matches!(outcome, RaceOutcome::Superseded) {
            debug!(
                locale = %ticket.locale,
                generation = ticket.generation,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "primary request superseded"
            );
        }
        outcome
    }

    fn release(&self, ticket: &Ticket) {
        if let Some(slot) = self.slots.lock().get_mut(&ticket.locale) {
            slot.release(ticket.generation);
        }
    }

    /// Guard that calls [`Self::abandon`] for `ticket` when dropped.
    pub fn settle_on_drop<'a>(&'a self, ticket: &'a Ticket) -> SettleOnDrop<'a> {
        SettleOnDrop {
            coordinator: self,
            ticket,
        }
    }

    /// Give up on `ticket` without a result.
    ///
    /// Frees its in-flight entry and, if it is still the newest request for
    /// its locale and has not published, wakes superseded waiters with
    /// [`Successor::Abandoned`].
    pub fn abandon(&self, ticket: &Ticket) {
        let mut slots = self.slots.lock();
        let Some(slot) = slots.get_mut(&ticket.locale) else {
            return;
        };
        slot.release(ticket.generation);
        if slot.latest_generation == ticket.generation
            && slot.post(ticket.generation, Successor::Abandoned)
        {
            debug!(
                locale = %ticket.locale,
                generation = ticket.generation,
                "request dropped before settling"
            );
        }
    }

    /// Whether no newer request for the ticket's locale has begun.
    pub fn is_latest(&self, ticket: &Ticket) -> bool {
        self.slots
            .lock()
            .get(&ticket.locale)
            .is_some_and(|slot| slot.latest_generation == ticket.generation)
    }

    pub fn has_in_flight(&self, locale: Locale) -> bool {
        self.slots
            .lock()
            .get(&locale)
            .is_some_and(|slot| slot.in_flight.is_some())
    }

    /// Record the settled result of `ticket` for superseded waiters.
    ///
    /// Older generations never overwrite newer ones.
    pub fn publish(&self, ticket: &Ticket, result: Arc<SearchResultSet>) {
        let mut slots = self.slots.lock();
        let slot = slots.entry(ticket.locale).or_insert_with(LocaleSlot::new);
        slot.post(ticket.generation, Successor::Settled(result));
    }

    /// Wait for a strictly newer request on the same locale to settle or be
    /// abandoned.
    pub async fn await_successor(&self, ticket: &Ticket) -> Successor {
        let mut settled = {
            let mut slots = self.slots.lock();
            slots
                .entry(ticket.locale)
                .or_insert_with(LocaleSlot::new)
                .settled
                .subscribe()
        };
        let newer = settled
            .wait_for(|current| {
                current
                    .as_ref()
                    .is_some_and(|published| published.generation > ticket.generation)
            })
            .await;
        match newer {
            Ok(newer) => {
                let newer: &Option<Published> = &newer;
                newer
                    .as_ref()
                    .map_or(Successor::Abandoned, |published| published.successor.clone())
            }
            Err(_) => Successor::Abandoned,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::types::ResultSource;
    use std::collections::BTreeMap;

    fn result_set() -> Arc<SearchResultSet> {
        Arc::new(SearchResultSet {
            results: BTreeMap::new(),
            source: ResultSource::Primary,
            error: None,
        })
    }

    #[test]
    fn begin_cancels_previous_for_same_locale_only() {
        let coordinator = RequestCoordinator::new(Duration::from_secs(1));
        let first = coordinator.begin(Locale::De);
        let other = coordinator.begin(Locale::En);
        let second = coordinator.begin(Locale::De);

        assert!(first.is_cancelled());
        assert!(!other.is_cancelled());
        assert!(!second.is_cancelled());
        assert!(second.generation > first.generation);
        assert!(!coordinator.is_latest(&first));
        assert!(coordinator.is_latest(&second));
    }

    #[tokio::test]
    async fn completed_race_releases_slot() {
        let coordinator = RequestCoordinator::new(Duration::from_secs(1));
        let ticket = coordinator.begin(Locale::De);
        assert!(coordinator.has_in_flight(Locale::De));

        let outcome = coordinator.race(&ticket, async { Ok::<_, PrimaryError>(7) }).await;
        assert!(matches!(outcome, RaceOutcome::Completed(7)));
        assert!(!coordinator.has_in_flight(Locale::De));
        assert!(!ticket.is_cancelled());
    }

    #[tokio::test]
    async fn failed_race_reports_error_and_releases_slot() {
        let coordinator = RequestCoordinator::new(Duration::from_secs(1));
        let ticket = coordinator.begin(Locale::En);
        let outcome = coordinator
            .race(&ticket, async { Err::<(), _>(PrimaryError::Status(503)) })
            .await;
        assert!(matches!(outcome, RaceOutcome::Failed(PrimaryError::Status(503))));
        assert!(!coordinator.has_in_flight(Locale::En));
    }

    #[tokio::test]
    async fn timeout_cancels_token() {
        let coordinator = RequestCoordinator::new(Duration::from_millis(20));
        let ticket = coordinator.begin(Locale::De);
        let outcome = coordinator
            .race(&ticket, std::future::pending::<Result<(), PrimaryError>>())
            .await;
        assert!(matches!(outcome, RaceOutcome::Failed(PrimaryError::TimedOut(_))));
        assert!(ticket.is_cancelled());
        assert!(!coordinator.has_in_flight(Locale::De));
    }

    #[tokio::test]
    async fn superseded_race_yields_superseded() {
        let coordinator = Arc::new(RequestCoordinator::new(Duration::from_secs(5)));
        let first = coordinator.begin(Locale::De);

        let racing = {
            let coordinator = Arc::clone(&coordinator);
            let first = first.clone();
            tokio::spawn(async move {
                coordinator
                    .race(&first, std::future::pending::<Result<(), PrimaryError>>())
                    .await
            })
        };
        tokio::task::yield_now().await;
        let second = coordinator.begin(Locale::De);

        let outcome = racing.await.unwrap();
        assert!(matches!(outcome, RaceOutcome::Superseded));
        // the newer registration survives the older one's release
        assert!(coordinator.has_in_flight(Locale::De));
        assert!(coordinator.is_latest(&second));
    }

    #[tokio::test]
    async fn successor_result_is_handed_back() {
        let coordinator = RequestCoordinator::new(Duration::from_secs(1));
        let first = coordinator.begin(Locale::De);
        let second = coordinator.begin(Locale::De);
        let published = result_set();
        coordinator.publish(&second, Arc::clone(&published));

        let Successor::Settled(handed) = coordinator.await_successor(&first).await else {
            panic!("expected a settled successor");
        };
        assert!(Arc::ptr_eq(&handed, &published));
    }

    #[tokio::test]
    async fn older_publish_does_not_replace_newer() {
        let coordinator = RequestCoordinator::new(Duration::from_secs(1));
        let first = coordinator.begin(Locale::De);
        let second = coordinator.begin(Locale::De);
        let third = coordinator.begin(Locale::De);

        let newest = result_set();
        coordinator.publish(&third, Arc::clone(&newest));
        coordinator.publish(&second, result_set());

        let Successor::Settled(handed) = coordinator.await_successor(&first).await else {
            panic!("expected a settled successor");
        };
        assert!(Arc::ptr_eq(&handed, &newest));
    }

    #[tokio::test]
    async fn dropped_race_releases_slot() {
        let coordinator = RequestCoordinator::new(Duration::from_secs(5));
        let ticket = coordinator.begin(Locale::De);
        let racing = coordinator.race(&ticket, std::future::pending::<Result<(), PrimaryError>>());
        assert!(
            tokio::time::timeout(Duration::from_millis(20), racing)
                .await
                .is_err()
        );
        assert!(!coordinator.has_in_flight(Locale::De));
    }

    #[tokio::test]
    async fn dropping_latest_ticket_wakes_waiters_as_abandoned() {
        let coordinator = RequestCoordinator::new(Duration::from_secs(1));
        let first = coordinator.begin(Locale::De);
        let second = coordinator.begin(Locale::De);
        drop(coordinator.settle_on_drop(&second));

        assert!(!coordinator.has_in_flight(Locale::De));
        let successor = tokio::time::timeout(Duration::from_secs(1), coordinator.await_successor(&first))
            .await
            .unwrap();
        assert!(matches!(successor, Successor::Abandoned));
    }

    #[tokio::test]
    async fn guard_after_publish_keeps_result() {
        let coordinator = RequestCoordinator::new(Duration::from_secs(1));
        let first = coordinator.begin(Locale::En);
        let second = coordinator.begin(Locale::En);
        let published = result_set();
        {
            let _settle = coordinator.settle_on_drop(&second);
            coordinator.publish(&second, Arc::clone(&published));
        }

        let Successor::Settled(handed) = coordinator.await_successor(&first).await else {
            panic!("published result was replaced by the drop guard");
        };
        assert!(Arc::ptr_eq(&handed, &published));
    }

    #[test]
    fn guard_of_stale_ticket_does_not_post() {
        let coordinator = RequestCoordinator::new(Duration::from_secs(1));
        let first = coordinator.begin(Locale::De);
        let _second = coordinator.begin(Locale::De);
        drop(coordinator.settle_on_drop(&first));

        // the newer request still owns the slot
        assert!(coordinator.has_in_flight(Locale::De));
        let slots = coordinator.slots.lock();
        assert!(slots[&Locale::De].settled.borrow().is_none());
    }
}
