// ===============================
// src/feed.rs (change-feed bridge)
// ===============================
//
// Translates inbound row events into store mutations. Signal inserts and
// updates apply as idempotent upserts (delivery is at-least-once and
// unordered); any like-table event invalidates the aggregates and triggers
// a full reload instead of incremental count patching. Reconnection is the
// transport adapter's job — receivers here stay live across reconnects.
//
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::backend::{Backend, ChangeFeedApi, SignalApi};
use crate::domain::{Event, EventMask, FeedEvent, FeedKind, FeedTable};
use crate::error::HubError;
use crate::metrics::{FEED_EVENTS, SIGNAL_LOADS};
use crate::session::SessionContext;
use crate::store::SharedStore;

/// Replace the store contents from persistence for the given viewer.
/// Last-writer-wins over anything the feed queued up in between.
pub async fn reload_store(
    signals: &Arc<dyn SignalApi>,
    store: &SharedStore,
    viewer: Option<Uuid>,
) -> Result<usize, HubError> {
    let rows = signals.load_all(viewer).await?;
    let n = rows.len();
    store.lock().unwrap().load(rows);
    SIGNAL_LOADS.inc();
    Ok(n)
}

pub struct ChangeFeedBridge {
    feed: Arc<dyn ChangeFeedApi>,
    signals: Arc<dyn SignalApi>,
    store: SharedStore,
    session: Arc<SessionContext>,
    rec_tx: Option<mpsc::Sender<Event>>,
    started: AtomicBool,
}

impl ChangeFeedBridge {
    pub fn new(
        backend: &Backend,
        store: SharedStore,
        session: Arc<SessionContext>,
        rec_tx: Option<mpsc::Sender<Event>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            feed: backend.feed.clone(),
            signals: backend.signals.clone(),
            store,
            session,
            rec_tx,
            started: AtomicBool::new(false),
        })
    }

    /// Subscribe and spawn the consumer tasks. Exactly one active
    /// subscription per table — repeated calls are refused.
    pub fn start(self: &Arc<Self>) -> bool {
        if self.started.swap(true, Ordering::SeqCst) {
            warn!("change-feed bridge already started, ignoring");
            return false;
        }

        let signals_rx = self.feed.subscribe(FeedTable::Signals);
        let likes_rx = self.feed.subscribe(FeedTable::Likes);

        tokio::spawn(Arc::clone(self).run_signals(signals_rx));
        tokio::spawn(Arc::clone(self).run_likes(likes_rx));
        info!("change-feed bridge started");
        true
    }

    async fn run_signals(self: Arc<Self>, mut rx: broadcast::Receiver<FeedEvent>) {
        loop {
            match rx.recv().await {
                Ok(ev) => self.apply_signal_event(ev),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    // dropped events: resync rather than guess
                    warn!(missed = n, "signal feed lagged, reloading");
                    let _ = self.reload().await;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }

    async fn run_likes(self: Arc<Self>, mut rx: broadcast::Receiver<FeedEvent>) {
        loop {
            match rx.recv().await {
                Ok(ev) => {
                    FEED_EVENTS
                        .with_label_values(&[ev.table.as_str(), kind_label(ev.kind)])
                        .inc();
                    self.handle_like_event().await;
                }
                Err(broadcast::error::RecvError::Lagged(_)) => self.handle_like_event().await,
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }

    /// Signal inserts front-insert; updates replace in place. Deletes are
    /// outside this subscription's mask and ignored.
    pub fn apply_signal_event(&self, ev: FeedEvent) {
        if !EventMask::UPSERTS.accepts(ev.kind) {
            return;
        }
        FEED_EVENTS
            .with_label_values(&[ev.table.as_str(), kind_label(ev.kind)])
            .inc();
        if let Some(row) = ev.signal.clone() {
            self.store.lock().unwrap().upsert(row);
            debug!(kind = ?ev.kind, "signal event applied");
        }
        if let Some(tx) = &self.rec_tx {
            let _ = tx.try_send(Event::Feed(ev));
        }
    }

    /// Like rows changed somewhere: the aggregates are stale, reload
    /// everything. Intentionally no incremental count patching.
    pub async fn handle_like_event(&self) {
        match self.reload().await {
            Ok(n) => {
                if let Some(tx) = &self.rec_tx {
                    let _ = tx.try_send(Event::Reload { signals: n });
                }
            }
            Err(e) => warn!(?e, "reload after like event failed, view stays stale"),
        }
    }

    pub async fn reload(&self) -> Result<usize, HubError> {
        let viewer = self.session.current().map(|u| u.id);
        reload_store(&self.signals, &self.store, viewer).await
    }
}

fn kind_label(kind: FeedKind) -> &'static str {
    match kind { FeedKind::Insert => "insert", FeedKind::Update => "update", FeedKind::Delete => "delete" }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::LikeApi;
    use crate::backend_mock::MockBackend;
    use crate::domain::{Signal, SignalAction, SignalDraft, SignalStatus, SubscriptionTier};
    use crate::store::SignalStore;
    use crate::view::{FilterTag, SortKey};
    use chrono::Utc;
    use std::time::Duration;

    fn row(asset: &str) -> Signal {
        Signal {
            id: Uuid::new_v4(),
            asset: asset.to_string(),
            action: SignalAction::Put,
            expiry_minutes: 15,
            entry_price: None,
            target_price: None,
            stop_loss: None,
            confidence: 2,
            status: SignalStatus::Active,
            created_by: Uuid::new_v4(),
            created_at: Utc::now(),
            like_count: 0,
            liked_by_me: false,
        }
    }

    fn bridge_fixture(backend: &Arc<MockBackend>) -> (Arc<ChangeFeedBridge>, SharedStore) {
        let bundle = Backend::from_parts(backend.clone());
        let (store, _view_rx) = SignalStore::shared(FilterTag::All, SortKey::Newest);
        let (session, _session_rx) = SessionContext::new(&bundle, 20);
        let bridge = ChangeFeedBridge::new(&bundle, store.clone(), session, None);
        (bridge, store)
    }

    #[tokio::test]
    async fn applying_the_same_update_twice_is_idempotent() {
        let backend = MockBackend::new();
        let (bridge, store) = bridge_fixture(&backend);

        let mut s = row("EUR/USD");
        bridge.apply_signal_event(FeedEvent { table: FeedTable::Signals, kind: FeedKind::Insert, signal: Some(s.clone()) });
        s.status = SignalStatus::Hit;
        bridge.apply_signal_event(FeedEvent { table: FeedTable::Signals, kind: FeedKind::Update, signal: Some(s.clone()) });
        let once = store.lock().unwrap().snapshot();
        bridge.apply_signal_event(FeedEvent { table: FeedTable::Signals, kind: FeedKind::Update, signal: Some(s.clone()) });
        let twice = store.lock().unwrap().snapshot();

        assert_eq!(once.len(), 1);
        assert_eq!(once.len(), twice.len());
        assert_eq!(twice[0].status, SignalStatus::Hit);
    }

    #[tokio::test]
    async fn inserts_go_to_the_front() {
        let backend = MockBackend::new();
        let (bridge, store) = bridge_fixture(&backend);

        bridge.apply_signal_event(FeedEvent { table: FeedTable::Signals, kind: FeedKind::Insert, signal: Some(row("FIRST")) });
        bridge.apply_signal_event(FeedEvent { table: FeedTable::Signals, kind: FeedKind::Insert, signal: Some(row("SECOND")) });

        assert_eq!(store.lock().unwrap().snapshot()[0].asset, "SECOND");
    }

    #[tokio::test]
    async fn delete_events_are_outside_the_mask() {
        let backend = MockBackend::new();
        let (bridge, store) = bridge_fixture(&backend);
        let s = row("KEEP");
        bridge.apply_signal_event(FeedEvent { table: FeedTable::Signals, kind: FeedKind::Insert, signal: Some(s.clone()) });
        bridge.apply_signal_event(FeedEvent { table: FeedTable::Signals, kind: FeedKind::Delete, signal: Some(s) });
        assert_eq!(store.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn like_events_trigger_a_full_reload_with_fresh_counts() {
        let backend = MockBackend::new();
        let admin = backend.seed_user("admin@x.io", "pw", "admin", true, SubscriptionTier::Vip);
        let fan = backend.seed_user("fan@x.io", "pw", "fan", false, SubscriptionTier::Free);
        let draft = SignalDraft {
            asset: "EUR/USD".into(),
            action: Some(SignalAction::Call),
            expiry_minutes: 5,
            confidence: 4,
            ..Default::default()
        };
        let id = SignalApi::insert(backend.as_ref(), &draft, admin).await.unwrap().id;

        let (bridge, store) = bridge_fixture(&backend);
        bridge.reload().await.unwrap();
        assert_eq!(store.lock().unwrap().get(id).unwrap().like_count, 0);

        LikeApi::insert(backend.as_ref(), id, fan).await.unwrap();
        bridge.handle_like_event().await;
        assert_eq!(store.lock().unwrap().get(id).unwrap().like_count, 1);
    }

    #[tokio::test]
    async fn start_refuses_duplicate_subscriptions() {
        let backend = MockBackend::new();
        let (bridge, _store) = bridge_fixture(&backend);
        assert!(bridge.start());
        assert!(!bridge.start());
    }

    #[tokio::test]
    async fn live_insert_reaches_the_store_end_to_end() {
        let backend = MockBackend::new();
        let admin = backend.seed_user("admin@x.io", "pw", "admin", true, SubscriptionTier::Vip);
        let (bridge, store) = bridge_fixture(&backend);
        bridge.start();

        let draft = SignalDraft {
            asset: "BTC/USD".into(),
            action: Some(SignalAction::Call),
            expiry_minutes: 30,
            confidence: 5,
            ..Default::default()
        };
        SignalApi::insert(backend.as_ref(), &draft, admin).await.unwrap();

        let mut seen = false;
        for _ in 0..100 {
            if store.lock().unwrap().len() == 1 {
                seen = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(seen, "insert event never reached the store");
    }
}
