// ===============================
// src/store.rs (in-memory signal cache)
// ===============================
//
// Single source of truth for rendering. Mutated only by the change-feed
// bridge and the like coordinator; every mutation republishes the full
// projection on the view watch channel.
//
use std::sync::{Arc, Mutex};

use chrono::Utc;
use tokio::sync::watch;
use uuid::Uuid;

use crate::domain::Signal;
use crate::metrics::STORE_SIZE;
use crate::view::{self, FilterTag, SortKey, ViewSnapshot};

pub struct SignalStore {
    signals: Vec<Signal>,
    filter: FilterTag,
    sort: SortKey,
    view_tx: watch::Sender<ViewSnapshot>,
}

pub type SharedStore = Arc<Mutex<SignalStore>>;

impl SignalStore {
    pub fn new(filter: FilterTag, sort: SortKey) -> (Self, watch::Receiver<ViewSnapshot>) {
        let (view_tx, view_rx) = watch::channel(ViewSnapshot::default());
        (Self { signals: Vec::new(), filter, sort, view_tx }, view_rx)
    }

    pub fn shared(filter: FilterTag, sort: SortKey) -> (SharedStore, watch::Receiver<ViewSnapshot>) {
        let (store, view_rx) = Self::new(filter, sort);
        (Arc::new(Mutex::new(store)), view_rx)
    }

    /// Replace the full set. Last-writer-wins: a reload supersedes any
    /// state queued up from the feed before it.
    pub fn load(&mut self, mut rows: Vec<Signal>) {
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
        self.signals = rows;
        self.republish();
    }

    /// Insert-or-replace. New records go to the FRONT (newest-first
    /// semantics for live inserts, corrected by the next projection);
    /// known ids are replaced in place, keeping their position and their
    /// like aggregates — feed rows don't carry the join columns, and the
    /// like path resynchronizes counts with a full reload anyway.
    pub fn upsert(&mut self, incoming: Signal) {
        if let Some(slot) = self.signals.iter_mut().find(|s| s.id == incoming.id) {
            let (like_count, liked_by_me) = (slot.like_count, slot.liked_by_me);
            *slot = incoming;
            slot.like_count = like_count;
            slot.liked_by_me = liked_by_me;
        } else {
            self.signals.insert(0, incoming);
        }
        self.republish();
    }

    pub fn remove(&mut self, id: Uuid) {
        self.signals.retain(|s| s.id != id);
        self.republish();
    }

    pub fn get(&self, id: Uuid) -> Option<&Signal> {
        self.signals.iter().find(|s| s.id == id)
    }

    pub fn liked(&self, id: Uuid) -> Option<bool> {
        self.get(id).map(|s| s.liked_by_me)
    }

    /// Optimistic local flip of the viewer's like, count adjusted with it.
    pub fn set_liked(&mut self, id: Uuid, liked: bool) {
        if let Some(slot) = self.signals.iter_mut().find(|s| s.id == id) {
            if slot.liked_by_me != liked {
                slot.liked_by_me = liked;
                slot.like_count = if liked {
                    slot.like_count.saturating_add(1)
                } else {
                    slot.like_count.saturating_sub(1)
                };
            }
            self.republish();
        }
    }

    pub fn set_filter(&mut self, filter: FilterTag) {
        self.filter = filter;
        self.republish();
    }

    pub fn set_sort(&mut self, sort: SortKey) {
        self.sort = sort;
        self.republish();
    }

    pub fn len(&self) -> usize { self.signals.len() }

    pub fn is_empty(&self) -> bool { self.signals.is_empty() }

    pub fn snapshot(&self) -> Vec<Signal> { self.signals.clone() }

    fn republish(&self) {
        STORE_SIZE.set(self.signals.len() as i64);
        let snap = ViewSnapshot {
            signals: view::project(&self.signals, self.filter, self.sort),
            stats: view::stats(&self.signals, Utc::now()),
        };
        let _ = self.view_tx.send(snap);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{SignalAction, SignalStatus};
    use chrono::Duration;

    fn sig(asset: &str, age_mins: i64) -> Signal {
        Signal {
            id: Uuid::new_v4(),
            asset: asset.to_string(),
            action: SignalAction::Call,
            expiry_minutes: 5,
            entry_price: None,
            target_price: None,
            stop_loss: None,
            confidence: 3,
            status: SignalStatus::Active,
            created_by: Uuid::new_v4(),
            created_at: Utc::now() - Duration::minutes(age_mins),
            like_count: 0,
            liked_by_me: false,
        }
    }

    #[test]
    fn load_replaces_and_orders_newest_first() {
        let (mut store, _rx) = SignalStore::new(FilterTag::All, SortKey::Newest);
        store.load(vec![sig("OLD", 60), sig("NEW", 1), sig("MID", 30)]);

        let order: Vec<String> = store.snapshot().into_iter().map(|s| s.asset).collect();
        assert_eq!(order, vec!["NEW", "MID", "OLD"]);

        store.load(vec![sig("ONLY", 5)]);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn upsert_front_inserts_new_records() {
        let (mut store, _rx) = SignalStore::new(FilterTag::All, SortKey::Newest);
        store.load(vec![sig("A", 1)]);

        // arrives live; goes to the front even though it is older
        store.upsert(sig("LIVE", 120));
        assert_eq!(store.snapshot()[0].asset, "LIVE");
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn upsert_is_idempotent_for_updates() {
        let (mut store, _rx) = SignalStore::new(FilterTag::All, SortKey::Newest);
        let mut s = sig("A", 10);
        store.load(vec![s.clone(), sig("B", 5)]);

        s.status = SignalStatus::Hit;
        store.upsert(s.clone());
        let after_once = store.snapshot();
        store.upsert(s.clone());
        let after_twice = store.snapshot();

        assert_eq!(after_once.len(), 2);
        assert_eq!(after_once.iter().map(|x| x.id).collect::<Vec<_>>(),
                   after_twice.iter().map(|x| x.id).collect::<Vec<_>>());
        assert_eq!(store.get(s.id).unwrap().status, SignalStatus::Hit);
    }

    #[test]
    fn upsert_replacement_keeps_position_and_like_aggregates() {
        let (mut store, _rx) = SignalStore::new(FilterTag::All, SortKey::Newest);
        let mut s = sig("A", 10);
        s.like_count = 4;
        s.liked_by_me = true;
        store.load(vec![sig("B", 1), s.clone(), sig("C", 20)]);

        let mut update = s.clone();
        update.status = SignalStatus::Miss;
        update.like_count = 0; // feed rows carry no aggregates
        update.liked_by_me = false;
        store.upsert(update);

        let row = store.get(s.id).unwrap();
        assert_eq!(row.status, SignalStatus::Miss);
        assert_eq!(row.like_count, 4);
        assert!(row.liked_by_me);
        assert_eq!(store.snapshot()[1].id, s.id);
    }

    #[test]
    fn set_liked_flips_once_and_adjusts_count() {
        let (mut store, _rx) = SignalStore::new(FilterTag::All, SortKey::Newest);
        let s = sig("A", 1);
        store.load(vec![s.clone()]);

        store.set_liked(s.id, true);
        store.set_liked(s.id, true); // repeated flip to the same state is a no-op
        assert_eq!(store.get(s.id).unwrap().like_count, 1);
        assert!(store.liked(s.id).unwrap());

        store.set_liked(s.id, false);
        assert_eq!(store.get(s.id).unwrap().like_count, 0);
        assert!(!store.liked(s.id).unwrap());
    }

    #[test]
    fn remove_drops_the_row() {
        let (mut store, _rx) = SignalStore::new(FilterTag::All, SortKey::Newest);
        let s = sig("A", 1);
        store.load(vec![s.clone(), sig("B", 2)]);
        store.remove(s.id);
        assert_eq!(store.len(), 1);
        assert!(store.get(s.id).is_none());
    }

    #[test]
    fn mutations_republish_the_projection() {
        let (mut store, rx) = SignalStore::new(FilterTag::Active, SortKey::Newest);
        let mut hit = sig("HIT", 3);
        hit.status = SignalStatus::Hit;
        store.load(vec![sig("A", 1), hit]);

        let snap = rx.borrow();
        assert_eq!(snap.signals.len(), 1); // filter applied
        assert_eq!(snap.signals[0].asset, "A");
    }
}
