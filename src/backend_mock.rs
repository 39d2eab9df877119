// ===============================
// src/backend_mock.rs (in-memory backend)
// ===============================
//
// Full backend over in-process tables, used by mock mode and by the test
// suite. Every mutation fans the matching row event out on the same
// broadcast channels the REST adapter feeds, so the bridge cannot tell
// the two apart. Tests use `write_calls()` to assert that refused
// operations never reached persistence, and `set_fail_writes(true)` to
// exercise the optimistic-mutation failure path.
//
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use ahash::AHashMap as HashMap;
use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::backend::{AuthApi, ChangeFeedApi, LikeApi, NotificationApi, ProfileApi, SignalApi};
use crate::domain::{
    AuthUser, FeedEvent, FeedKind, FeedTable, Like, NewNotification, Notification, Signal,
    SignalDraft, SignalStatus, SignupAttrs, SubscriptionTier, TierFilter, UserProfile,
};
use crate::error::HubError;

#[derive(Default)]
struct Tables {
    signals: Vec<Signal>,
    likes: Vec<Like>,
    notifications: Vec<Notification>,
    profiles: Vec<UserProfile>,
    // email -> (user id, password)
    credentials: HashMap<String, (Uuid, String)>,
}

pub struct MockBackend {
    tables: Mutex<Tables>,
    session: Mutex<Option<AuthUser>>,
    signals_tx: broadcast::Sender<FeedEvent>,
    likes_tx: broadcast::Sender<FeedEvent>,
    write_calls: AtomicUsize,
    fail_writes: AtomicBool,
}

impl MockBackend {
    pub fn new() -> Arc<Self> {
        let (signals_tx, _) = broadcast::channel(256);
        let (likes_tx, _) = broadcast::channel(256);
        Arc::new(Self {
            tables: Mutex::new(Tables::default()),
            session: Mutex::new(None),
            signals_tx,
            likes_tx,
            write_calls: AtomicUsize::new(0),
            fail_writes: AtomicBool::new(false),
        })
    }

    /// Mutating persistence calls observed so far.
    pub fn write_calls(&self) -> usize {
        self.write_calls.load(Ordering::SeqCst)
    }

    /// While set, every mutating call fails with a persistence error.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn write_guard(&self) -> Result<(), HubError> {
        self.write_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(HubError::Persistence("injected write failure".into()));
        }
        Ok(())
    }

    /// Register a user with credentials and a profile row. Test/demo seam.
    pub fn seed_user(
        &self,
        email: &str,
        password: &str,
        username: &str,
        is_admin: bool,
        tier: SubscriptionTier,
    ) -> Uuid {
        let id = Uuid::new_v4();
        let mut t = self.tables.lock().unwrap();
        t.credentials.insert(email.to_string(), (id, password.to_string()));
        t.profiles.push(UserProfile {
            id,
            username: username.to_string(),
            full_name: None,
            email: email.to_string(),
            is_admin,
            tier,
            tier_expires_at: None,
            avatar_url: None,
            created_at: Utc::now(),
        });
        id
    }

    fn rows_with_aggregates(t: &Tables, viewer: Option<Uuid>) -> Vec<Signal> {
        let mut rows: Vec<Signal> = t
            .signals
            .iter()
            .map(|s| {
                let mut row = s.clone();
                row.like_count = t.likes.iter().filter(|l| l.signal_id == s.id).count() as u32;
                row.liked_by_me = viewer
                    .map(|v| t.likes.iter().any(|l| l.signal_id == s.id && l.user_id == v))
                    .unwrap_or(false);
                row
            })
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
        rows
    }

    fn emit_signal(&self, kind: FeedKind, row: Option<Signal>) {
        let _ = self.signals_tx.send(FeedEvent { table: FeedTable::Signals, kind, signal: row });
    }

    fn emit_like(&self, kind: FeedKind) {
        let _ = self.likes_tx.send(FeedEvent { table: FeedTable::Likes, kind, signal: None });
    }
}

#[async_trait]
impl AuthApi for MockBackend {
    async fn session(&self) -> Result<Option<AuthUser>, HubError> {
        Ok(self.session.lock().unwrap().clone())
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthUser, HubError> {
        let t = self.tables.lock().unwrap();
        let (id, stored) = t
            .credentials
            .get(email)
            .cloned()
            .ok_or_else(|| HubError::Auth("invalid login credentials".into()))?;
        if stored != password {
            return Err(HubError::Auth("invalid login credentials".into()));
        }
        let profile = t.profiles.iter().find(|p| p.id == id);
        let user = AuthUser {
            id,
            email: email.to_string(),
            username: profile.map(|p| p.username.clone()),
            full_name: profile.and_then(|p| p.full_name.clone()),
        };
        drop(t);
        *self.session.lock().unwrap() = Some(user.clone());
        Ok(user)
    }

    async fn sign_up(&self, email: &str, password: &str, attrs: SignupAttrs) -> Result<AuthUser, HubError> {
        let mut t = self.tables.lock().unwrap();
        if t.credentials.contains_key(email) {
            return Err(HubError::Auth("email already registered".into()));
        }
        let id = Uuid::new_v4();
        t.credentials.insert(email.to_string(), (id, password.to_string()));
        drop(t);

        let user = AuthUser {
            id,
            email: email.to_string(),
            username: Some(attrs.username),
            full_name: attrs.full_name,
        };
        *self.session.lock().unwrap() = Some(user.clone());
        Ok(user)
    }

    async fn sign_out(&self) -> Result<(), HubError> {
        *self.session.lock().unwrap() = None;
        Ok(())
    }
}

#[async_trait]
impl SignalApi for MockBackend {
    async fn load_all(&self, viewer: Option<Uuid>) -> Result<Vec<Signal>, HubError> {
        let t = self.tables.lock().unwrap();
        Ok(Self::rows_with_aggregates(&t, viewer))
    }

    async fn fetch(&self, id: Uuid) -> Result<Signal, HubError> {
        let t = self.tables.lock().unwrap();
        t.signals
            .iter()
            .find(|s| s.id == id)
            .cloned()
            .ok_or_else(|| HubError::NotFound(format!("signal {id}")))
    }

    async fn insert(&self, draft: &SignalDraft, created_by: Uuid) -> Result<Signal, HubError> {
        self.write_guard()?;
        let action = draft
            .action
            .ok_or_else(|| HubError::InvalidSignal("action is required".into()))?;
        let row = Signal {
            id: Uuid::new_v4(),
            asset: draft.asset.clone(),
            action,
            expiry_minutes: draft.expiry_minutes,
            entry_price: draft.entry_price,
            target_price: draft.target_price,
            stop_loss: draft.stop_loss,
            confidence: draft.confidence,
            status: SignalStatus::Active,
            created_by,
            created_at: Utc::now(),
            like_count: 0,
            liked_by_me: false,
        };
        self.tables.lock().unwrap().signals.push(row.clone());
        self.emit_signal(FeedKind::Insert, Some(row.clone()));
        Ok(row)
    }

    async fn update_status(&self, id: Uuid, status: SignalStatus) -> Result<(), HubError> {
        self.write_guard()?;
        let updated = {
            let mut t = self.tables.lock().unwrap();
            let row = t
                .signals
                .iter_mut()
                .find(|s| s.id == id)
                .ok_or_else(|| HubError::NotFound(format!("signal {id}")))?;
            row.status = status;
            row.clone()
        };
        self.emit_signal(FeedKind::Update, Some(updated));
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<(), HubError> {
        self.write_guard()?;
        {
            let mut t = self.tables.lock().unwrap();
            t.signals.retain(|s| s.id != id);
            t.likes.retain(|l| l.signal_id != id);
        }
        self.emit_signal(FeedKind::Delete, None);
        Ok(())
    }

    async fn count(&self) -> Result<usize, HubError> {
        Ok(self.tables.lock().unwrap().signals.len())
    }
}

#[async_trait]
impl ProfileApi for MockBackend {
    async fn fetch(&self, id: Uuid) -> Result<Option<UserProfile>, HubError> {
        let t = self.tables.lock().unwrap();
        Ok(t.profiles.iter().find(|p| p.id == id).cloned())
    }

    async fn insert(&self, profile: &UserProfile) -> Result<(), HubError> {
        self.write_guard()?;
        self.tables.lock().unwrap().profiles.push(profile.clone());
        Ok(())
    }

    async fn list_all(&self) -> Result<Vec<UserProfile>, HubError> {
        let mut rows = self.tables.lock().unwrap().profiles.clone();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }

    async fn ids_for_tier(&self, filter: TierFilter) -> Result<Vec<Uuid>, HubError> {
        let t = self.tables.lock().unwrap();
        Ok(t.profiles
            .iter()
            .filter(|p| match filter {
                TierFilter::Any => true,
                TierFilter::OnlyFree => p.tier.is_free(),
                TierFilter::NotFree => !p.tier.is_free(),
            })
            .map(|p| p.id)
            .collect())
    }

    async fn ids_for_emails(&self, emails: &[String]) -> Result<Vec<Uuid>, HubError> {
        let t = self.tables.lock().unwrap();
        Ok(t.profiles
            .iter()
            .filter(|p| emails.iter().any(|e| e.eq_ignore_ascii_case(&p.email)))
            .map(|p| p.id)
            .collect())
    }

    async fn set_admin(&self, id: Uuid, is_admin: bool) -> Result<(), HubError> {
        self.write_guard()?;
        let mut t = self.tables.lock().unwrap();
        let row = t
            .profiles
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| HubError::NotFound(format!("profile {id}")))?;
        row.is_admin = is_admin;
        Ok(())
    }

    async fn count(&self) -> Result<usize, HubError> {
        Ok(self.tables.lock().unwrap().profiles.len())
    }
}

#[async_trait]
impl LikeApi for MockBackend {
    async fn insert(&self, signal_id: Uuid, user_id: Uuid) -> Result<(), HubError> {
        self.write_guard()?;
        {
            let mut t = self.tables.lock().unwrap();
            // at most one per (signal, user)
            if !t.likes.iter().any(|l| l.signal_id == signal_id && l.user_id == user_id) {
                t.likes.push(Like { signal_id, user_id, created_at: Utc::now() });
            }
        }
        self.emit_like(FeedKind::Insert);
        Ok(())
    }

    async fn delete(&self, signal_id: Uuid, user_id: Uuid) -> Result<(), HubError> {
        self.write_guard()?;
        {
            let mut t = self.tables.lock().unwrap();
            t.likes.retain(|l| !(l.signal_id == signal_id && l.user_id == user_id));
        }
        self.emit_like(FeedKind::Delete);
        Ok(())
    }

    async fn count(&self) -> Result<usize, HubError> {
        Ok(self.tables.lock().unwrap().likes.len())
    }
}

#[async_trait]
impl NotificationApi for MockBackend {
    async fn insert_bulk(&self, rows: Vec<NewNotification>) -> Result<usize, HubError> {
        self.write_guard()?;
        let now = Utc::now();
        let mut t = self.tables.lock().unwrap();
        let n = rows.len();
        t.notifications.extend(rows.into_iter().map(|r| Notification {
            id: Uuid::new_v4(),
            user_id: r.user_id,
            title: r.title,
            message: r.message,
            kind: r.kind,
            read: false,
            related_signal_id: r.related_signal_id,
            created_at: now,
        }));
        Ok(n)
    }

    async fn for_user(&self, user_id: Uuid, limit: usize) -> Result<Vec<Notification>, HubError> {
        let t = self.tables.lock().unwrap();
        let mut rows: Vec<Notification> = t
            .notifications
            .iter()
            .filter(|n| n.user_id == user_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        rows.truncate(limit);
        Ok(rows)
    }

    async fn mark_read(&self, id: Uuid) -> Result<(), HubError> {
        self.write_guard()?;
        let mut t = self.tables.lock().unwrap();
        if let Some(n) = t.notifications.iter_mut().find(|n| n.id == id) {
            n.read = true;
        }
        Ok(())
    }

    async fn mark_all_read(&self, user_id: Uuid) -> Result<(), HubError> {
        self.write_guard()?;
        let mut t = self.tables.lock().unwrap();
        for n in t.notifications.iter_mut().filter(|n| n.user_id == user_id && !n.read) {
            n.read = true;
        }
        Ok(())
    }

    async fn recent(&self, limit: usize) -> Result<Vec<Notification>, HubError> {
        let t = self.tables.lock().unwrap();
        let mut rows = t.notifications.clone();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        rows.truncate(limit);
        Ok(rows)
    }
}

impl ChangeFeedApi for MockBackend {
    fn subscribe(&self, table: FeedTable) -> broadcast::Receiver<FeedEvent> {
        match table {
            FeedTable::Signals => self.signals_tx.subscribe(),
            FeedTable::Likes => self.likes_tx.subscribe(),
        }
    }
}
