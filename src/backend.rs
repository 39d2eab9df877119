// ===============================
// src/backend.rs
// ===============================
//
// Collaborator contracts the client core depends on:
// - AuthApi          : hosted auth sessions + credentials
// - SignalApi        : row CRUD for signals (with like aggregates on read)
// - ProfileApi       : user profiles + tier/email audience lookups
// - LikeApi          : (signal, user) like rows
// - NotificationApi  : bulk insert + per-user fetch/mark-read
// - ChangeFeedApi    : row-level push events per table
//
// Two implementations exist: backend_mock (in-memory, used by tests and
// mock mode) and backend_rest (managed backend over HTTP + websocket).
//
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::domain::{
    AuthUser, FeedEvent, FeedTable, NewNotification, Notification, Signal, SignalDraft,
    SignalStatus, SignupAttrs, TierFilter, UserProfile,
};
use crate::error::HubError;

#[async_trait]
pub trait AuthApi: Send + Sync {
    /// Restored identity, if a session already exists.
    async fn session(&self) -> Result<Option<AuthUser>, HubError>;
    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthUser, HubError>;
    async fn sign_up(&self, email: &str, password: &str, attrs: SignupAttrs) -> Result<AuthUser, HubError>;
    async fn sign_out(&self) -> Result<(), HubError>;
}

#[async_trait]
pub trait SignalApi: Send + Sync {
    /// Full signal set ordered created_at descending, with like count and
    /// the viewer's liked flag joined in.
    async fn load_all(&self, viewer: Option<Uuid>) -> Result<Vec<Signal>, HubError>;
    async fn fetch(&self, id: Uuid) -> Result<Signal, HubError>;
    async fn insert(&self, draft: &SignalDraft, created_by: Uuid) -> Result<Signal, HubError>;
    async fn update_status(&self, id: Uuid, status: SignalStatus) -> Result<(), HubError>;
    async fn delete(&self, id: Uuid) -> Result<(), HubError>;
    async fn count(&self) -> Result<usize, HubError>;
}

#[async_trait]
pub trait ProfileApi: Send + Sync {
    async fn fetch(&self, id: Uuid) -> Result<Option<UserProfile>, HubError>;
    async fn insert(&self, profile: &UserProfile) -> Result<(), HubError>;
    /// Newest first.
    async fn list_all(&self) -> Result<Vec<UserProfile>, HubError>;
    async fn ids_for_tier(&self, filter: TierFilter) -> Result<Vec<Uuid>, HubError>;
    async fn ids_for_emails(&self, emails: &[String]) -> Result<Vec<Uuid>, HubError>;
    async fn set_admin(&self, id: Uuid, is_admin: bool) -> Result<(), HubError>;
    async fn count(&self) -> Result<usize, HubError>;
}

#[async_trait]
pub trait LikeApi: Send + Sync {
    async fn insert(&self, signal_id: Uuid, user_id: Uuid) -> Result<(), HubError>;
    async fn delete(&self, signal_id: Uuid, user_id: Uuid) -> Result<(), HubError>;
    async fn count(&self) -> Result<usize, HubError>;
}

#[async_trait]
pub trait NotificationApi: Send + Sync {
    /// Single bulk insert; partial failure surfaces as one aggregate error.
    async fn insert_bulk(&self, rows: Vec<NewNotification>) -> Result<usize, HubError>;
    /// Newest first, capped at `limit`. Never cached by the core.
    async fn for_user(&self, user_id: Uuid, limit: usize) -> Result<Vec<Notification>, HubError>;
    async fn mark_read(&self, id: Uuid) -> Result<(), HubError>;
    async fn mark_all_read(&self, user_id: Uuid) -> Result<(), HubError>;
    /// Cross-user history for the admin console.
    async fn recent(&self, limit: usize) -> Result<Vec<Notification>, HubError>;
}

/// Push transport. A receiver stays live across transport reconnects (the
/// adapter owns resubscription); delivery is at-least-once and unordered.
/// Receivers see every event kind for the table — consumers filter with
/// their own `EventMask`.
pub trait ChangeFeedApi: Send + Sync {
    fn subscribe(&self, table: FeedTable) -> broadcast::Receiver<FeedEvent>;
}

/// One concrete backend shared by every component as per-concern trait
/// objects. Constructed once at startup and injected — never referenced
/// as an ambient global.
#[derive(Clone)]
pub struct Backend {
    pub auth: Arc<dyn AuthApi>,
    pub signals: Arc<dyn SignalApi>,
    pub profiles: Arc<dyn ProfileApi>,
    pub likes: Arc<dyn LikeApi>,
    pub notifications: Arc<dyn NotificationApi>,
    pub feed: Arc<dyn ChangeFeedApi>,
}

impl Backend {
    pub fn from_parts<T>(b: Arc<T>) -> Self
    where
        T: AuthApi + SignalApi + ProfileApi + LikeApi + NotificationApi + ChangeFeedApi + 'static,
    {
        Backend {
            auth: b.clone(),
            signals: b.clone(),
            profiles: b.clone(),
            likes: b.clone(),
            notifications: b.clone(),
            feed: b,
        }
    }
}
