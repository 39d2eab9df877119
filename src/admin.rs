// ===============================
// src/admin.rs (role-gated console)
// ===============================
//
// Orchestration layer for administrative CRUD and broadcasts. The
// capability check lives HERE, not in whatever affordance calls in:
// every mutating operation verifies the session's admin flag before a
// single persistence call goes out.
//
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::backend::{Backend, LikeApi, NotificationApi, ProfileApi, SignalApi};
use crate::domain::{
    Audience, Notification, NotificationKind, Signal, SignalDraft, SignalStatus, UserProfile,
};
use crate::error::HubError;
use crate::fanout::NotificationFanout;
use crate::feed::reload_store;
use crate::metrics::ADMIN_REFUSALS;
use crate::session::{CurrentUser, SessionContext};
use crate::store::SharedStore;

pub struct AdminConsole {
    session: Arc<SessionContext>,
    signals: Arc<dyn SignalApi>,
    profiles: Arc<dyn ProfileApi>,
    likes: Arc<dyn LikeApi>,
    notifications: Arc<dyn NotificationApi>,
    fanout: Arc<NotificationFanout>,
    store: SharedStore,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DashboardStats {
    pub signals: usize,
    pub users: usize,
    pub likes: usize,
    pub success_rate_pct: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityKind { Signal, User }

#[derive(Debug, Clone, Serialize)]
pub struct ActivityEntry {
    pub kind: ActivityKind,
    pub title: String,
    pub by: String,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UserRow {
    pub profile: UserProfile,
    pub subscription_active: bool,
}

impl AdminConsole {
    pub fn new(
        backend: &Backend,
        session: Arc<SessionContext>,
        fanout: Arc<NotificationFanout>,
        store: SharedStore,
    ) -> Self {
        Self {
            session,
            signals: backend.signals.clone(),
            profiles: backend.profiles.clone(),
            likes: backend.likes.clone(),
            notifications: backend.notifications.clone(),
            fanout,
            store,
        }
    }

    fn ensure_admin(&self) -> Result<CurrentUser, HubError> {
        match self.session.current() {
            None => {
                ADMIN_REFUSALS.inc();
                Err(HubError::NotSignedIn)
            }
            Some(u) if !u.is_admin => {
                ADMIN_REFUSALS.inc();
                Err(HubError::NotAuthorized)
            }
            Some(u) => Ok(u),
        }
    }

    async fn reload(&self) -> Result<usize, HubError> {
        let viewer = self.session.current().map(|u| u.id);
        reload_store(&self.signals, &self.store, viewer).await
    }

    /// Validate, persist, alert everyone else, then resynchronize the view.
    pub async fn create_signal(&self, draft: SignalDraft) -> Result<Signal, HubError> {
        let user = self.ensure_admin()?;
        draft.validate()?;

        let signal = self.signals.insert(&draft, user.id).await?;
        info!(asset = %signal.asset, action = %signal.action.as_str(), "signal created");

        // alert failure must not unwind the already-persisted signal
        if let Err(e) = self.fanout.signal_alert(&signal).await {
            warn!(?e, "signal alert fan-out failed");
        }

        self.reload().await?;
        Ok(signal)
    }

    pub async fn update_status(&self, id: Uuid, status: SignalStatus) -> Result<(), HubError> {
        self.ensure_admin()?;
        self.signals.update_status(id, status).await?;
        info!(%id, status = %status.as_str(), "signal status updated");
        self.reload().await?;
        Ok(())
    }

    /// Deletes are not in the feed subscription's mask, so the local
    /// store is pruned directly.
    pub async fn delete_signal(&self, id: Uuid) -> Result<(), HubError> {
        self.ensure_admin()?;
        self.signals.delete(id).await?;
        self.store.lock().unwrap().remove(id);
        info!(%id, "signal deleted");
        Ok(())
    }

    /// Flip another user's admin flag. Operators cannot change their own.
    pub async fn toggle_admin(&self, user_id: Uuid) -> Result<bool, HubError> {
        let me = self.ensure_admin()?;
        if user_id == me.id {
            return Err(HubError::SelfToggle);
        }
        let profile = self
            .profiles
            .fetch(user_id)
            .await?
            .ok_or_else(|| HubError::NotFound(format!("profile {user_id}")))?;
        let now_admin = !profile.is_admin;
        self.profiles.set_admin(user_id, now_admin).await?;
        info!(%user_id, now_admin, "admin flag toggled");
        Ok(now_admin)
    }

    /// Broadcast to a resolved audience. An audience that resolves to
    /// nobody is a warning here, not a failure.
    pub async fn send_broadcast(
        &self,
        audience: Audience,
        title: &str,
        message: &str,
        kind: NotificationKind,
    ) -> Result<usize, HubError> {
        self.ensure_admin()?;
        if title.trim().is_empty() || message.trim().is_empty() {
            return Err(HubError::InvalidNotification("title and message are required".into()));
        }

        match self.fanout.broadcast(&audience, title, message, kind).await {
            Ok(sent) => {
                info!(sent, %title, "broadcast sent");
                Ok(sent)
            }
            Err(e) if e.is_empty_audience() => {
                warn!(%title, "no users found for the selected audience");
                Ok(0)
            }
            Err(e) => Err(e),
        }
    }

    /// Users table: every profile plus whether its subscription is live.
    pub async fn list_users(&self) -> Result<Vec<UserRow>, HubError> {
        self.ensure_admin()?;
        let now = Utc::now();
        Ok(self
            .profiles
            .list_all()
            .await?
            .into_iter()
            .map(|profile| {
                let subscription_active = profile.subscription_active(now);
                UserRow { profile, subscription_active }
            })
            .collect())
    }

    pub async fn dashboard_stats(&self) -> Result<DashboardStats, HubError> {
        self.ensure_admin()?;
        let signals = self.signals.count().await?;
        let users = self.profiles.count().await?;
        let likes = self.likes.count().await?;

        let rows = self.signals.load_all(None).await?;
        let hits = rows.iter().filter(|s| s.status == SignalStatus::Hit).count();
        let success_rate_pct = if rows.is_empty() {
            0
        } else {
            ((hits as f64 / rows.len() as f64) * 100.0).round() as u32
        };

        Ok(DashboardStats { signals, users, likes, success_rate_pct })
    }

    pub async fn notification_history(&self, limit: usize) -> Result<Vec<Notification>, HubError> {
        self.ensure_admin()?;
        self.notifications.recent(limit).await
    }

    /// Merged feed of the latest signals and the latest registrations,
    /// newest first.
    pub async fn recent_activity(&self, limit: usize) -> Result<Vec<ActivityEntry>, HubError> {
        self.ensure_admin()?;

        let profiles = self.profiles.list_all().await?;
        let username_of = |id: Uuid| {
            profiles
                .iter()
                .find(|p| p.id == id)
                .map(|p| p.username.clone())
                .unwrap_or_else(|| "Admin".to_string())
        };

        let mut entries: Vec<ActivityEntry> = Vec::new();
        for s in self.signals.load_all(None).await?.into_iter().take(5) {
            entries.push(ActivityEntry {
                kind: ActivityKind::Signal,
                title: format!("New signal: {} {}", s.asset, s.action.as_str()),
                by: username_of(s.created_by),
                at: s.created_at,
            });
        }
        for p in profiles.iter().take(5) {
            entries.push(ActivityEntry {
                kind: ActivityKind::User,
                title: format!("New user joined: {}", p.username),
                by: "System".to_string(),
                at: p.created_at,
            });
        }

        entries.sort_by(|a, b| b.at.cmp(&a.at));
        entries.truncate(limit);
        Ok(entries)
    }
}
