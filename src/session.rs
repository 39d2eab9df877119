// ===============================
// src/session.rs (per-tab auth state)
// ===============================
//
// Holds the current authenticated identity + role flag, sourced from the
// auth collaborator, and publishes a snapshot on every change. The profile
// row is joined in on login and created on first authenticated session if
// absent. Notifications are never cached: fetched on demand, re-fetched
// after mutation.
//
use std::sync::{Arc, Mutex};

use chrono::Utc;
use tokio::sync::watch;
use tracing::{info, warn};
use uuid::Uuid;

use crate::backend::{AuthApi, Backend, NotificationApi, ProfileApi};
use crate::domain::{AuthUser, Notification, SignupAttrs, SubscriptionTier, UserProfile};
use crate::error::HubError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentUser {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    pub is_admin: bool,
}

/// What the chrome renders: who is signed in and the unread badge count.
#[derive(Debug, Clone, Default)]
pub struct SessionSnapshot {
    pub user: Option<CurrentUser>,
    pub unread: usize,
}

pub struct SessionContext {
    auth: Arc<dyn AuthApi>,
    profiles: Arc<dyn ProfileApi>,
    notifications: Arc<dyn NotificationApi>,
    current: Mutex<Option<CurrentUser>>,
    notif_limit: usize,
    session_tx: watch::Sender<SessionSnapshot>,
}

impl SessionContext {
    pub fn new(backend: &Backend, notif_limit: usize) -> (Arc<Self>, watch::Receiver<SessionSnapshot>) {
        let (session_tx, session_rx) = watch::channel(SessionSnapshot::default());
        (
            Arc::new(Self {
                auth: backend.auth.clone(),
                profiles: backend.profiles.clone(),
                notifications: backend.notifications.clone(),
                current: Mutex::new(None),
                notif_limit,
                session_tx,
            }),
            session_rx,
        )
    }

    pub fn current(&self) -> Option<CurrentUser> {
        self.current.lock().unwrap().clone()
    }

    pub fn is_admin(&self) -> bool {
        self.current().map(|u| u.is_admin).unwrap_or(false)
    }

    /// Restore an existing session at startup, if the auth collaborator
    /// still has one.
    pub async fn restore(&self) -> Result<Option<CurrentUser>, HubError> {
        match self.auth.session().await? {
            Some(user) => self.complete_login(user).await.map(Some),
            None => Ok(None),
        }
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<CurrentUser, HubError> {
        let user = self.auth.sign_in(email, password).await?;
        let cu = self.complete_login(user).await?;
        info!(email = %cu.email, admin = cu.is_admin, "signed in");
        Ok(cu)
    }

    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        username: &str,
        full_name: Option<String>,
    ) -> Result<CurrentUser, HubError> {
        if email.trim().is_empty() || !email.contains('@') {
            return Err(HubError::InvalidSignup("a valid email is required".into()));
        }
        if username.trim().is_empty() {
            return Err(HubError::InvalidSignup("username is required".into()));
        }
        if password.len() < 8 {
            return Err(HubError::InvalidSignup("password must be at least 8 characters".into()));
        }

        let attrs = SignupAttrs { username: username.trim().to_string(), full_name };
        let user = self.auth.sign_up(email, password, attrs).await?;
        let cu = self.complete_login(user).await?;
        info!(email = %cu.email, "signed up");
        Ok(cu)
    }

    pub async fn sign_out(&self) -> Result<(), HubError> {
        self.auth.sign_out().await?;
        *self.current.lock().unwrap() = None;
        self.publish(0);
        info!("signed out");
        Ok(())
    }

    async fn complete_login(&self, user: AuthUser) -> Result<CurrentUser, HubError> {
        let profile = match self.profiles.fetch(user.id).await? {
            Some(p) => p,
            None => {
                // first authenticated session: materialize the profile row
                let p = default_profile_for(&user);
                self.profiles.insert(&p).await?;
                info!(username = %p.username, "profile created");
                p
            }
        };

        let cu = CurrentUser {
            id: user.id,
            email: user.email,
            username: profile.username,
            is_admin: profile.is_admin,
        };
        *self.current.lock().unwrap() = Some(cu.clone());

        let unread = self.unread_count().await.unwrap_or_else(|e| {
            warn!(?e, "unread count unavailable");
            0
        });
        self.publish(unread);
        Ok(cu)
    }

    fn signed_in(&self) -> Result<CurrentUser, HubError> {
        self.current().ok_or(HubError::NotSignedIn)
    }

    pub async fn load_notifications(&self) -> Result<Vec<Notification>, HubError> {
        let user = self.signed_in()?;
        self.notifications.for_user(user.id, self.notif_limit).await
    }

    pub async fn unread_count(&self) -> Result<usize, HubError> {
        Ok(self.load_notifications().await?.iter().filter(|n| !n.read).count())
    }

    pub async fn mark_read(&self, id: Uuid) -> Result<(), HubError> {
        self.signed_in()?;
        self.notifications.mark_read(id).await?;
        let unread = self.unread_count().await?;
        self.publish(unread);
        Ok(())
    }

    /// Mark everything read, then re-fetch the panel contents.
    pub async fn mark_all_read(&self) -> Result<Vec<Notification>, HubError> {
        let user = self.signed_in()?;
        self.notifications.mark_all_read(user.id).await?;
        let rows = self.load_notifications().await?;
        self.publish(rows.iter().filter(|n| !n.read).count());
        Ok(rows)
    }

    fn publish(&self, unread: usize) {
        let _ = self.session_tx.send(SessionSnapshot { user: self.current(), unread });
    }
}

fn default_profile_for(user: &AuthUser) -> UserProfile {
    let username = user
        .username
        .clone()
        .unwrap_or_else(|| user.email.split('@').next().unwrap_or("trader").to_string());
    UserProfile {
        id: user.id,
        full_name: user.full_name.clone().or_else(|| Some(username.clone())),
        avatar_url: Some(format!("https://ui-avatars.com/api/?name={username}")),
        email: user.email.clone(),
        is_admin: false,
        tier: SubscriptionTier::Free,
        tier_expires_at: None,
        created_at: Utc::now(),
        username,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend_mock::MockBackend;
    use crate::domain::{NewNotification, NotificationKind};

    fn context(backend: &Arc<MockBackend>) -> (Arc<SessionContext>, watch::Receiver<SessionSnapshot>) {
        SessionContext::new(&Backend::from_parts(backend.clone()), 20)
    }

    #[tokio::test]
    async fn sign_up_validation_rejects_before_auth() {
        let backend = MockBackend::new();
        let (session, _rx) = context(&backend);

        assert!(matches!(
            session.sign_up("bad-email", "longenough", "u", None).await,
            Err(HubError::InvalidSignup(_))
        ));
        assert!(matches!(
            session.sign_up("u@x.io", "short", "u", None).await,
            Err(HubError::InvalidSignup(_))
        ));
        assert!(matches!(
            session.sign_up("u@x.io", "longenough", " ", None).await,
            Err(HubError::InvalidSignup(_))
        ));
        assert_eq!(backend.write_calls(), 0);
    }

    #[tokio::test]
    async fn sign_up_creates_the_missing_profile_row() {
        let backend = MockBackend::new();
        let (session, rx) = context(&backend);

        let cu = session.sign_up("new@x.io", "password1", "newbie", None).await.unwrap();
        assert_eq!(cu.username, "newbie");
        assert!(!cu.is_admin);

        let profile = ProfileApi::fetch(backend.as_ref(), cu.id).await.unwrap().unwrap();
        assert_eq!(profile.email, "new@x.io");
        assert_eq!(profile.tier, SubscriptionTier::Free);
        assert!(profile.avatar_url.unwrap().contains("newbie"));

        let snap = rx.borrow();
        assert_eq!(snap.user.as_ref().unwrap().email, "new@x.io");
    }

    #[tokio::test]
    async fn sign_in_joins_the_existing_profile() {
        let backend = MockBackend::new();
        backend.seed_user("admin@x.io", "pw", "admin", true, SubscriptionTier::Vip);
        let (session, _rx) = context(&backend);

        let cu = session.sign_in("admin@x.io", "pw").await.unwrap();
        assert!(cu.is_admin);
        assert_eq!(cu.username, "admin");

        assert!(matches!(
            session.sign_in("admin@x.io", "wrong").await,
            Err(HubError::Auth(_))
        ));
    }

    #[tokio::test]
    async fn unread_badge_follows_mark_all_read() {
        let backend = MockBackend::new();
        let uid = backend.seed_user("u@x.io", "pw", "u", false, SubscriptionTier::Free);
        backend
            .insert_bulk(vec![
                NewNotification {
                    user_id: uid,
                    title: "A".into(),
                    message: "a".into(),
                    kind: NotificationKind::System,
                    related_signal_id: None,
                },
                NewNotification {
                    user_id: uid,
                    title: "B".into(),
                    message: "b".into(),
                    kind: NotificationKind::System,
                    related_signal_id: None,
                },
            ])
            .await
            .unwrap();

        let (session, rx) = context(&backend);
        session.sign_in("u@x.io", "pw").await.unwrap();
        assert_eq!(rx.borrow().unread, 2);

        let rows = session.mark_all_read().await.unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|n| n.read));
        assert_eq!(rx.borrow().unread, 0);
    }

    #[tokio::test]
    async fn notification_reads_require_a_session() {
        let backend = MockBackend::new();
        let (session, _rx) = context(&backend);
        assert!(matches!(session.load_notifications().await, Err(HubError::NotSignedIn)));
        assert!(matches!(session.mark_all_read().await, Err(HubError::NotSignedIn)));
    }

    #[tokio::test]
    async fn sign_out_clears_the_snapshot() {
        let backend = MockBackend::new();
        backend.seed_user("u@x.io", "pw", "u", false, SubscriptionTier::Free);
        let (session, rx) = context(&backend);

        session.sign_in("u@x.io", "pw").await.unwrap();
        assert!(rx.borrow().user.is_some());

        session.sign_out().await.unwrap();
        assert!(rx.borrow().user.is_none());
        assert!(session.current().is_none());
    }

    #[tokio::test]
    async fn restore_picks_up_an_existing_session() {
        let backend = MockBackend::new();
        backend.seed_user("u@x.io", "pw", "u", false, SubscriptionTier::Free);
        let (session, _rx) = context(&backend);
        session.sign_in("u@x.io", "pw").await.unwrap();

        // a second tab against the same auth collaborator
        let (tab2, rx2) = context(&backend);
        let restored = tab2.restore().await.unwrap();
        assert_eq!(restored.unwrap().email, "u@x.io");
        assert!(rx2.borrow().user.is_some());
    }
}
