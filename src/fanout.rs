// ===============================
// src/fanout.rs (notification fan-out)
// ===============================
//
// Resolves an audience to concrete recipient ids, builds one notification
// row per recipient and performs a single bulk insert. Empty resolution is
// a typed error — the admin path downgrades it to a warning, the like path
// never produces it (a missing creator is a lookup failure instead).
//
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use crate::backend::{Backend, NotificationApi, ProfileApi, SignalApi};
use crate::domain::{Audience, Event, NewNotification, NotificationKind, Signal, TierFilter};
use crate::error::HubError;
use crate::metrics::NOTIFICATIONS_SENT;

pub struct NotificationFanout {
    profiles: Arc<dyn ProfileApi>,
    notifications: Arc<dyn NotificationApi>,
    signals: Arc<dyn SignalApi>,
    rec_tx: Option<mpsc::Sender<Event>>,
}

impl NotificationFanout {
    pub fn new(backend: &Backend, rec_tx: Option<mpsc::Sender<Event>>) -> Self {
        Self {
            profiles: backend.profiles.clone(),
            notifications: backend.notifications.clone(),
            signals: backend.signals.clone(),
            rec_tx,
        }
    }

    async fn resolve(&self, audience: &Audience) -> Result<Vec<Uuid>, HubError> {
        match audience {
            Audience::All => self.profiles.ids_for_tier(TierFilter::Any).await,
            Audience::Vip => self.profiles.ids_for_tier(TierFilter::NotFree).await,
            Audience::Free => self.profiles.ids_for_tier(TierFilter::OnlyFree).await,
            Audience::Emails(list) => self.profiles.ids_for_emails(list).await,
        }
    }

    async fn dispatch(&self, rows: Vec<NewNotification>, kind: NotificationKind, title: &str) -> Result<usize, HubError> {
        let sent = self.notifications.insert_bulk(rows).await?;
        NOTIFICATIONS_SENT
            .with_label_values(&[kind_label(kind)])
            .inc_by(sent as u64);
        if let Some(tx) = &self.rec_tx {
            let _ = tx.try_send(Event::Fanout { title: title.to_string(), kind, recipients: sent });
        }
        Ok(sent)
    }

    /// Admin broadcast to a resolved audience. One bulk insert; partial
    /// failure comes back as one aggregate persistence error.
    pub async fn broadcast(
        &self,
        audience: &Audience,
        title: &str,
        message: &str,
        kind: NotificationKind,
    ) -> Result<usize, HubError> {
        let ids = self.resolve(audience).await?;
        if ids.is_empty() {
            return Err(HubError::EmptyAudience);
        }

        let rows: Vec<NewNotification> = ids
            .into_iter()
            .map(|user_id| NewNotification {
                user_id,
                title: title.to_string(),
                message: message.to_string(),
                kind,
                related_signal_id: None,
            })
            .collect();

        let sent = self.dispatch(rows, kind, title).await?;
        debug!(sent, %title, "broadcast dispatched");
        Ok(sent)
    }

    /// Alert every profile except the creator about a fresh signal.
    /// Nobody else registered yet is not an error here.
    pub async fn signal_alert(&self, signal: &Signal) -> Result<usize, HubError> {
        let ids = self.resolve(&Audience::All).await?;
        let rows: Vec<NewNotification> = ids
            .into_iter()
            .filter(|id| *id != signal.created_by)
            .map(|user_id| NewNotification {
                user_id,
                title: "New Signal Alert".to_string(),
                message: format!(
                    "New {} signal for {} ({}min)",
                    signal.action.as_str(),
                    signal.asset,
                    signal.expiry_minutes
                ),
                kind: NotificationKind::Signal,
                related_signal_id: Some(signal.id),
            })
            .collect();

        if rows.is_empty() {
            return Ok(0);
        }
        self.dispatch(rows, NotificationKind::Signal, "New Signal Alert").await
    }

    /// One notification to the signal's creator when someone likes it.
    /// Self-likes never notify. Returns whether a row was written.
    pub async fn like_alert(
        &self,
        signal_id: Uuid,
        actor_id: Uuid,
        actor_label: &str,
    ) -> Result<bool, HubError> {
        let signal = self.signals.fetch(signal_id).await?;
        if signal.created_by == actor_id {
            return Ok(false);
        }

        let row = NewNotification {
            user_id: signal.created_by,
            title: "New Like".to_string(),
            message: format!("{} liked your {} signal", actor_label, signal.asset),
            kind: NotificationKind::Like,
            related_signal_id: Some(signal_id),
        };
        self.dispatch(vec![row], NotificationKind::Like, "New Like").await?;
        Ok(true)
    }
}

fn kind_label(kind: NotificationKind) -> &'static str {
    match kind {
        NotificationKind::Signal => "signal",
        NotificationKind::Like => "like",
        NotificationKind::System => "system",
        NotificationKind::Promo => "promo",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend_mock::MockBackend;
    use crate::domain::{SignalDraft, SignalAction, SubscriptionTier};

    fn fanout(backend: &Arc<MockBackend>) -> NotificationFanout {
        NotificationFanout::new(&Backend::from_parts(backend.clone()), None)
    }

    fn draft(asset: &str) -> SignalDraft {
        SignalDraft {
            asset: asset.to_string(),
            action: Some(SignalAction::Call),
            expiry_minutes: 5,
            confidence: 4,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn vip_audience_is_exactly_non_free_tiers() {
        let backend = MockBackend::new();
        let free = backend.seed_user("a@x.io", "pw", "a", false, SubscriptionTier::Free);
        let vip = backend.seed_user("b@x.io", "pw", "b", false, SubscriptionTier::Vip);
        let vip_plus = backend.seed_user("c@x.io", "pw", "c", false, SubscriptionTier::VipPlus);

        let f = fanout(&backend);
        let sent = f
            .broadcast(&Audience::Vip, "Maintenance", "tonight", NotificationKind::System)
            .await
            .unwrap();
        assert_eq!(sent, 2);

        assert_eq!(backend.for_user(vip, 10).await.unwrap().len(), 1);
        assert_eq!(backend.for_user(vip_plus, 10).await.unwrap().len(), 1);
        assert!(backend.for_user(free, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn free_audience_is_exactly_free_tier() {
        let backend = MockBackend::new();
        let free = backend.seed_user("a@x.io", "pw", "a", false, SubscriptionTier::Free);
        let vip = backend.seed_user("b@x.io", "pw", "b", false, SubscriptionTier::Vip);

        let f = fanout(&backend);
        let sent = f
            .broadcast(&Audience::Free, "Upgrade", "go vip", NotificationKind::Promo)
            .await
            .unwrap();
        assert_eq!(sent, 1);
        assert_eq!(backend.for_user(free, 10).await.unwrap().len(), 1);
        assert!(backend.for_user(vip, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn explicit_emails_resolve_to_matching_profiles_only() {
        let backend = MockBackend::new();
        let a = backend.seed_user("a@x.io", "pw", "a", false, SubscriptionTier::Free);
        backend.seed_user("b@x.io", "pw", "b", false, SubscriptionTier::Free);

        let f = fanout(&backend);
        let audience = Audience::Emails(vec!["A@x.io".into(), "nobody@x.io".into()]);
        let sent = f
            .broadcast(&audience, "Hello", "hi", NotificationKind::System)
            .await
            .unwrap();
        assert_eq!(sent, 1);
        assert_eq!(backend.for_user(a, 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn empty_audience_is_a_typed_error_before_any_insert() {
        let backend = MockBackend::new();
        let f = fanout(&backend);
        let before = backend.write_calls();

        let err = f
            .broadcast(&Audience::Vip, "Hello", "hi", NotificationKind::System)
            .await
            .unwrap_err();
        assert!(err.is_empty_audience());
        assert_eq!(backend.write_calls(), before);
    }

    #[tokio::test]
    async fn signal_alert_reaches_everyone_except_the_creator() {
        let backend = MockBackend::new();
        let admin = backend.seed_user("admin@x.io", "pw", "admin", true, SubscriptionTier::Vip);
        let u1 = backend.seed_user("u1@x.io", "pw", "u1", false, SubscriptionTier::Free);
        let u2 = backend.seed_user("u2@x.io", "pw", "u2", false, SubscriptionTier::Vip);

        let signal = SignalApi::insert(backend.as_ref(), &draft("EUR/USD"), admin).await.unwrap();
        let f = fanout(&backend);
        let sent = f.signal_alert(&signal).await.unwrap();
        assert_eq!(sent, 2);

        let row = &backend.for_user(u1, 10).await.unwrap()[0];
        assert_eq!(row.kind, NotificationKind::Signal);
        assert!(!row.read);
        assert!(row.message.contains("CALL signal for EUR/USD (5min)"));
        assert_eq!(row.related_signal_id, Some(signal.id));

        assert_eq!(backend.for_user(u2, 10).await.unwrap().len(), 1);
        assert!(backend.for_user(admin, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn like_alert_targets_the_creator_and_suppresses_self_likes() {
        let backend = MockBackend::new();
        let admin = backend.seed_user("admin@x.io", "pw", "admin", true, SubscriptionTier::Vip);
        let fan = backend.seed_user("fan@x.io", "pw", "fan", false, SubscriptionTier::Free);

        let signal = SignalApi::insert(backend.as_ref(), &draft("GBP/USD"), admin).await.unwrap();
        let f = fanout(&backend);

        assert!(f.like_alert(signal.id, fan, "fan@x.io").await.unwrap());
        let rows = backend.for_user(admin, 10).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert!(rows[0].message.contains("fan@x.io liked your GBP/USD signal"));

        // creator liking their own signal: nothing written
        assert!(!f.like_alert(signal.id, admin, "admin@x.io").await.unwrap());
        assert_eq!(backend.for_user(admin, 10).await.unwrap().len(), 1);
    }
}
