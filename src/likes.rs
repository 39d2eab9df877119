// ===============================
// src/likes.rs (optimistic like toggle)
// ===============================
//
// Flips the viewer's like locally first, then persists. A failed persist
// leaves the optimistic state in place: the next full reload or like-feed
// event resynchronizes it (bounded staleness, not rollback).
//
use std::sync::Arc;

use tracing::warn;
use uuid::Uuid;

use crate::backend::{Backend, LikeApi};
use crate::error::HubError;
use crate::fanout::NotificationFanout;
use crate::metrics::LIKE_TOGGLES;
use crate::session::SessionContext;
use crate::store::SharedStore;

pub struct LikeCoordinator {
    store: SharedStore,
    likes: Arc<dyn LikeApi>,
    session: Arc<SessionContext>,
    fanout: Arc<NotificationFanout>,
}

impl LikeCoordinator {
    pub fn new(
        backend: &Backend,
        store: SharedStore,
        session: Arc<SessionContext>,
        fanout: Arc<NotificationFanout>,
    ) -> Self {
        Self { store, likes: backend.likes.clone(), session, fanout }
    }

    /// Toggle the current user's like on a signal. Returns the new liked
    /// state. Unauthenticated callers are refused before anything changes.
    pub async fn toggle_like(&self, signal_id: Uuid) -> Result<bool, HubError> {
        let user = self.session.current().ok_or(HubError::NotSignedIn)?;

        let was_liked = {
            let store = self.store.lock().unwrap();
            store
                .liked(signal_id)
                .ok_or_else(|| HubError::NotFound(format!("signal {signal_id}")))?
        };
        let now_liked = !was_liked;

        // optimistic flip before the round trip
        self.store.lock().unwrap().set_liked(signal_id, now_liked);
        LIKE_TOGGLES
            .with_label_values(&[if now_liked { "like" } else { "unlike" }])
            .inc();

        let persisted = if now_liked {
            self.likes.insert(signal_id, user.id).await
        } else {
            self.likes.delete(signal_id, user.id).await
        };
        if let Err(e) = persisted {
            // no rollback: the next resync corrects the view
            warn!(%signal_id, ?e, "like persist failed, local state stays until resync");
            return Err(e);
        }

        if now_liked {
            // creator gets one notification; failure here must not undo
            // the like, but it is surfaced rather than swallowed
            if let Err(e) = self.fanout.like_alert(signal_id, user.id, &user.email).await {
                warn!(%signal_id, ?e, "like notification failed");
            }
        }

        Ok(now_liked)
    }
}
