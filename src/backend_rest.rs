// ===============================
// src/backend_rest.rs (managed backend adapter)
// ===============================
//
// Talks to a hosted PostgREST/GoTrue-style backend:
// - row CRUD over REST (apikey + bearer headers, eq./neq./in. filters,
//   order/limit params, bulk insert arrays, exact counts)
// - auth over the token/signup/logout endpoints
// - realtime change feed over a phoenix-style websocket, one socket per
//   table, reconnecting with exponential backoff + jitter
//
// Rows come back as loosely-shaped backend records; everything is
// deserialized into typed DTOs and coerced into domain types here at the
// boundary.
//
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::{SinkExt, StreamExt};
use rand::Rng;
use reqwest::StatusCode;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::broadcast;
use tokio::time::sleep;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{error, info, warn};
use url::Url;
use uuid::Uuid;

use crate::backend::{AuthApi, ChangeFeedApi, LikeApi, NotificationApi, ProfileApi, SignalApi};
use crate::domain::{
    AuthUser, FeedEvent, FeedKind, FeedTable, NewNotification, Notification, NotificationKind,
    Signal, SignalAction, SignalDraft, SignalStatus, SignupAttrs, SubscriptionTier, TierFilter,
    UserProfile,
};
use crate::error::HubError;
use crate::metrics::{FEED_WS_CONNECTED, FEED_WS_RECONNECTS};

pub struct RestBackend {
    http: reqwest::Client,
    base: String,
    key: String,
    access_token: Mutex<Option<String>>,
    session: Mutex<Option<AuthUser>>,
    signals_tx: broadcast::Sender<FeedEvent>,
    likes_tx: broadcast::Sender<FeedEvent>,
    realtime_started: AtomicBool,
}

// ---- wire row shapes (backend column names, not ours) ----

#[derive(Debug, Deserialize)]
struct SignalRow {
    id: Uuid,
    asset_name: String,
    action: String,
    expiry_time: u32,
    entry_price: Option<Decimal>,
    target_price: Option<Decimal>,
    stop_loss: Option<Decimal>,
    confidence_level: u8,
    status: String,
    created_by: Uuid,
    created_at: DateTime<Utc>,
}

impl SignalRow {
    fn coerce(self) -> Option<Signal> {
        let action = match self.action.to_ascii_uppercase().as_str() {
            "CALL" => SignalAction::Call,
            "PUT" => SignalAction::Put,
            other => {
                warn!(%other, id = %self.id, "unknown signal action, row dropped");
                return None;
            }
        };
        let status = match self.status.to_ascii_lowercase().as_str() {
            "active" => SignalStatus::Active,
            "hit" => SignalStatus::Hit,
            "miss" => SignalStatus::Miss,
            other => {
                warn!(%other, id = %self.id, "unknown signal status, coerced to active");
                SignalStatus::Active
            }
        };
        Some(Signal {
            id: self.id,
            asset: self.asset_name,
            action,
            expiry_minutes: self.expiry_time,
            entry_price: self.entry_price,
            target_price: self.target_price,
            stop_loss: self.stop_loss,
            confidence: self.confidence_level.min(5),
            status,
            created_by: self.created_by,
            created_at: self.created_at,
            like_count: 0,
            liked_by_me: false,
        })
    }
}

#[derive(Debug, Deserialize)]
struct LikeRow {
    signal_id: Uuid,
    user_id: Uuid,
}

#[derive(Debug, Deserialize)]
struct ProfileRow {
    id: Uuid,
    username: String,
    full_name: Option<String>,
    email: String,
    #[serde(default)]
    is_admin: bool,
    #[serde(default)]
    subscription_tier: Option<String>,
    subscription_expiry: Option<DateTime<Utc>>,
    avatar_url: Option<String>,
    created_at: DateTime<Utc>,
}

impl ProfileRow {
    fn coerce(self) -> UserProfile {
        let tier = match self.subscription_tier.as_deref() {
            None | Some("free") => SubscriptionTier::Free,
            Some("vip_plus") => SubscriptionTier::VipPlus,
            // any other paid label still counts as vip
            Some(_) => SubscriptionTier::Vip,
        };
        UserProfile {
            id: self.id,
            username: self.username,
            full_name: self.full_name,
            email: self.email,
            is_admin: self.is_admin,
            tier,
            tier_expires_at: self.subscription_expiry,
            avatar_url: self.avatar_url,
            created_at: self.created_at,
        }
    }
}

#[derive(Debug, Deserialize)]
struct NotificationRow {
    id: Uuid,
    user_id: Uuid,
    title: String,
    message: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    read: bool,
    related_signal_id: Option<Uuid>,
    created_at: DateTime<Utc>,
}

impl NotificationRow {
    fn coerce(self) -> Notification {
        let kind = match self.kind.as_str() {
            "signal" => NotificationKind::Signal,
            "like" => NotificationKind::Like,
            "promo" => NotificationKind::Promo,
            _ => NotificationKind::System,
        };
        Notification {
            id: self.id,
            user_id: self.user_id,
            title: self.title,
            message: self.message,
            kind,
            read: self.read,
            related_signal_id: self.related_signal_id,
            created_at: self.created_at,
        }
    }
}

#[derive(Debug, Deserialize)]
struct AuthUserBody {
    id: Uuid,
    email: String,
    #[serde(default)]
    user_metadata: serde_json::Value,
}

impl AuthUserBody {
    fn coerce(self) -> AuthUser {
        let meta_str = |key: &str| {
            self.user_metadata
                .get(key)
                .and_then(|v| v.as_str())
                .map(|s| s.to_string())
        };
        AuthUser {
            id: self.id,
            email: self.email,
            username: meta_str("username"),
            full_name: meta_str("full_name"),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenBody {
    access_token: String,
    user: AuthUserBody,
}

fn kind_column(kind: NotificationKind) -> &'static str {
    match kind {
        NotificationKind::Signal => "signal",
        NotificationKind::Like => "like",
        NotificationKind::System => "system",
        NotificationKind::Promo => "promo",
    }
}

impl RestBackend {
    pub fn new(base: &str, key: &str) -> Arc<Self> {
        let (signals_tx, _) = broadcast::channel(256);
        let (likes_tx, _) = broadcast::channel(256);
        Arc::new(Self {
            http: reqwest::Client::new(),
            base: base.trim_end_matches('/').to_string(),
            key: key.to_string(),
            access_token: Mutex::new(None),
            session: Mutex::new(None),
            signals_tx,
            likes_tx,
            realtime_started: AtomicBool::new(false),
        })
    }

    /// Spawn the realtime socket tasks, once. Repeated calls are refused
    /// so re-initialization cannot duplicate subscriptions.
    pub fn start_realtime(self: &Arc<Self>) -> bool {
        if self.realtime_started.swap(true, Ordering::SeqCst) {
            warn!("realtime already started, ignoring");
            return false;
        }
        for table in [FeedTable::Signals, FeedTable::Likes] {
            let me = Arc::clone(self);
            tokio::spawn(async move { me.realtime_loop(table).await });
        }
        true
    }

    fn bearer(&self) -> String {
        self.access_token
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_else(|| self.key.clone())
    }

    fn rest_url(&self, table: &str, query: &str) -> String {
        format!("{}/rest/v1/{}?{}", self.base, table, query)
    }

    fn table_request(&self, method: reqwest::Method, table: &str, query: &str) -> reqwest::RequestBuilder {
        self.http
            .request(method, self.rest_url(table, query))
            .header("apikey", &self.key)
            .bearer_auth(self.bearer())
    }

    async fn check(resp: reqwest::Response) -> Result<reqwest::Response, HubError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        Err(HubError::Persistence(format!("{status}: {body}")))
    }

    async fn rows<T: serde::de::DeserializeOwned>(
        &self,
        req: reqwest::RequestBuilder,
    ) -> Result<Vec<T>, HubError> {
        let resp = Self::check(req.send().await?).await?;
        let body = resp.text().await?;
        Ok(serde_json::from_str(&body)?)
    }

    async fn exact_count(&self, table: &str) -> Result<usize, HubError> {
        let resp = self
            .table_request(reqwest::Method::GET, table, "select=id")
            .header("Prefer", "count=exact")
            .header("Range", "0-0")
            .send()
            .await?;
        if resp.status() != StatusCode::PARTIAL_CONTENT && !resp.status().is_success() {
            return Err(HubError::Persistence(format!("{}: count failed", resp.status())));
        }
        // content-range: 0-0/42
        let total = resp
            .headers()
            .get("content-range")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.rsplit('/').next())
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(0);
        Ok(total)
    }

    fn emit(&self, ev: FeedEvent) {
        let tx = match ev.table {
            FeedTable::Signals => &self.signals_tx,
            FeedTable::Likes => &self.likes_tx,
        };
        let _ = tx.send(ev);
    }

    async fn realtime_loop(self: Arc<Self>, table: FeedTable) {
        let ws_base = self.base.replacen("http", "ws", 1);
        let ws_url = format!("{}/realtime/v1/websocket?apikey={}&vsn=1.0.0", ws_base, self.key);
        let topic = format!("realtime:public:{}", table.as_str());

        if let Err(e) = Url::parse(&ws_url) {
            error!(?e, %ws_url, "bad realtime url");
            return;
        }

        let mut attempt: u32 = 0;
        loop {
            info!(%topic, "connecting realtime socket");
            match self.realtime_session(&ws_url, &topic, table).await {
                Ok(()) => {
                    // stream ended after a live session
                    attempt = 0;
                    info!(%topic, "realtime disconnected, will reconnect…");
                }
                Err(e) => error!(?e, %topic, "realtime session failed"),
            }
            FEED_WS_CONNECTED.with_label_values(&[table.as_str()]).set(0);

            // Exponential backoff + jitter
            FEED_WS_RECONNECTS.with_label_values(&[table.as_str()]).inc();
            attempt = attempt.saturating_add(1);
            let shift = attempt.min(6);
            let factor = 1u64 << shift;                  // 2,4,...,64
            let base_ms = 500u64.saturating_mul(factor); // 1s..32s
            let jitter = rand::thread_rng().gen_range(0..=250);
            sleep(Duration::from_millis(base_ms + jitter)).await;
        }
    }

    /// One websocket session: join the table topic, forward row events,
    /// answer heartbeats. Returns Ok on a clean end of stream.
    async fn realtime_session(&self, ws_url: &str, topic: &str, table: FeedTable) -> Result<(), HubError> {
        let (mut ws, _resp) = connect_async(ws_url).await?;
        FEED_WS_CONNECTED.with_label_values(&[table.as_str()]).set(1);

        let join = json!({
            "topic": topic,
            "event": "phx_join",
            "payload": {},
            "ref": "1",
        });
        ws.send(Message::Text(join.to_string())).await?;

        let mut heartbeat = tokio::time::interval(Duration::from_secs(30));
        loop {
            tokio::select! {
                frame = ws.next() => {
                    match frame {
                        Some(Ok(m)) if m.is_text() => {
                            let txt = m.into_text().unwrap_or_default();
                            if let Some(ev) = decode_realtime(table, &txt) {
                                self.emit(ev);
                            }
                        }
                        Some(Ok(_)) => {
                            // ignore non-text frames
                        }
                        Some(Err(e)) => return Err(e.into()),
                        None => return Ok(()),
                    }
                }
                _ = heartbeat.tick() => {
                    let hb = json!({
                        "topic": "phoenix",
                        "event": "heartbeat",
                        "payload": {},
                        "ref": "hb",
                    });
                    ws.send(Message::Text(hb.to_string())).await?;
                }
            }
        }
    }
}

/// Decode one phoenix frame into a feed event. Unknown shapes are noise,
/// not errors.
fn decode_realtime(table: FeedTable, txt: &str) -> Option<FeedEvent> {
    let v: serde_json::Value = serde_json::from_str(txt).ok()?;
    let kind = match v.get("event").and_then(|e| e.as_str())? {
        "INSERT" => FeedKind::Insert,
        "UPDATE" => FeedKind::Update,
        "DELETE" => FeedKind::Delete,
        _ => return None,
    };
    let signal = match table {
        FeedTable::Signals => v
            .get("payload")
            .and_then(|p| p.get("record"))
            .and_then(|r| serde_json::from_value::<SignalRow>(r.clone()).ok())
            .and_then(SignalRow::coerce),
        FeedTable::Likes => None,
    };
    Some(FeedEvent { table, kind, signal })
}

#[async_trait]
impl AuthApi for RestBackend {
    async fn session(&self) -> Result<Option<AuthUser>, HubError> {
        // no offline token storage: a fresh process starts signed out
        Ok(self.session.lock().unwrap().clone())
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthUser, HubError> {
        let url = format!("{}/auth/v1/token?grant_type=password", self.base);
        let resp = self
            .http
            .post(url)
            .header("apikey", &self.key)
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await?;

        if !resp.status().is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(HubError::Auth(auth_message(&body)));
        }

        let token: TokenBody = resp.json().await?;
        *self.access_token.lock().unwrap() = Some(token.access_token);
        let user = token.user.coerce();
        *self.session.lock().unwrap() = Some(user.clone());
        Ok(user)
    }

    async fn sign_up(&self, email: &str, password: &str, attrs: SignupAttrs) -> Result<AuthUser, HubError> {
        let url = format!("{}/auth/v1/signup", self.base);
        let resp = self
            .http
            .post(url)
            .header("apikey", &self.key)
            .json(&json!({
                "email": email,
                "password": password,
                "data": { "username": attrs.username, "full_name": attrs.full_name },
            }))
            .send()
            .await?;

        if !resp.status().is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(HubError::Auth(auth_message(&body)));
        }

        let token: TokenBody = resp.json().await?;
        *self.access_token.lock().unwrap() = Some(token.access_token);
        let user = token.user.coerce();
        *self.session.lock().unwrap() = Some(user.clone());
        Ok(user)
    }

    async fn sign_out(&self) -> Result<(), HubError> {
        let url = format!("{}/auth/v1/logout", self.base);
        let resp = self
            .http
            .post(url)
            .header("apikey", &self.key)
            .bearer_auth(self.bearer())
            .send()
            .await?;
        // a dead token is as signed-out as it gets
        if !resp.status().is_success() {
            warn!(status = %resp.status(), "logout returned non-success");
        }
        *self.access_token.lock().unwrap() = None;
        *self.session.lock().unwrap() = None;
        Ok(())
    }
}

fn auth_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error_description")
                .or_else(|| v.get("msg"))
                .or_else(|| v.get("message"))
                .and_then(|m| m.as_str())
                .map(|s| s.to_string())
        })
        .unwrap_or_else(|| "authentication failed".to_string())
}

#[async_trait]
impl SignalApi for RestBackend {
    async fn load_all(&self, viewer: Option<Uuid>) -> Result<Vec<Signal>, HubError> {
        let rows: Vec<SignalRow> = self
            .rows(self.table_request(
                reqwest::Method::GET,
                "signals",
                "select=*&order=created_at.desc",
            ))
            .await?;
        let likes: Vec<LikeRow> = self
            .rows(self.table_request(
                reqwest::Method::GET,
                "signal_likes",
                "select=signal_id,user_id",
            ))
            .await?;

        Ok(rows
            .into_iter()
            .filter_map(SignalRow::coerce)
            .map(|mut s| {
                s.like_count = likes.iter().filter(|l| l.signal_id == s.id).count() as u32;
                s.liked_by_me = viewer
                    .map(|v| likes.iter().any(|l| l.signal_id == s.id && l.user_id == v))
                    .unwrap_or(false);
                s
            })
            .collect())
    }

    async fn fetch(&self, id: Uuid) -> Result<Signal, HubError> {
        let rows: Vec<SignalRow> = self
            .rows(self.table_request(
                reqwest::Method::GET,
                "signals",
                &format!("select=*&id=eq.{id}&limit=1"),
            ))
            .await?;
        rows.into_iter()
            .next()
            .and_then(SignalRow::coerce)
            .ok_or_else(|| HubError::NotFound(format!("signal {id}")))
    }

    async fn insert(&self, draft: &SignalDraft, created_by: Uuid) -> Result<Signal, HubError> {
        let action = draft
            .action
            .ok_or_else(|| HubError::InvalidSignal("action is required".into()))?;
        let body = json!({
            "asset_name": draft.asset,
            "action": action.as_str(),
            "expiry_time": draft.expiry_minutes,
            "entry_price": draft.entry_price,
            "target_price": draft.target_price,
            "stop_loss": draft.stop_loss,
            "confidence_level": draft.confidence,
            "status": "active",
            "created_by": created_by,
        });
        let rows: Vec<SignalRow> = self
            .rows(
                self.table_request(reqwest::Method::POST, "signals", "select=*")
                    .header("Prefer", "return=representation")
                    .json(&body),
            )
            .await?;
        rows.into_iter()
            .next()
            .and_then(SignalRow::coerce)
            .ok_or_else(|| HubError::Persistence("insert returned no row".into()))
    }

    async fn update_status(&self, id: Uuid, status: SignalStatus) -> Result<(), HubError> {
        let req = self
            .table_request(reqwest::Method::PATCH, "signals", &format!("id=eq.{id}"))
            .json(&json!({ "status": status.as_str() }));
        Self::check(req.send().await?).await?;
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<(), HubError> {
        let req = self.table_request(reqwest::Method::DELETE, "signals", &format!("id=eq.{id}"));
        Self::check(req.send().await?).await?;
        Ok(())
    }

    async fn count(&self) -> Result<usize, HubError> {
        self.exact_count("signals").await
    }
}

#[async_trait]
impl ProfileApi for RestBackend {
    async fn fetch(&self, id: Uuid) -> Result<Option<UserProfile>, HubError> {
        let rows: Vec<ProfileRow> = self
            .rows(self.table_request(
                reqwest::Method::GET,
                "profiles",
                &format!("select=*&id=eq.{id}&limit=1"),
            ))
            .await?;
        Ok(rows.into_iter().next().map(ProfileRow::coerce))
    }

    async fn insert(&self, profile: &UserProfile) -> Result<(), HubError> {
        let body = json!({
            "id": profile.id,
            "username": profile.username,
            "full_name": profile.full_name,
            "email": profile.email,
            "is_admin": profile.is_admin,
            "subscription_tier": match profile.tier {
                SubscriptionTier::Free => "free",
                SubscriptionTier::Vip => "vip",
                SubscriptionTier::VipPlus => "vip_plus",
            },
            "subscription_expiry": profile.tier_expires_at,
            "avatar_url": profile.avatar_url,
        });
        let req = self
            .table_request(reqwest::Method::POST, "profiles", "")
            .json(&body);
        Self::check(req.send().await?).await?;
        Ok(())
    }

    async fn list_all(&self) -> Result<Vec<UserProfile>, HubError> {
        let rows: Vec<ProfileRow> = self
            .rows(self.table_request(
                reqwest::Method::GET,
                "profiles",
                "select=*&order=created_at.desc",
            ))
            .await?;
        Ok(rows.into_iter().map(ProfileRow::coerce).collect())
    }

    async fn ids_for_tier(&self, filter: TierFilter) -> Result<Vec<Uuid>, HubError> {
        #[derive(Deserialize)]
        struct IdRow { id: Uuid }

        let query = match filter {
            TierFilter::Any => "select=id".to_string(),
            TierFilter::OnlyFree => "select=id&subscription_tier=eq.free".to_string(),
            TierFilter::NotFree => "select=id&subscription_tier=neq.free".to_string(),
        };
        let rows: Vec<IdRow> = self
            .rows(self.table_request(reqwest::Method::GET, "profiles", &query))
            .await?;
        Ok(rows.into_iter().map(|r| r.id).collect())
    }

    async fn ids_for_emails(&self, emails: &[String]) -> Result<Vec<Uuid>, HubError> {
        #[derive(Deserialize)]
        struct IdRow { id: Uuid }

        if emails.is_empty() {
            return Ok(Vec::new());
        }
        let list = emails
            .iter()
            .map(|e| format!("\"{}\"", e.trim()))
            .collect::<Vec<_>>()
            .join(",");
        let rows: Vec<IdRow> = self
            .rows(self.table_request(
                reqwest::Method::GET,
                "profiles",
                &format!("select=id&email=in.({list})"),
            ))
            .await?;
        Ok(rows.into_iter().map(|r| r.id).collect())
    }

    async fn set_admin(&self, id: Uuid, is_admin: bool) -> Result<(), HubError> {
        let req = self
            .table_request(reqwest::Method::PATCH, "profiles", &format!("id=eq.{id}"))
            .json(&json!({ "is_admin": is_admin }));
        Self::check(req.send().await?).await?;
        Ok(())
    }

    async fn count(&self) -> Result<usize, HubError> {
        self.exact_count("profiles").await
    }
}

#[async_trait]
impl LikeApi for RestBackend {
    async fn insert(&self, signal_id: Uuid, user_id: Uuid) -> Result<(), HubError> {
        let req = self
            .table_request(reqwest::Method::POST, "signal_likes", "")
            .json(&json!({ "signal_id": signal_id, "user_id": user_id }));
        Self::check(req.send().await?).await?;
        Ok(())
    }

    async fn delete(&self, signal_id: Uuid, user_id: Uuid) -> Result<(), HubError> {
        let req = self.table_request(
            reqwest::Method::DELETE,
            "signal_likes",
            &format!("signal_id=eq.{signal_id}&user_id=eq.{user_id}"),
        );
        Self::check(req.send().await?).await?;
        Ok(())
    }

    async fn count(&self) -> Result<usize, HubError> {
        self.exact_count("signal_likes").await
    }
}

#[async_trait]
impl NotificationApi for RestBackend {
    async fn insert_bulk(&self, rows: Vec<NewNotification>) -> Result<usize, HubError> {
        if rows.is_empty() {
            return Ok(0);
        }
        let n = rows.len();
        let body: Vec<serde_json::Value> = rows
            .into_iter()
            .map(|r| {
                json!({
                    "user_id": r.user_id,
                    "title": r.title,
                    "message": r.message,
                    "type": kind_column(r.kind),
                    "read": false,
                    "related_signal_id": r.related_signal_id,
                })
            })
            .collect();
        let req = self
            .table_request(reqwest::Method::POST, "notifications", "")
            .json(&body);
        Self::check(req.send().await?).await?;
        Ok(n)
    }

    async fn for_user(&self, user_id: Uuid, limit: usize) -> Result<Vec<Notification>, HubError> {
        let rows: Vec<NotificationRow> = self
            .rows(self.table_request(
                reqwest::Method::GET,
                "notifications",
                &format!("select=*&user_id=eq.{user_id}&order=created_at.desc&limit={limit}"),
            ))
            .await?;
        Ok(rows.into_iter().map(NotificationRow::coerce).collect())
    }

    async fn mark_read(&self, id: Uuid) -> Result<(), HubError> {
        let req = self
            .table_request(reqwest::Method::PATCH, "notifications", &format!("id=eq.{id}"))
            .json(&json!({ "read": true }));
        Self::check(req.send().await?).await?;
        Ok(())
    }

    async fn mark_all_read(&self, user_id: Uuid) -> Result<(), HubError> {
        let req = self
            .table_request(
                reqwest::Method::PATCH,
                "notifications",
                &format!("user_id=eq.{user_id}&read=eq.false"),
            )
            .json(&json!({ "read": true }));
        Self::check(req.send().await?).await?;
        Ok(())
    }

    async fn recent(&self, limit: usize) -> Result<Vec<Notification>, HubError> {
        let rows: Vec<NotificationRow> = self
            .rows(self.table_request(
                reqwest::Method::GET,
                "notifications",
                &format!("select=*&order=created_at.desc&limit={limit}"),
            ))
            .await?;
        Ok(rows.into_iter().map(NotificationRow::coerce).collect())
    }
}

impl ChangeFeedApi for RestBackend {
    fn subscribe(&self, table: FeedTable) -> broadcast::Receiver<FeedEvent> {
        match table {
            FeedTable::Signals => self.signals_tx.subscribe(),
            FeedTable::Likes => self.likes_tx.subscribe(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn realtime_insert_decodes_into_a_signal_event() {
        let txt = r#"{
            "topic": "realtime:public:signals",
            "event": "INSERT",
            "payload": {
                "record": {
                    "id": "7f4df6aa-4f41-4f2b-a9f5-0d2f8c2f3a11",
                    "asset_name": "EUR/USD",
                    "action": "CALL",
                    "expiry_time": 5,
                    "entry_price": "1.07321",
                    "target_price": null,
                    "stop_loss": null,
                    "confidence_level": 4,
                    "status": "active",
                    "created_by": "30b9b2c5-9c6f-4f0a-9c11-2e9c2f6a1d22",
                    "created_at": "2024-06-01T12:00:00Z"
                }
            }
        }"#;

        let ev = decode_realtime(FeedTable::Signals, txt).unwrap();
        assert_eq!(ev.kind, FeedKind::Insert);
        let s = ev.signal.unwrap();
        assert_eq!(s.asset, "EUR/USD");
        assert_eq!(s.action, SignalAction::Call);
        assert_eq!(s.confidence, 4);
        assert_eq!(s.entry_price, Some(dec!(1.07321)));
    }

    #[test]
    fn realtime_like_events_carry_no_row() {
        let txt = r#"{"topic":"realtime:public:signal_likes","event":"DELETE","payload":{}}"#;
        let ev = decode_realtime(FeedTable::Likes, txt).unwrap();
        assert_eq!(ev.kind, FeedKind::Delete);
        assert!(ev.signal.is_none());
    }

    #[test]
    fn phoenix_control_frames_are_ignored() {
        let txt = r#"{"topic":"phoenix","event":"phx_reply","payload":{"status":"ok"},"ref":"1"}"#;
        assert!(decode_realtime(FeedTable::Signals, txt).is_none());
    }

    #[test]
    fn malformed_rows_are_dropped_not_fatal() {
        let txt = r#"{"topic":"t","event":"INSERT","payload":{"record":{"id":"nope"}}}"#;
        let ev = decode_realtime(FeedTable::Signals, txt).unwrap();
        assert!(ev.signal.is_none());
    }

    #[test]
    fn unknown_status_coerces_to_active_but_unknown_action_drops() {
        let row = |action: &str, status: &str| SignalRow {
            id: Uuid::new_v4(),
            asset_name: "X".into(),
            action: action.into(),
            expiry_time: 5,
            entry_price: None,
            target_price: None,
            stop_loss: None,
            confidence_level: 9,
            status: status.into(),
            created_by: Uuid::new_v4(),
            created_at: Utc::now(),
        };

        let s = row("call", "resolved").coerce().unwrap();
        assert_eq!(s.status, SignalStatus::Active);
        assert_eq!(s.confidence, 5); // clamped at ingress

        assert!(row("STRADDLE", "active").coerce().is_none());
    }
}
