// ===============================
// src/domain.rs
// ===============================
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::HubError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SignalAction { Call, Put }
impl SignalAction {
    pub fn as_str(&self) -> &'static str { match self { SignalAction::Call => "CALL", SignalAction::Put => "PUT" } }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalStatus { Active, Hit, Miss }
impl SignalStatus {
    pub fn as_str(&self) -> &'static str { match self { SignalStatus::Active => "active", SignalStatus::Hit => "hit", SignalStatus::Miss => "miss" } }
}

/// A published trade call, with the per-viewer like aggregates the
/// persistence layer joins in on read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub id: Uuid,
    pub asset: String,
    pub action: SignalAction,
    pub expiry_minutes: u32,
    pub entry_price: Option<Decimal>,
    pub target_price: Option<Decimal>,
    pub stop_loss: Option<Decimal>,
    pub confidence: u8,
    pub status: SignalStatus,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub like_count: u32,
    #[serde(default)]
    pub liked_by_me: bool,
}

/// Unsaved signal as entered by an admin; validated at the boundary
/// before anything touches persistence.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SignalDraft {
    pub asset: String,
    pub action: Option<SignalAction>,
    pub expiry_minutes: u32,
    pub entry_price: Option<Decimal>,
    pub target_price: Option<Decimal>,
    pub stop_loss: Option<Decimal>,
    pub confidence: u8,
}

impl SignalDraft {
    pub fn validate(&self) -> Result<(), HubError> {
        if self.asset.trim().is_empty() {
            return Err(HubError::InvalidSignal("asset name is required".into()));
        }
        if self.action.is_none() {
            return Err(HubError::InvalidSignal("action is required".into()));
        }
        if self.expiry_minutes == 0 {
            return Err(HubError::InvalidSignal("expiry must be positive".into()));
        }
        if !(1..=5).contains(&self.confidence) {
            return Err(HubError::InvalidSignal(format!("confidence {} outside 1..=5", self.confidence)));
        }
        Ok(())
    }
}

/// At most one like per (signal, user) pair; the pair is the key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Like {
    pub signal_id: Uuid,
    pub user_id: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind { Signal, Like, System, Promo }

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub message: String,
    pub kind: NotificationKind,
    pub read: bool,
    pub related_signal_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// Insert shape for notifications; `read` always starts false.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewNotification {
    pub user_id: Uuid,
    pub title: String,
    pub message: String,
    pub kind: NotificationKind,
    pub related_signal_id: Option<Uuid>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionTier { Free, Vip, VipPlus }
impl SubscriptionTier {
    pub fn is_free(&self) -> bool { matches!(self, SubscriptionTier::Free) }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: Uuid,
    pub username: String,
    pub full_name: Option<String>,
    pub email: String,
    pub is_admin: bool,
    pub tier: SubscriptionTier,
    pub tier_expires_at: Option<DateTime<Utc>>,
    pub avatar_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl UserProfile {
    pub fn subscription_active(&self, now: DateTime<Utc>) -> bool {
        self.tier_expires_at.map(|t| t > now).unwrap_or(false)
    }
}

/// Identity as the auth collaborator reports it, before the profile row
/// is joined in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: Uuid,
    pub email: String,
    pub username: Option<String>,
    pub full_name: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct SignupAttrs {
    pub username: String,
    pub full_name: Option<String>,
}

// ---- Change feed ----

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedTable { Signals, Likes }
impl FeedTable {
    pub fn as_str(&self) -> &'static str { match self { FeedTable::Signals => "signals", FeedTable::Likes => "signal_likes" } }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FeedKind { Insert, Update, Delete }

/// One row-level event off the change feed. Delivery is at-least-once and
/// unordered, so consumers must apply these idempotently. Like events carry
/// no row: the bridge resynchronizes with a full reload instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedEvent {
    pub table: FeedTable,
    pub kind: FeedKind,
    pub signal: Option<Signal>,
}

#[derive(Debug, Clone, Copy)]
pub struct EventMask { pub insert: bool, pub update: bool, pub delete: bool }
impl EventMask {
    pub const ALL: EventMask = EventMask { insert: true, update: true, delete: true };
    pub const UPSERTS: EventMask = EventMask { insert: true, update: true, delete: false };
    pub fn accepts(&self, kind: FeedKind) -> bool {
        match kind { FeedKind::Insert => self.insert, FeedKind::Update => self.update, FeedKind::Delete => self.delete }
    }
}

// ---- Broadcast audiences ----

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Audience { All, Vip, Free, Emails(Vec<String>) }

/// Tier predicate the profile store understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TierFilter { Any, OnlyFree, NotFree }

// ---- Recorder events ----

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    Feed(FeedEvent),
    Fanout { title: String, kind: NotificationKind, recipients: usize },
    Reload { signals: usize },
}
