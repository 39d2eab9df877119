// ===============================
// src/lib.rs
// ===============================
//! Client core of a realtime trading-signal hub: an in-memory signal
//! cache, its pure filtered/sorted projection, optimistic like toggles,
//! role-gated admin operations, audience-resolved notification fan-out
//! and a change-feed bridge — all against swappable backend collaborators
//! (an in-memory mock or a hosted REST backend).

pub mod domain;
pub mod error;
pub mod config;
pub mod metrics;
pub mod recorder;
pub mod backend;          // collaborator contracts (auth/persistence/feed)
pub mod backend_mock;     // in-memory backend (mock mode + tests)
pub mod backend_rest;     // hosted backend over REST + realtime socket
pub mod store;
pub mod view;
pub mod feed;
pub mod likes;
pub mod fanout;
pub mod session;
pub mod admin;

pub use admin::{ActivityEntry, AdminConsole, DashboardStats, UserRow};
pub use backend::Backend;
pub use error::HubError;
pub use fanout::NotificationFanout;
pub use feed::ChangeFeedBridge;
pub use likes::LikeCoordinator;
pub use session::{CurrentUser, SessionContext, SessionSnapshot};
pub use store::{SharedStore, SignalStore};
pub use view::{FilterTag, SortKey, ViewSnapshot};

pub type Result<T> = std::result::Result<T, HubError>;
