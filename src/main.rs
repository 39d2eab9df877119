// ===============================
// src/main.rs
// ===============================
/*
=============================================================================
Project : signal_hub_rust — realtime trading-signal hub client in Rust

Summary : Keeps an in-memory signal cache, its filtered/sorted projection
          and the unread-notification badge consistent under local actions
          (likes, admin CRUD, broadcasts) and realtime change-feed events
          from a hosted backend (mock or REST mode), exposes Prometheus
          metrics, and records applied events as JSONL.
=============================================================================
*/
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::{select, sync::mpsc, time::sleep};
use tracing::{info, warn};

use signal_hub_rust::admin::AdminConsole;
use signal_hub_rust::backend::Backend;
use signal_hub_rust::backend_mock::MockBackend;
use signal_hub_rust::backend_rest::RestBackend;
use signal_hub_rust::config::{self, BackendMode};
use signal_hub_rust::domain::{
    Audience, Event, NotificationKind, SignalAction, SignalDraft, SignalStatus, SubscriptionTier,
};
use signal_hub_rust::fanout::NotificationFanout;
use signal_hub_rust::feed::ChangeFeedBridge;
use signal_hub_rust::likes::LikeCoordinator;
use signal_hub_rust::session::SessionContext;
use signal_hub_rust::store::SignalStore;
use signal_hub_rust::view::{FilterTag, SortKey};
use signal_hub_rust::{metrics, recorder};

#[tokio::main]
async fn main() {
    // ---- Logging ----
    tracing_subscriber::fmt().with_env_filter("info").init();

    // ---- Load config ----
    let args = config::load();

    // ---- Metrics ----
    metrics::init();
    tokio::spawn(metrics::serve_metrics(args.metrics_port));
    metrics::CONFIG_BACKEND_MODE
        .with_label_values(&[args.backend_mode.as_str()])
        .set(1);

    let filter = FilterTag::parse_one(&args.default_filter).unwrap_or(FilterTag::All);
    let sort = SortKey::parse_one(&args.default_sort).unwrap_or(SortKey::Newest);

    info!(
        mode = %args.backend_mode.as_str(),
        url = %args.backend_url,
        ?filter,
        ?sort,
        notif_limit = args.notif_limit,
        "startup config"
    );

    // ---- Recorder (optional) ----
    let (rec_tx, rec_rx) = mpsc::channel::<Event>(8192);
    let rec_tx = if let Some(path) = args.record_file.clone() {
        tokio::spawn(recorder::run(rec_rx, path));
        Some(rec_tx)
    } else {
        None
    };

    // ---- Backend ----
    let mock = match args.backend_mode {
        BackendMode::Mock => Some(MockBackend::new()),
        BackendMode::Rest => None,
    };
    let backend = match &mock {
        Some(m) => Backend::from_parts(m.clone()),
        None => {
            let rest = RestBackend::new(&args.backend_url, &args.backend_key);
            rest.start_realtime();
            Backend::from_parts(rest)
        }
    };

    // ---- Core state ----
    let (store, view_rx) = SignalStore::shared(filter, sort);
    let (session, session_rx) = SessionContext::new(&backend, args.notif_limit);
    let fanout = Arc::new(NotificationFanout::new(&backend, rec_tx.clone()));
    let like_coordinator = Arc::new(LikeCoordinator::new(
        &backend,
        store.clone(),
        session.clone(),
        fanout.clone(),
    ));

    // ---- Session restore + first load ----
    match session.restore().await {
        Ok(Some(user)) => info!(email = %user.email, "session restored"),
        Ok(None) => info!("no existing session"),
        Err(e) => warn!(?e, "session restore failed"),
    }

    // ---- Change-feed bridge ----
    let bridge = ChangeFeedBridge::new(&backend, store.clone(), session.clone(), rec_tx.clone());
    bridge.start();
    if let Err(e) = bridge.reload().await {
        warn!(?e, "initial load failed, starting empty");
    }

    // ---- Demo tabs (mock mode only) ----
    if let Some(mock) = &mock {
        mock.seed_user("desk@signalhub.local", "desk-password", "desk", true, SubscriptionTier::Vip);
        mock.seed_user("fan@signalhub.local", "fan-password", "fan", false, SubscriptionTier::Free);

        // "admin tab": its own session and store, publishing through the
        // console; the main tab only sees the results via the change feed
        let (admin_session, _admin_session_rx) = SessionContext::new(&backend, args.notif_limit);
        let (admin_store, _admin_view_rx) = SignalStore::shared(filter, sort);
        let admin_console = AdminConsole::new(
            &backend,
            admin_session.clone(),
            fanout.clone(),
            admin_store.clone(),
        );
        let assets = args.demo_assets.clone();
        let interval = args.demo_interval_secs.max(1);
        tokio::spawn(async move {
            if let Err(e) = admin_session.sign_in("desk@signalhub.local", "desk-password").await {
                warn!(?e, "demo admin sign-in failed");
                return;
            }
            if !admin_session.is_admin() {
                warn!("demo admin lacks the admin role, stopping");
                return;
            }
            let mut published: u64 = 0;
            loop {
                sleep(Duration::from_secs(interval)).await;

                // don't hold ThreadRng across an .await
                let (idx, call, confidence, expiry, resolve, hit) = {
                    let mut rng = rand::thread_rng();
                    (
                        rng.gen_range(0..assets.len()),
                        rng.gen_bool(0.5),
                        rng.gen_range(1..=5u8),
                        [5u32, 15, 30, 60][rng.gen_range(0..4)],
                        rng.gen_bool(0.3),
                        rng.gen_bool(0.6),
                    )
                };

                let draft = SignalDraft {
                    asset: assets[idx].clone(),
                    action: Some(if call { SignalAction::Call } else { SignalAction::Put }),
                    expiry_minutes: expiry,
                    entry_price: None,
                    target_price: None,
                    stop_loss: None,
                    confidence,
                };
                match admin_console.create_signal(draft).await {
                    Ok(_) => published += 1,
                    Err(e) => warn!(?e, "demo create failed"),
                }

                if resolve {
                    let target = {
                        let s = admin_store.lock().unwrap();
                        s.snapshot()
                            .into_iter()
                            .find(|x| x.status == SignalStatus::Active)
                            .map(|x| x.id)
                    };
                    if let Some(id) = target {
                        let status = if hit { SignalStatus::Hit } else { SignalStatus::Miss };
                        let _ = admin_console.update_status(id, status).await;
                    }
                }

                if published > 0 && published % 10 == 0 {
                    let _ = admin_console
                        .send_broadcast(
                            Audience::All,
                            "Desk update",
                            "Fresh batch of signals is live",
                            NotificationKind::System,
                        )
                        .await;
                }
            }
        });

        // "viewer tab": the main session likes what it sees
        let viewer_session = session.clone();
        let viewer_store = store.clone();
        let viewer_likes = like_coordinator.clone();
        tokio::spawn(async move {
            if let Err(e) = viewer_session.sign_in("fan@signalhub.local", "fan-password").await {
                warn!(?e, "demo viewer sign-in failed");
                return;
            }
            loop {
                sleep(Duration::from_secs(interval * 2)).await;
                let target = {
                    let s = viewer_store.lock().unwrap();
                    let snap = s.snapshot();
                    if snap.is_empty() {
                        None
                    } else {
                        let idx = rand::thread_rng().gen_range(0..snap.len());
                        Some(snap[idx].id)
                    }
                };
                if let Some(id) = target {
                    if let Err(e) = viewer_likes.toggle_like(id).await {
                        warn!(?e, "demo like failed");
                    }
                }
            }
        });
    }

    // ---- Heartbeat + render counter ----
    let mut view_rx = view_rx;
    let session_rx = session_rx;
    let mut renders: u64 = 0;

    loop {
        select! {
            changed = view_rx.changed() => {
                if changed.is_err() { break; }
                renders += 1;
            },
            _ = sleep(Duration::from_secs(5)) => {
                let view = view_rx.borrow();
                let sess = session_rx.borrow();
                info!(
                    visible = view.signals.len(),
                    today = view.stats.signals_today,
                    success_rate = view.stats.success_rate_pct,
                    unread = sess.unread,
                    renders,
                    "heartbeat"
                );
                renders = 0;
            }
        }
    }
}
