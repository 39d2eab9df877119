// ===============================
// src/config.rs
// ===============================
use dotenvy::dotenv;
use std::env;

/// Where persistence, auth and the change feed come from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BackendMode {
    Mock,
    Rest,
}

impl BackendMode {
    pub fn from_env(key: &str, default_mode: BackendMode) -> BackendMode {
        match env::var(key).unwrap_or_default().to_ascii_lowercase().as_str() {
            "mock" => BackendMode::Mock,
            "rest" => BackendMode::Rest,
            _ => default_mode,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self { BackendMode::Mock => "mock", BackendMode::Rest => "rest" }
    }
}

#[derive(Clone, Debug)]
pub struct Args {
    // backend selection
    pub backend_mode: BackendMode,
    pub backend_url: String,
    pub backend_key: String,

    // view defaults for this tab
    pub default_filter: String,
    pub default_sort: String,

    // notifications panel page size
    pub notif_limit: usize,

    // files/metrics
    pub record_file: Option<String>,
    pub metrics_port: u16,

    // mock demo generator
    pub demo_interval_secs: u64,
    pub demo_assets: Vec<String>,
}

pub fn load() -> Args {
    // .env first so BACKEND_URL, RECORD_FILE etc. are visible
    let _ = dotenv();

    let backend_mode = BackendMode::from_env("BACKEND_MODE", BackendMode::Mock);

    let backend_url = env::var("BACKEND_URL").unwrap_or_else(|_| "http://localhost:54321".to_string());
    let backend_key = env::var("BACKEND_KEY").unwrap_or_default();

    let default_filter = env::var("SIGNAL_FILTER").unwrap_or_else(|_| "all".to_string());
    let default_sort = env::var("SIGNAL_SORT").unwrap_or_else(|_| "newest".to_string());

    let notif_limit = env::var("NOTIF_LIMIT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(20);

    let record_file = env::var("RECORD_FILE").ok();
    let metrics_port = env::var("METRICS_PORT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(9898);

    let demo_interval_secs = env::var("DEMO_INTERVAL_SECS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(7);

    // DEMO_ASSETS=EUR/USD,GBP/JPY,BTC/USD
    let demo_assets: Vec<String> = env::var("DEMO_ASSETS")
        .ok()
        .map(|s| {
            s.split(',')
                .map(|x| x.trim())
                .filter(|x| !x.is_empty())
                .map(|x| x.to_ascii_uppercase())
                .collect()
        })
        .filter(|v: &Vec<String>| !v.is_empty())
        .unwrap_or_else(|| vec!["EUR/USD".into(), "GBP/USD".into(), "USD/JPY".into(), "BTC/USD".into()]);

    Args {
        backend_mode,
        backend_url,
        backend_key,
        default_filter,
        default_sort,
        notif_limit,
        record_file,
        metrics_port,
        demo_interval_secs,
        demo_assets,
    }
}
