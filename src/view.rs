// ===============================
// src/view.rs
// ===============================
//
// Pure projection of the signal set for rendering. No I/O, no side
// effects: (full set, filter, sort) -> ordered list, recomputed in full
// on every call. Sets are bounded in the hundreds, so no incremental
// diffing is attempted.
//
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{Signal, SignalAction, SignalStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterTag { All, Active, Call, Put, Hit, Miss }

impl FilterTag {
    pub fn parse_one(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Some(FilterTag::All),
            "active" => Some(FilterTag::Active),
            "call" => Some(FilterTag::Call),
            "put" => Some(FilterTag::Put),
            "hit" => Some(FilterTag::Hit),
            "miss" => Some(FilterTag::Miss),
            _ => None,
        }
    }

    pub fn accepts(&self, s: &Signal) -> bool {
        match self {
            FilterTag::All => true,
            FilterTag::Active => s.status == SignalStatus::Active,
            FilterTag::Call => s.action == SignalAction::Call,
            FilterTag::Put => s.action == SignalAction::Put,
            FilterTag::Hit => s.status == SignalStatus::Hit,
            FilterTag::Miss => s.status == SignalStatus::Miss,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortKey { Newest, Oldest, Confidence, Likes }

impl SortKey {
    pub fn parse_one(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "newest" => Some(SortKey::Newest),
            "oldest" => Some(SortKey::Oldest),
            "confidence" => Some(SortKey::Confidence),
            "likes" => Some(SortKey::Likes),
            _ => None,
        }
    }
}

/// Filter + sort the full set. `confidence` and `likes` are stable over
/// the newest-first baseline: equal keys keep their newest-order ranking.
pub fn project(signals: &[Signal], filter: FilterTag, sort: SortKey) -> Vec<Signal> {
    let mut out: Vec<Signal> = signals.iter().filter(|s| filter.accepts(s)).cloned().collect();

    // newest-first baseline, id as the deterministic tie-break
    out.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));

    match sort {
        SortKey::Newest => {}
        SortKey::Oldest => out.reverse(),
        SortKey::Confidence => out.sort_by(|a, b| b.confidence.cmp(&a.confidence)),
        SortKey::Likes => out.sort_by(|a, b| b.like_count.cmp(&a.like_count)),
    }
    out
}

/// Headline numbers above the signal grid.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    pub signals_today: usize,
    pub success_rate_pct: u32,
}

pub fn stats(signals: &[Signal], now: DateTime<Utc>) -> Stats {
    let midnight = now
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .map(|t| t.and_utc())
        .unwrap_or(now);

    let signals_today = signals.iter().filter(|s| s.created_at >= midnight).count();

    let hits = signals.iter().filter(|s| s.status == SignalStatus::Hit).count();
    let success_rate_pct = if signals.is_empty() {
        0
    } else {
        ((hits as f64 / signals.len() as f64) * 100.0).round() as u32
    };

    Stats { signals_today, success_rate_pct }
}

/// Everything the presentation surface needs on each state change: the
/// ordered, render-ready sequence plus the headline stats.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ViewSnapshot {
    pub signals: Vec<Signal>,
    pub stats: Stats,
}

/// "★★★★☆" for level 4; levels clamp to 0..=5.
pub fn confidence_stars(level: u8) -> String {
    let filled = level.min(5) as usize;
    let mut s = String::with_capacity(5 * 3);
    for _ in 0..filled { s.push('★'); }
    for _ in filled..5 { s.push('☆'); }
    s
}

/// Relative timestamp for cards and the notification panel.
pub fn time_ago(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let diff = now.signed_duration_since(then);
    let mins = diff.num_minutes();
    let hours = diff.num_hours();
    let days = diff.num_days();

    if mins < 1 {
        "Just now".to_string()
    } else if mins < 60 {
        format!("{mins}m ago")
    } else if hours < 24 {
        format!("{hours}h ago")
    } else if days < 7 {
        format!("{days}d ago")
    } else {
        then.format("%Y-%m-%d").to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use uuid::Uuid;

    fn sig(asset: &str, action: SignalAction, status: SignalStatus, confidence: u8, likes: u32, age_mins: i64) -> Signal {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        Signal {
            id: Uuid::new_v4(),
            asset: asset.to_string(),
            action,
            expiry_minutes: 5,
            entry_price: None,
            target_price: None,
            stop_loss: None,
            confidence,
            status,
            created_by: Uuid::new_v4(),
            created_at: now - Duration::minutes(age_mins),
            like_count: likes,
            liked_by_me: false,
        }
    }

    #[test]
    fn filter_tags_select_by_status_and_action() {
        let set = vec![
            sig("EUR/USD", SignalAction::Call, SignalStatus::Active, 3, 0, 1),
            sig("GBP/USD", SignalAction::Put, SignalStatus::Hit, 3, 0, 2),
            sig("USD/JPY", SignalAction::Call, SignalStatus::Miss, 3, 0, 3),
        ];

        assert_eq!(project(&set, FilterTag::All, SortKey::Newest).len(), 3);
        assert_eq!(project(&set, FilterTag::Active, SortKey::Newest).len(), 1);
        assert_eq!(project(&set, FilterTag::Call, SortKey::Newest).len(), 2);
        assert_eq!(project(&set, FilterTag::Put, SortKey::Newest).len(), 1);
        assert_eq!(project(&set, FilterTag::Hit, SortKey::Newest).len(), 1);
        assert_eq!(project(&set, FilterTag::Miss, SortKey::Newest).len(), 1);
    }

    #[test]
    fn newest_then_oldest_are_mirrors() {
        let set = vec![
            sig("A", SignalAction::Call, SignalStatus::Active, 3, 0, 30),
            sig("B", SignalAction::Call, SignalStatus::Active, 3, 0, 10),
            sig("C", SignalAction::Call, SignalStatus::Active, 3, 0, 20),
        ];

        let newest = project(&set, FilterTag::All, SortKey::Newest);
        let assets: Vec<&str> = newest.iter().map(|s| s.asset.as_str()).collect();
        assert_eq!(assets, vec!["B", "C", "A"]);

        let oldest = project(&set, FilterTag::All, SortKey::Oldest);
        let assets: Vec<&str> = oldest.iter().map(|s| s.asset.as_str()).collect();
        assert_eq!(assets, vec!["A", "C", "B"]);
    }

    #[test]
    fn confidence_sort_is_stable_over_newest_order() {
        let set = vec![
            sig("A", SignalAction::Call, SignalStatus::Active, 4, 0, 30),
            sig("B", SignalAction::Call, SignalStatus::Active, 4, 0, 10),
            sig("C", SignalAction::Call, SignalStatus::Active, 5, 0, 20),
            sig("D", SignalAction::Call, SignalStatus::Active, 4, 0, 5),
        ];

        let by_conf = project(&set, FilterTag::All, SortKey::Confidence);
        let assets: Vec<&str> = by_conf.iter().map(|s| s.asset.as_str()).collect();
        // C wins on confidence; the 4s keep their newest-first order D, B, A.
        assert_eq!(assets, vec!["C", "D", "B", "A"]);
    }

    #[test]
    fn likes_sort_descends_and_keeps_newest_for_ties() {
        let set = vec![
            sig("A", SignalAction::Call, SignalStatus::Active, 3, 2, 30),
            sig("B", SignalAction::Call, SignalStatus::Active, 3, 7, 10),
            sig("C", SignalAction::Call, SignalStatus::Active, 3, 2, 20),
        ];

        let by_likes = project(&set, FilterTag::All, SortKey::Likes);
        let assets: Vec<&str> = by_likes.iter().map(|s| s.asset.as_str()).collect();
        assert_eq!(assets, vec!["B", "C", "A"]);
    }

    #[test]
    fn stats_count_today_and_hit_rate() {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        let mut old = sig("A", SignalAction::Call, SignalStatus::Hit, 3, 0, 0);
        old.created_at = now - Duration::days(3);
        let set = vec![
            old,
            sig("B", SignalAction::Call, SignalStatus::Hit, 3, 0, 30),
            sig("C", SignalAction::Call, SignalStatus::Miss, 3, 0, 60),
            sig("D", SignalAction::Call, SignalStatus::Active, 3, 0, 90),
        ];

        let st = stats(&set, now);
        assert_eq!(st.signals_today, 3);
        assert_eq!(st.success_rate_pct, 50); // 2 of 4
    }

    #[test]
    fn stats_empty_set_is_zero() {
        let st = stats(&[], Utc::now());
        assert_eq!(st.signals_today, 0);
        assert_eq!(st.success_rate_pct, 0);
    }

    #[test]
    fn stars_render_filled_and_hollow() {
        assert_eq!(confidence_stars(0), "☆☆☆☆☆");
        assert_eq!(confidence_stars(4), "★★★★☆");
        assert_eq!(confidence_stars(5), "★★★★★");
        assert_eq!(confidence_stars(9), "★★★★★");
    }

    #[test]
    fn time_ago_buckets() {
        let now = Utc.with_ymd_and_hms(2024, 6, 10, 12, 0, 0).unwrap();
        assert_eq!(time_ago(now - Duration::seconds(20), now), "Just now");
        assert_eq!(time_ago(now - Duration::minutes(5), now), "5m ago");
        assert_eq!(time_ago(now - Duration::hours(3), now), "3h ago");
        assert_eq!(time_ago(now - Duration::days(2), now), "2d ago");
        assert_eq!(time_ago(now - Duration::days(30), now), "2024-05-11");
    }
}
