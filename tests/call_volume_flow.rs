//! Call volume dashboard driven end to end through an in-memory source.

mod common;

use std::sync::Arc;

use serde_json::{json, Value as JsonValue};

use cfs_dashboard::config::{HeatmapGrid, RegionMode, Settings, StalePolicy};
use cfs_dashboard::controller::RefreshOutcome;
use cfs_dashboard::filter::{DateSpan, FilterValue};
use cfs_dashboard::normalize::call_volume::CallVolumeNormalizer;
use cfs_dashboard::normalize::Normalizer;
use cfs_dashboard::widgets::FilterEvent;

use common::{dashboard, names, shuffled_dow, CannedSource, GatedSource};

fn week_payload() -> JsonValue {
    let natures: Vec<JsonValue> = (0..35)
        .map(|i| json!({"id": i, "name": format!("Nature {i:02}"), "volume": i * 3}))
        .collect();
    json!({
        "volume_by_dow": shuffled_dow(),
        "volume_by_nature": natures,
        "volume_by_shift": [{"id": 1, "volume": 8}, {"id": 0, "volume": 12}],
        "volume_by_source": [{"id": 1, "volume": 40}, {"id": 0, "volume": 9}],
        "volume_by_beat": [
            {"id": 3, "name": "B3", "volume": 30},
            {"id": 1, "name": "B1", "volume": 10},
            {"id": 2, "name": null, "volume": 99}
        ],
        "volume_by_date": [
            {"date": "2024-01-03T00:00:00", "volume": 21},
            {"date": "2024-01-01T00:00:00", "volume": 11},
            {"date": "2024-01-02T00:00:00", "volume": 17}
        ],
        "heatmap": [
            {"dow_received": 0, "hour_received": 8, "volume": 4},
            {"dow_received": 1, "hour_received": 9, "volume": 6},
            {"dow_received": 2, "hour_received": 10, "volume": 1},
            {"dow_received": 5, "hour_received": 23, "volume": 2},
            {"dow_received": 6, "hour_received": 0, "volume": 3}
        ],
        "precision": "day"
    })
}

// ============================================================================
// Date range filter
// ============================================================================

#[tokio::test]
async fn test_week_filter_fetches_and_draws_every_chart() {
    let settings = Settings::default();
    let source = CannedSource::new(week_payload());
    let (d, surface) = dashboard(&settings, source.clone());

    let outcome = d
        .load("#time__gte=2024-01-01&time__lte=2024-01-07")
        .await
        .unwrap();
    assert_eq!(outcome, RefreshOutcome::Committed { generation: 1 });
    assert_eq!(source.queries(), ["time__gte=2024-01-01&time__lte=2024-01-07"]);

    let dow = surface.frame("#volume-by-dow").unwrap();
    assert_eq!(dow.series[0]["key"], "Call Volume");
    assert_eq!(names(&dow.series), ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"]);
    assert_eq!(dow.series[0]["values"][0]["value"], 5.0);
    assert_eq!(dow.options["filter_key"], "dow_received");

    let natures = surface.frame("#volume-by-nature").unwrap();
    let values = natures.series[0]["values"].as_array().unwrap();
    assert_eq!(values.len(), 20);
    assert_eq!(values[0]["name"], "Nature 34");
    assert!(values
        .windows(2)
        .all(|w| w[0]["value"].as_f64() >= w[1]["value"].as_f64()));

    let shifts = surface.frame("#volume-by-shift").unwrap();
    assert_eq!(names(&shifts.series), ["Shift 1", "Shift 2"]);

    let map = surface.frame("#map").unwrap();
    assert_eq!(map.series, json!({"B1": 10.0, "B3": 30.0}));

    let line = surface.frame("#volume-by-date").unwrap();
    let xs: Vec<i64> = line.series[0]["values"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["x"].as_i64().unwrap())
        .collect();
    assert!(xs.windows(2).all(|w| w[0] < w[1]));
    assert_eq!(line.options["x_tick_format"], "%a %m/%d");
}

#[tokio::test]
async fn test_sparse_heatmap_is_completed_to_full_week() {
    let (d, surface) = dashboard(&Settings::default(), CannedSource::new(week_payload()));
    d.load("").await.unwrap();

    let heatmap = surface.frame("#heatmap").unwrap();
    let cells = heatmap.series.as_array().unwrap();
    assert_eq!(cells.len(), 168);
    assert_eq!(cells.iter().filter(|c| !c["value"].is_null()).count(), 5);
    assert_eq!(cells[8]["value"], 4.0);
    assert_eq!(cells[167]["day"], 6);
    assert_eq!(cells[167]["hour"], 23);
}

#[tokio::test]
async fn test_date_span_refetches_once_with_new_bounds() {
    let source = CannedSource::new(week_payload());
    let (d, _) = dashboard(&Settings::default(), source.clone());
    d.load("#beat=3").await.unwrap();

    d.filter_by_date(DateSpan::Last7Days).await.unwrap().unwrap();
    let queries = source.queries();
    assert_eq!(queries.len(), 2);
    assert!(queries[1].starts_with("beat=3&time__gte="));
    assert!(d.fragment().contains("time__lte="));

    // Going back restores the previous filter with one more fetch.
    d.back().await.unwrap().unwrap();
    assert_eq!(d.filter().get("time__gte"), None);
    assert_eq!(source.queries().len(), 3);
}

// ============================================================================
// Normalization
// ============================================================================

#[test]
fn test_normalization_is_deterministic() {
    let n = CallVolumeNormalizer::new(Some(RegionMode::Beat), HeatmapGrid::Sparse);
    let raw = week_payload();
    let first = n.normalize(&raw).unwrap();
    let second = n.normalize(&raw).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_always_grid_fills_empty_heatmap() {
    let n = CallVolumeNormalizer::new(None, HeatmapGrid::Always);
    let out = n.clean(&json!({})).unwrap();
    assert_eq!(out.heatmap.len(), 168);
    assert!(out.heatmap.iter().all(|c| c.value.is_none()));
    assert!(out.map_data.is_none());
}

// ============================================================================
// Overlapping refreshes
// ============================================================================

#[tokio::test]
async fn test_discard_policy_keeps_latest_filter_data() {
    let settings = Settings {
        stale_policy: StalePolicy::Discard,
        ..Settings::default()
    };
    let source = Arc::new(GatedSource::default());
    let release_old = source.gate("beat=1");
    let release_new = source.gate("beat=2");
    let (d, surface) = dashboard(&settings, source.clone());
    let d = Arc::new(d);

    let old = d.dispatch(FilterEvent {
        key: "beat".to_string(),
        value: FilterValue::Id(1),
    });
    while d.controller().issued() < 1 {
        tokio::task::yield_now().await;
    }
    let new = d.dispatch(FilterEvent {
        key: "beat".to_string(),
        value: FilterValue::Id(2),
    });
    while d.controller().issued() < 2 {
        tokio::task::yield_now().await;
    }

    release_new
        .send(json!({"volume_by_dow": [{"id": 0, "volume": 2}]}))
        .unwrap();
    assert_eq!(
        new.await.unwrap().unwrap(),
        RefreshOutcome::Committed { generation: 2 }
    );
    release_old
        .send(json!({"volume_by_dow": [{"id": 6, "volume": 1}]}))
        .unwrap();
    assert_eq!(
        old.await.unwrap().unwrap(),
        RefreshOutcome::Stale {
            generation: 1,
            latest: 2
        }
    );

    let dow = surface.frame("#volume-by-dow").unwrap();
    assert_eq!(names(&dow.series), ["Mon"]);
    assert_eq!(d.controller().committed(), 2);
    assert!(!d.store().get_bool("loading"));
}

#[tokio::test]
async fn test_normalize_failure_keeps_previous_charts() {
    let source = CannedSource::new(json!({"volume_by_dow": [{"id": 9, "volume": 1}]}));
    let (d, surface) = dashboard(&Settings::default(), source);
    assert!(d.load("").await.is_err());
    assert!(surface.frame("#volume-by-dow").is_none());
    assert_eq!(d.controller().committed(), 0);
}
