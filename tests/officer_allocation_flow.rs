//! Officer allocation dashboard driven end to end through an in-memory source.

mod common;

use serde_json::{json, Value as JsonValue};

use cfs_dashboard::config::Settings;
use cfs_dashboard::dashboard::DashboardKind;
use cfs_dashboard::filter::FilterValue;
use cfs_dashboard::widgets::StackStyle;

use common::{dashboard, names, CannedSource};

fn bucket(patrol: f64) -> JsonValue {
    json!({
        "IN CALL - CITIZEN INITIATED": {"avg_volume": 3.0},
        "IN CALL - SELF INITIATED": {"avg_volume": 2.0},
        "OUT OF SERVICE": {"avg_volume": 0.5},
        "IN CALL - DIRECTED PATROL": {"avg_volume": 1.0},
        "PATROL": {"avg_volume": patrol}
    })
}

fn payload() -> JsonValue {
    json!({
        "allocation_over_time": {
            "13:00:00": bucket(9.0),
            "01:00:00": bucket(4.333),
        },
        "on_duty_by_beat": [
            {"beat": "312", "beat_id": 12, "on_duty": 1.256},
            {"beat": "114", "beat_id": 4, "on_duty": 2.0},
            {"beat": "", "beat_id": 99, "on_duty": 7.0}
        ],
        "on_duty_by_district": [
            {"district": "D2", "district_id": 2, "on_duty": 5.5}
        ]
    })
}

fn settings() -> Settings {
    Settings {
        kind: DashboardKind::OfficerAllocation,
        ..Settings::default()
    }
}

#[tokio::test]
async fn test_allocation_charts_draw_in_stacking_order() {
    let source = CannedSource::new(payload());
    let (d, surface) = dashboard(&settings(), source.clone());
    d.load("#time__gte=2024-01-01").await.unwrap();

    let area = surface.frame("#allocation-over-time").unwrap();
    let keys: Vec<_> = area
        .series
        .as_array()
        .unwrap()
        .iter()
        .map(|g| g["key"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(
        keys,
        [
            "Citizen-Initiated Call",
            "Officer-Initiated Call",
            "Out of Service",
            "Directed Patrol",
            "Patrol"
        ]
    );
    // Buckets sorted by time of day, values rounded to hundredths.
    assert_eq!(area.series[4]["values"][0]["x"], 3_600_000);
    assert_eq!(area.series[4]["values"][0]["y"], 4.33);
    assert_eq!(area.options["style"], "stacked");

    let beats = surface.frame("#on-duty-by-beat").unwrap();
    assert_eq!(names(&beats.series), ["114", "312"]);
    assert_eq!(beats.options["bar_colors"], json!({"114": "#9edae5", "312": "#dbdb8d"}));

    let districts = surface.frame("#on-duty-by-district").unwrap();
    assert_eq!(districts.options["bar_colors"], json!({"D2": "#17becf"}));
}

#[tokio::test]
async fn test_beat_click_filters_and_stack_style_survives_refresh() {
    let source = CannedSource::new(payload());
    let (d, surface) = dashboard(&settings(), source.clone());
    d.load("").await.unwrap();

    let area = d.widget("#allocation-over-time").unwrap();
    assert!(!area.toggle_legend("Patrol"));
    assert!(area.set_stack_style(StackStyle::Expanded));

    d.click("#on-duty-by-beat", &json!({"id": 12, "name": "312"}))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(d.filter().get("call_unit__beat"), Some(&FilterValue::Id(12)));
    assert_eq!(source.queries(), ["", "call_unit__beat=12"]);

    let frame = surface.frame("#allocation-over-time").unwrap();
    assert_eq!(frame.options["style"], "expanded");
    assert!(frame.options.get("hidden_series").is_none());
}
