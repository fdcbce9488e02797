use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};

use crate::config::{HeatmapGrid, RegionMode};
use crate::error::{DashboardError, Result};

use super::helpers::{
    complete_week_grid, has_label, lenient_f64, parse_datetime_ms, region_map,
    sort_by_name, sort_by_value_asc, substitute_labels, top_n_desc, CALL_SOURCES, DAYS_PER_WEEK,
    DAY_OF_WEEK, HOURS_PER_DAY, SHIFTS,
};
use super::series::{CategoryPoint, HeatCell, Series, SeriesGroup, XyPoint};
use super::Normalizer;

pub const TOP_NATURES: usize = 20;

#[derive(Debug, Deserialize)]
struct RawCategory {
    #[serde(default)]
    id: Option<i64>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default, deserialize_with = "lenient_f64")]
    volume: f64,
}

#[derive(Debug, Deserialize)]
struct RawDatePoint {
    date: String,
    #[serde(default, deserialize_with = "lenient_f64")]
    volume: f64,
}

#[derive(Debug, Deserialize)]
struct RawHeatCell {
    #[serde(deserialize_with = "lenient_f64")]
    dow_received: f64,
    #[serde(deserialize_with = "lenient_f64")]
    hour_received: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    volume: f64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawCallVolume {
    volume_by_nature_group: Vec<RawCategory>,
    volume_by_nature: Vec<RawCategory>,
    volume_by_date: Vec<RawDatePoint>,
    volume_by_source: Vec<RawCategory>,
    volume_by_beat: Vec<RawCategory>,
    volume_by_district: Vec<RawCategory>,
    volume_by_dow: Vec<RawCategory>,
    volume_by_shift: Vec<RawCategory>,
    heatmap: Vec<RawHeatCell>,
    precision: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CallVolumeData {
    pub volume_by_nature_group: Series<CategoryPoint>,
    pub volume_by_nature: Series<CategoryPoint>,
    pub volume_by_date: Series<XyPoint>,
    pub volume_by_source: Series<CategoryPoint>,
    pub volume_by_beat: Series<CategoryPoint>,
    pub volume_by_dow: Series<CategoryPoint>,
    pub volume_by_shift: Series<CategoryPoint>,
    pub heatmap: Vec<HeatCell>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub map_data: Option<BTreeMap<String, f64>>,
    pub precision: String,
}

fn labelled(items: Vec<RawCategory>) -> Vec<CategoryPoint> {
    items
        .into_iter()
        .filter(|d| has_label(&d.name))
        .map(|d| CategoryPoint {
            id: d.id,
            name: d.name.unwrap_or_default(),
            value: d.volume,
        })
        .collect()
}

fn ids(items: Vec<RawCategory>) -> Vec<(Option<i64>, f64)> {
    items.into_iter().map(|d| (d.id, d.volume)).collect()
}

fn heat_cell(raw: RawHeatCell) -> Result<HeatCell> {
    let day = raw.dow_received;
    let hour = raw.hour_received;
    if !(0.0..DAYS_PER_WEEK as f64).contains(&day) || day.fract() != 0.0 {
        return Err(DashboardError::shape(
            "heatmap.dow_received",
            format!("day {day} outside 0..7"),
        ));
    }
    if !(0.0..HOURS_PER_DAY as f64).contains(&hour) || hour.fract() != 0.0 {
        return Err(DashboardError::shape(
            "heatmap.hour_received",
            format!("hour {hour} outside 0..24"),
        ));
    }
    Ok(HeatCell {
        day: day as u8,
        hour: hour as u8,
        value: Some(raw.volume),
    })
}

pub struct CallVolumeNormalizer {
    pub region: Option<RegionMode>,
    pub grid: HeatmapGrid,
}

impl CallVolumeNormalizer {
    pub fn new(region: Option<RegionMode>, grid: HeatmapGrid) -> Self {
        Self { region, grid }
    }

    pub fn clean(&self, raw: &JsonValue) -> Result<CallVolumeData> {
        let raw: RawCallVolume = serde_json::from_value(raw.clone())?;

        let mut nature_groups = labelled(raw.volume_by_nature_group);
        sort_by_name(&mut nature_groups);

        let natures = top_n_desc(labelled(raw.volume_by_nature), TOP_NATURES);

        let mut by_date = raw
            .volume_by_date
            .into_iter()
            .map(|d| {
                Ok(XyPoint {
                    x: parse_datetime_ms("volume_by_date.date", &d.date)?,
                    y: d.volume,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        by_date.sort_by_key(|p| p.x);

        let sources = substitute_labels("volume_by_source", ids(raw.volume_by_source), &CALL_SOURCES)?;
        let dow = substitute_labels("volume_by_dow", ids(raw.volume_by_dow), &DAY_OF_WEEK)?;
        let shifts = substitute_labels("volume_by_shift", ids(raw.volume_by_shift), &SHIFTS)?;

        let mut beats = labelled(raw.volume_by_beat);
        sort_by_value_asc(&mut beats);

        let map_data = match self.region {
            Some(RegionMode::Beat) => Some(region_map(&beats)),
            Some(RegionMode::District) => Some(region_map(&labelled(raw.volume_by_district))),
            None => None,
        };

        let cells = raw
            .heatmap
            .into_iter()
            .map(heat_cell)
            .collect::<Result<Vec<_>>>()?;
        let heatmap = complete_week_grid(cells, self.grid);

        Ok(CallVolumeData {
            volume_by_nature_group: vec![SeriesGroup::new("Call Volume", nature_groups)],
            volume_by_nature: vec![SeriesGroup::new("Call Volume", natures)],
            volume_by_date: vec![SeriesGroup::new("Call Volume", by_date)],
            volume_by_source: vec![SeriesGroup::new("Volume by Source", sources)],
            volume_by_beat: vec![SeriesGroup::new("Volume By Beat", beats)],
            volume_by_dow: vec![SeriesGroup::new("Call Volume", dow)],
            volume_by_shift: vec![SeriesGroup::new("Volume By Shift", shifts)],
            heatmap,
            map_data,
            precision: raw.precision.unwrap_or_else(|| "day".to_string()),
        })
    }
}

impl Normalizer for CallVolumeNormalizer {
    fn name(&self) -> &'static str {
        "call_volume"
    }

    fn initial_data(&self) -> JsonValue {
        json!({
            "volume_by_date": [],
            "heatmap": [],
            "volume_by_source": [],
            "precision": "day",
        })
    }

    fn normalize(&self, raw: &JsonValue) -> Result<JsonValue> {
        Ok(serde_json::to_value(self.clean(raw)?)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn normalizer() -> CallVolumeNormalizer {
        CallVolumeNormalizer::new(Some(RegionMode::Beat), HeatmapGrid::Sparse)
    }

    #[test]
    fn test_dow_uses_fixed_order_regardless_of_payload_order() {
        let raw = json!({
            "volume_by_dow": [
                {"id": 6, "volume": 70}, {"id": 2, "volume": 30}, {"id": 0, "volume": 10},
                {"id": 4, "volume": 50}, {"id": 1, "volume": 20}, {"id": 5, "volume": 60},
                {"id": 3, "volume": 40}
            ]
        });
        let out = normalizer().clean(&raw).unwrap();
        assert_eq!(out.volume_by_dow.len(), 1);
        let names: Vec<_> = out.volume_by_dow[0].values.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"]);
        assert_eq!(out.volume_by_dow[0].values[0].value, 10.0);
    }

    #[test]
    fn test_unknown_day_id_is_an_error() {
        let raw = json!({"volume_by_dow": [{"id": 7, "volume": 1}]});
        assert!(matches!(
            normalizer().clean(&raw),
            Err(DashboardError::LabelOutOfRange { table: "day_of_week", id: 7 })
        ));
    }

    #[test]
    fn test_nature_top_20_descending_without_unlabelled() {
        let mut natures: Vec<JsonValue> = (0..35)
            .map(|i| json!({"id": i, "name": format!("N{i:02}"), "volume": i}))
            .collect();
        natures.push(json!({"id": 99, "name": null, "volume": 1000}));
        natures.push(json!({"id": 98, "name": "", "volume": 999}));
        let out = normalizer().clean(&json!({"volume_by_nature": natures})).unwrap();
        let values = &out.volume_by_nature[0].values;
        assert_eq!(values.len(), 20);
        assert_eq!(values[0].name, "N34");
        assert_eq!(values[19].name, "N15");
        assert!(values.windows(2).all(|w| w[0].value >= w[1].value));
    }

    #[test]
    fn test_nature_groups_sorted_by_name() {
        let raw = json!({"volume_by_nature_group": [
            {"id": 2, "name": "Traffic", "volume": 3},
            {"id": 1, "name": "Alarm", "volume": 9},
            {"id": 3, "name": null, "volume": 1}
        ]});
        let out = normalizer().clean(&raw).unwrap();
        let names: Vec<_> = out.volume_by_nature_group[0].values.iter().map(|p| p.name.clone()).collect();
        assert_eq!(names, ["Alarm", "Traffic"]);
    }

    #[test]
    fn test_dates_sorted_by_timestamp() {
        let raw = json!({"volume_by_date": [
            {"date": "2024-01-02T00:00:00", "volume": 5},
            {"date": "2024-01-01T00:00:00", "volume": 3}
        ]});
        let out = normalizer().clean(&raw).unwrap();
        let ys: Vec<_> = out.volume_by_date[0].values.iter().map(|p| p.y).collect();
        assert_eq!(ys, [3.0, 5.0]);
    }

    #[test]
    fn test_heatmap_accepts_string_numbers_and_fills() {
        let raw = json!({"heatmap": [
            {"dow_received": "1", "hour_received": "5", "volume": "12"},
            {"dow_received": 0, "hour_received": 0, "volume": 2}
        ]});
        let out = normalizer().clean(&raw).unwrap();
        assert_eq!(out.heatmap.len(), 168);
        assert_eq!(out.heatmap[0].value, Some(2.0));
        assert_eq!(out.heatmap[29].value, Some(12.0));
    }

    #[test]
    fn test_heatmap_rejects_out_of_range_day() {
        let raw = json!({"heatmap": [{"dow_received": 7, "hour_received": 0, "volume": 1}]});
        assert!(matches!(normalizer().clean(&raw), Err(DashboardError::Shape { .. })));
    }

    #[test]
    fn test_region_map_by_beat_and_district() {
        let raw = json!({
            "volume_by_beat": [{"name": "B2", "volume": 4}, {"name": "B1", "volume": 7}, {"name": null, "volume": 1}],
            "volume_by_district": [{"name": "D1", "volume": 11}]
        });
        let beat = normalizer().clean(&raw).unwrap();
        let map = beat.map_data.unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map["B1"], 7.0);
        let names: Vec<_> = beat.volume_by_beat[0].values.iter().map(|p| p.name.clone()).collect();
        assert_eq!(names, ["B2", "B1"]);

        let district = CallVolumeNormalizer::new(Some(RegionMode::District), HeatmapGrid::Sparse)
            .clean(&raw)
            .unwrap();
        assert_eq!(district.map_data.unwrap()["D1"], 11.0);

        let none = CallVolumeNormalizer::new(None, HeatmapGrid::Sparse).clean(&raw).unwrap();
        assert!(none.map_data.is_none());
    }

    #[test]
    fn test_normalize_is_deterministic() {
        let raw = json!({
            "volume_by_source": [{"id": 1, "volume": 3}, {"id": 0, "volume": 1}],
            "volume_by_shift": [{"id": 1, "volume": 3}, {"id": 0, "volume": 1}],
            "heatmap": [{"dow_received": 3, "hour_received": 3, "volume": 1}]
        });
        let n = normalizer();
        assert_eq!(n.normalize(&raw).unwrap(), n.normalize(&raw).unwrap());
    }

    #[test]
    fn test_ill_typed_payload_is_decode_error() {
        let raw = json!({"volume_by_dow": "nope"});
        assert!(matches!(normalizer().clean(&raw), Err(DashboardError::Decode(_))));
    }
}
