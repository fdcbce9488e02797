use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};

use chrono::{NaiveDateTime, NaiveTime, Timelike};
use serde::{Deserialize, Deserializer};

use crate::config::HeatmapGrid;
use crate::error::{DashboardError, Result};

use super::series::{CategoryPoint, HeatCell};

pub const DAYS_PER_WEEK: u8 = 7;
pub const HOURS_PER_DAY: u8 = 24;
pub const WEEK_GRID_CELLS: usize = DAYS_PER_WEEK as usize * HOURS_PER_DAY as usize;

#[derive(Debug, Clone, Copy)]
pub struct LabelTable {
    pub name: &'static str,
    pub labels: &'static [&'static str],
}

impl LabelTable {
    pub const fn new(name: &'static str, labels: &'static [&'static str]) -> Self {
        Self { name, labels }
    }

    pub fn lookup(&self, id: i64) -> Result<&'static str> {
        usize::try_from(id)
            .ok()
            .and_then(|i| self.labels.get(i).copied())
            .ok_or(DashboardError::LabelOutOfRange {
                table: self.name,
                id,
            })
    }
}

pub const DAY_OF_WEEK: LabelTable =
    LabelTable::new("day_of_week", &["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"]);
pub const SHIFTS: LabelTable = LabelTable::new("shift", &["Shift 1", "Shift 2"]);
pub const CALL_SOURCES: LabelTable = LabelTable::new("call_source", &["Officer", "Citizen"]);

pub fn has_label(label: &Option<String>) -> bool {
    label.as_deref().is_some_and(|s| !s.is_empty())
}

fn cmp_f64(a: f64, b: f64) -> Ordering {
    a.partial_cmp(&b).unwrap_or(Ordering::Equal)
}

pub fn sort_by_name(points: &mut [CategoryPoint]) {
    points.sort_by(|a, b| a.name.cmp(&b.name));
}

pub fn sort_by_id(points: &mut [CategoryPoint]) {
    points.sort_by(|a, b| a.id.cmp(&b.id).then_with(|| a.name.cmp(&b.name)));
}

pub fn sort_by_value_asc(points: &mut [CategoryPoint]) {
    points.sort_by(|a, b| cmp_f64(a.value, b.value).then_with(|| a.name.cmp(&b.name)));
}

pub fn top_n_desc(mut points: Vec<CategoryPoint>, n: usize) -> Vec<CategoryPoint> {
    points.sort_by(|a, b| cmp_f64(b.value, a.value).then_with(|| a.name.cmp(&b.name)));
    points.truncate(n);
    points
}

pub fn substitute_labels(
    field: &str,
    items: Vec<(Option<i64>, f64)>,
    table: &LabelTable,
) -> Result<Vec<CategoryPoint>> {
    let mut out = Vec::with_capacity(items.len());
    for (id, value) in items {
        let id = id.ok_or_else(|| DashboardError::shape(field, "entry without id"))?;
        out.push(CategoryPoint {
            id: Some(id),
            name: table.lookup(id)?.to_string(),
            value,
        });
    }
    sort_by_id(&mut out);
    Ok(out)
}

pub fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

pub fn complete_week_grid(mut cells: Vec<HeatCell>, policy: HeatmapGrid) -> Vec<HeatCell> {
    let fill = match policy {
        HeatmapGrid::Sparse => !cells.is_empty() && cells.len() < WEEK_GRID_CELLS,
        HeatmapGrid::Always => cells.len() < WEEK_GRID_CELLS,
    };
    if fill {
        let present: HashSet<(u8, u8)> = cells.iter().map(|c| (c.day, c.hour)).collect();
        for day in 0..DAYS_PER_WEEK {
            for hour in 0..HOURS_PER_DAY {
                if !present.contains(&(day, hour)) {
                    cells.push(HeatCell {
                        day,
                        hour,
                        value: None,
                    });
                }
            }
        }
    }
    cells.sort_by_key(HeatCell::ordinal);
    cells
}

pub fn region_map(points: &[CategoryPoint]) -> BTreeMap<String, f64> {
    points.iter().map(|p| (p.name.clone(), p.value)).collect()
}

pub const DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";
pub const TIME_OF_DAY_FORMAT: &str = "%H:%M:%S";

pub fn parse_datetime_ms(field: &str, s: &str) -> Result<i64> {
    NaiveDateTime::parse_from_str(s, DATETIME_FORMAT)
        .map(|dt| dt.and_utc().timestamp_millis())
        .map_err(|e| DashboardError::shape(field, format!("bad timestamp {s:?}: {e}")))
}

pub fn parse_time_of_day_ms(field: &str, s: &str) -> Result<i64> {
    NaiveTime::parse_from_str(s, TIME_OF_DAY_FORMAT)
        .map(|t| t.num_seconds_from_midnight() as i64 * 1000)
        .map_err(|e| DashboardError::shape(field, format!("bad time of day {s:?}: {e}")))
}

pub fn lenient_f64<'de, D>(de: D) -> std::result::Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumOrStr {
        Num(f64),
        Str(String),
        Null(()),
    }
    match NumOrStr::deserialize(de)? {
        NumOrStr::Num(n) => Ok(n),
        NumOrStr::Str(s) => s.trim().parse::<f64>().map_err(serde::de::Error::custom),
        NumOrStr::Null(()) => Ok(0.0),
    }
}
