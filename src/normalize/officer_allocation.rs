use serde::Serialize;
use serde_json::{json, Value as JsonValue};

use crate::error::{DashboardError, Result};

use super::helpers::{has_label, parse_time_of_day_ms, round2, sort_by_name};
use super::series::{CategoryPoint, Series, SeriesGroup, XyPoint};
use super::Normalizer;

pub const ALLOCATION_GROUPS: [(&str, &str); 5] = [
    ("Citizen-Initiated Call", "IN CALL - CITIZEN INITIATED"),
    ("Officer-Initiated Call", "IN CALL - SELF INITIATED"),
    ("Out of Service", "OUT OF SERVICE"),
    ("Directed Patrol", "IN CALL - DIRECTED PATROL"),
    ("Patrol", "PATROL"),
];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OfficerAllocationData {
    pub allocation_over_time: Series<XyPoint>,
    pub on_duty_by_beat: Series<CategoryPoint>,
    pub on_duty_by_district: Series<CategoryPoint>,
}

fn allocation_over_time(raw: &JsonValue) -> Result<Series<XyPoint>> {
    let buckets = match raw.get("allocation_over_time") {
        None | Some(JsonValue::Null) => return Ok(empty_allocation()),
        Some(JsonValue::Object(m)) => m,
        Some(_) => {
            return Err(DashboardError::shape(
                "allocation_over_time",
                "expected an object keyed by time of day",
            ))
        }
    };

    let mut keys: Vec<&String> = buckets.keys().collect();
    keys.sort();

    let mut groups = empty_allocation();
    for k in keys {
        let x = parse_time_of_day_ms("allocation_over_time", k)?;
        for (group, (_, bucket)) in groups.iter_mut().zip(ALLOCATION_GROUPS.iter()) {
            let path = format!("allocation_over_time.{k}.{bucket}.avg_volume");
            let y = buckets[k]
                .get(*bucket)
                .and_then(|b| b.get("avg_volume"))
                .ok_or_else(|| DashboardError::shape(&path, "missing"))?
                .as_f64()
                .ok_or_else(|| DashboardError::shape(&path, "not a number"))?;
            group.values.push(XyPoint { x, y: round2(y) });
        }
    }
    Ok(groups)
}

fn empty_allocation() -> Series<XyPoint> {
    ALLOCATION_GROUPS
        .iter()
        .map(|(name, _)| SeriesGroup::new(name, Vec::new()))
        .collect()
}

fn on_duty(raw: &JsonValue, field: &str, label_key: &str, id_key: &str) -> Result<Vec<CategoryPoint>> {
    let items = match raw.get(field) {
        None | Some(JsonValue::Null) => return Ok(Vec::new()),
        Some(JsonValue::Array(a)) => a,
        Some(_) => return Err(DashboardError::shape(field, "expected a list")),
    };
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        let label = item.get(label_key).and_then(|v| v.as_str()).map(str::to_string);
        if !has_label(&label) {
            continue;
        }
        let value = item
            .get("on_duty")
            .and_then(|v| v.as_f64())
            .ok_or_else(|| DashboardError::shape(format!("{field}.on_duty"), "missing or not a number"))?;
        out.push(CategoryPoint {
            id: item.get(id_key).and_then(|v| v.as_i64()),
            name: label.unwrap_or_default(),
            value: round2(value),
        });
    }
    sort_by_name(&mut out);
    Ok(out)
}

pub struct OfficerAllocationNormalizer;

impl OfficerAllocationNormalizer {
    pub fn clean(&self, raw: &JsonValue) -> Result<OfficerAllocationData> {
        Ok(OfficerAllocationData {
            allocation_over_time: allocation_over_time(raw)?,
            on_duty_by_beat: vec![SeriesGroup::new(
                "Average On Duty",
                on_duty(raw, "on_duty_by_beat", "beat", "beat_id")?,
            )],
            on_duty_by_district: vec![SeriesGroup::new(
                "Average On Duty",
                on_duty(raw, "on_duty_by_district", "district", "district_id")?,
            )],
        })
    }
}

impl Normalizer for OfficerAllocationNormalizer {
    fn name(&self) -> &'static str {
        "officer_allocation"
    }

    fn initial_data(&self) -> JsonValue {
        json!({ "allocation_over_time": [] })
    }

    fn normalize(&self, raw: &JsonValue) -> Result<JsonValue> {
        Ok(serde_json::to_value(self.clean(raw)?)?)
    }
}
