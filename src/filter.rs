use std::collections::BTreeMap;
use std::fmt;

use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use crate::error::{DashboardError, Result};
use crate::store::DashboardStore;

pub const DATE_FORMAT: &str = "%Y-%m-%d";

pub const FILTER_PATH: &str = "filter";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Date,
    Id,
    Text,
}

pub const KNOWN_FIELDS: &[(&str, FieldKind)] = &[
    ("time__gte", FieldKind::Date),
    ("time__lte", FieldKind::Date),
    ("dow_received", FieldKind::Id),
    ("hour_received", FieldKind::Id),
    ("shift", FieldKind::Id),
    ("initiated_by", FieldKind::Id),
    ("beat", FieldKind::Id),
    ("district", FieldKind::Id),
    ("squad", FieldKind::Id),
    ("priority", FieldKind::Id),
    ("nature", FieldKind::Id),
    ("nature__nature_group", FieldKind::Id),
    ("close_code", FieldKind::Id),
    ("call_unit__beat", FieldKind::Id),
    ("call_unit__district", FieldKind::Id),
    ("primary_unit", FieldKind::Id),
    ("cancelled", FieldKind::Text),
    ("q", FieldKind::Text),
];

pub fn field_kind(key: &str) -> Option<FieldKind> {
    KNOWN_FIELDS
        .iter()
        .find(|(k, _)| *k == key)
        .map(|(_, kind)| *kind)
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum FilterValue {
    Date(NaiveDate),
    Id(i64),
    Text(String),
}

impl FilterValue {
    pub fn parse(kind: FieldKind, raw: &str) -> Option<Self> {
        match kind {
            FieldKind::Date => NaiveDate::parse_from_str(raw.trim(), DATE_FORMAT)
                .ok()
                .map(FilterValue::Date),
            FieldKind::Id => raw.trim().parse::<i64>().ok().map(FilterValue::Id),
            FieldKind::Text if raw.is_empty() => None,
            FieldKind::Text => Some(FilterValue::Text(raw.to_string())),
        }
    }

    /// `value` in the shape `key` stores. Known keys take their field's
    /// kind; unknown keys hold ids or text. `None` when the value cannot be
    /// expressed for the key.
    pub fn for_key(key: &str, value: FilterValue) -> Option<Self> {
        match (field_kind(key), value) {
            (Some(FieldKind::Date), FilterValue::Date(d)) => Some(FilterValue::Date(d)),
            (Some(FieldKind::Id), FilterValue::Id(id)) => Some(FilterValue::Id(id)),
            (Some(kind), FilterValue::Text(s)) => FilterValue::parse(kind, &s),
            (Some(FieldKind::Text), other) => Some(FilterValue::Text(other.to_string())),
            (Some(_), _) => None,
            (None, FilterValue::Text(s)) if s.is_empty() => None,
            (None, FilterValue::Date(d)) => Some(FilterValue::Text(d.format(DATE_FORMAT).to_string())),
            (None, other) => Some(other),
        }
    }

    fn to_json(&self) -> JsonValue {
        match self {
            FilterValue::Date(d) => JsonValue::String(d.format(DATE_FORMAT).to_string()),
            FilterValue::Id(id) => JsonValue::from(*id),
            FilterValue::Text(s) => JsonValue::String(s.clone()),
        }
    }

    pub fn from_json(key: &str, v: &JsonValue) -> Option<Self> {
        let raw = match v {
            JsonValue::Number(n) => match n.as_i64() {
                Some(id) => FilterValue::Id(id),
                None => FilterValue::Text(n.to_string()),
            },
            JsonValue::String(s) => FilterValue::Text(s.clone()),
            _ => return None,
        };
        FilterValue::for_key(key, raw)
    }
}

impl fmt::Display for FilterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterValue::Date(d) => write!(f, "{}", d.format(DATE_FORMAT)),
            FilterValue::Id(id) => write!(f, "{id}"),
            FilterValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for FilterValue {
    fn from(id: i64) -> Self {
        FilterValue::Id(id)
    }
}

impl From<i32> for FilterValue {
    fn from(id: i32) -> Self {
        FilterValue::Id(id as i64)
    }
}

impl From<NaiveDate> for FilterValue {
    fn from(d: NaiveDate) -> Self {
        FilterValue::Date(d)
    }
}

impl From<&str> for FilterValue {
    fn from(s: &str) -> Self {
        FilterValue::Text(s.to_string())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterState {
    fields: BTreeMap<String, FilterValue>,
}

impl FilterState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&FilterValue> {
        self.fields.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FilterValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn with(&self, key: &str, value: impl Into<FilterValue>) -> Self {
        let mut next = self.clone();
        match FilterValue::for_key(key, value.into()) {
            Some(value) => {
                next.fields.insert(key.to_string(), value);
            }
            None => log::warn!("filter.set rejected key={}", key),
        }
        next
    }

    pub fn without(&self, key: &str) -> Self {
        let mut next = self.clone();
        next.fields.remove(key);
        next
    }

    pub fn toggled(&self, key: &str, value: FilterValue) -> Self {
        let Some(value) = FilterValue::for_key(key, value) else {
            return self.clone();
        };
        if self.fields.get(key) == Some(&value) {
            self.without(key)
        } else {
            self.with(key, value)
        }
    }

    pub fn known_subset(&self) -> Self {
        Self {
            fields: self
                .fields
                .iter()
                .filter(|(k, _)| field_kind(k).is_some())
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        }
    }

    pub fn to_query_string(&self) -> String {
        let mut ser = url::form_urlencoded::Serializer::new(String::new());
        for (k, v) in &self.fields {
            ser.append_pair(k, &v.to_string());
        }
        ser.finish()
    }

    pub fn to_fragment(&self) -> String {
        if self.fields.is_empty() {
            String::new()
        } else {
            format!("#{}", self.to_query_string())
        }
    }

    pub fn from_fragment(raw: &str) -> Self {
        let body = raw
            .trim()
            .trim_start_matches('#')
            .trim_start_matches('!')
            .trim_start_matches('?');
        let mut fields = BTreeMap::new();
        for (k, v) in url::form_urlencoded::parse(body.as_bytes()) {
            let Some(kind) = field_kind(&k) else {
                log::debug!("filter.restore ignored_key={}", k);
                continue;
            };
            match FilterValue::parse(kind, &v) {
                Some(value) => {
                    fields.insert(k.into_owned(), value);
                }
                None => log::warn!("filter.restore bad_value key={} value={}", k, v),
            }
        }
        Self { fields }
    }

    pub fn to_json(&self) -> JsonValue {
        let map: Map<String, JsonValue> = self
            .fields
            .iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect();
        JsonValue::Object(map)
    }

    pub fn from_json(v: &JsonValue) -> Self {
        let fields = v
            .as_object()
            .map(|obj| {
                obj.iter()
                    .filter_map(|(k, v)| FilterValue::from_json(k, v).map(|fv| (k.clone(), fv)))
                    .collect()
            })
            .unwrap_or_default();
        Self { fields }
    }
}

pub fn clone_filter(store: &DashboardStore) -> FilterState {
    store
        .get(FILTER_PATH)
        .map(|v| FilterState::from_json(&v))
        .unwrap_or_default()
}

pub fn toggle_filter(
    store: &DashboardStore,
    key: &str,
    value: impl Into<FilterValue>,
) -> Result<FilterState> {
    let raw = value.into();
    let value = FilterValue::for_key(key, raw.clone()).ok_or_else(|| {
        DashboardError::InvalidFilterValue {
            key: key.to_string(),
            value: raw.to_string(),
        }
    })?;
    let current = clone_filter(store);
    let removed = current.get(key) == Some(&value);
    let next = current.toggled(key, value.clone());
    log::info!("filter.toggle key={} value={} removed={}", key, value, removed);
    store.set(FILTER_PATH, next.to_json())?;
    Ok(next)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DateSpan {
    #[serde(rename = "7days")]
    Last7Days,
    #[serde(rename = "28days")]
    Last28Days,
    #[serde(rename = "ytd")]
    YearToDate,
}

impl DateSpan {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "7days" => Some(DateSpan::Last7Days),
            "28days" => Some(DateSpan::Last28Days),
            "ytd" => Some(DateSpan::YearToDate),
            _ => None,
        }
    }

    pub fn apply(&self, filter: &FilterState, today: NaiveDate) -> FilterState {
        let past_sunday =
            today - Duration::days(today.weekday().num_days_from_sunday() as i64);
        match self {
            DateSpan::Last7Days => filter
                .with("time__gte", past_sunday - Duration::days(7))
                .with("time__lte", past_sunday),
            DateSpan::Last28Days => filter
                .with("time__gte", past_sunday - Duration::days(28))
                .with("time__lte", past_sunday),
            DateSpan::YearToDate => {
                let jan1 = NaiveDate::from_ymd_opt(today.year(), 1, 1).unwrap_or(today);
                filter.with("time__gte", jan1).without("time__lte")
            }
        }
    }
}
