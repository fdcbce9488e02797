#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use parking_lot::Mutex;
use serde_json::{json, Value as JsonValue};
use tokio::sync::oneshot;

use cfs_dashboard::config::Settings;
use cfs_dashboard::dashboard::{Dashboard, FixedClock};
use cfs_dashboard::error::Result;
use cfs_dashboard::normalize;
use cfs_dashboard::source::AggregateSource;
use cfs_dashboard::widgets::RecordingSurface;

/// Same payload for every request; remembers the queries it saw.
pub struct CannedSource {
    payload: JsonValue,
    queries: Mutex<Vec<String>>,
}

impl CannedSource {
    pub fn new(payload: JsonValue) -> Arc<Self> {
        Arc::new(Self {
            payload,
            queries: Mutex::new(Vec::new()),
        })
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().clone()
    }
}

#[async_trait]
impl AggregateSource for CannedSource {
    async fn fetch(&self, _endpoint: &str, query: &str) -> Result<JsonValue> {
        self.queries.lock().push(query.to_string());
        Ok(self.payload.clone())
    }
}

/// Every query blocks until the test releases it with a payload.
#[derive(Default)]
pub struct GatedSource {
    gates: Mutex<HashMap<String, oneshot::Receiver<JsonValue>>>,
}

impl GatedSource {
    pub fn gate(&self, query: &str) -> oneshot::Sender<JsonValue> {
        let (tx, rx) = oneshot::channel();
        self.gates.lock().insert(query.to_string(), rx);
        tx
    }
}

#[async_trait]
impl AggregateSource for GatedSource {
    async fn fetch(&self, _endpoint: &str, query: &str) -> Result<JsonValue> {
        let rx = self
            .gates
            .lock()
            .remove(query)
            .unwrap_or_else(|| panic!("no gate for query {query:?}"));
        Ok(rx.await.expect("gate dropped"))
    }
}

pub fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 10).unwrap()
}

pub fn dashboard(
    settings: &Settings,
    source: Arc<dyn AggregateSource>,
) -> (Dashboard, Arc<RecordingSurface>) {
    let surface = Arc::new(RecordingSurface::new(900));
    let d = Dashboard::new(
        settings,
        source,
        normalize::for_settings(settings),
        Arc::new(FixedClock(today())),
        surface.clone(),
    )
    .unwrap();
    (d, surface)
}

/// Day-of-week counts with ids deliberately out of order.
pub fn shuffled_dow() -> JsonValue {
    json!([
        {"id": 4, "volume": 40},
        {"id": 6, "volume": 60},
        {"id": 0, "volume": 5},
        {"id": 3, "volume": 30},
        {"id": 1, "volume": 10},
        {"id": 5, "volume": 50},
        {"id": 2, "volume": 20}
    ])
}

pub fn names(series: &JsonValue) -> Vec<String> {
    series[0]["values"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v["name"].as_str().unwrap().to_string())
        .collect()
}
