use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use serde_json::Value as JsonValue;

use crate::config::StalePolicy;
use crate::error::Result;
use crate::filter::FilterState;
use crate::normalize::Normalizer;
use crate::source::AggregateSource;
use crate::store::{DashboardStore, DATA_PATH, INITIAL_LOAD_PATH, LOADING_PATH};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RefreshOutcome {
    Committed { generation: u64 },
    Stale { generation: u64, latest: u64 },
}

pub struct RefreshController {
    store: DashboardStore,
    source: Arc<dyn AggregateSource>,
    normalizer: Arc<dyn Normalizer>,
    endpoint: String,
    policy: StalePolicy,
    issued: AtomicU64,
    committed: AtomicU64,
}

impl RefreshController {
    pub fn new(
        store: DashboardStore,
        source: Arc<dyn AggregateSource>,
        normalizer: Arc<dyn Normalizer>,
        endpoint: &str,
        policy: StalePolicy,
    ) -> Self {
        Self {
            store,
            source,
            normalizer,
            endpoint: endpoint.to_string(),
            policy,
            issued: AtomicU64::new(0),
            committed: AtomicU64::new(0),
        }
    }

    pub fn issued(&self) -> u64 {
        self.issued.load(Ordering::SeqCst)
    }

    /// Highest generation committed so far. A late, older response never
    /// lowers it.
    pub fn committed(&self) -> u64 {
        self.committed.load(Ordering::SeqCst)
    }

    pub async fn filter_updated(&self, filter: &FilterState) -> Result<RefreshOutcome> {
        self.refresh(filter.to_query_string()).await
    }

    pub async fn refresh(&self, query: String) -> Result<RefreshOutcome> {
        self.store.set(LOADING_PATH, JsonValue::Bool(true))?;
        let generation = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        log::info!(
            "refresh.start endpoint={} generation={} query={}",
            self.endpoint,
            generation,
            query
        );

        let started = Instant::now();
        let raw = match self.source.fetch(&self.endpoint, &query).await {
            Ok(raw) => raw,
            Err(e) => {
                log::error!("refresh.error generation={} {}", generation, e);
                return Err(e);
            }
        };

        let latest = self.issued();
        if self.policy == StalePolicy::Discard && generation != latest {
            log::warn!("refresh.stale generation={} current={}", generation, latest);
            return Ok(RefreshOutcome::Stale { generation, latest });
        }
        if generation < self.committed() {
            log::warn!(
                "refresh.out_of_order generation={} committed={}",
                generation,
                self.committed()
            );
        }

        self.store.set(LOADING_PATH, JsonValue::Bool(false))?;
        self.store.set(INITIAL_LOAD_PATH, JsonValue::Bool(false))?;
        let data = self.normalizer.normalize(&raw).inspect_err(|e| {
            log::error!("refresh.normalize_error generation={} {}", generation, e);
        })?;
        self.store.set(DATA_PATH, data)?;
        self.committed.fetch_max(generation, Ordering::SeqCst);

        log::info!(
            "refresh.done generation={} ms={}",
            generation,
            started.elapsed().as_millis()
        );
        Ok(RefreshOutcome::Committed { generation })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DashboardError;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::collections::HashMap;
    use tokio::sync::oneshot;

    struct Echo;

    impl Normalizer for Echo {
        fn name(&self) -> &'static str {
            "echo"
        }
        fn initial_data(&self) -> JsonValue {
            json!({})
        }
        fn normalize(&self, raw: &JsonValue) -> Result<JsonValue> {
            Ok(json!({ "echo": raw }))
        }
    }

    #[derive(Default)]
    struct GatedSource {
        gates: Mutex<HashMap<String, oneshot::Receiver<Result<JsonValue>>>>,
    }

    impl GatedSource {
        fn gate(&self, query: &str) -> oneshot::Sender<Result<JsonValue>> {
            let (tx, rx) = oneshot::channel();
            self.gates.lock().insert(query.to_string(), rx);
            tx
        }
    }

    #[async_trait]
    impl AggregateSource for GatedSource {
        async fn fetch(&self, _endpoint: &str, query: &str) -> Result<JsonValue> {
            let rx = self.gates.lock().remove(query).expect("ungated query");
            rx.await.expect("gate dropped")
        }
    }

    fn controller(source: Arc<GatedSource>, policy: StalePolicy) -> (DashboardStore, Arc<RefreshController>) {
        let store = DashboardStore::for_dashboard(json!({}));
        let ctl = RefreshController::new(store.clone(), source, Arc::new(Echo), "test", policy);
        (store, Arc::new(ctl))
    }

    fn filter(beat: i64) -> FilterState {
        FilterState::new().with("beat", beat)
    }

    #[tokio::test]
    async fn test_loading_is_set_before_response() {
        let source = Arc::new(GatedSource::default());
        let tx = source.gate("beat=1");
        let (store, ctl) = controller(source, StalePolicy::LastWins);

        let task = tokio::spawn({
            let ctl = ctl.clone();
            async move { ctl.filter_updated(&filter(1)).await }
        });
        tokio::task::yield_now().await;
        while ctl.issued() == 0 {
            tokio::task::yield_now().await;
        }
        assert!(store.get_bool("loading"));
        assert!(store.get_bool("initialLoad"));

        tx.send(Ok(json!({"n": 1}))).unwrap();
        let outcome = task.await.unwrap().unwrap();
        assert_eq!(outcome, RefreshOutcome::Committed { generation: 1 });
        assert!(!store.get_bool("loading"));
        assert!(!store.get_bool("initialLoad"));
        assert_eq!(store.get("data.echo"), Some(json!({"n": 1})));
    }

    async fn race(
        policy: StalePolicy,
    ) -> (DashboardStore, Arc<RefreshController>, RefreshOutcome, RefreshOutcome) {
        let source = Arc::new(GatedSource::default());
        let first = source.gate("beat=1");
        let second = source.gate("beat=2");
        let (store, ctl) = controller(source, policy);

        let t1 = tokio::spawn({
            let ctl = ctl.clone();
            async move { ctl.filter_updated(&filter(1)).await }
        });
        while ctl.issued() < 1 {
            tokio::task::yield_now().await;
        }
        let t2 = tokio::spawn({
            let ctl = ctl.clone();
            async move { ctl.filter_updated(&filter(2)).await }
        });
        while ctl.issued() < 2 {
            tokio::task::yield_now().await;
        }

        // Newer filter answers first, older one lands afterwards.
        second.send(Ok(json!("second"))).unwrap();
        let o2 = t2.await.unwrap().unwrap();
        first.send(Ok(json!("first"))).unwrap();
        let o1 = t1.await.unwrap().unwrap();
        (store, ctl, o1, o2)
    }

    #[tokio::test]
    async fn test_last_response_wins_by_default() {
        let (store, ctl, o1, o2) = race(StalePolicy::LastWins).await;
        assert_eq!(o2, RefreshOutcome::Committed { generation: 2 });
        assert_eq!(o1, RefreshOutcome::Committed { generation: 1 });
        assert_eq!(store.get("data.echo"), Some(json!("first")));
        assert_eq!(ctl.committed(), 2);
    }

    #[tokio::test]
    async fn test_discard_policy_drops_stale_response() {
        let (store, ctl, o1, _) = race(StalePolicy::Discard).await;
        assert_eq!(ctl.committed(), 2);
        assert_eq!(o1, RefreshOutcome::Stale { generation: 1, latest: 2 });
        assert_eq!(store.get("data.echo"), Some(json!("second")));
    }

    #[tokio::test]
    async fn test_fetch_error_propagates_and_keeps_data() {
        let source = Arc::new(GatedSource::default());
        let tx = source.gate("beat=1");
        let (store, ctl) = controller(source, StalePolicy::LastWins);
        tx.send(Err(DashboardError::Status {
            status: 502,
            body: "bad gateway".to_string(),
        }))
        .unwrap();

        let err = ctl.filter_updated(&filter(1)).await.unwrap_err();
        assert!(matches!(err, DashboardError::Status { status: 502, .. }));
        assert_eq!(store.get("data"), Some(json!({})));
        assert!(store.get_bool("loading"));
        assert_eq!(ctl.committed(), 0);
    }
}
