use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, NaiveDate};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::config::{Settings, SiteConfig};
use crate::controller::{RefreshController, RefreshOutcome};
use crate::error::{DashboardError, Result};
use crate::filter::{self, clone_filter, DateSpan, FilterState, FilterValue, FILTER_PATH};
use crate::history::NavigationHistory;
use crate::monitor::monitor_chart;
use crate::normalize::{self, Normalizer};
use crate::source::{AggregateSource, HttpAggregateSource};
use crate::store::{DashboardStore, INITIAL_LOAD_PATH, LOADING_PATH};
use crate::widgets::{beat_color, district_color, time_axis_format, ChartSurface, ChartWidget, FilterEvent};

pub const PAGE_PATH: &str = "page";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DashboardKind {
    CallVolume,
    OfficerAllocation,
    CallList,
}

impl DashboardKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "call_volume" => Some(DashboardKind::CallVolume),
            "officer_allocation" => Some(DashboardKind::OfficerAllocation),
            "call_list" => Some(DashboardKind::CallList),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DashboardKind::CallVolume => "call_volume",
            DashboardKind::OfficerAllocation => "officer_allocation",
            DashboardKind::CallList => "call_list",
        }
    }

    pub fn endpoint(&self) -> &'static str {
        match self {
            DashboardKind::CallVolume => "call_volume",
            DashboardKind::OfficerAllocation => "officer_allocation",
            DashboardKind::CallList => "calls",
        }
    }
}

pub trait Clock: Send + Sync {
    fn today(&self) -> NaiveDate;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }
}

pub struct FixedClock(pub NaiveDate);

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        self.0
    }
}

pub struct Dashboard {
    id: Uuid,
    kind: DashboardKind,
    store: DashboardStore,
    history: Mutex<NavigationHistory>,
    controller: RefreshController,
    clock: Arc<dyn Clock>,
    widgets: Vec<Arc<ChartWidget>>,
    per_page: u64,
}

impl Dashboard {
    pub fn new(
        settings: &Settings,
        source: Arc<dyn AggregateSource>,
        normalizer: Arc<dyn Normalizer>,
        clock: Arc<dyn Clock>,
        surface: Arc<dyn ChartSurface>,
    ) -> Result<Self> {
        settings
            .site
            .validate()
            .map_err(|e| DashboardError::config(e.to_string()))?;
        if settings.call_list_per_page == 0 {
            return Err(DashboardError::config("call list page size must be >= 1"));
        }

        let store = DashboardStore::for_dashboard(normalizer.initial_data());
        if settings.kind == DashboardKind::CallList {
            store.set(PAGE_PATH, json!(1))?;
        }
        let controller = RefreshController::new(
            store.clone(),
            source,
            normalizer,
            settings.kind.endpoint(),
            settings.stale_policy,
        );
        let widgets = mount_widgets(settings.kind, &settings.site, &store, surface);

        let id = Uuid::new_v4();
        log::info!(
            "dashboard.start id={} kind={} agency={} widgets={} stale={:?}",
            id,
            settings.kind.as_str(),
            settings.agency_code,
            widgets.len(),
            settings.stale_policy
        );

        Ok(Self {
            id,
            kind: settings.kind,
            store,
            history: Mutex::new(NavigationHistory::default()),
            controller,
            clock,
            widgets,
            per_page: settings.call_list_per_page,
        })
    }

    pub fn connect(settings: &Settings, surface: Arc<dyn ChartSurface>) -> Result<Self> {
        let source = HttpAggregateSource::new(
            &settings.api_base_url,
            &settings.agency_code,
            Duration::from_secs(settings.http_timeout_secs),
        )?;
        Self::new(
            settings,
            Arc::new(source),
            normalize::for_settings(settings),
            Arc::new(SystemClock),
            surface,
        )
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn kind(&self) -> DashboardKind {
        self.kind
    }

    pub fn store(&self) -> &DashboardStore {
        &self.store
    }

    pub fn controller(&self) -> &RefreshController {
        &self.controller
    }

    pub fn widgets(&self) -> &[Arc<ChartWidget>] {
        &self.widgets
    }

    pub fn widget(&self, mount: &str) -> Option<&Arc<ChartWidget>> {
        self.widgets.iter().find(|w| w.mount() == mount)
    }

    pub fn filter(&self) -> FilterState {
        clone_filter(&self.store)
    }

    pub fn fragment(&self) -> String {
        self.history.lock().current().to_string()
    }

    pub async fn load(&self, fragment: &str) -> Result<RefreshOutcome> {
        let restored = FilterState::from_fragment(fragment);
        {
            let mut history = self.history.lock();
            self.store.set(FILTER_PATH, restored.to_json())?;
            *history = NavigationHistory::new(&restored.to_fragment());
        }
        log::info!("filter.restore fields={} fragment={}", restored.len(), fragment);
        self.filter_updated(&restored).await
    }

    pub async fn set_filter(&self, next: FilterState) -> Result<RefreshOutcome> {
        {
            let mut history = self.history.lock();
            self.store.set(FILTER_PATH, next.to_json())?;
            history.push(&next.to_fragment());
        }
        self.filter_updated(&next).await
    }

    pub async fn toggle_filter(&self, key: &str, value: FilterValue) -> Result<RefreshOutcome> {
        // The history lock spans read, write and push so concurrent toggles
        // compose instead of overwriting each other.
        let next = {
            let mut history = self.history.lock();
            let next = filter::toggle_filter(&self.store, key, value)?;
            history.push(&next.to_fragment());
            next
        };
        self.filter_updated(&next).await
    }

    pub fn update_hash(&self, fragment: &str) -> bool {
        self.history.lock().push(fragment)
    }

    pub async fn hash_changed(&self) -> Result<Option<RefreshOutcome>> {
        let derived = {
            let history = self.history.lock();
            let derived = history.current_filter();
            if derived == clone_filter(&self.store) {
                return Ok(None);
            }
            self.store.set(FILTER_PATH, derived.to_json())?;
            derived
        };
        self.filter_updated(&derived).await.map(Some)
    }

    pub async fn navigate(&self, fragment: &str) -> Result<Option<RefreshOutcome>> {
        if !self.update_hash(fragment) {
            return Ok(None);
        }
        self.hash_changed().await
    }

    pub async fn back(&self) -> Result<Option<RefreshOutcome>> {
        let moved = self.history.lock().back().is_some();
        if !moved {
            return Ok(None);
        }
        self.hash_changed().await
    }

    pub async fn forward(&self) -> Result<Option<RefreshOutcome>> {
        let moved = self.history.lock().forward().is_some();
        if !moved {
            return Ok(None);
        }
        self.hash_changed().await
    }

    pub async fn filter_by_date(&self, span: DateSpan) -> Result<Option<RefreshOutcome>> {
        let today = self.clock.today();
        log::info!("filter.date_span span={:?} today={}", span, today);
        let pushed = {
            let mut history = self.history.lock();
            let next = span.apply(&clone_filter(&self.store), today);
            history.push(&next.to_fragment())
        };
        if !pushed {
            return Ok(None);
        }
        self.hash_changed().await
    }

    pub async fn click(&self, mount: &str, element: &JsonValue) -> Result<Option<RefreshOutcome>> {
        let Some(event) = self.widget(mount).and_then(|w| w.click(element)) else {
            return Ok(None);
        };
        self.toggle_filter(&event.key, event.value).await.map(Some)
    }

    pub fn dispatch(self: &Arc<Self>, event: FilterEvent) -> JoinHandle<Result<RefreshOutcome>> {
        let this = Arc::clone(self);
        tokio::spawn(async move { this.toggle_filter(&event.key, event.value).await })
    }

    pub fn resize(&self) -> usize {
        self.widgets.iter().filter(|w| w.resize()).count()
    }

    async fn filter_updated(&self, filter: &FilterState) -> Result<RefreshOutcome> {
        match self.kind {
            DashboardKind::CallList => {
                self.store.set(PAGE_PATH, json!(1))?;
                self.reload_calls(filter, 1).await
            }
            _ => self.controller.filter_updated(filter).await,
        }
    }

    // Call list pagination

    pub fn page(&self) -> u64 {
        self.store
            .get(PAGE_PATH)
            .and_then(|v| v.as_u64())
            .unwrap_or(1)
    }

    pub fn per_page(&self) -> u64 {
        self.per_page
    }

    pub fn count(&self) -> u64 {
        self.store
            .get("data.calls.count")
            .and_then(|v| v.as_u64())
            .unwrap_or(0)
    }

    pub fn calls(&self) -> Vec<JsonValue> {
        match self.store.get("data.calls.results") {
            Some(JsonValue::Array(rows)) => rows,
            _ => Vec::new(),
        }
    }

    pub async fn click_field(&self, field: &str, value: &JsonValue) -> Result<Option<RefreshOutcome>> {
        let Some(value) = FilterValue::from_json(field, value) else {
            log::debug!("calls.click_ignored field={} value={}", field, value);
            return Ok(None);
        };
        self.toggle_filter(field, value).await.map(Some)
    }

    pub fn top_count(&self) -> u64 {
        self.count().min(self.page() * self.per_page)
    }

    pub fn max_page(&self) -> u64 {
        self.count().div_ceil(self.per_page)
    }

    pub async fn next_page(&self) -> Result<Option<RefreshOutcome>> {
        let page = self.page();
        if self.kind != DashboardKind::CallList || page >= self.max_page() {
            return Ok(None);
        }
        self.go_to_page(page + 1).await.map(Some)
    }

    pub async fn prev_page(&self) -> Result<Option<RefreshOutcome>> {
        let page = self.page();
        if self.kind != DashboardKind::CallList || page <= 1 {
            return Ok(None);
        }
        self.go_to_page(page - 1).await.map(Some)
    }

    async fn go_to_page(&self, page: u64) -> Result<RefreshOutcome> {
        self.store.set(PAGE_PATH, json!(page))?;
        log::info!("calls.page page={} max_page={}", page, self.max_page());
        self.reload_calls(&clone_filter(&self.store), page).await
    }

    async fn reload_calls(&self, filter: &FilterState, page: u64) -> Result<RefreshOutcome> {
        let query = filter.to_query_string();
        let query = if query.is_empty() {
            format!("page={page}")
        } else {
            format!("{query}&page={page}")
        };
        self.controller.refresh(query).await
    }

    pub fn state_json(&self) -> JsonValue {
        let (fragment, can_back, can_forward) = {
            let h = self.history.lock();
            (h.current().to_string(), h.can_go_back(), h.can_go_forward())
        };
        let mut state = json!({
            "id": self.id.to_string(),
            "kind": self.kind,
            "filter": self.filter().to_json(),
            "fragment": fragment,
            "loading": self.store.get_bool(LOADING_PATH),
            "initialLoad": self.store.get_bool(INITIAL_LOAD_PATH),
            "can_go_back": can_back,
            "can_go_forward": can_forward,
        });
        if self.kind == DashboardKind::CallList {
            state["pagination"] = json!({
                "page": self.page(),
                "per_page": self.per_page,
                "count": self.count(),
                "top_count": self.top_count(),
                "max_page": self.max_page(),
            });
            state["calls"] = JsonValue::Array(self.calls());
        }
        state
    }
}

fn bind(store: &DashboardStore, path: &str, widget: ChartWidget) -> Arc<ChartWidget> {
    let widget = Arc::new(widget);
    let w = widget.clone();
    monitor_chart(store, path, move |v| {
        if !v.is_null() {
            w.render(v);
        }
    });
    widget
}

fn mount_widgets(
    kind: DashboardKind,
    site: &SiteConfig,
    store: &DashboardStore,
    surface: Arc<dyn ChartSurface>,
) -> Vec<Arc<ChartWidget>> {
    let mut widgets = Vec::new();
    match kind {
        DashboardKind::CallVolume => {
            widgets.push(bind(
                store,
                "data.volume_by_dow",
                ChartWidget::horizontal_bar("#volume-by-dow", "dow_received", 1.5, surface.clone()),
            ));
            if site.use_shift {
                widgets.push(bind(
                    store,
                    "data.volume_by_shift",
                    ChartWidget::horizontal_bar("#volume-by-shift", "shift", 2.5, surface.clone()),
                ));
            }
            if site.use_nature_group {
                widgets.push(bind(
                    store,
                    "data.volume_by_nature_group",
                    ChartWidget::discrete_bar(
                        "#volume-by-nature",
                        "nature__nature_group",
                        2.0,
                        surface.clone(),
                    ),
                ));
            } else if site.use_nature {
                widgets.push(bind(
                    store,
                    "data.volume_by_nature",
                    ChartWidget::discrete_bar("#volume-by-nature", "nature", 2.0, surface.clone()),
                ));
            }
            if site.use_call_source {
                widgets.push(bind(
                    store,
                    "data.volume_by_source",
                    ChartWidget::horizontal_bar(
                        "#volume-by-source",
                        "initiated_by",
                        2.5,
                        surface.clone(),
                    ),
                ));
            }
            if let Some(region) = site.region_mode() {
                widgets.push(bind(
                    store,
                    "data.map_data",
                    ChartWidget::region_map("#map", region, surface.clone()),
                ));
            }
            widgets.push(bind(
                store,
                "data.heatmap",
                ChartWidget::heatmap("#heatmap", surface.clone()),
            ));

            // Precision is observed first so the axis format is in place
            // before the series it belongs to is drawn.
            let line = Arc::new(ChartWidget::line("#volume-by-date", 2.5, surface));
            let l = line.clone();
            monitor_chart(store, "data.precision", move |p| {
                let fmt = time_axis_format(p.as_str().unwrap_or("day"));
                l.set_view("x_tick_format", json!(fmt));
            });
            let l = line.clone();
            monitor_chart(store, "data.volume_by_date", move |v| {
                if !v.is_null() {
                    l.render(v);
                }
            });
            widgets.push(line);
        }
        DashboardKind::OfficerAllocation => {
            widgets.push(bind(
                store,
                "data.allocation_over_time",
                ChartWidget::stacked_area("#allocation-over-time", 2.0, surface.clone()),
            ));
            widgets.push(bind(
                store,
                "data.on_duty_by_beat",
                ChartWidget::horizontal_bar(
                    "#on-duty-by-beat",
                    "call_unit__beat",
                    1.0,
                    surface.clone(),
                )
                .with_colors(beat_color),
            ));
            widgets.push(bind(
                store,
                "data.on_duty_by_district",
                ChartWidget::horizontal_bar(
                    "#on-duty-by-district",
                    "call_unit__district",
                    1.0,
                    surface,
                )
                .with_colors(district_color),
            ));
        }
        DashboardKind::CallList => {}
    }
    widgets
}
