use std::collections::BTreeSet;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value as JsonValue};

use crate::config::RegionMode;
use crate::filter::FilterValue;

use super::surface::{ChartFrame, ChartKind, ChartSurface};
use super::FilterEvent;

pub const DISTRICT_COLORS: [(&str, &str); 5] = [
    ("1", "#9edae5"),
    ("2", "#17becf"),
    ("3", "#dbdb8d"),
    ("4", "#bcbd22"),
    ("5", "#c7c7c7"),
];

const BLUES_5: [&str; 5] = ["#eff3ff", "#bdd7e7", "#6baed6", "#3182bd", "#08519c"];

pub type ColorFn = fn(&str) -> Option<&'static str>;

fn palette(digit: &str) -> Option<&'static str> {
    DISTRICT_COLORS
        .iter()
        .find(|(d, _)| *d == digit)
        .map(|(_, c)| *c)
}

pub fn beat_color(label: &str) -> Option<&'static str> {
    palette(label.get(..1)?)
}

pub fn district_color(label: &str) -> Option<&'static str> {
    palette(label.get(1..2)?)
}

pub fn time_axis_format(precision: &str) -> &'static str {
    match precision {
        "month" => "%b %Y",
        "week" => "%m/%d/%y",
        "hour" => "%m/%d %H:%M",
        _ => "%a %m/%d",
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StackStyle {
    Stacked,
    Expanded,
}

impl StackStyle {
    pub fn as_str(&self) -> &'static str {
        match self {
            StackStyle::Stacked => "stacked",
            StackStyle::Expanded => "expanded",
        }
    }
}

#[derive(Default)]
struct WidgetState {
    series: Option<JsonValue>,
    view: Map<String, JsonValue>,
    hidden: BTreeSet<String>,
    last_frame: Option<ChartFrame>,
}

pub struct ChartWidget {
    mount: String,
    kind: ChartKind,
    ratio: f64,
    filter_key: Option<String>,
    legend_toggles: bool,
    color_by: Option<ColorFn>,
    options: Map<String, JsonValue>,
    surface: Arc<dyn ChartSurface>,
    state: Mutex<WidgetState>,
}

impl ChartWidget {
    fn new(mount: &str, kind: ChartKind, ratio: f64, surface: Arc<dyn ChartSurface>) -> Self {
        Self {
            mount: mount.to_string(),
            kind,
            ratio,
            filter_key: None,
            legend_toggles: true,
            color_by: None,
            options: Map::new(),
            surface,
            state: Mutex::new(WidgetState::default()),
        }
    }

    pub fn horizontal_bar(
        mount: &str,
        filter_key: &str,
        ratio: f64,
        surface: Arc<dyn ChartSurface>,
    ) -> Self {
        let mut w = Self::new(mount, ChartKind::HorizontalBar, ratio, surface);
        w.filter_key = Some(filter_key.to_string());
        w.with_option("fmt", json!(",d"))
            .with_option("show_controls", json!(false))
            .with_option("show_legend", json!(false))
    }

    pub fn discrete_bar(
        mount: &str,
        filter_key: &str,
        ratio: f64,
        surface: Arc<dyn ChartSurface>,
    ) -> Self {
        let mut w = Self::new(mount, ChartKind::DiscreteBar, ratio, surface);
        w.filter_key = Some(filter_key.to_string());
        w.with_option("fmt", json!(",d"))
            .with_option("rotate_labels", json!(true))
    }

    pub fn line(mount: &str, ratio: f64, surface: Arc<dyn ChartSurface>) -> Self {
        Self::new(mount, ChartKind::Line, ratio, surface)
            .with_option("force_y", json!([0]))
            .with_option("show_legend", json!(false))
            .with_option("interactive_guideline", json!(true))
            .with_option("y_axis_label", json!("Volume"))
            .with_option("x_tick_format", json!(time_axis_format("day")))
    }

    pub fn stacked_area(mount: &str, ratio: f64, surface: Arc<dyn ChartSurface>) -> Self {
        let mut w = Self::new(mount, ChartKind::StackedArea, ratio, surface)
            .with_option("force_y", json!([0]))
            .with_option("interactive_guideline", json!(true))
            .with_option("controls", json!(["Stacked", "Expanded"]))
            .with_option("legend_toggles", json!(false))
            .with_option("x_axis_label", json!("Time"))
            .with_option("x_tick_format", json!("%X"))
            .with_option("y_axis_label", json!("Average Officers Allocated"));
        w.legend_toggles = false;
        w.state
            .lock()
            .view
            .insert("style".to_string(), json!(StackStyle::Stacked.as_str()));
        w
    }

    pub fn heatmap(mount: &str, surface: Arc<dyn ChartSurface>) -> Self {
        Self::new(mount, ChartKind::Heatmap, 3.0, surface)
            .with_option("colors", json!(BLUES_5))
            .with_option("measure_name", json!("calls"))
    }

    pub fn region_map(mount: &str, region: RegionMode, surface: Arc<dyn ChartSurface>) -> Self {
        let mut w = Self::new(mount, ChartKind::RegionMap, 1.0, surface);
        w.filter_key = Some(region.as_str().to_string());
        w.with_option("region", json!(region.as_str()))
            .with_option("color_scheme", json!("Blues"))
            .with_option("data_descr", json!("Call Volume"))
    }

    pub fn with_option(mut self, key: &str, value: JsonValue) -> Self {
        self.options.insert(key.to_string(), value);
        self
    }

    pub fn with_colors(mut self, color_by: ColorFn) -> Self {
        self.color_by = Some(color_by);
        self
    }

    pub fn mount(&self) -> &str {
        &self.mount
    }

    pub fn kind(&self) -> ChartKind {
        self.kind
    }

    pub fn filter_key(&self) -> Option<&str> {
        self.filter_key.as_deref()
    }

    pub fn last_frame(&self) -> Option<ChartFrame> {
        self.state.lock().last_frame.clone()
    }

    pub fn render(&self, series: &JsonValue) {
        let mut st = self.state.lock();
        st.series = Some(series.clone());
        self.draw_locked(&mut st);
    }

    pub fn resize(&self) -> bool {
        let mut st = self.state.lock();
        self.draw_locked(&mut st)
    }

    pub fn set_view(&self, key: &str, value: JsonValue) {
        self.state.lock().view.insert(key.to_string(), value);
    }

    pub fn set_stack_style(&self, style: StackStyle) -> bool {
        if self.kind != ChartKind::StackedArea {
            return false;
        }
        let mut st = self.state.lock();
        st.view.insert("style".to_string(), json!(style.as_str()));
        self.draw_locked(&mut st);
        true
    }

    pub fn toggle_legend(&self, series_key: &str) -> bool {
        if !self.legend_toggles {
            log::debug!("widget.legend_ignored mount={} key={}", self.mount, series_key);
            return false;
        }
        let mut st = self.state.lock();
        if !st.hidden.remove(series_key) {
            st.hidden.insert(series_key.to_string());
        }
        self.draw_locked(&mut st);
        true
    }

    pub fn click(&self, element: &JsonValue) -> Option<FilterEvent> {
        let key = self.filter_key.as_ref()?;
        let id = element.get("id").and_then(JsonValue::as_i64)?;
        Some(FilterEvent {
            key: key.clone(),
            value: FilterValue::Id(id),
        })
    }

    fn draw_locked(&self, st: &mut WidgetState) -> bool {
        let Some(series) = st.series.as_ref() else {
            return false;
        };
        let width = self.surface.measure(&self.mount);
        if width == 0 {
            log::debug!("widget.skip mount={} width=0", self.mount);
            return false;
        }
        let height = (width as f64 / self.ratio).ceil() as u32;

        let mut options = self.options.clone();
        for (k, v) in &st.view {
            options.insert(k.clone(), v.clone());
        }
        if let Some(key) = &self.filter_key {
            options.insert("filter_key".to_string(), json!(key));
        }
        if !st.hidden.is_empty() {
            options.insert("hidden_series".to_string(), json!(st.hidden));
        }
        if let Some(color_by) = self.color_by {
            options.insert("bar_colors".to_string(), bar_colors(series, color_by));
        }

        let frame = ChartFrame {
            mount: self.mount.clone(),
            kind: self.kind,
            width,
            height,
            options: JsonValue::Object(options),
            series: series.clone(),
        };
        if st.last_frame.as_ref() == Some(&frame) {
            return false;
        }
        self.surface.draw(&frame);
        st.last_frame = Some(frame);
        true
    }
}

fn bar_colors(series: &JsonValue, color_by: ColorFn) -> JsonValue {
    let mut colors = Map::new();
    let groups = series.as_array().map(Vec::as_slice).unwrap_or_default();
    for group in groups {
        let values = group
            .get("values")
            .and_then(JsonValue::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();
        for v in values {
            if let Some(name) = v.get("name").and_then(JsonValue::as_str) {
                if let Some(c) = color_by(name) {
                    colors.insert(name.to_string(), json!(c));
                }
            }
        }
    }
    JsonValue::Object(colors)
}
