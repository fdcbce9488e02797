use serde_json::Value as JsonValue;

use crate::store::{DashboardStore, SubscriptionId};

pub fn is_renderable(v: &JsonValue) -> bool {
    match v {
        JsonValue::Null => false,
        JsonValue::Array(a) => !a.is_empty(),
        JsonValue::Object(o) => !o.is_empty(),
        JsonValue::String(s) => !s.is_empty(),
        _ => true,
    }
}

/// Subscribe `render` to `path`, replaying the current value first when it
/// is already renderable, so a chart mounted after data arrived still draws.
/// Afterwards `render` runs once per replacement of that slot.
pub fn monitor_chart<F>(store: &DashboardStore, path: &str, render: F) -> SubscriptionId
where
    F: Fn(&JsonValue) + Send + Sync + 'static,
{
    if let Some(current) = store.get(path).filter(is_renderable) {
        log::debug!("monitor.replay path={}", path);
        render(&current);
    }
    store.observe(path, render)
}
