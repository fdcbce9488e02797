pub mod call_list;
pub mod call_volume;
pub mod helpers;
pub mod officer_allocation;
pub mod series;

use std::sync::Arc;

use serde_json::Value as JsonValue;

use crate::config::Settings;
use crate::dashboard::DashboardKind;
use crate::error::Result;

pub use call_list::CallListNormalizer;
pub use call_volume::CallVolumeNormalizer;
pub use officer_allocation::OfficerAllocationNormalizer;

pub trait Normalizer: Send + Sync {
    fn name(&self) -> &'static str;

    fn initial_data(&self) -> JsonValue;

    fn normalize(&self, raw: &JsonValue) -> Result<JsonValue>;
}

pub fn for_settings(settings: &Settings) -> Arc<dyn Normalizer> {
    match settings.kind {
        DashboardKind::CallVolume => Arc::new(CallVolumeNormalizer::new(
            settings.site.region_mode(),
            settings.heatmap_grid,
        )),
        DashboardKind::OfficerAllocation => Arc::new(OfficerAllocationNormalizer),
        DashboardKind::CallList => Arc::new(CallListNormalizer),
    }
}
