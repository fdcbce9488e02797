pub mod chart;
pub mod surface;

use crate::filter::FilterValue;

pub use chart::{beat_color, district_color, time_axis_format, ChartWidget, StackStyle};
pub use surface::{ChartFrame, ChartKind, ChartSurface, RecordingSurface};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterEvent {
    pub key: String,
    pub value: FilterValue,
}
