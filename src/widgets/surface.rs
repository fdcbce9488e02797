use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value as JsonValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChartKind {
    HorizontalBar,
    DiscreteBar,
    Line,
    StackedArea,
    Heatmap,
    RegionMap,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartFrame {
    pub mount: String,
    pub kind: ChartKind,
    pub width: u32,
    pub height: u32,
    pub options: JsonValue,
    pub series: JsonValue,
}

pub trait ChartSurface: Send + Sync {
    fn measure(&self, mount: &str) -> u32;

    fn draw(&self, frame: &ChartFrame);
}

pub struct RecordingSurface {
    default_width: u32,
    widths: Mutex<HashMap<String, u32>>,
    frames: Mutex<BTreeMap<String, ChartFrame>>,
    draws: AtomicUsize,
}

impl RecordingSurface {
    pub fn new(default_width: u32) -> Self {
        Self {
            default_width,
            widths: Mutex::new(HashMap::new()),
            frames: Mutex::new(BTreeMap::new()),
            draws: AtomicUsize::new(0),
        }
    }

    pub fn set_width(&self, mount: &str, width: u32) {
        self.widths.lock().insert(mount.to_string(), width);
    }

    pub fn frame(&self, mount: &str) -> Option<ChartFrame> {
        self.frames.lock().get(mount).cloned()
    }

    pub fn frames(&self) -> Vec<ChartFrame> {
        self.frames.lock().values().cloned().collect()
    }

    pub fn draw_count(&self) -> usize {
        self.draws.load(Ordering::SeqCst)
    }
}

impl Default for RecordingSurface {
    fn default() -> Self {
        Self::new(960)
    }
}

impl ChartSurface for RecordingSurface {
    fn measure(&self, mount: &str) -> u32 {
        self.widths
            .lock()
            .get(mount)
            .copied()
            .unwrap_or(self.default_width)
    }

    fn draw(&self, frame: &ChartFrame) {
        self.draws.fetch_add(1, Ordering::SeqCst);
        self.frames.lock().insert(frame.mount.clone(), frame.clone());
    }
}
