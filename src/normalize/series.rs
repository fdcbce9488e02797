use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesGroup<P> {
    pub key: String,
    pub values: Vec<P>,
}

pub type Series<P> = Vec<SeriesGroup<P>>;

impl<P> SeriesGroup<P> {
    pub fn new(key: &str, values: Vec<P>) -> Self {
        Self {
            key: key.to_string(),
            values,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct XyPoint {
    pub x: i64,
    pub y: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryPoint {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub name: String,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeatCell {
    pub day: u8,
    pub hour: u8,
    pub value: Option<f64>,
}

impl HeatCell {
    pub fn ordinal(&self) -> u32 {
        self.day as u32 * 24 + self.hour as u32
    }
}
