use serde_json::{json, Value as JsonValue};

use crate::error::{DashboardError, Result};

use super::Normalizer;

pub struct CallListNormalizer;

impl Normalizer for CallListNormalizer {
    fn name(&self) -> &'static str {
        "call_list"
    }

    fn initial_data(&self) -> JsonValue {
        json!({ "calls": {} })
    }

    fn normalize(&self, raw: &JsonValue) -> Result<JsonValue> {
        if !raw.get("count").is_some_and(JsonValue::is_u64) {
            return Err(DashboardError::shape("count", "missing or not a count"));
        }
        Ok(json!({ "calls": raw }))
    }
}
