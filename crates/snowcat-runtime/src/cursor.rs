//! The per-(stage, stream) cursor blob (spec.md §4.5 step 4): absolute
//! read position, the buffered-window cache, and stage-local scratch
//! state (`extra`, mirroring `original_source`'s `self.s`).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cursor {
    pub idx: u64,
    pub last_save_ts: f64,
    pub loop_flag: bool,
    pub buffer_chunk: u32,
    pub buffer_window_offset: Option<u64>,
    pub buffer_contents: Option<Vec<Vec<u8>>>,
    #[serde(default)]
    pub extra: serde_json::Value,
}

impl Cursor {
    /// A freshly-initialized cursor with the stage's own `cursor_defaults()`
    /// folded into `extra`.
    pub fn fresh(extra: serde_json::Value) -> Self {
        Self {
            idx: 0,
            last_save_ts: 0.0,
            loop_flag: true,
            buffer_chunk: 0,
            buffer_window_offset: None,
            buffer_contents: None,
            extra,
        }
    }
}

impl Default for Cursor {
    fn default() -> Self {
        Self::fresh(serde_json::json!({}))
    }
}

pub fn now_secs() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}
