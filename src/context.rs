//! Per-session context store — scalars, accumulators, sticky flags, and
//! the append-only analysis/visual logs.
//!
//! Every wizard reads and writes through this type. Serialization must be
//! lossless: a saved project restores accumulator order, history order,
//! and scalar selections exactly.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::collab::stats::AnalysisOutcome;

/// Prefix shared by every sticky flag.
pub const STICKY_PREFIX: &str = "awaiting_";

/// Well-known context keys shared across wizards.
pub mod keys {
    pub const DATASET_PATH: &str = "dataset_path";
    pub const SCHEMA: &str = "schema_json";
    pub const RESEARCH_TITLE: &str = "research_title";
    pub const RESEARCH_OBJECTIVES: &str = "research_objectives";
    pub const RESEARCH_QUESTIONS: &str = "research_questions";
    pub const RESEARCH_HYPOTHESES: &str = "research_hypotheses";
    pub const CHAT_MODE: &str = "chat_mode";
}

/// One completed analysis, as consumed by the report generator and by
/// conversational follow-ups. `outcome` keeps the typed result; `summary`
/// is the human text that was shown when the analysis ran.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRecord {
    pub test_name: String,
    pub variables: String,
    pub summary: String,
    pub outcome: AnalysisOutcome,
}

/// One generated chart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisualRecord {
    /// Path of the rendered file, relative to the data directory.
    pub file: String,
    pub title: String,
    pub kind: String,
    /// Underlying data, kept for report embedding.
    pub data: serde_json::Value,
}

/// The per-session key/value state.
///
/// Invariants:
/// - at most one sticky flag is set at any time;
/// - accumulators are deduplicated and keep first-selection order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionContext {
    scalars: BTreeMap<String, String>,
    flags: BTreeMap<String, bool>,
    accumulators: BTreeMap<String, Vec<String>>,
    sticky: Option<String>,
    pub history: Vec<AnalysisRecord>,
    pub visuals: Vec<VisualRecord>,
}

impl SessionContext {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Scalars ─────────────────────────────────────────────────────

    pub fn get(&self, key: &str) -> Option<&str> {
        self.scalars.get(key).map(String::as_str)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.scalars.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.scalars.remove(key)
    }

    // ── Boolean flags (non-routing, e.g. chat mode, display toggles) ──

    pub fn flag(&self, key: &str) -> bool {
        self.flags.get(key).copied().unwrap_or(false)
    }

    pub fn set_flag(&mut self, key: impl Into<String>, value: bool) {
        self.flags.insert(key.into(), value);
    }

    pub fn toggle_flag(&mut self, key: &str) -> bool {
        let next = !self.flag(key);
        self.flags.insert(key.to_string(), next);
        next
    }

    // ── Sticky flags ────────────────────────────────────────────────

    /// Set the sticky flag that will capture the next turn. Replaces any
    /// previous flag so the single-flag invariant holds by construction.
    pub fn set_sticky(&mut self, flag: impl Into<String>) {
        let flag = flag.into();
        debug_assert!(flag.starts_with(STICKY_PREFIX), "sticky flags use the {STICKY_PREFIX} prefix");
        self.sticky = Some(flag);
    }

    pub fn sticky(&self) -> Option<&str> {
        self.sticky.as_deref()
    }

    /// Consume the sticky flag. Routing calls this exactly once per
    /// captured turn.
    pub fn take_sticky(&mut self) -> Option<String> {
        self.sticky.take()
    }

    pub fn clear_sticky(&mut self) {
        self.sticky = None;
    }

    // ── Accumulators ────────────────────────────────────────────────

    /// Add `item` to the accumulator under `key`. Returns false if the
    /// item was already selected (the accumulator is unchanged).
    pub fn select(&mut self, key: &str, item: impl Into<String>) -> bool {
        let item = item.into();
        let entries = self.accumulators.entry(key.to_string()).or_default();
        if entries.contains(&item) {
            return false;
        }
        entries.push(item);
        true
    }

    pub fn accumulator(&self, key: &str) -> &[String] {
        self.accumulators.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Consume an accumulator on its "done" signal.
    pub fn take_accumulator(&mut self, key: &str) -> Vec<String> {
        self.accumulators.remove(key).unwrap_or_default()
    }

    pub fn clear_accumulator(&mut self, key: &str) {
        self.accumulators.remove(key);
    }

    // ── Logs ────────────────────────────────────────────────────────

    pub fn push_history(&mut self, record: AnalysisRecord) {
        self.history.push(record);
    }

    pub fn push_visual(&mut self, record: VisualRecord) {
        self.visuals.push(record);
    }

    // ── Bulk resets ─────────────────────────────────────────────────

    /// Remove every scalar and flag whose key starts with `prefix`.
    pub fn clear_prefix(&mut self, prefix: &str) {
        self.scalars.retain(|k, _| !k.starts_with(prefix));
        self.flags.retain(|k, _| !k.starts_with(prefix));
        if self.sticky.as_deref().is_some_and(|f| f.starts_with(prefix)) {
            self.sticky = None;
        }
    }

    /// Drop the sticky flag and all accumulators. Called on every hub
    /// entry, on wizard entry, and on global cancel, so selection state
    /// never leaks from one wizard into another.
    pub fn reset_transient(&mut self) {
        self.sticky = None;
        self.accumulators.clear();
        self.flags.retain(|k, _| !k.starts_with("opt_"));
        self.set_flag(keys::CHAT_MODE, false);
    }

    // ── Snapshots ───────────────────────────────────────────────────

    pub fn to_snapshot(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(self)
    }

    pub fn from_snapshot(value: &serde_json::Value) -> serde_json::Result<Self> {
        serde_json::from_value(value.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accumulator_dedups_and_keeps_order() {
        let mut ctx = SessionContext::new();
        assert!(ctx.select("predictors", "Age"));
        assert!(ctx.select("predictors", "Income"));
        assert!(!ctx.select("predictors", "Age"));
        assert_eq!(ctx.accumulator("predictors"), ["Age", "Income"]);
    }

    #[test]
    fn at_most_one_sticky_flag() {
        let mut ctx = SessionContext::new();
        ctx.set_sticky("awaiting_chart_title");
        ctx.set_sticky("awaiting_word_count");
        assert_eq!(ctx.sticky(), Some("awaiting_word_count"));
        assert_eq!(ctx.take_sticky().as_deref(), Some("awaiting_word_count"));
        assert_eq!(ctx.sticky(), None);
    }

    #[test]
    fn reset_transient_clears_flags_and_accumulators() {
        let mut ctx = SessionContext::new();
        ctx.set_sticky("awaiting_chart_title");
        ctx.select("rel_items", "Q1");
        ctx.set_flag("chat_mode", true);
        ctx.set_flag("opt_row_pct", true);
        ctx.set("research_title", "Kept");

        ctx.reset_transient();

        assert_eq!(ctx.sticky(), None);
        assert!(ctx.accumulator("rel_items").is_empty());
        assert!(!ctx.flag("chat_mode"));
        assert!(!ctx.flag("opt_row_pct"));
        assert_eq!(ctx.get("research_title"), Some("Kept"));
    }

    #[test]
    fn clear_prefix_hits_scalars_flags_and_sticky() {
        let mut ctx = SessionContext::new();
        ctx.set("awaiting_param", "population");
        ctx.set_flag("awaiting_legacy", true);
        ctx.set_sticky("awaiting_chart_title");
        ctx.set("goal", "compare");

        ctx.clear_prefix(STICKY_PREFIX);

        assert_eq!(ctx.get("awaiting_param"), None);
        assert!(!ctx.flag("awaiting_legacy"));
        assert_eq!(ctx.sticky(), None);
        assert_eq!(ctx.get("goal"), Some("compare"));
    }

    #[test]
    fn snapshot_roundtrip_is_lossless() {
        let mut ctx = SessionContext::new();
        ctx.set("research_title", "Impact of X on Y");
        ctx.set("confidence", "95%");
        ctx.select("predictors", "Age");
        ctx.select("predictors", "Income");
        ctx.push_history(AnalysisRecord {
            test_name: "Independent T-Test".into(),
            variables: "Score by Gender".into(),
            summary: "t = 2.1, p = 0.04".into(),
            outcome: AnalysisOutcome::TwoGroup {
                groups: vec!["M".into(), "F".into()],
                t: 2.1,
                p: 0.04,
                cohen_d: 0.5,
                means: vec![70.0, 65.0],
            },
        });
        ctx.push_visual(VisualRecord {
            file: "charts/score_hist.png".into(),
            title: "Score distribution".into(),
            kind: "histogram".into(),
            data: serde_json::json!({"column": "Score"}),
        });

        let snap = ctx.to_snapshot().unwrap();
        let restored = SessionContext::from_snapshot(&snap).unwrap();
        assert_eq!(restored, ctx);

        // Byte-for-byte: re-serializing the restored context matches.
        assert_eq!(
            serde_json::to_string(&restored).unwrap(),
            serde_json::to_string(&ctx).unwrap()
        );
    }
}
