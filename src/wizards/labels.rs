//! Fixed menu labels shared across wizards and the router.

pub const MAIN_MENU: &str = "🏠 Main Menu";
pub const BACK_TO_MENU: &str = "◀️ Back to Menu";
pub const BACK: &str = "◀️ Back";
pub const CANCEL: &str = "❌ Cancel";
pub const DONE_SELECTING: &str = "✅ Done Selecting";

// Main menu actions.
pub const ANALYSE_DATA: &str = "📊 Analyse Data (Upload File)";
pub const SAMPLE_SIZE: &str = "🔢 Calculate Sample Size";
pub const DESCRIPTIVE: &str = "📉 Descriptive Stats";
pub const HYPOTHESIS: &str = "🆚 Hypothesis Tests";
pub const REGRESSION: &str = "🔗 Regression";
pub const CROSSTAB: &str = "📋 Crosstab";
pub const RELIABILITY: &str = "🛡️ Reliability";
pub const VISUALS: &str = "📊 Create Visuals";
pub const AI_CHAT: &str = "💬 AI Chat";
pub const REPORT: &str = "📄 Generate Report";
pub const PROJECTS: &str = "📁 My Projects";
pub const SAVE_EXIT: &str = "💾 Save & Exit";
pub const EXIT_CHAT: &str = "Exit Chat";

// Post-analysis actions.
pub const RUN_ANOTHER: &str = "📊 Run Another Analysis";
pub const FINISH: &str = "✅ Finish";
pub const EXPORT_CSV: &str = "📥 Export to CSV";

// Shared wizard controls.
pub const PROCEED: &str = "✅ Proceed";
pub const CANCEL_ANALYSIS: &str = "❌ Cancel Analysis";
pub const SKIP: &str = "⏭️ Skip";
