//! Wizard modules — one guided task per module, each registering its
//! states and dispatch routes with the router.

pub mod charts;
pub mod crosstab;
pub mod hypothesis;
pub mod labels;
pub mod main_menu;
pub mod manuscript;
pub mod projects;
pub mod regression;
pub mod reliability;
pub mod sampling;
pub mod signup;

use std::path::PathBuf;
use std::sync::Arc;

use crate::context::AnalysisRecord;
use crate::engine::router::{TurnContext, Wizard};
use crate::error::EngineError;

/// Every wizard, in registration order.
pub fn all() -> Vec<Arc<dyn Wizard>> {
    vec![
        Arc::new(signup::SignupWizard),
        Arc::new(main_menu::MainMenuWizard),
        Arc::new(hypothesis::HypothesisWizard),
        Arc::new(regression::RegressionWizard),
        Arc::new(crosstab::CrosstabWizard),
        Arc::new(reliability::ReliabilityWizard),
        Arc::new(sampling::SamplingWizard),
        Arc::new(charts::ChartsWizard),
        Arc::new(manuscript::ManuscriptWizard),
        Arc::new(projects::ProjectsWizard),
    ]
}

/// Write the most recent analysis record as a two-column CSV export.
pub(crate) async fn export_record_csv(
    record: &AnalysisRecord,
    ctx: &TurnContext<'_>,
) -> Result<PathBuf, EngineError> {
    let dir = ctx.deps.config.data_dir.join("exports");
    tokio::fs::create_dir_all(&dir)
        .await
        .map_err(|e| EngineError::Document(crate::error::DocumentError::Io(e)))?;

    let mut out = String::from("field,value\n");
    out.push_str(&format!("test,{}\n", record.test_name));
    out.push_str(&format!("variables,\"{}\"\n", record.variables));
    if let Ok(serde_json::Value::Object(fields)) = serde_json::to_value(&record.outcome) {
        for (key, value) in fields {
            if key == "kind" {
                continue;
            }
            let rendered = match value {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            };
            out.push_str(&format!("{},\"{}\"\n", key, rendered.replace('"', "'")));
        }
    }

    let path = dir.join(format!("export_{}.csv", uuid::Uuid::new_v4()));
    tokio::fs::write(&path, out)
        .await
        .map_err(|e| EngineError::Document(crate::error::DocumentError::Io(e)))?;
    Ok(path)
}
