//! Engine states — the nodes of the conversation graph.

use serde::{Deserialize, Serialize};

/// Every conversational state the router can dispatch on.
///
/// Most states are transient and revisited many times per session. The
/// graph cycles back through the hub states (`MainMenu`, `PostAnalysis`);
/// only `Cancelled` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineState {
    // Signup — required before any analysis wizard is reachable.
    SignupName,
    SignupEmail,
    SignupPhone,
    SignupCountry,

    // Hubs.
    MainMenu,
    PostAnalysis,

    // Dataset upload.
    AwaitingUpload,

    // Guided hypothesis test.
    TestSelect,
    TestGuide,
    GroupVarSelect,
    MeasureVarSelect,
    ExportOffer,

    // Guided regression.
    OutcomeSelect,
    PredictorSelect,

    // Guided crosstab.
    CrosstabRows,
    CrosstabCols,
    CrosstabOptions,

    // Reliability analysis.
    ReliabilityItems,

    // Sample-size calculator.
    SamplingMode,
    StudyTypeSelect,
    MethodSelect,
    PopulationCheck,
    ConfidenceSelect,
    ParamInput,

    // Chart builder.
    ChartKind,
    ChartColumn,

    // Manuscript formatting.
    ManuscriptStructure,
    ManuscriptFont,
    ManuscriptSpacing,
    ManuscriptCitation,
    ManuscriptLength,
    ManuscriptConfirm,

    // Projects.
    ProjectsMenu,
    SaveTitle,
    SaveObjectives,
    SaveQuestions,
    SaveHypotheses,

    // Terminal.
    Cancelled,
}

impl EngineState {
    /// Hub states are safe recovery targets: frequently revisited, always
    /// routable, and entering one clears all sticky flags.
    pub fn is_hub(&self) -> bool {
        matches!(self, Self::MainMenu | Self::PostAnalysis)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Whether this state belongs to the signup flow.
    pub fn is_signup(&self) -> bool {
        matches!(
            self,
            Self::SignupName | Self::SignupEmail | Self::SignupPhone | Self::SignupCountry
        )
    }
}

impl std::fmt::Display for EngineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // serde's snake_case rename is the canonical spelling; reuse it so
        // logs and the database agree.
        let json = serde_json::to_string(self).map_err(|_| std::fmt::Error)?;
        write!(f, "{}", json.trim_matches('"'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_matches_serde() {
        let states = [
            EngineState::MainMenu,
            EngineState::GroupVarSelect,
            EngineState::ManuscriptConfirm,
            EngineState::Cancelled,
        ];
        for state in states {
            let display = format!("{state}");
            let json = serde_json::to_string(&state).unwrap();
            assert_eq!(format!("\"{display}\""), json);
        }
    }

    #[test]
    fn hub_and_terminal_classification() {
        assert!(EngineState::MainMenu.is_hub());
        assert!(EngineState::PostAnalysis.is_hub());
        assert!(!EngineState::GroupVarSelect.is_hub());
        assert!(EngineState::Cancelled.is_terminal());
        assert!(!EngineState::MainMenu.is_terminal());
    }

    #[test]
    fn serde_roundtrip() {
        let state = EngineState::PredictorSelect;
        let json = serde_json::to_string(&state).unwrap();
        assert_eq!(json, "\"predictor_select\"");
        let parsed: EngineState = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, state);
    }
}
