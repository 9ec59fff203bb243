//! End-to-end conversation flows through the state router, with an
//! in-memory store, a real CSV loader and stats engine, and stubbed
//! chart/LLM collaborators.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;

use quantabot::collab::charts::{ChartEngine, ChartSpec, RenderedChart};
use quantabot::collab::dataset::Dataset;
use quantabot::collab::{BuiltinStatsEngine, CsvDatasetLoader, MarkdownDocumentEngine};
use quantabot::config::EngineConfig;
use quantabot::engine::menu::MenuBuilder;
use quantabot::engine::router::{EngineDeps, StateRouter, WizardRegistry};
use quantabot::engine::state::EngineState;
use quantabot::engine::turn::TurnReply;
use quantabot::error::ChartError;
use quantabot::llm::Interpreter;
use quantabot::store::{LibSqlBackend, ProjectStore};
use quantabot::wizards;

/// Chart engine double — records the spec and writes an empty file.
struct StubChartEngine;

#[async_trait]
impl ChartEngine for StubChartEngine {
    async fn render(
        &self,
        _ds: &Dataset,
        spec: &ChartSpec,
        title: Option<&str>,
        out_dir: &Path,
    ) -> Result<RenderedChart, ChartError> {
        tokio::fs::create_dir_all(out_dir).await?;
        let path = out_dir.join(format!("{}_{}.png", spec.kind(), uuid::Uuid::new_v4()));
        tokio::fs::write(&path, b"png").await?;
        Ok(RenderedChart {
            path,
            title: title
                .map(str::to_string)
                .unwrap_or_else(|| spec.default_title()),
            kind: spec.kind().to_string(),
        })
    }
}

struct Harness {
    router: Arc<StateRouter>,
    _dir: tempfile::TempDir,
    data_dir: PathBuf,
}

async fn harness() -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let data_dir = dir.path().to_path_buf();
    let config = EngineConfig {
        data_dir: data_dir.clone(),
        ..Default::default()
    };
    let store: Arc<dyn ProjectStore> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
    let deps = Arc::new(EngineDeps {
        config,
        store,
        datasets: Arc::new(CsvDatasetLoader::new()),
        stats: Arc::new(BuiltinStatsEngine::new()),
        charts: Arc::new(StubChartEngine),
        documents: Arc::new(MarkdownDocumentEngine::new()),
        interpreter: Arc::new(Interpreter::offline()),
        menu: MenuBuilder::default(),
    });
    Harness {
        router: Arc::new(StateRouter::new(deps)),
        data_dir,
        _dir: dir,
    }
}

impl Harness {
    async fn send(&self, user: &str, text: &str) -> TurnReply {
        self.router.handle_turn(user, text).await
    }

    async fn signup(&self, user: &str) {
        self.send(user, "/start").await;
        self.send(user, "Ada Analyst").await;
        self.send(user, "ada@example.com").await;
        self.send(user, "+15550100").await;
        let reply = self.send(user, "Kenya").await;
        assert!(
            reply.text.contains("Registration complete"),
            "signup should finish: {}",
            reply.text
        );
    }

    fn write_csv(&self, name: &str, contents: &str) -> String {
        let path = self.data_dir.join(name);
        std::fs::write(&path, contents).unwrap();
        path.display().to_string()
    }

    async fn upload(&self, user: &str, name: &str, contents: &str) {
        let path = self.write_csv(name, contents);
        self.send(user, "📊 Analyse Data (Upload File)").await;
        let reply = self.send(user, &path).await;
        assert!(
            reply.text.contains("File loaded"),
            "upload should succeed: {}",
            reply.text
        );
    }

    async fn state_of(&self, user: &str) -> EngineState {
        self.router
            .sessions()
            .get(user)
            .await
            .expect("session exists")
            .lock()
            .await
            .state
    }

    async fn history_len(&self, user: &str) -> usize {
        self.router
            .sessions()
            .get(user)
            .await
            .expect("session exists")
            .lock()
            .await
            .context
            .history
            .len()
    }

    async fn sticky_of(&self, user: &str) -> Option<String> {
        self.router
            .sessions()
            .get(user)
            .await
            .expect("session exists")
            .lock()
            .await
            .context
            .sticky()
            .map(str::to_string)
    }
}

const GENDER_SCORE_CSV: &str =
    "Gender,Score\nM,70\nF,65\nM,80\nF,72\nM,68\nF,61\nM,75\nF,66\n";

#[tokio::test]
async fn signup_is_required_before_any_analysis() {
    let h = harness().await;
    let reply = h.send("u1", "🆚 Hypothesis Tests").await;
    assert!(reply.text.contains("full name"), "got: {}", reply.text);
    // Still gated on the next turn until the flow completes.
    h.send("u1", "Ada Analyst").await;
    h.send("u1", "ada@example.com").await;
    h.send("u1", "+15550100").await;
    let reply = h.send("u1", "Nigeria").await;
    assert!(reply.text.contains("NGN"));
    assert_eq!(h.state_of("u1").await, EngineState::MainMenu);
}

#[tokio::test]
async fn end_to_end_two_group_test_appends_history_and_offers_export() {
    let h = harness().await;
    h.signup("u1").await;
    h.upload("u1", "scores.csv", GENDER_SCORE_CSV).await;

    h.send("u1", "🆚 Hypothesis Tests").await;
    let guide = h.send("u1", "Independent T-Test (2 Groups)").await;
    assert!(guide.text.contains("Independent T-Test"));

    let group_prompt = h.send("u1", "✅ Proceed").await;
    assert!(group_prompt.text.contains("grouping variable"));

    // Engine detects exactly 2 groups and moves on to the measurement.
    let measure_prompt = h.send("u1", "Gender").await;
    assert!(measure_prompt.text.contains("measurement variable"));

    let result = h.send("u1", "Score").await;
    assert!(result.text.contains("T-Test Results"), "got: {}", result.text);
    assert!(result.text.contains("Export this result?"));
    assert_eq!(h.history_len("u1").await, 1);
    assert_eq!(h.state_of("u1").await, EngineState::ExportOffer);

    let exported = h.send("u1", "📥 Export to CSV").await;
    assert_eq!(exported.attachments.len(), 1);
    assert!(exported.attachments[0].exists());
    assert_eq!(h.state_of("u1").await, EngineState::PostAnalysis);
}

#[tokio::test]
async fn three_group_column_is_rejected_in_place_for_two_group_test() {
    let h = harness().await;
    h.signup("u1").await;
    h.upload(
        "u1",
        "groups.csv",
        "Group,Binary,Value\nA,X,1\nA,Y,2\nB,X,3\nB,Y,4\nC,X,5\n",
    )
    .await;

    h.send("u1", "🆚 Hypothesis Tests").await;
    h.send("u1", "Independent T-Test (2 Groups)").await;
    h.send("u1", "✅ Proceed").await;

    // {A,A,B,B,C} → 3 distinct values → rejected with corrective text,
    // session stays in the same state.
    let rejection = h.send("u1", "Group").await;
    assert!(rejection.text.contains("exactly 2"), "got: {}", rejection.text);
    assert!(rejection.text.contains("3 distinct values"));
    assert_eq!(h.state_of("u1").await, EngineState::GroupVarSelect);

    // The acceptance message is distinct from the rejection.
    let acceptance = h.send("u1", "Binary").await;
    assert!(!acceptance.text.contains("exactly 2"));
    assert!(acceptance.text.contains("measurement variable"));
    assert_eq!(h.state_of("u1").await, EngineState::MeasureVarSelect);
}

#[tokio::test]
async fn regression_accumulator_dedups_and_rejects_empty_done() {
    let h = harness().await;
    h.signup("u1").await;
    h.upload(
        "u1",
        "reg.csv",
        "Y,Age,Income\n3,1,10\n5,2,20\n7,3,31\n9,4,39\n11,5,52\n",
    )
    .await;

    h.send("u1", "🔗 Regression").await;
    h.send("u1", "Y").await;

    // Empty accumulator: "Done" is rejected without advancing state.
    let rejected = h.send("u1", "✅ Done Selecting").await;
    assert!(rejected.text.contains("at least one predictor"));
    assert_eq!(h.state_of("u1").await, EngineState::PredictorSelect);

    // Selecting the same item twice leaves the accumulator unchanged.
    h.send("u1", "Age").await;
    let after_dup = h.send("u1", "Age").await;
    assert!(after_dup.text.contains("Age"), "menu re-shown");
    {
        let handle = h.router.sessions().get("u1").await.unwrap();
        let session = handle.lock().await;
        assert_eq!(session.context.accumulator("regression_predictors"), ["Age"]);
    }

    let result = h.send("u1", "✅ Done Selecting").await;
    assert!(result.text.contains("Regression Results"), "got: {}", result.text);
    assert_eq!(h.history_len("u1").await, 1);
}

#[tokio::test]
async fn reliability_requires_two_items() {
    let h = harness().await;
    h.signup("u1").await;
    h.upload(
        "u1",
        "scale.csv",
        "Q1,Q2,Q3\n1,1,2\n2,2,2\n3,3,4\n4,4,4\n5,5,6\n",
    )
    .await;

    h.send("u1", "🛡️ Reliability").await;
    h.send("u1", "Q1").await;
    let rejected = h.send("u1", "✅ Done Selecting").await;
    assert!(rejected.text.contains("at least **2 items**"));
    assert_eq!(h.state_of("u1").await, EngineState::ReliabilityItems);

    h.send("u1", "Q2").await;
    let result = h.send("u1", "✅ Done Selecting").await;
    assert!(result.text.contains("Cronbach's α"), "got: {}", result.text);
}

#[tokio::test]
async fn global_cancel_clears_flags_and_accumulators_from_any_state() {
    let h = harness().await;
    h.signup("u1").await;
    h.upload("u1", "scores.csv", GENDER_SCORE_CSV).await;

    // Mid-accumulation in the reliability wizard.
    h.send("u1", "🛡️ Reliability").await;
    h.send("u1", "Score").await;

    let reply = h.send("u1", "❌ Cancel").await;
    assert!(reply.text.contains("cancelled"));
    assert_eq!(h.state_of("u1").await, EngineState::Cancelled);
    {
        let handle = h.router.sessions().get("u1").await.unwrap();
        let session = handle.lock().await;
        assert!(session.context.accumulator("rel_items").is_empty());
        assert_eq!(session.context.sticky(), None);
    }

    // Any message after cancel restarts at the menu.
    let revived = h.send("u1", "hello").await;
    assert!(revived.text.contains("Main Menu"));
    assert_eq!(h.state_of("u1").await, EngineState::MainMenu);
}

#[tokio::test]
async fn chart_title_sticky_flag_is_single_and_cleared_by_hub_entry() {
    let h = harness().await;
    h.signup("u1").await;
    h.upload("u1", "scores.csv", GENDER_SCORE_CSV).await;

    h.send("u1", "📊 Create Visuals").await;
    h.send("u1", "📊 Bar Chart").await;
    let rendered = h.send("u1", "Gender").await;
    assert_eq!(rendered.attachments.len(), 1);

    h.send("u1", "✏️ Set Custom Title").await;
    assert_eq!(
        h.sticky_of("u1").await.as_deref(),
        Some("awaiting_chart_title")
    );

    // The sticky flag borrows exactly one turn.
    let retitled = h.send("u1", "Participants by gender").await;
    assert!(retitled.text.contains("Participants by gender"));
    assert_eq!(h.sticky_of("u1").await, None);

    // Set it again, then enter a hub: the flag must not survive.
    h.send("u1", "✏️ Set Custom Title").await;
    assert!(h.sticky_of("u1").await.is_some());
    h.send("u1", "🏠 Main Menu").await;
    assert_eq!(h.sticky_of("u1").await, None);
    assert_eq!(h.state_of("u1").await, EngineState::MainMenu);
}

#[tokio::test]
async fn sample_size_finite_population_walks_the_substitution() {
    let h = harness().await;
    h.signup("u1").await;

    h.send("u1", "🔢 Calculate Sample Size").await;
    h.send("u1", "🎓 Help me choose (Study Design)").await;
    h.send("u1", "1. Cross-sectional (Survey)").await;
    h.send("u1", "Yes, I know N (Finite)").await;
    h.send("u1", "500").await;
    let result = h.send("u1", "95% (Standard)").await;

    // N=500, e=0.05, 95% → n0=385, corrected n=218, with the formula
    // substitution displayed step by step.
    assert!(result.text.contains("Sample size (n): 218"), "got: {}", result.text);
    assert!(result.text.contains("385"));
    assert!(result.text.contains("Step-by-step substitution"));
    assert_eq!(h.state_of("u1").await, EngineState::MainMenu);
}

#[tokio::test]
async fn sample_size_unsure_branch_asks_simplified_question() {
    let h = harness().await;
    h.signup("u1").await;

    h.send("u1", "🔢 Calculate Sample Size").await;
    h.send("u1", "🎓 Help me choose (Study Design)").await;
    h.send("u1", "1. Cross-sectional (Survey)").await;
    let unsure = h.send("u1", "Unsure (Help me decide)").await;
    assert!(unsure.text.contains("listable group"));

    h.send("u1", "General/Uncountable (Infinite)").await;
    let result = h.send("u1", "95% (Standard)").await;
    assert!(result.text.contains("Sample size (n): 385"), "got: {}", result.text);
}

#[tokio::test]
async fn save_then_resume_restores_the_context_byte_for_byte() {
    let h = harness().await;
    h.signup("u1").await;
    h.upload("u1", "scores.csv", GENDER_SCORE_CSV).await;

    // One analysis so the session has history worth saving.
    let reply = h.send("u1", "📉 Descriptive Stats").await;
    assert!(reply.text.contains("Descriptive Statistics"));

    // Save flow: title answered, the rest skipped.
    h.send("u1", "💾 Save & Exit").await;
    h.send("u1", "My Study").await;
    h.send("u1", "⏭️ Skip").await;
    h.send("u1", "⏭️ Skip").await;
    let saved = h.send("u1", "⏭️ Skip").await;
    assert!(saved.text.contains("Project saved"), "got: {}", saved.text);

    let snapshot_before = {
        let handle = h.router.sessions().get("u1").await.unwrap();
        let session = handle.lock().await;
        session.context.to_snapshot().unwrap()
    };

    // Wipe the live history by uploading a fresh dataset.
    h.upload("u1", "other.csv", "A,B\n1,2\n3,4\n5,6\n").await;
    assert_eq!(h.history_len("u1").await, 0);

    // Resume: list → pick row 1 → open.
    h.send("u1", "📁 My Projects").await;
    h.send("u1", "1.").await;
    let loaded = h.send("u1", "📂 Open / Load").await;
    assert!(loaded.text.contains("My Study"), "got: {}", loaded.text);
    assert_eq!(h.history_len("u1").await, 1);

    let snapshot_after = {
        let handle = h.router.sessions().get("u1").await.unwrap();
        let session = handle.lock().await;
        session.context.to_snapshot().unwrap()
    };
    assert_eq!(
        serde_json::to_string(&snapshot_before).unwrap(),
        serde_json::to_string(&snapshot_after).unwrap()
    );
}

#[tokio::test]
async fn crosstab_toggles_and_generates() {
    let h = harness().await;
    h.signup("u1").await;
    h.upload(
        "u1",
        "ct.csv",
        "Gender,Transport\nM,Bus\nM,Car\nF,Bus\nF,Bus\nM,Car\nF,Car\n",
    )
    .await;

    h.send("u1", "📋 Crosstab").await;
    h.send("u1", "Gender").await;
    h.send("u1", "✅ Done Selecting").await;
    h.send("u1", "Transport").await;
    let options = h.send("u1", "✅ Done Selecting").await;
    assert!(options.text.contains("Display options"));

    let toggled = h.send("u1", "Toggle Row %").await;
    assert!(toggled.text.contains("[x] Row %"), "got: {}", toggled.text);

    let generated = h.send("u1", "Generate Table").await;
    assert!(generated.text.contains("χ²"), "got: {}", generated.text);
    assert_eq!(h.history_len("u1").await, 1);
    assert_eq!(h.state_of("u1").await, EngineState::PostAnalysis);
}

#[tokio::test]
async fn manuscript_wizard_keeps_settings_on_change_and_generates() {
    let h = harness().await;
    h.signup("u1").await;
    h.upload("u1", "scores.csv", GENDER_SCORE_CSV).await;

    // Report without analyses is a corrective hub prompt.
    let empty = h.send("u1", "📄 Generate Report").await;
    assert!(empty.text.contains("nothing to report"), "got: {}", empty.text);

    h.send("u1", "📉 Descriptive Stats").await;
    h.send("u1", "📄 Generate Report").await;
    h.send("u1", "📑 APA Research").await;
    h.send("u1", "Georgia").await;
    h.send("u1", "Double (2.0)").await;
    h.send("u1", "Harvard").await;
    let confirm = h.send("u1", "📄 Medium (3000-5000)").await;
    assert!(confirm.text.contains("Georgia"));
    assert!(confirm.text.contains("Harvard"));

    // Change settings re-enters at step one with prior answers as defaults.
    let step_one = h.send("u1", "🔄 Change Settings").await;
    assert!(step_one.text.contains("current: APA Research"), "got: {}", step_one.text);
    h.send("u1", "📄 IMRAD (Standard)").await;
    h.send("u1", "Georgia").await;
    h.send("u1", "Double (2.0)").await;
    h.send("u1", "Harvard").await;
    h.send("u1", "⏭️ No Limit").await;

    let done = h.send("u1", "✅ Generate Manuscript").await;
    assert!(done.text.contains("Report generated"), "got: {}", done.text);
    assert_eq!(done.attachments.len(), 1);
    assert!(done.attachments[0].exists());
}

#[tokio::test]
async fn unrecognized_input_reshows_current_menu() {
    let h = harness().await;
    h.signup("u1").await;
    let reply = h.send("u1", "qwertyuiop").await;
    let labels: Vec<&str> = reply.labels().collect();
    assert!(labels.contains(&"📊 Analyse Data (Upload File)"));
    assert_eq!(h.state_of("u1").await, EngineState::MainMenu);
}

#[tokio::test]
async fn missing_dataset_routes_to_corrective_hub() {
    let h = harness().await;
    h.signup("u1").await;
    let reply = h.send("u1", "🛡️ Reliability").await;
    assert!(reply.text.contains("No dataset"), "got: {}", reply.text);
    assert_eq!(h.state_of("u1").await, EngineState::MainMenu);
}

#[tokio::test]
async fn every_wizard_state_has_an_owner() {
    let registry = WizardRegistry::new(wizards::all());
    let states = [
        EngineState::SignupName,
        EngineState::MainMenu,
        EngineState::AwaitingUpload,
        EngineState::TestSelect,
        EngineState::TestGuide,
        EngineState::GroupVarSelect,
        EngineState::MeasureVarSelect,
        EngineState::ExportOffer,
        EngineState::OutcomeSelect,
        EngineState::PredictorSelect,
        EngineState::CrosstabRows,
        EngineState::CrosstabCols,
        EngineState::CrosstabOptions,
        EngineState::ReliabilityItems,
        EngineState::SamplingMode,
        EngineState::StudyTypeSelect,
        EngineState::MethodSelect,
        EngineState::PopulationCheck,
        EngineState::ConfidenceSelect,
        EngineState::ParamInput,
        EngineState::ChartKind,
        EngineState::ChartColumn,
        EngineState::ManuscriptStructure,
        EngineState::ManuscriptFont,
        EngineState::ManuscriptSpacing,
        EngineState::ManuscriptCitation,
        EngineState::ManuscriptLength,
        EngineState::ManuscriptConfirm,
        EngineState::ProjectsMenu,
        EngineState::SaveTitle,
        EngineState::SaveObjectives,
        EngineState::SaveQuestions,
        EngineState::SaveHypotheses,
        EngineState::PostAnalysis,
    ];
    for state in states {
        assert!(
            registry.owner_of(state).is_some(),
            "state {state} has no owning wizard"
        );
    }
    // The dispatch table is enumerable without executing the engine.
    assert!(registry.all_routes().len() > 50);
}
