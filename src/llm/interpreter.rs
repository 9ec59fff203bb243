//! Narrative interpretation of analysis results.
//!
//! Every call runs under an explicit timeout and degrades to a canned
//! template rather than stalling the session. The interpreter never
//! returns an error to a wizard — worst case the user gets the template.

use std::sync::Arc;
use std::time::Duration;

use crate::collab::document::ReportInput;
use crate::collab::stats::AnalysisOutcome;
use crate::llm::provider::{ChatMessage, CompletionRequest, LlmProvider};

/// Research question/hypothesis suggestions for the interview flow.
#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct ResearchSuggestions {
    #[serde(default)]
    pub questions: Vec<String>,
    #[serde(default)]
    pub hypotheses: Vec<String>,
}

/// LLM-backed interpreter with template fallback.
pub struct Interpreter {
    llm: Option<Arc<dyn LlmProvider>>,
    timeout: Duration,
}

impl Interpreter {
    pub fn new(llm: Option<Arc<dyn LlmProvider>>, timeout: Duration) -> Self {
        Self { llm, timeout }
    }

    /// No LLM configured; every call takes the template path.
    pub fn offline() -> Self {
        Self {
            llm: None,
            timeout: Duration::from_secs(1),
        }
    }

    /// One guarded LLM round-trip. `None` on timeout, error, or when no
    /// provider is configured.
    async fn ask(&self, system: &str, user: &str, max_tokens: u32) -> Option<String> {
        let llm = self.llm.as_ref()?;
        let request = CompletionRequest::new(vec![
            ChatMessage::system(system),
            ChatMessage::user(user),
        ])
        .with_max_tokens(max_tokens)
        .with_temperature(0.7);

        match tokio::time::timeout(self.timeout, llm.complete(request)).await {
            Ok(Ok(response)) => Some(response.content.trim().to_string()),
            Ok(Err(e)) => {
                tracing::warn!("LLM call failed, using fallback: {e}");
                None
            }
            Err(_) => {
                tracing::warn!(timeout = ?self.timeout, "LLM call timed out, using fallback");
                None
            }
        }
    }

    /// Plain-language explanation of one analysis outcome.
    pub async fn interpret(&self, outcome: &AnalysisOutcome) -> String {
        let payload = serde_json::to_string(outcome).unwrap_or_default();
        let prompt = format!(
            "Explain the following statistical results in plain, professional \
             language suitable for a research manuscript results section.\n\n\
             Results JSON: {payload}\n\n\
             Focus on whether the result is significant, the effect size, and \
             a brief implication. Plain text only, under 150 words."
        );
        match self
            .ask(
                "You are a professional statistical consultant. Never use \
                 markdown formatting in your responses.",
                &prompt,
                300,
            )
            .await
        {
            Some(text) => text,
            None => template_fallback(outcome),
        }
    }

    /// Free-text question about the loaded dataset (AI chat mode).
    pub async fn chat(&self, question: &str, data_summary: &str) -> String {
        let system = format!(
            "You are a statistical analyst. The user has a dataset:\n{data_summary}\n\n\
             Answer their question. Be concise. Plain text only."
        );
        match self.ask(&system, question, 400).await {
            Some(text) => text,
            None => "The analysis assistant is unavailable right now. You can still \
                     run any analysis from the menu."
                .to_string(),
        }
    }

    /// Research question and hypothesis suggestions for a study title.
    pub async fn suggestions(&self, topic: &str) -> ResearchSuggestions {
        let prompt = format!(
            "A researcher is studying: \"{topic}\". Propose up to 3 research \
             questions and up to 3 matching hypotheses. Respond with JSON only: \
             {{\"questions\": [...], \"hypotheses\": [...]}}"
        );
        if let Some(text) = self
            .ask(
                "You are a research methodology advisor. Output only valid JSON.",
                &prompt,
                512,
            )
            .await
        {
            if let Ok(parsed) = serde_json::from_str::<ResearchSuggestions>(text.trim()) {
                return parsed;
            }
            tracing::warn!("Suggestion JSON did not parse, using defaults");
        }
        ResearchSuggestions {
            questions: vec![
                "Is there a significant difference between groups?".into(),
                "Is there a relationship between the key variables?".into(),
            ],
            hypotheses: vec![
                "There is a significant difference between groups".into(),
                "There is a significant relationship between the variables".into(),
            ],
        }
    }

    /// Discussion section for the generated report.
    pub async fn discussion(&self, input: &ReportInput) -> String {
        let analyses: Vec<String> = input
            .history
            .iter()
            .map(|r| format!("{} ({}): {}", r.test_name, r.variables, r.summary))
            .collect();
        let prompt = format!(
            "Write a concise Discussion section for a study titled \"{}\".\n\
             Objectives: {}\nQuestions: {}\nHypotheses: {}\n\nFindings:\n{}\n\n\
             Interpret the findings against the objectives. Plain text, under 300 words.",
            input.title,
            input.objectives,
            input.questions,
            input.hypotheses,
            analyses.join("\n")
        );
        match self
            .ask("You are an academic writing assistant.", &prompt, 700)
            .await
        {
            Some(text) => text,
            None => format!(
                "This study ({}) comprised {} analyses. The results are reported \
                 above; each should be weighed against the stated objectives and \
                 the limitations of the sample.",
                input.title,
                input.history.len()
            ),
        }
    }
}

fn significance(p: f64) -> &'static str {
    if p < 0.05 { "significant" } else { "not significant" }
}

/// Canned interpretations used when the model is unavailable.
fn template_fallback(outcome: &AnalysisOutcome) -> String {
    match outcome {
        AnalysisOutcome::Descriptive { .. } => "The descriptive statistics show the central \
             tendency and dispersion of your numeric variables. Look for outliers or \
             unexpected values."
            .into(),
        AnalysisOutcome::TwoGroup { p, .. } => format!(
            "The t-test result was statistically {} (p = {p:.4}). This suggests the \
             difference between the groups is {}.",
            significance(*p),
            significance(*p)
        ),
        AnalysisOutcome::RankSum { p, .. } => format!(
            "The Mann-Whitney U test indicates a {} difference between the groups (p = {p:.4}).",
            significance(*p)
        ),
        AnalysisOutcome::Anova { p, .. } => format!(
            "The ANOVA results show a {} difference between the group means (p = {p:.4}).",
            significance(*p)
        ),
        AnalysisOutcome::Correlation { .. } => "The correlation matrix shows relationships \
             between variables. Values close to +1 or -1 indicate strong relationships; \
             values near 0 suggest weak or no linear relationship."
            .into(),
        AnalysisOutcome::Regression { r_squared, .. } => format!(
            "The regression model explains {:.1}% of the variance in the outcome variable.",
            r_squared * 100.0
        ),
        AnalysisOutcome::Reliability { alpha, .. } => format!(
            "Cronbach's alpha = {alpha:.3}. Values above 0.7 are generally acceptable."
        ),
        AnalysisOutcome::CrossTab { p, .. } => format!(
            "The chi-square test was statistically {} (p = {p:.4}).",
            significance(*p)
        ),
        AnalysisOutcome::Frequencies { .. } => {
            "The frequency table shows how observations distribute across categories.".into()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LlmError;
    use crate::llm::provider::{CompletionResponse, LlmProvider};
    use async_trait::async_trait;

    struct SlowProvider;

    #[async_trait]
    impl LlmProvider for SlowProvider {
        async fn complete(
            &self,
            _request: CompletionRequest,
        ) -> Result<CompletionResponse, LlmError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(CompletionResponse {
                content: "too late".into(),
            })
        }

        fn model_name(&self) -> &str {
            "slow"
        }
    }

    struct CannedProvider(&'static str);

    #[async_trait]
    impl LlmProvider for CannedProvider {
        async fn complete(
            &self,
            _request: CompletionRequest,
        ) -> Result<CompletionResponse, LlmError> {
            Ok(CompletionResponse {
                content: self.0.to_string(),
            })
        }

        fn model_name(&self) -> &str {
            "canned"
        }
    }

    fn sample_outcome() -> AnalysisOutcome {
        AnalysisOutcome::TwoGroup {
            groups: vec!["M".into(), "F".into()],
            t: 2.1,
            p: 0.03,
            cohen_d: 0.5,
            means: vec![70.0, 65.0],
        }
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_degrades_to_template() {
        let interpreter = Interpreter::new(Some(Arc::new(SlowProvider)), Duration::from_secs(1));
        let text = interpreter.interpret(&sample_outcome()).await;
        assert!(text.contains("significant"));
        assert!(text.contains("0.03"));
    }

    #[tokio::test]
    async fn offline_uses_templates() {
        let interpreter = Interpreter::offline();
        let text = interpreter.interpret(&sample_outcome()).await;
        assert!(text.contains("t-test"));
    }

    #[tokio::test]
    async fn live_provider_answer_passes_through() {
        let interpreter = Interpreter::new(
            Some(Arc::new(CannedProvider("Groups differ meaningfully."))),
            Duration::from_secs(5),
        );
        let text = interpreter.interpret(&sample_outcome()).await;
        assert_eq!(text, "Groups differ meaningfully.");
    }

    #[tokio::test]
    async fn malformed_suggestion_json_falls_back() {
        let interpreter = Interpreter::new(
            Some(Arc::new(CannedProvider("not json at all"))),
            Duration::from_secs(5),
        );
        let suggestions = interpreter.suggestions("sleep and grades").await;
        assert!(!suggestions.questions.is_empty());
        assert!(!suggestions.hypotheses.is_empty());
    }
}
