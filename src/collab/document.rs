//! Document collaborator — assembles the session's analyses into a report
//! file and reports its word count.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::collab::stats::AnalysisOutcome;
use crate::context::{AnalysisRecord, VisualRecord};
use crate::error::DocumentError;

/// Document skeleton the report follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStructure {
    Imrad,
    ApaResearch,
    Thesis,
    Report,
    Journal,
    Custom,
}

impl DocumentStructure {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Imrad => "IMRAD",
            Self::ApaResearch => "APA Research",
            Self::Thesis => "Thesis",
            Self::Report => "Report",
            Self::Journal => "Journal Article",
            Self::Custom => "Custom",
        }
    }
}

/// Citation style for the reference list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CitationStyle {
    Apa7,
    Mla9,
    Harvard,
    Vancouver,
    Chicago,
    Ieee,
}

impl CitationStyle {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Apa7 => "APA 7th",
            Self::Mla9 => "MLA 9th",
            Self::Harvard => "Harvard",
            Self::Vancouver => "Vancouver",
            Self::Chicago => "Chicago",
            Self::Ieee => "IEEE",
        }
    }
}

/// Line spacing of the generated document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineSpacing {
    Single,
    OneHalf,
    Double,
}

impl LineSpacing {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Single => "Single",
            Self::OneHalf => "1.5",
            Self::Double => "Double",
        }
    }
}

/// Formatting settings collected by the manuscript wizard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManuscriptSettings {
    pub structure: DocumentStructure,
    pub font: String,
    pub font_size: u8,
    pub spacing: LineSpacing,
    pub citation_style: CitationStyle,
    /// Target length; `(0, 0)` means no limit.
    pub min_words: u32,
    pub max_words: u32,
}

impl Default for ManuscriptSettings {
    fn default() -> Self {
        Self {
            structure: DocumentStructure::Imrad,
            font: "Times New Roman".into(),
            font_size: 12,
            spacing: LineSpacing::Double,
            citation_style: CitationStyle::Apa7,
            min_words: 0,
            max_words: 0,
        }
    }
}

/// Everything the generator needs from the session.
#[derive(Debug, Clone, Default)]
pub struct ReportInput {
    pub title: String,
    pub objectives: String,
    pub questions: String,
    pub hypotheses: String,
    pub discussion: String,
    pub history: Vec<AnalysisRecord>,
    pub visuals: Vec<VisualRecord>,
    pub references: Vec<String>,
}

/// A generated document on disk.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedDocument {
    pub path: PathBuf,
    pub word_count: usize,
}

/// Turns accumulated analyses into a formatted document.
#[async_trait]
pub trait DocumentEngine: Send + Sync {
    async fn generate(
        &self,
        settings: &ManuscriptSettings,
        input: &ReportInput,
        out_dir: &Path,
    ) -> Result<GeneratedDocument, DocumentError>;
}

/// Markdown report writer.
pub struct MarkdownDocumentEngine;

impl MarkdownDocumentEngine {
    pub fn new() -> Self {
        Self
    }
}

impl Default for MarkdownDocumentEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn outcome_block(outcome: &AnalysisOutcome) -> String {
    match outcome {
        AnalysisOutcome::Descriptive { rows } => {
            let mut out = String::from("| Variable | N | Mean | SD | Min | Max |\n|---|---|---|---|---|---|\n");
            for r in rows {
                out.push_str(&format!(
                    "| {} | {} | {:.3} | {:.3} | {:.3} | {:.3} |\n",
                    r.column, r.n, r.mean, r.sd, r.min, r.max
                ));
            }
            out
        }
        AnalysisOutcome::TwoGroup { t, p, cohen_d, .. } => {
            format!("t = {t:.3}, p = {p:.4}, Cohen's d = {cohen_d:.3}\n")
        }
        AnalysisOutcome::RankSum { u, p, .. } => format!("U = {u:.1}, p = {p:.4}\n"),
        AnalysisOutcome::Anova {
            f,
            p,
            df_between,
            df_within,
            ..
        } => format!("F({df_between}, {df_within}) = {f:.3}, p = {p:.4}\n"),
        AnalysisOutcome::Correlation { columns, r } => {
            let mut out = String::from("|  |");
            for c in columns {
                out.push_str(&format!(" {c} |"));
            }
            out.push('\n');
            out.push_str(&format!("|---|{}\n", "---|".repeat(columns.len())));
            for (i, c) in columns.iter().enumerate() {
                out.push_str(&format!("| {c} |"));
                for j in 0..columns.len() {
                    out.push_str(&format!(" {:.3} |", r[i][j]));
                }
                out.push('\n');
            }
            out
        }
        AnalysisOutcome::Regression {
            r_squared,
            f_p,
            n,
            coefficients,
            ..
        } => {
            let mut out =
                format!("R² = {r_squared:.3}, model p = {f_p:.4}, N = {n}\n\n| Term | Estimate | p |\n|---|---|---|\n");
            for c in coefficients {
                out.push_str(&format!("| {} | {:.4} | {:.4} |\n", c.name, c.estimate, c.p));
            }
            out
        }
        AnalysisOutcome::Reliability { alpha, n, items } => format!(
            "Cronbach's α = {alpha:.3} over {} items, N = {n}\n",
            items.len()
        ),
        AnalysisOutcome::CrossTab {
            row_labels,
            col_labels,
            counts,
            chi2,
            p,
            ..
        } => {
            let mut out = String::from("|  |");
            for c in col_labels {
                out.push_str(&format!(" {c} |"));
            }
            out.push_str(" Total |\n");
            out.push_str(&format!("|---|{}\n", "---|".repeat(col_labels.len() + 1)));
            for (label, row) in row_labels.iter().zip(counts.iter()) {
                let total: u64 = row.iter().sum();
                out.push_str(&format!("| {label} |"));
                for c in row {
                    out.push_str(&format!(" {c} |"));
                }
                out.push_str(&format!(" {total} |\n"));
            }
            out.push_str(&format!("\nχ² = {chi2:.3}, p = {p:.4}\n"));
            out
        }
        AnalysisOutcome::Frequencies { entries, .. } => {
            let mut out = String::from("| Value | Count | % |\n|---|---|---|\n");
            for e in entries {
                out.push_str(&format!("| {} | {} | {:.1} |\n", e.value, e.count, e.percent));
            }
            out
        }
    }
}

#[async_trait]
impl DocumentEngine for MarkdownDocumentEngine {
    async fn generate(
        &self,
        settings: &ManuscriptSettings,
        input: &ReportInput,
        out_dir: &Path,
    ) -> Result<GeneratedDocument, DocumentError> {
        if input.history.is_empty() {
            return Err(DocumentError::EmptyHistory);
        }
        tokio::fs::create_dir_all(out_dir).await?;

        let mut doc = String::new();
        doc.push_str(&format!("# {}\n\n", input.title));
        doc.push_str(&format!(
            "*{} structure · {} {}pt · {} spacing · {} citations*\n\n",
            settings.structure.label(),
            settings.font,
            settings.font_size,
            settings.spacing.label(),
            settings.citation_style.label(),
        ));

        for (heading, body) in [
            ("Research Objectives", &input.objectives),
            ("Research Questions", &input.questions),
            ("Hypotheses", &input.hypotheses),
        ] {
            if !body.is_empty() {
                doc.push_str(&format!("## {heading}\n\n{body}\n\n"));
            }
        }

        doc.push_str("## Results\n\n");
        for (i, record) in input.history.iter().enumerate() {
            doc.push_str(&format!(
                "### Analysis {}: {} ({})\n\n",
                i + 1,
                record.test_name,
                record.variables
            ));
            doc.push_str(&format!("{}\n\n", record.summary));
            doc.push_str(&outcome_block(&record.outcome));
            doc.push('\n');
        }

        if !input.visuals.is_empty() {
            doc.push_str("## Figures\n\n");
            for (i, v) in input.visuals.iter().enumerate() {
                doc.push_str(&format!("Figure {}: {} ({})\n\n![{}]({})\n\n", i + 1, v.title, v.kind, v.title, v.file));
            }
        }

        if !input.discussion.is_empty() {
            doc.push_str(&format!("## Discussion\n\n{}\n\n", input.discussion));
        }

        if !input.references.is_empty() {
            doc.push_str(&format!("## References ({})\n\n", settings.citation_style.label()));
            for r in &input.references {
                doc.push_str(&format!("- {r}\n"));
            }
            doc.push('\n');
        }

        let path = out_dir.join(format!("report_{}.md", Uuid::new_v4()));
        tokio::fs::write(&path, &doc)
            .await
            .map_err(|e| DocumentError::WriteFailed(e.to_string()))?;

        let word_count = doc.split_whitespace().count();
        tracing::info!(path = %path.display(), words = word_count, "Report generated");
        Ok(GeneratedDocument { path, word_count })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::stats::AnalysisOutcome;

    fn sample_input() -> ReportInput {
        ReportInput {
            title: "Impact of Gender on Score".into(),
            objectives: "Compare mean scores".into(),
            questions: "Is there a difference?".into(),
            hypotheses: "There is a significant difference between groups".into(),
            discussion: "The groups differed meaningfully.".into(),
            history: vec![AnalysisRecord {
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
            }],
            visuals: vec![],
            references: vec!["Cohen, J. (1988). Statistical Power Analysis.".into()],
        }
    }

    #[tokio::test]
    async fn generates_report_with_word_count() {
        let dir = tempfile::tempdir().unwrap();
        let engine = MarkdownDocumentEngine::new();
        let doc = engine
            .generate(&ManuscriptSettings::default(), &sample_input(), dir.path())
            .await
            .unwrap();
        assert!(doc.path.exists());
        assert!(doc.word_count > 20);
        let text = std::fs::read_to_string(&doc.path).unwrap();
        assert!(text.contains("## Results"));
        assert!(text.contains("Independent T-Test"));
        assert!(text.contains("## References"));
    }

    #[tokio::test]
    async fn empty_history_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let engine = MarkdownDocumentEngine::new();
        let input = ReportInput {
            history: vec![],
            ..sample_input()
        };
        let err = engine
            .generate(&ManuscriptSettings::default(), &input, dir.path())
            .await;
        assert!(matches!(err, Err(DocumentError::EmptyHistory)));
    }
}
