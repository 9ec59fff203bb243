//! Manuscript formatting wizard — a fixed linear sequence (structure →
//! font → spacing → citation style → target length → confirmation).
//! "Change Settings" re-enters at step one with previous answers kept as
//! editable defaults.

use async_trait::async_trait;

use crate::collab::document::{
    CitationStyle, DocumentStructure, LineSpacing, ManuscriptSettings, ReportInput,
};
use crate::context::keys;
use crate::engine::router::{MatchedInput, PatternKind, Route, TurnContext, Wizard};
use crate::engine::state::EngineState;
use crate::engine::turn::{Step, TurnReply};
use crate::error::EngineError;
use crate::wizards::{labels, main_menu};

const STRUCTURES: [(&str, DocumentStructure); 6] = [
    ("📄 IMRAD (Standard)", DocumentStructure::Imrad),
    ("📑 APA Research", DocumentStructure::ApaResearch),
    ("📖 Thesis Format", DocumentStructure::Thesis),
    ("📋 Report Format", DocumentStructure::Report),
    ("🔬 Journal Article", DocumentStructure::Journal),
    ("⚙️ Custom", DocumentStructure::Custom),
];
const FONTS: [&str; 6] = [
    "Times New Roman",
    "Arial",
    "Calibri",
    "Georgia",
    "Cambria",
    "Garamond",
];
const SPACINGS: [(&str, LineSpacing); 3] = [
    ("Single (1.0)", LineSpacing::Single),
    ("1.5 Spacing", LineSpacing::OneHalf),
    ("Double (2.0)", LineSpacing::Double),
];
const CITATIONS: [(&str, CitationStyle); 6] = [
    ("APA 7th", CitationStyle::Apa7),
    ("MLA 9th", CitationStyle::Mla9),
    ("Harvard", CitationStyle::Harvard),
    ("Vancouver", CitationStyle::Vancouver),
    ("Chicago", CitationStyle::Chicago),
    ("IEEE", CitationStyle::Ieee),
];
const LENGTHS: [(&str, (u32, u32)); 4] = [
    ("📝 Short (1500-2500)", (1500, 2500)),
    ("📄 Medium (3000-5000)", (3000, 5000)),
    ("📖 Long (5000-8000)", (5000, 8000)),
    ("📑 Full (8000+)", (8000, 15000)),
];
const LENGTH_CUSTOM: &str = "✏️ Custom";
const LENGTH_NO_LIMIT: &str = "⏭️ No Limit";
const GENERATE: &str = "✅ Generate Manuscript";
const CHANGE_SETTINGS: &str = "🔄 Change Settings";

/// Sticky flag for custom word-count entry.
pub const AWAITING_WORD_COUNT: &str = "awaiting_word_count";

const KEY_STRUCTURE: &str = "ms_structure";
const KEY_FONT: &str = "ms_font";
const KEY_SPACING: &str = "ms_spacing";
const KEY_CITATION: &str = "ms_citation";
const KEY_MIN_WORDS: &str = "ms_min_words";
const KEY_MAX_WORDS: &str = "ms_max_words";

/// Enter the wizard; requires at least one completed analysis.
pub async fn entry(ctx: &mut TurnContext<'_>) -> Result<Step, EngineError> {
    ctx.session.context.clear_sticky();
    if ctx.session.context.history.is_empty() {
        // Missing-context failure: corrective hub prompt, not a crash.
        return Ok(Step::go(
            EngineState::MainMenu,
            main_menu::menu_reply(
                "⚠️ There is nothing to report yet — run at least one analysis first.",
            ),
        ));
    }
    Ok(Step::go(EngineState::ManuscriptStructure, structure_prompt(ctx)))
}

fn current_settings(ctx: &TurnContext<'_>) -> ManuscriptSettings {
    let defaults = ManuscriptSettings::default();
    let get = |key: &str| ctx.session.context.get(key).map(str::to_string);
    ManuscriptSettings {
        structure: get(KEY_STRUCTURE)
            .and_then(|v| {
                STRUCTURES
                    .iter()
                    .find(|(label, _)| *label == v)
                    .map(|(_, s)| *s)
            })
            .unwrap_or(defaults.structure),
        font: get(KEY_FONT).unwrap_or(defaults.font),
        font_size: defaults.font_size,
        spacing: get(KEY_SPACING)
            .and_then(|v| {
                SPACINGS
                    .iter()
                    .find(|(label, _)| *label == v)
                    .map(|(_, s)| *s)
            })
            .unwrap_or(defaults.spacing),
        citation_style: get(KEY_CITATION)
            .and_then(|v| {
                CITATIONS
                    .iter()
                    .find(|(label, _)| *label == v)
                    .map(|(_, s)| *s)
            })
            .unwrap_or(defaults.citation_style),
        min_words: get(KEY_MIN_WORDS).and_then(|v| v.parse().ok()).unwrap_or(0),
        max_words: get(KEY_MAX_WORDS).and_then(|v| v.parse().ok()).unwrap_or(0),
    }
}

fn structure_prompt(ctx: &TurnContext<'_>) -> TurnReply {
    let current = current_settings(ctx).structure.label();
    TurnReply::text(format!(
        "📄 **Manuscript Formatting**\n\nStep 1/5 — select the document \
         structure (current: {current}):"
    ))
    .with_choices(vec![
        vec![STRUCTURES[0].0.into(), STRUCTURES[1].0.into()],
        vec![STRUCTURES[2].0.into(), STRUCTURES[3].0.into()],
        vec![STRUCTURES[4].0.into(), STRUCTURES[5].0.into()],
        vec![labels::BACK_TO_MENU.into()],
    ])
}

fn font_prompt(ctx: &TurnContext<'_>) -> TurnReply {
    let current = current_settings(ctx).font;
    TurnReply::text(format!("Step 2/5 — select the font (current: {current}):")).with_choices(
        vec![
            vec![FONTS[0].into(), FONTS[1].into()],
            vec![FONTS[2].into(), FONTS[3].into()],
            vec![FONTS[4].into(), FONTS[5].into()],
            vec![labels::BACK_TO_MENU.into()],
        ],
    )
}

fn spacing_prompt(ctx: &TurnContext<'_>) -> TurnReply {
    let current = current_settings(ctx).spacing.label();
    TurnReply::text(format!(
        "Step 3/5 — select line spacing (current: {current}):"
    ))
    .with_choices(vec![
        vec![SPACINGS[0].0.into(), SPACINGS[1].0.into()],
        vec![SPACINGS[2].0.into()],
        vec![labels::BACK_TO_MENU.into()],
    ])
}

fn citation_prompt(ctx: &TurnContext<'_>) -> TurnReply {
    let current = current_settings(ctx).citation_style.label();
    TurnReply::text(format!(
        "Step 4/5 — select the citation style (current: {current}):"
    ))
    .with_choices(vec![
        vec![CITATIONS[0].0.into(), CITATIONS[1].0.into()],
        vec![CITATIONS[2].0.into(), CITATIONS[3].0.into()],
        vec![CITATIONS[4].0.into(), CITATIONS[5].0.into()],
        vec![labels::BACK_TO_MENU.into()],
    ])
}

fn length_prompt(_ctx: &TurnContext<'_>) -> TurnReply {
    TurnReply::text("Step 5/5 — set the target word count:").with_choices(vec![
        vec![LENGTHS[0].0.into(), LENGTHS[1].0.into()],
        vec![LENGTHS[2].0.into(), LENGTHS[3].0.into()],
        vec![LENGTH_CUSTOM.into(), LENGTH_NO_LIMIT.into()],
        vec![labels::BACK_TO_MENU.into()],
    ])
}

fn confirm_prompt(ctx: &TurnContext<'_>) -> TurnReply {
    let settings = current_settings(ctx);
    let words = if settings.max_words == 0 {
        "No limit".to_string()
    } else {
        format!("{}–{}", settings.min_words, settings.max_words)
    };
    TurnReply::text(format!(
        "📝 **Manuscript Settings Summary**\n\n\
         📄 Structure: {}\n🔤 Font: {} ({}pt)\n📏 Spacing: {}\n📚 Citation: {}\n\
         📊 Word count: {words}\n📈 Analyses: {}\n📖 References: {}\n\n\
         Ready to generate?",
        settings.structure.label(),
        settings.font,
        settings.font_size,
        settings.spacing.label(),
        settings.citation_style.label(),
        ctx.session.context.history.len(),
        ctx.session.context.accumulator("references").len(),
    ))
    .with_choices(vec![
        vec![GENERATE.into()],
        vec![CHANGE_SETTINGS.into(), labels::BACK_TO_MENU.into()],
    ])
}

pub struct ManuscriptWizard;

#[async_trait]
impl Wizard for ManuscriptWizard {
    fn name(&self) -> &'static str {
        "manuscript"
    }

    fn routes(&self) -> Vec<Route> {
        use EngineState::*;
        use PatternKind::*;
        let mut routes = Vec::new();
        for (label, _) in STRUCTURES {
            routes.push(Route::new(ManuscriptStructure, Exact(label)));
        }
        for label in FONTS {
            routes.push(Route::new(ManuscriptFont, Exact(label)));
        }
        for (label, _) in SPACINGS {
            routes.push(Route::new(ManuscriptSpacing, Exact(label)));
        }
        for (label, _) in CITATIONS {
            routes.push(Route::new(ManuscriptCitation, Exact(label)));
        }
        for (label, _) in LENGTHS {
            routes.push(Route::new(ManuscriptLength, Exact(label)));
        }
        routes.push(Route::new(ManuscriptLength, Exact(LENGTH_CUSTOM)));
        routes.push(Route::new(ManuscriptLength, Exact(LENGTH_NO_LIMIT)));
        routes.push(Route::new(ManuscriptConfirm, Exact(GENERATE)));
        routes.push(Route::new(ManuscriptConfirm, Exact(CHANGE_SETTINGS)));
        routes
    }

    fn sticky_flags(&self) -> &'static [&'static str] {
        &[AWAITING_WORD_COUNT]
    }

    async fn handle(
        &self,
        state: EngineState,
        input: MatchedInput,
        ctx: &mut TurnContext<'_>,
    ) -> Result<Step, EngineError> {
        let MatchedInput::Exact(label) = input else {
            return self.reprompt(state, ctx).await;
        };
        match state {
            EngineState::ManuscriptStructure => {
                ctx.session.context.set(KEY_STRUCTURE, label);
                Ok(Step::go(EngineState::ManuscriptFont, font_prompt(ctx)))
            }
            EngineState::ManuscriptFont => {
                ctx.session.context.set(KEY_FONT, label);
                Ok(Step::go(EngineState::ManuscriptSpacing, spacing_prompt(ctx)))
            }
            EngineState::ManuscriptSpacing => {
                ctx.session.context.set(KEY_SPACING, label);
                Ok(Step::go(EngineState::ManuscriptCitation, citation_prompt(ctx)))
            }
            EngineState::ManuscriptCitation => {
                ctx.session.context.set(KEY_CITATION, label);
                Ok(Step::go(EngineState::ManuscriptLength, length_prompt(ctx)))
            }
            EngineState::ManuscriptLength => match label {
                LENGTH_CUSTOM => {
                    ctx.session.context.set_sticky(AWAITING_WORD_COUNT);
                    Ok(Step::stay(
                        EngineState::ManuscriptLength,
                        TurnReply::text(
                            "Enter your target word count — a number (e.g. 4000) or a \
                             range (e.g. 3000-5000):",
                        ),
                    ))
                }
                LENGTH_NO_LIMIT => {
                    ctx.session.context.set(KEY_MIN_WORDS, "0");
                    ctx.session.context.set(KEY_MAX_WORDS, "0");
                    Ok(Step::go(EngineState::ManuscriptConfirm, confirm_prompt(ctx)))
                }
                _ => {
                    if let Some((_, (min, max))) = LENGTHS.iter().find(|(l, _)| *l == label) {
                        ctx.session.context.set(KEY_MIN_WORDS, min.to_string());
                        ctx.session.context.set(KEY_MAX_WORDS, max.to_string());
                    }
                    Ok(Step::go(EngineState::ManuscriptConfirm, confirm_prompt(ctx)))
                }
            },
            EngineState::ManuscriptConfirm => match label {
                GENERATE => self.generate(ctx).await,
                CHANGE_SETTINGS => {
                    // Re-enter at step one; answered fields stay as defaults.
                    Ok(Step::go(EngineState::ManuscriptStructure, structure_prompt(ctx)))
                }
                _ => self.reprompt(state, ctx).await,
            },
            other => Err(EngineError::UnroutableState(other.to_string())),
        }
    }

    async fn on_sticky(
        &self,
        _flag: &str,
        input: &str,
        ctx: &mut TurnContext<'_>,
    ) -> Result<Step, EngineError> {
        match parse_word_count(input) {
            Some((min, max)) => {
                ctx.session.context.set(KEY_MIN_WORDS, min.to_string());
                ctx.session.context.set(KEY_MAX_WORDS, max.to_string());
                Ok(Step::go(EngineState::ManuscriptConfirm, confirm_prompt(ctx)))
            }
            None => {
                ctx.session.context.set_sticky(AWAITING_WORD_COUNT);
                Ok(Step::stay(
                    EngineState::ManuscriptLength,
                    TurnReply::text(
                        "⚠️ Invalid format. Enter a number (e.g. 4000) or a range \
                         (e.g. 3000-5000):",
                    ),
                ))
            }
        }
    }

    async fn reprompt(
        &self,
        state: EngineState,
        ctx: &mut TurnContext<'_>,
    ) -> Result<Step, EngineError> {
        let reply = match state {
            EngineState::ManuscriptStructure => structure_prompt(ctx),
            EngineState::ManuscriptFont => font_prompt(ctx),
            EngineState::ManuscriptSpacing => spacing_prompt(ctx),
            EngineState::ManuscriptCitation => citation_prompt(ctx),
            EngineState::ManuscriptLength => length_prompt(ctx),
            _ => confirm_prompt(ctx),
        };
        Ok(Step::stay(state, reply))
    }
}

impl ManuscriptWizard {
    async fn generate(&self, ctx: &mut TurnContext<'_>) -> Result<Step, EngineError> {
        let settings = current_settings(ctx);
        let get = |key: &str| {
            ctx.session
                .context
                .get(key)
                .unwrap_or_default()
                .to_string()
        };
        let mut input = ReportInput {
            title: {
                let title = get(keys::RESEARCH_TITLE);
                if title.is_empty() {
                    "Statistical Analysis Report".to_string()
                } else {
                    title
                }
            },
            objectives: get(keys::RESEARCH_OBJECTIVES),
            questions: get(keys::RESEARCH_QUESTIONS),
            hypotheses: get(keys::RESEARCH_HYPOTHESES),
            discussion: String::new(),
            history: ctx.session.context.history.clone(),
            visuals: ctx.session.context.visuals.clone(),
            references: ctx.session.context.accumulator("references").to_vec(),
        };
        input.discussion = ctx.deps.interpreter.discussion(&input).await;

        let out_dir = ctx.deps.config.data_dir.join("reports");
        let document = match ctx.deps.documents.generate(&settings, &input, &out_dir).await {
            Ok(document) => document,
            Err(e) => {
                tracing::error!("Report generation failed: {e}");
                let mut reply = confirm_prompt(ctx);
                reply.text = format!(
                    "❌ Report generation failed. Your settings are kept — you can \
                     try again.\n\n{}",
                    reply.text
                );
                return Ok(Step::stay(EngineState::ManuscriptConfirm, reply));
            }
        };

        let analyses = ctx.session.context.history.len();
        Ok(Step::go(
            EngineState::PostAnalysis,
            main_menu::post_analysis_reply(
                &format!(
                    "📄 **Report generated** — {} words across {} analyses.",
                    document.word_count, analyses
                ),
                analyses,
            )
            .with_attachment(document.path),
        ))
    }
}

fn parse_word_count(input: &str) -> Option<(u32, u32)> {
    let cleaned = input.trim().replace(',', "");
    if let Some((lo, hi)) = cleaned.split_once('-') {
        let min: u32 = lo.trim().parse().ok()?;
        let max: u32 = hi.trim().parse().ok()?;
        if min == 0 || max < min {
            return None;
        }
        return Some((min, max));
    }
    let target: u32 = cleaned.parse().ok()?;
    if target == 0 {
        return None;
    }
    // Single targets become a ±10% band.
    Some(((target as f64 * 0.9) as u32, (target as f64 * 1.1) as u32))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn word_count_parses_single_and_range() {
        assert_eq!(parse_word_count("4000"), Some((3600, 4400)));
        assert_eq!(parse_word_count("3000-5000"), Some((3000, 5000)));
        assert_eq!(parse_word_count("3,000-5,000"), Some((3000, 5000)));
        assert_eq!(parse_word_count("abc"), None);
        assert_eq!(parse_word_count("5000-3000"), None);
        assert_eq!(parse_word_count("0"), None);
    }
}
