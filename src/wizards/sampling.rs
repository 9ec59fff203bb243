//! Sample-size calculator wizard — guided (study design) and direct
//! (method) branches, finite/infinite population handling, and a result
//! that always walks through the formula substitution.

use async_trait::async_trait;

use crate::collab::sampler::{self, Confidence, SampleSizeResult};
use crate::engine::router::{MatchedInput, PatternKind, Route, TurnContext, Wizard};
use crate::engine::state::EngineState;
use crate::engine::turn::{Step, TurnReply};
use crate::error::EngineError;
use crate::wizards::{labels, main_menu};

const MODE_GUIDED: &str = "🎓 Help me choose (Study Design)";
const MODE_DIRECT: &str = "🛠️ I know the method (Direct Selection)";
const STUDY_CROSS: &str = "1. Cross-sectional (Survey)";
const STUDY_EXPERIMENTAL: &str = "2. Experimental (Comparison)";
const STUDY_CORRELATIONAL: &str = "3. Correlational";
const METHOD_COCHRAN: &str = "Cochran (Proportions)";
const METHOD_YAMANE: &str = "Yamane (Finite Pop)";
const METHOD_POWER: &str = "Power Analysis (T-Test)";
const POP_KNOWN: &str = "Yes, I know N (Finite)";
const POP_UNKNOWN: &str = "No / General Public (Infinite)";
const POP_UNSURE: &str = "Unsure (Help me decide)";
const POP_SPECIFIC: &str = "Specific/Listable (Finite)";
const POP_GENERAL: &str = "General/Uncountable (Infinite)";
const CI_95: &str = "95% (Standard)";
const CI_99: &str = "99% (High Precision)";
const CI_90: &str = "90%";
const MARGIN_5: &str = "5% (0.05)";
const MARGIN_1: &str = "1% (0.01)";
const EFFECT_SMALL: &str = "Small (0.2)";
const EFFECT_MEDIUM: &str = "Medium (0.5)";
const EFFECT_LARGE: &str = "Large (0.8)";
const CUSTOM: &str = "Custom";

const KEY_METHOD: &str = "sampling_method";
const KEY_PARAM: &str = "sampling_param";
const KEY_POPULATION: &str = "sampling_population";

/// Enter at the mode question.
pub async fn entry(ctx: &mut TurnContext<'_>) -> Result<Step, EngineError> {
    ctx.session.context.reset_transient();
    Ok(Step::go(
        EngineState::SamplingMode,
        TurnReply::text("🔢 **Sample Size Calculator**\n\nHow would you like to proceed?")
            .with_choices(vec![
                vec![MODE_GUIDED.into()],
                vec![MODE_DIRECT.into()],
                vec![labels::BACK_TO_MENU.into()],
            ]),
    ))
}

fn study_menu() -> TurnReply {
    TurnReply::text(
        "🎓 **Select your study design:**\n\n\
         1. **Cross-sectional / Survey** — one-time data collection.\n\
         2. **Experimental / Comparative** — comparing groups.\n\
         3. **Correlational** — relationships between variables.",
    )
    .with_choices(vec![
        vec![STUDY_CROSS.into()],
        vec![STUDY_EXPERIMENTAL.into()],
        vec![STUDY_CORRELATIONAL.into()],
        vec![labels::BACK.into()],
    ])
}

fn method_menu() -> TurnReply {
    TurnReply::text("🛠️ **Select a statistical method:**").with_choices(vec![
        vec![METHOD_COCHRAN.into(), METHOD_YAMANE.into()],
        vec![METHOD_POWER.into()],
        vec![labels::BACK.into()],
    ])
}

fn population_menu() -> TurnReply {
    TurnReply::text(
        "📋 This design typically uses **Cochran's formula**.\n\n\
         Do you know the exact size of your target population?",
    )
    .with_choices(vec![
        vec![POP_KNOWN.into(), POP_UNKNOWN.into()],
        vec![POP_UNSURE.into()],
        vec![labels::BACK.into()],
    ])
}

fn confidence_menu() -> TurnReply {
    TurnReply::text(
        "⚙️ **Parameters considered:**\n\
         • Confidence level (Z) — how sure you want to be.\n\
         • Precision (e) — margin of error, 5% is standard.\n\n\
         Select the **confidence level**:",
    )
    .with_choices(vec![
        vec![CI_95.into(), CI_99.into(), CI_90.into()],
        vec![labels::BACK.into()],
    ])
}

fn effect_menu() -> TurnReply {
    TurnReply::text(
        "**Power analysis parameters**\n\nSelect the expected **effect size** \
         (magnitude of the difference):",
    )
    .with_choices(vec![
        vec![EFFECT_SMALL.into(), EFFECT_MEDIUM.into(), EFFECT_LARGE.into()],
        vec![CUSTOM.into()],
    ])
}

/// The terminal step always re-displays the substitution step by step.
fn result_reply(result: &SampleSizeResult) -> TurnReply {
    let mut text = format!(
        "✅ **Calculation Result**\n\n🔢 **Sample size (n): {}**\n",
        result.sample_size
    );
    if let Some(total) = result.total_sample {
        text.push_str(&format!("👥 Total across groups: {total}\n"));
    }
    text.push_str(&format!("📘 Method: {}\n`{}`\n", result.method, result.formula));
    text.push_str("\n🎓 **Step-by-step substitution:**\n");
    for (i, step) in result.steps.iter().enumerate() {
        text.push_str(&format!("{}. {}\n", i + 1, step));
    }
    main_menu::menu_reply(&text)
}

pub struct SamplingWizard;

#[async_trait]
impl Wizard for SamplingWizard {
    fn name(&self) -> &'static str {
        "sampling"
    }

    fn routes(&self) -> Vec<Route> {
        use EngineState::*;
        use PatternKind::*;
        vec![
            Route::new(SamplingMode, Exact(MODE_GUIDED)),
            Route::new(SamplingMode, Exact(MODE_DIRECT)),
            Route::new(StudyTypeSelect, Exact(STUDY_CROSS)),
            Route::new(StudyTypeSelect, Exact(STUDY_EXPERIMENTAL)),
            Route::new(StudyTypeSelect, Exact(STUDY_CORRELATIONAL)),
            Route::new(StudyTypeSelect, Exact(labels::BACK)),
            Route::new(MethodSelect, Exact(METHOD_COCHRAN)),
            Route::new(MethodSelect, Exact(METHOD_YAMANE)),
            Route::new(MethodSelect, Exact(METHOD_POWER)),
            Route::new(MethodSelect, Exact(labels::BACK)),
            Route::new(PopulationCheck, Exact(POP_KNOWN)),
            Route::new(PopulationCheck, Exact(POP_UNKNOWN)),
            Route::new(PopulationCheck, Exact(POP_UNSURE)),
            Route::new(PopulationCheck, Exact(POP_SPECIFIC)),
            Route::new(PopulationCheck, Exact(POP_GENERAL)),
            Route::new(PopulationCheck, Exact(labels::BACK)),
            Route::new(ConfidenceSelect, Exact(CI_95)),
            Route::new(ConfidenceSelect, Exact(CI_99)),
            Route::new(ConfidenceSelect, Exact(CI_90)),
            Route::new(ConfidenceSelect, Exact(labels::BACK)),
            Route::new(ParamInput, Exact(MARGIN_5)),
            Route::new(ParamInput, Exact(MARGIN_1)),
            Route::new(ParamInput, Exact(EFFECT_SMALL)),
            Route::new(ParamInput, Exact(EFFECT_MEDIUM)),
            Route::new(ParamInput, Exact(EFFECT_LARGE)),
            Route::new(ParamInput, Exact(CUSTOM)),
            Route::new(ParamInput, Exact(labels::BACK)),
            Route::new(ParamInput, Number),
        ]
    }

    async fn handle(
        &self,
        state: EngineState,
        input: MatchedInput,
        ctx: &mut TurnContext<'_>,
    ) -> Result<Step, EngineError> {
        match state {
            EngineState::SamplingMode => match input {
                MatchedInput::Exact(MODE_GUIDED) => {
                    Ok(Step::go(EngineState::StudyTypeSelect, study_menu()))
                }
                MatchedInput::Exact(MODE_DIRECT) => {
                    Ok(Step::go(EngineState::MethodSelect, method_menu()))
                }
                _ => self.reprompt(state, ctx).await,
            },
            EngineState::StudyTypeSelect => self.handle_study(input, ctx).await,
            EngineState::MethodSelect => self.handle_method(input, ctx).await,
            EngineState::PopulationCheck => self.handle_population(input, ctx).await,
            EngineState::ConfidenceSelect => self.handle_confidence(input, ctx).await,
            EngineState::ParamInput => self.handle_param(input, ctx).await,
            _ => Err(EngineError::UnroutableState(state.to_string())),
        }
    }

    async fn reprompt(
        &self,
        state: EngineState,
        ctx: &mut TurnContext<'_>,
    ) -> Result<Step, EngineError> {
        let reply = match state {
            EngineState::StudyTypeSelect => study_menu(),
            EngineState::MethodSelect => method_menu(),
            EngineState::PopulationCheck => population_menu(),
            EngineState::ConfidenceSelect => confidence_menu(),
            EngineState::ParamInput => self.param_prompt(ctx),
            _ => {
                return entry(ctx).await;
            }
        };
        Ok(Step::stay(state, reply))
    }
}

impl SamplingWizard {
    fn param_prompt(&self, ctx: &TurnContext<'_>) -> TurnReply {
        match ctx.session.context.get(KEY_PARAM) {
            Some("yamane_e") => TurnReply::text("Select the **margin of error (e)**:")
                .with_choices(vec![
                    vec![MARGIN_5.into(), MARGIN_1.into()],
                    vec![CUSTOM.into()],
                ]),
            Some("effect") => effect_menu(),
            _ => TurnReply::text("Please enter the **population size (N)** as a number:")
                .with_choice_column(&[labels::BACK]),
        }
    }

    async fn handle_study(
        &self,
        input: MatchedInput,
        ctx: &mut TurnContext<'_>,
    ) -> Result<Step, EngineError> {
        match input {
            MatchedInput::Exact(STUDY_CROSS) => {
                ctx.session.context.set(KEY_METHOD, "cochran");
                Ok(Step::go(EngineState::PopulationCheck, population_menu()))
            }
            MatchedInput::Exact(STUDY_EXPERIMENTAL) | MatchedInput::Exact(STUDY_CORRELATIONAL) => {
                ctx.session.context.set(KEY_METHOD, "power");
                ctx.session.context.set(KEY_PARAM, "effect");
                Ok(Step::go(EngineState::ParamInput, effect_menu()))
            }
            MatchedInput::Exact(labels::BACK) => entry(ctx).await,
            _ => self.reprompt(EngineState::StudyTypeSelect, ctx).await,
        }
    }

    async fn handle_method(
        &self,
        input: MatchedInput,
        ctx: &mut TurnContext<'_>,
    ) -> Result<Step, EngineError> {
        match input {
            MatchedInput::Exact(METHOD_COCHRAN) => {
                ctx.session.context.set(KEY_METHOD, "cochran");
                Ok(Step::go(EngineState::PopulationCheck, population_menu()))
            }
            MatchedInput::Exact(METHOD_YAMANE) => {
                ctx.session.context.set(KEY_METHOD, "yamane");
                ctx.session.context.set(KEY_PARAM, "yamane_n");
                Ok(Step::go(
                    EngineState::ParamInput,
                    TurnReply::text("Enter the **population size (N)**:")
                        .with_choice_column(&[labels::BACK]),
                ))
            }
            MatchedInput::Exact(METHOD_POWER) => {
                ctx.session.context.set(KEY_METHOD, "power");
                ctx.session.context.set(KEY_PARAM, "effect");
                Ok(Step::go(EngineState::ParamInput, effect_menu()))
            }
            MatchedInput::Exact(labels::BACK) => entry(ctx).await,
            _ => self.reprompt(EngineState::MethodSelect, ctx).await,
        }
    }

    async fn handle_population(
        &self,
        input: MatchedInput,
        ctx: &mut TurnContext<'_>,
    ) -> Result<Step, EngineError> {
        match input {
            MatchedInput::Exact(POP_KNOWN) | MatchedInput::Exact(POP_SPECIFIC) => {
                ctx.session.context.set(KEY_PARAM, "cochran_n");
                Ok(Step::go(
                    EngineState::ParamInput,
                    TurnReply::text(
                        "Since the group is listable we treat it as **finite**.\n\
                         Please enter the **population size (N)**:",
                    )
                    .with_choice_column(&[labels::BACK]),
                ))
            }
            MatchedInput::Exact(POP_UNKNOWN) | MatchedInput::Exact(POP_GENERAL) => {
                ctx.session.context.remove(KEY_POPULATION);
                Ok(Step::go(EngineState::ConfidenceSelect, confidence_menu()))
            }
            MatchedInput::Exact(POP_UNSURE) => {
                // The "help me decide" sub-branch: one simplified yes/no
                // question before committing to a formula.
                Ok(Step::stay(
                    EngineState::PopulationCheck,
                    TurnReply::text(
                        "🤔 **Let's figure it out.**\n\nIs your study targeting a \
                         **specific, listable group** (e.g. employees of one firm), or a \
                         **general/uncountable group** (e.g. residents of a city)?",
                    )
                    .with_choices(vec![
                        vec![POP_SPECIFIC.into(), POP_GENERAL.into()],
                        vec![labels::BACK.into()],
                    ]),
                ))
            }
            MatchedInput::Exact(labels::BACK) => entry(ctx).await,
            _ => self.reprompt(EngineState::PopulationCheck, ctx).await,
        }
    }

    async fn handle_confidence(
        &self,
        input: MatchedInput,
        ctx: &mut TurnContext<'_>,
    ) -> Result<Step, EngineError> {
        let label = match input {
            MatchedInput::Exact(label) => label,
            _ => return self.reprompt(EngineState::ConfidenceSelect, ctx).await,
        };
        if label == labels::BACK {
            return entry(ctx).await;
        }
        let confidence = Confidence::parse(label).unwrap_or(Confidence::C95);
        let population = ctx
            .session
            .context
            .get(KEY_POPULATION)
            .and_then(|n| n.parse::<u64>().ok());
        let result = sampler::cochran(0.5, 0.05, confidence, population);
        Ok(Step::go(EngineState::MainMenu, result_reply(&result)))
    }

    async fn handle_param(
        &self,
        input: MatchedInput,
        ctx: &mut TurnContext<'_>,
    ) -> Result<Step, EngineError> {
        let param = ctx
            .session
            .context
            .get(KEY_PARAM)
            .unwrap_or_default()
            .to_string();

        match (param.as_str(), input) {
            (_, MatchedInput::Exact(labels::BACK)) => entry(ctx).await,

            ("cochran_n", MatchedInput::Number(n)) if n >= 1.0 => {
                ctx.session.context.set(KEY_POPULATION, format!("{}", n as u64));
                ctx.session.context.remove(KEY_PARAM);
                Ok(Step::go(EngineState::ConfidenceSelect, confidence_menu()))
            }
            ("yamane_n", MatchedInput::Number(n)) if n >= 1.0 => {
                ctx.session.context.set(KEY_POPULATION, format!("{}", n as u64));
                ctx.session.context.set(KEY_PARAM, "yamane_e");
                Ok(Step::stay(EngineState::ParamInput, self.param_prompt(ctx)))
            }
            ("yamane_e", MatchedInput::Exact(CUSTOM)) | ("effect", MatchedInput::Exact(CUSTOM)) => {
                Ok(Step::stay(
                    EngineState::ParamInput,
                    TurnReply::text("Enter the value as a number (e.g. 0.05):"),
                ))
            }
            ("yamane_e", input) => {
                let e = match input {
                    MatchedInput::Exact(MARGIN_1) => Some(0.01),
                    MatchedInput::Exact(MARGIN_5) => Some(0.05),
                    MatchedInput::Number(e) if e > 0.0 && e < 1.0 => Some(e),
                    _ => None,
                };
                let Some(e) = e else {
                    return Ok(Step::stay(EngineState::ParamInput, self.param_prompt(ctx)));
                };
                let population = ctx
                    .session
                    .context
                    .get(KEY_POPULATION)
                    .and_then(|n| n.parse::<u64>().ok())
                    .unwrap_or(0);
                if population == 0 {
                    return entry(ctx).await;
                }
                let result = sampler::yamane(population, e);
                Ok(Step::go(EngineState::MainMenu, result_reply(&result)))
            }
            ("effect", input) => {
                let effect = match input {
                    MatchedInput::Exact(EFFECT_SMALL) => Some(0.2),
                    MatchedInput::Exact(EFFECT_MEDIUM) => Some(0.5),
                    MatchedInput::Exact(EFFECT_LARGE) => Some(0.8),
                    MatchedInput::Number(d) if d > 0.0 => Some(d),
                    _ => None,
                };
                let Some(effect) = effect else {
                    return Ok(Step::stay(EngineState::ParamInput, effect_menu()));
                };
                let result = sampler::power_ttest(effect, 0.05, 0.8);
                Ok(Step::go(EngineState::MainMenu, result_reply(&result)))
            }
            _ => Ok(Step::stay(EngineState::ParamInput, self.param_prompt(ctx))),
        }
    }
}
