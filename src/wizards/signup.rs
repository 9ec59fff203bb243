//! Account signup — name, email, phone, country. Required before any
//! analysis wizard is reachable; completion creates the user row.

use async_trait::async_trait;
use chrono::Utc;

use crate::engine::router::{MatchedInput, PatternKind, Route, TurnContext, Wizard};
use crate::engine::state::EngineState;
use crate::engine::turn::{Step, TurnReply};
use crate::error::EngineError;
use crate::store::UserRecord;
use crate::wizards::main_menu;

const KEY_NAME: &str = "signup_name";
const KEY_EMAIL: &str = "signup_email";
const KEY_PHONE: &str = "signup_phone";

/// First contact — ask for the user's name.
pub async fn entry(ctx: &mut TurnContext<'_>) -> Result<Step, EngineError> {
    ctx.session.context.reset_transient();
    Ok(Step::go(
        EngineState::SignupName,
        TurnReply::text(
            "📝 **Welcome!**\n\nBefore we analyse anything, let's set up your \
             account.\nWhat is your **full name**?",
        ),
    ))
}

/// Country → billing currency, defaulting to USD.
fn currency_for(country: &str) -> &'static str {
    let country = country.to_lowercase();
    const MAP: [(&str, &str); 13] = [
        ("nigeria", "NGN"),
        ("ghana", "GHS"),
        ("kenya", "KES"),
        ("south africa", "ZAR"),
        ("united kingdom", "GBP"),
        ("uk", "GBP"),
        ("usa", "USD"),
        ("united states", "USD"),
        ("canada", "CAD"),
        ("germany", "EUR"),
        ("france", "EUR"),
        ("italy", "EUR"),
        ("spain", "EUR"),
    ];
    for (name, currency) in MAP {
        if country.contains(name) {
            return currency;
        }
    }
    "USD"
}

pub struct SignupWizard;

#[async_trait]
impl Wizard for SignupWizard {
    fn name(&self) -> &'static str {
        "signup"
    }

    fn routes(&self) -> Vec<Route> {
        use EngineState::*;
        use PatternKind::*;
        vec![
            Route::new(SignupName, FreeText),
            Route::new(SignupEmail, FreeText),
            Route::new(SignupPhone, FreeText),
            Route::new(SignupCountry, FreeText),
        ]
    }

    async fn handle(
        &self,
        state: EngineState,
        input: MatchedInput,
        ctx: &mut TurnContext<'_>,
    ) -> Result<Step, EngineError> {
        let MatchedInput::FreeText(text) = input else {
            return self.reprompt(state, ctx).await;
        };
        let text = text.trim().to_string();

        match state {
            EngineState::SignupName => {
                if text.len() < 2 {
                    return Ok(Step::stay(
                        state,
                        TurnReply::text("Please enter your full name:"),
                    ));
                }
                ctx.session.context.set(KEY_NAME, text);
                Ok(Step::go(
                    EngineState::SignupEmail,
                    TurnReply::text("Thanks! Now, what is your **email address**?"),
                ))
            }
            EngineState::SignupEmail => {
                if !text.contains('@') || text.len() < 5 {
                    // Validation failure: corrective text, same state.
                    return Ok(Step::stay(
                        state,
                        TurnReply::text(
                            "⚠️ That doesn't look like an email address. Please try again:",
                        ),
                    ));
                }
                ctx.session.context.set(KEY_EMAIL, text);
                Ok(Step::go(
                    EngineState::SignupPhone,
                    TurnReply::text("What is your **phone number**?"),
                ))
            }
            EngineState::SignupPhone => {
                ctx.session.context.set(KEY_PHONE, text);
                Ok(Step::go(
                    EngineState::SignupCountry,
                    TurnReply::text("Finally, which **country** are you in?"),
                ))
            }
            EngineState::SignupCountry => {
                if text.len() < 2 {
                    return Ok(Step::stay(
                        state,
                        TurnReply::text("Please provide a valid country name:"),
                    ));
                }
                let currency = currency_for(&text);
                let user = UserRecord {
                    id: ctx.session.user_id.clone(),
                    full_name: ctx
                        .session
                        .context
                        .get(KEY_NAME)
                        .unwrap_or_default()
                        .to_string(),
                    email: ctx
                        .session
                        .context
                        .get(KEY_EMAIL)
                        .unwrap_or_default()
                        .to_string(),
                    phone: ctx
                        .session
                        .context
                        .get(KEY_PHONE)
                        .unwrap_or_default()
                        .to_string(),
                    country: text,
                    currency: currency.to_string(),
                    created_at: Utc::now(),
                };
                let name = user.full_name.clone();
                ctx.deps.store.create_user(&user).await?;

                ctx.session.context.clear_prefix("signup_");
                Ok(Step::go(
                    EngineState::MainMenu,
                    main_menu::menu_reply(&format!(
                        "✅ **Registration complete!**\nWelcome, {name}. \
                         Local pricing set to **{currency}**."
                    )),
                ))
            }
            other => Err(EngineError::UnroutableState(other.to_string())),
        }
    }

    async fn reprompt(
        &self,
        state: EngineState,
        _ctx: &mut TurnContext<'_>,
    ) -> Result<Step, EngineError> {
        let question = match state {
            EngineState::SignupName => "What is your **full name**?",
            EngineState::SignupEmail => "What is your **email address**?",
            EngineState::SignupPhone => "What is your **phone number**?",
            _ => "Which **country** are you in?",
        };
        Ok(Step::stay(state, TurnReply::text(question)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn currency_mapping_defaults_to_usd() {
        assert_eq!(currency_for("Kenya"), "KES");
        assert_eq!(currency_for("the United Kingdom"), "GBP");
        assert_eq!(currency_for("Atlantis"), "USD");
    }
}
