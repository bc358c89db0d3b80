//! Intent handlers, one per supported request.

use std::sync::Arc;

use async_trait::async_trait;
use rearm_action::{ActuatorProvider, Registrar, Scheduler};
use rearm_core::types::Mode;
use tracing::info;

use crate::duration::parse_duration_secs;
use crate::error::SkillError;
use crate::request::{
    RequestEnvelope, SkillResponse, INTENT_REQUEST, LAUNCH_REQUEST, SESSION_ENDED_REQUEST,
};
use crate::speech;

pub const DELAY_HOME_INTENT: &str = "DelayHomeIntent";
pub const DELAY_AWAY_INTENT: &str = "DelayAwayIntent";
pub const TEMP_DISARM_INTENT: &str = "TempDisarmIntent";
pub const RESET_INTENT: &str = "ResetIntent";
pub const HELP_INTENT: &str = "AMAZON.HelpIntent";
pub const CANCEL_INTENT: &str = "AMAZON.CancelIntent";
pub const STOP_INTENT: &str = "AMAZON.StopIntent";
pub const FALLBACK_INTENT: &str = "AMAZON.FallbackIntent";

/// Services available to handlers.
#[derive(Clone)]
pub struct SkillServices {
    pub scheduler: Scheduler,
    pub registrar: Registrar,
    pub actuators: Arc<dyn ActuatorProvider>,
    pub default_delay_secs: u32,
}

/// A request plus what was loaded for it before routing.
pub struct SkillInput<'a> {
    pub envelope: &'a RequestEnvelope,
    /// Whether the user has a usable refresh token.
    pub registered: bool,
}

/// One entry of the routing table.
#[async_trait]
pub trait IntentHandler: Send + Sync {
    fn name(&self) -> &'static str;

    fn can_handle(&self, input: &SkillInput<'_>) -> bool;

    async fn handle(
        &self,
        input: &SkillInput<'_>,
        services: &SkillServices,
    ) -> Result<SkillResponse, SkillError>;
}

async fn disarm_and_rearm(
    input: &SkillInput<'_>,
    services: &SkillServices,
    final_mode: Mode,
    delay_seconds: u32,
) -> Result<SkillResponse, SkillError> {
    let envelope = input.envelope;
    services
        .scheduler
        .disarm_and_rearm(
            envelope.user_id(),
            final_mode,
            delay_seconds,
            envelope.request_id(),
        )
        .await?;
    Ok(SkillResponse::speak(speech::rearm_confirmation(
        final_mode,
        delay_seconds,
    )))
}

fn is_arming_request(envelope: &RequestEnvelope) -> bool {
    envelope.request_type() == LAUNCH_REQUEST
        || [DELAY_HOME_INTENT, DELAY_AWAY_INTENT, TEMP_DISARM_INTENT]
            .iter()
            .any(|name| envelope.is_intent(name))
}

// =============================================================================
// Arming intents
// =============================================================================

pub struct DelayHomeHandler;

#[async_trait]
impl IntentHandler for DelayHomeHandler {
    fn name(&self) -> &'static str {
        DELAY_HOME_INTENT
    }

    fn can_handle(&self, input: &SkillInput<'_>) -> bool {
        input.registered && input.envelope.is_intent(DELAY_HOME_INTENT)
    }

    async fn handle(
        &self,
        input: &SkillInput<'_>,
        services: &SkillServices,
    ) -> Result<SkillResponse, SkillError> {
        disarm_and_rearm(input, services, Mode::Home, services.default_delay_secs).await
    }
}

pub struct DelayAwayHandler;

#[async_trait]
impl IntentHandler for DelayAwayHandler {
    fn name(&self) -> &'static str {
        DELAY_AWAY_INTENT
    }

    fn can_handle(&self, input: &SkillInput<'_>) -> bool {
        input.registered && input.envelope.is_intent(DELAY_AWAY_INTENT)
    }

    async fn handle(
        &self,
        input: &SkillInput<'_>,
        services: &SkillServices,
    ) -> Result<SkillResponse, SkillError> {
        disarm_and_rearm(input, services, Mode::Away, services.default_delay_secs).await
    }
}

/// Launch or "disarm for N minutes". Rearms to home.
pub struct TempDisarmHandler;

#[async_trait]
impl IntentHandler for TempDisarmHandler {
    fn name(&self) -> &'static str {
        TEMP_DISARM_INTENT
    }

    fn can_handle(&self, input: &SkillInput<'_>) -> bool {
        input.registered
            && (input.envelope.request_type() == LAUNCH_REQUEST
                || input.envelope.is_intent(TEMP_DISARM_INTENT))
    }

    async fn handle(
        &self,
        input: &SkillInput<'_>,
        services: &SkillServices,
    ) -> Result<SkillResponse, SkillError> {
        let delay = match input.envelope.slot("delay") {
            Some(raw) => parse_duration_secs(raw)?,
            None => services.default_delay_secs,
        };
        disarm_and_rearm(input, services, Mode::Home, delay).await
    }
}

/// Arming request from a user without a token: hand out a register code.
pub struct RegisterHandler;

#[async_trait]
impl IntentHandler for RegisterHandler {
    fn name(&self) -> &'static str {
        "Register"
    }

    fn can_handle(&self, input: &SkillInput<'_>) -> bool {
        !input.registered && is_arming_request(input.envelope)
    }

    async fn handle(
        &self,
        input: &SkillInput<'_>,
        services: &SkillServices,
    ) -> Result<SkillResponse, SkillError> {
        let code = services.registrar.begin(input.envelope.user_id()).await?;
        Ok(SkillResponse::speak(speech::register_prompt(&code)))
    }
}

// =============================================================================
// Housekeeping intents
// =============================================================================

/// Drops the user's cached alarm connection.
pub struct ResetHandler;

#[async_trait]
impl IntentHandler for ResetHandler {
    fn name(&self) -> &'static str {
        RESET_INTENT
    }

    fn can_handle(&self, input: &SkillInput<'_>) -> bool {
        input.envelope.is_intent(RESET_INTENT)
    }

    async fn handle(
        &self,
        input: &SkillInput<'_>,
        services: &SkillServices,
    ) -> Result<SkillResponse, SkillError> {
        let user_id = input.envelope.user_id();
        let dropped = services.actuators.reset(user_id);
        info!(user_id = %user_id, dropped, "Connection reset");
        Ok(SkillResponse::speak(speech::DONE))
    }
}

pub struct HelpHandler;

#[async_trait]
impl IntentHandler for HelpHandler {
    fn name(&self) -> &'static str {
        HELP_INTENT
    }

    fn can_handle(&self, input: &SkillInput<'_>) -> bool {
        input.envelope.is_intent(HELP_INTENT)
    }

    async fn handle(
        &self,
        _input: &SkillInput<'_>,
        _services: &SkillServices,
    ) -> Result<SkillResponse, SkillError> {
        Ok(SkillResponse::ask(speech::HELP))
    }
}

pub struct CancelAndStopHandler;

#[async_trait]
impl IntentHandler for CancelAndStopHandler {
    fn name(&self) -> &'static str {
        "CancelAndStop"
    }

    fn can_handle(&self, input: &SkillInput<'_>) -> bool {
        input.envelope.is_intent(CANCEL_INTENT) || input.envelope.is_intent(STOP_INTENT)
    }

    async fn handle(
        &self,
        _input: &SkillInput<'_>,
        _services: &SkillServices,
    ) -> Result<SkillResponse, SkillError> {
        Ok(SkillResponse::speak(speech::GOODBYE))
    }
}

pub struct FallbackHandler;

#[async_trait]
impl IntentHandler for FallbackHandler {
    fn name(&self) -> &'static str {
        FALLBACK_INTENT
    }

    fn can_handle(&self, input: &SkillInput<'_>) -> bool {
        input.envelope.is_intent(FALLBACK_INTENT)
    }

    async fn handle(
        &self,
        _input: &SkillInput<'_>,
        _services: &SkillServices,
    ) -> Result<SkillResponse, SkillError> {
        Ok(SkillResponse::ask(speech::FALLBACK))
    }
}

pub struct SessionEndedHandler;

#[async_trait]
impl IntentHandler for SessionEndedHandler {
    fn name(&self) -> &'static str {
        SESSION_ENDED_REQUEST
    }

    fn can_handle(&self, input: &SkillInput<'_>) -> bool {
        input.envelope.request_type() == SESSION_ENDED_REQUEST
    }

    async fn handle(
        &self,
        input: &SkillInput<'_>,
        _services: &SkillServices,
    ) -> Result<SkillResponse, SkillError> {
        info!(user_id = %input.envelope.user_id(), "Session ended");
        Ok(SkillResponse::empty())
    }
}

/// Echoes any other intent back, for interaction model debugging.
pub struct IntentReflectorHandler;

#[async_trait]
impl IntentHandler for IntentReflectorHandler {
    fn name(&self) -> &'static str {
        "IntentReflector"
    }

    fn can_handle(&self, input: &SkillInput<'_>) -> bool {
        input.envelope.request_type() == INTENT_REQUEST
    }

    async fn handle(
        &self,
        input: &SkillInput<'_>,
        _services: &SkillServices,
    ) -> Result<SkillResponse, SkillError> {
        let name = input.envelope.intent_name().unwrap_or("an unnamed intent");
        Ok(SkillResponse::speak(speech::reflect(name)))
    }
}
