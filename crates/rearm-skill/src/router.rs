//! Ordered dispatch of voice requests.
//!
//! Handlers are consulted in order and the first whose predicate matches
//! handles the request. Any failure is logged and answered with a generic
//! apology.

use tracing::{debug, error};

use crate::error::SkillError;
use crate::handlers::{
    CancelAndStopHandler, DelayAwayHandler, DelayHomeHandler, FallbackHandler, HelpHandler,
    IntentHandler, IntentReflectorHandler, RegisterHandler, ResetHandler, SessionEndedHandler,
    SkillInput, SkillServices, TempDisarmHandler,
};
use crate::request::{RequestEnvelope, SkillResponse};
use crate::speech;

pub struct SkillRouter {
    handlers: Vec<Box<dyn IntentHandler>>,
    services: SkillServices,
}

impl SkillRouter {
    /// Router with the standard handler chain.
    pub fn new(services: SkillServices) -> Self {
        Self::with_handlers(
            services,
            vec![
                Box::new(DelayHomeHandler),
                Box::new(DelayAwayHandler),
                Box::new(TempDisarmHandler),
                Box::new(RegisterHandler),
                Box::new(ResetHandler),
                Box::new(HelpHandler),
                Box::new(CancelAndStopHandler),
                Box::new(FallbackHandler),
                Box::new(SessionEndedHandler),
                Box::new(IntentReflectorHandler),
            ],
        )
    }

    pub fn with_handlers(services: SkillServices, handlers: Vec<Box<dyn IntentHandler>>) -> Self {
        Self { handlers, services }
    }

    pub fn handler_names(&self) -> Vec<&'static str> {
        self.handlers.iter().map(|h| h.name()).collect()
    }

    /// Answer a request. Never fails; errors become a spoken apology.
    pub async fn dispatch(&self, envelope: &RequestEnvelope) -> SkillResponse {
        match self.try_dispatch(envelope).await {
            Ok(response) => response,
            Err(e) => {
                error!(
                    user_id = %envelope.user_id(),
                    request_type = %envelope.request_type(),
                    error = %e,
                    "Skill request failed"
                );
                SkillResponse::ask(speech::TROUBLE)
            }
        }
    }

    async fn try_dispatch(&self, envelope: &RequestEnvelope) -> Result<SkillResponse, SkillError> {
        let registered = self
            .services
            .registrar
            .is_registered(envelope.user_id())
            .await?;
        let input = SkillInput {
            envelope,
            registered,
        };

        let handler = self
            .handlers
            .iter()
            .find(|h| h.can_handle(&input))
            .ok_or_else(|| SkillError::Unhandled(envelope.request_type().to_string()))?;
        debug!(
            user_id = %envelope.user_id(),
            handler = handler.name(),
            registered,
            "Routing skill request"
        );
        handler.handle(&input, &self.services).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::{DELAY_AWAY_INTENT, DELAY_HOME_INTENT, RESET_INTENT, TEMP_DISARM_INTENT};
    use crate::request::{INTENT_REQUEST, LAUNCH_REQUEST, SESSION_ENDED_REQUEST};
    use rearm_action::{
        ActuatorConnector, ActuatorProvider, ConnectionCache, Registrar, Scheduler,
        SimulatedVendor,
    };
    use rearm_core::types::{CredentialRole, EventStatus, Mode};
    use rearm_storage::{DelayQueue, EventStore, MemoryDelayQueue, MemoryRecordStore};
    use std::sync::Arc;

    struct Fixture {
        router: SkillRouter,
        store: EventStore,
        queue: Arc<MemoryDelayQueue>,
        registrar: Registrar,
        connector: Arc<ActuatorConnector>,
    }

    fn fixture() -> Fixture {
        let store = EventStore::new(Arc::new(MemoryRecordStore::new()));
        let queue = Arc::new(MemoryDelayQueue::default());
        let registrar = Registrar::new(store.clone(), CredentialRole::Listener);
        let connector = Arc::new(ActuatorConnector::new(
            store.clone(),
            CredentialRole::Listener,
            Arc::new(SimulatedVendor::new(Mode::Away)),
            Arc::new(ConnectionCache::new()),
            "test",
        ));
        let services = SkillServices {
            scheduler: Scheduler::new(store.clone(), queue.clone()),
            registrar: registrar.clone(),
            actuators: connector.clone(),
            default_delay_secs: 180,
        };
        Fixture {
            router: SkillRouter::new(services),
            store,
            queue,
            registrar,
            connector,
        }
    }

    async fn registered() -> Fixture {
        let f = fixture();
        f.registrar.complete("u1", "rt-1").await.unwrap();
        f
    }

    fn intent(name: &str) -> RequestEnvelope {
        RequestEnvelope::new("u1", INTENT_REQUEST, Some(name))
    }

    #[tokio::test]
    async fn test_delay_home_schedules_and_confirms() {
        let f = registered().await;
        let response = f.router.dispatch(&intent(DELAY_HOME_INTENT)).await;
        assert_eq!(
            response.speech,
            "Disarmed. Ring will be in home mode in 3 minute."
        );
        assert!(response.end_session);

        let messages = f.queue.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].mode_override, Some(Mode::Disarmed));
        let event = f.store.get_event("u1").await.unwrap().unwrap();
        assert_eq!(event.target_mode, Mode::Home);
        assert_eq!(event.delay_seconds, 180);
        assert_eq!(event.status, EventStatus::Scheduled);
    }

    #[tokio::test]
    async fn test_delay_away_wishes_good_trip() {
        let f = registered().await;
        let response = f.router.dispatch(&intent(DELAY_AWAY_INTENT)).await;
        assert!(response.speech.ends_with("Have a good trip!"));
        let event = f.store.get_event("u1").await.unwrap().unwrap();
        assert_eq!(event.target_mode, Mode::Away);
    }

    #[tokio::test]
    async fn test_temp_disarm_uses_delay_slot() {
        let f = registered().await;
        let request = intent(TEMP_DISARM_INTENT).with_slot("delay", "PT1M30S");
        let response = f.router.dispatch(&request).await;
        assert_eq!(
            response.speech,
            "Disarmed. Ring will be in home mode in 1 minute 30 second."
        );
        assert_eq!(f.store.get_event("u1").await.unwrap().unwrap().delay_seconds, 90);
    }

    #[tokio::test]
    async fn test_launch_uses_default_delay() {
        let f = registered().await;
        let request = RequestEnvelope::new("u1", LAUNCH_REQUEST, None);
        let response = f.router.dispatch(&request).await;
        assert!(response.speech.contains("home mode in 3 minute"));
    }

    #[tokio::test]
    async fn test_bad_delay_slot_apologises_without_scheduling() {
        let f = registered().await;
        let request = intent(TEMP_DISARM_INTENT).with_slot("delay", "soon");
        let response = f.router.dispatch(&request).await;
        assert_eq!(response.speech, speech::TROUBLE);
        assert!(!response.end_session);
        assert!(f.queue.is_empty());
    }

    #[tokio::test]
    async fn test_unregistered_launch_hands_out_code() {
        let f = fixture();
        let request = RequestEnvelope::new("u1", LAUNCH_REQUEST, None);
        let response = f.router.dispatch(&request).await;
        assert!(response
            .speech
            .starts_with("Refresh token is not registered. Set it for register code "));
        let code = response.speech.rsplit(' ').next().unwrap();
        assert_eq!(code.len(), 4);
        assert!(!f.registrar.is_registered("u1").await.unwrap());
        assert_eq!(f.registrar.list_user_ids().await.unwrap(), vec!["u1"]);
        assert!(f.queue.is_empty());
    }

    #[tokio::test]
    async fn test_unregistered_arming_intent_does_not_schedule() {
        let f = fixture();
        let response = f.router.dispatch(&intent(DELAY_AWAY_INTENT)).await;
        assert!(response.speech.contains("register code"));
        assert!(f.store.get_event("u1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_reset_clears_cached_connection() {
        let f = registered().await;
        f.connector.actuator_for("u1").await.unwrap();
        assert_eq!(f.connector.cache().len(), 1);

        let response = f.router.dispatch(&intent(RESET_INTENT)).await;
        assert_eq!(response.speech, "Done!");
        assert!(f.connector.cache().is_empty());
    }

    #[tokio::test]
    async fn test_housekeeping_intents() {
        let f = fixture();
        let help = f.router.dispatch(&intent("AMAZON.HelpIntent")).await;
        assert_eq!(help.speech, speech::HELP);
        assert_eq!(help.reprompt.as_deref(), Some(speech::HELP));

        for name in ["AMAZON.CancelIntent", "AMAZON.StopIntent"] {
            assert_eq!(f.router.dispatch(&intent(name)).await.speech, "Goodbye!");
        }

        let fallback = f.router.dispatch(&intent("AMAZON.FallbackIntent")).await;
        assert_eq!(fallback.speech, speech::FALLBACK);

        let ended = RequestEnvelope::new("u1", SESSION_ENDED_REQUEST, None);
        assert_eq!(f.router.dispatch(&ended).await.speech, "");
    }

    #[tokio::test]
    async fn test_unknown_intent_is_reflected() {
        let f = fixture();
        let response = f.router.dispatch(&intent("OrderPizzaIntent")).await;
        assert_eq!(response.speech, "You just triggered OrderPizzaIntent");
    }

    #[tokio::test]
    async fn test_unknown_request_type_apologises() {
        let f = fixture();
        let request = RequestEnvelope::new("u1", "CanFulfillIntentRequest", None);
        let response = f.router.dispatch(&request).await;
        assert_eq!(response.speech, speech::TROUBLE);
    }

    #[tokio::test]
    async fn test_first_match_wins() {
        let f = fixture();
        assert_eq!(f.router.handler_names()[0], DELAY_HOME_INTENT);
        assert_eq!(
            *f.router.handler_names().last().unwrap(),
            "IntentReflector"
        );
        // Registered users never reach the register handler.
        f.registrar.complete("u1", "rt-1").await.unwrap();
        let response = f.router.dispatch(&intent(DELAY_HOME_INTENT)).await;
        assert!(response.speech.starts_with("Disarmed."));
    }

    #[tokio::test]
    async fn test_only_disarm_is_due_immediately() {
        let f = registered().await;
        f.router.dispatch(&intent(DELAY_HOME_INTENT)).await;
        let due = f.queue.receive(10).await.unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].message.mode_override, Some(Mode::Disarmed));
    }
}
