//! Voice request envelope and spoken response.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

pub const LAUNCH_REQUEST: &str = "LaunchRequest";
pub const INTENT_REQUEST: &str = "IntentRequest";
pub const SESSION_ENDED_REQUEST: &str = "SessionEndedRequest";

/// Incoming voice request. Only the fields the skill reads are modelled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestEnvelope {
    pub session: Session,
    pub request: Request,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub user: User,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub user_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Request {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub request_id: String,
    #[serde(default)]
    pub intent: Option<Intent>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Intent {
    pub name: String,
    #[serde(default)]
    pub slots: HashMap<String, Slot>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Slot {
    #[serde(default)]
    pub value: Option<String>,
}

impl RequestEnvelope {
    pub fn user_id(&self) -> &str {
        &self.session.user.user_id
    }

    pub fn request_id(&self) -> &str {
        &self.request.request_id
    }

    pub fn request_type(&self) -> &str {
        &self.request.kind
    }

    /// Intent name, for intent requests only.
    pub fn intent_name(&self) -> Option<&str> {
        if self.request.kind != INTENT_REQUEST {
            return None;
        }
        self.request.intent.as_ref().map(|i| i.name.as_str())
    }

    pub fn is_intent(&self, name: &str) -> bool {
        self.intent_name() == Some(name)
    }

    /// Non-empty slot value of the current intent.
    pub fn slot(&self, name: &str) -> Option<&str> {
        self.request
            .intent
            .as_ref()?
            .slots
            .get(name)?
            .value
            .as_deref()
            .filter(|v| !v.trim().is_empty())
    }

    /// Build a request for tests and the CLI.
    pub fn new(user_id: &str, kind: &str, intent: Option<&str>) -> Self {
        Self {
            session: Session {
                user: User {
                    user_id: user_id.to_string(),
                },
            },
            request: Request {
                kind: kind.to_string(),
                request_id: uuid::Uuid::new_v4().to_string(),
                intent: intent.map(|name| Intent {
                    name: name.to_string(),
                    slots: HashMap::new(),
                }),
            },
        }
    }

    pub fn with_slot(mut self, name: &str, value: &str) -> Self {
        if let Some(intent) = self.request.intent.as_mut() {
            intent.slots.insert(
                name.to_string(),
                Slot {
                    value: Some(value.to_string()),
                },
            );
        }
        self
    }
}

/// What the assistant says back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillResponse {
    pub speech: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reprompt: Option<String>,
    pub end_session: bool,
}

impl SkillResponse {
    /// Speak and close the session.
    pub fn speak(speech: impl Into<String>) -> Self {
        Self {
            speech: speech.into(),
            reprompt: None,
            end_session: true,
        }
    }

    /// Speak and keep listening, repeating the same prompt.
    pub fn ask(speech: impl Into<String>) -> Self {
        let speech = speech.into();
        Self {
            reprompt: Some(speech.clone()),
            speech,
            end_session: false,
        }
    }

    pub fn empty() -> Self {
        Self::speak(String::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_intent_request() {
        let raw = json!({
            "session": {"user": {"userId": "amzn1.account.X"}},
            "request": {
                "type": "IntentRequest",
                "requestId": "req-1",
                "intent": {
                    "name": "TempDisarmIntent",
                    "slots": {"delay": {"name": "delay", "value": "PT5M"}}
                }
            }
        });
        let env: RequestEnvelope = serde_json::from_value(raw).unwrap();
        assert_eq!(env.user_id(), "amzn1.account.X");
        assert_eq!(env.request_id(), "req-1");
        assert!(env.is_intent("TempDisarmIntent"));
        assert_eq!(env.slot("delay"), Some("PT5M"));
    }

    #[test]
    fn test_launch_has_no_intent_name() {
        let raw = json!({
            "session": {"user": {"userId": "u1"}},
            "request": {"type": "LaunchRequest", "requestId": "req-2"}
        });
        let env: RequestEnvelope = serde_json::from_value(raw).unwrap();
        assert_eq!(env.request_type(), LAUNCH_REQUEST);
        assert_eq!(env.intent_name(), None);
        assert_eq!(env.slot("delay"), None);
    }

    #[test]
    fn test_blank_slot_is_absent() {
        let env = RequestEnvelope::new("u1", INTENT_REQUEST, Some("TempDisarmIntent"))
            .with_slot("delay", " ");
        assert_eq!(env.slot("delay"), None);
    }

    #[test]
    fn test_response_shapes() {
        let r = SkillResponse::ask("Help?");
        assert_eq!(r.reprompt.as_deref(), Some("Help?"));
        assert!(!r.end_session);

        let r = SkillResponse::speak("Goodbye!");
        assert!(r.end_session);
        let value = serde_json::to_value(&r).unwrap();
        assert!(value.get("reprompt").is_none());
    }
}
