//! Voice skill front end for Rearm.
//!
//! Turns voice requests into scheduling calls through an ordered table of
//! intent handlers and answers with a short spoken phrase.

pub mod duration;
pub mod error;
pub mod handlers;
pub mod request;
pub mod router;
pub mod speech;

pub use duration::parse_duration_secs;
pub use error::SkillError;
pub use handlers::{IntentHandler, SkillInput, SkillServices};
pub use request::{RequestEnvelope, SkillResponse};
pub use router::SkillRouter;
