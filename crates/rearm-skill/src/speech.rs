//! Phrases spoken by the skill.

use rearm_core::types::Mode;

pub const HELP: &str = "You can ask me to temporarily disarm ring for some time. \
I will automatically set ring back to the current mode later.";
pub const GOODBYE: &str = "Goodbye!";
pub const DONE: &str = "Done!";
pub const FALLBACK: &str = "Sorry, I don't know about that. Please try again.";
pub const TROUBLE: &str = "Sorry, I had trouble doing what you asked. Please try again.";
pub const GOOD_TRIP: &str = "Have a good trip!";

/// `"2 minute 30 second"`. Seconds are left out when zero.
pub fn spoken_delay(delay_seconds: u32) -> String {
    let minutes = delay_seconds / 60;
    let seconds = delay_seconds % 60;
    if seconds == 0 {
        format!("{} minute", minutes)
    } else {
        format!("{} minute {} second", minutes, seconds)
    }
}

/// Confirmation after a disarm-and-rearm.
pub fn rearm_confirmation(final_mode: Mode, delay_seconds: u32) -> String {
    let mut speech = format!(
        "Disarmed. Ring will be in {} mode in {}.",
        final_mode,
        spoken_delay(delay_seconds)
    );
    if final_mode == Mode::Away {
        speech.push(' ');
        speech.push_str(GOOD_TRIP);
    }
    speech
}

pub fn register_prompt(code: &str) -> String {
    format!(
        "Refresh token is not registered. Set it for register code {}",
        code
    )
}

pub fn reflect(intent_name: &str) -> String {
    format!("You just triggered {}", intent_name)
}
