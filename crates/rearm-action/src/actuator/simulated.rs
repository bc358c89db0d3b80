//! In-process stand-in for the hosted alarm API.
//!
//! Backs the `simulated` actuator kind and the tests. Failures and token
//! rotations are scripted ahead of time.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use rearm_core::types::{Mode, RefreshCredential};
use tracing::info;

use super::{
    raw_mode, AlarmLocation, AlarmSession, SessionFactory, TokenRotationListener,
};
use crate::error::ActuatorError;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Consume one scripted failure. `u32::MAX` never runs out.
fn take_failure(remaining: &AtomicU32) -> bool {
    remaining
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| match n {
            0 => None,
            u32::MAX => Some(u32::MAX),
            n => Some(n - 1),
        })
        .is_ok()
}

/// A single simulated alarm unit.
pub struct SimulatedAlarm {
    id: String,
    raw: Mutex<String>,
    failures_remaining: AtomicU32,
    read_failures_remaining: AtomicU32,
    apply_on_failure: AtomicBool,
    apply_calls: AtomicU32,
    read_calls: AtomicU32,
}

impl SimulatedAlarm {
    pub fn new(id: impl Into<String>, mode: Mode) -> Self {
        Self {
            id: id.into(),
            raw: Mutex::new(raw_mode(mode).to_string()),
            failures_remaining: AtomicU32::new(0),
            read_failures_remaining: AtomicU32::new(0),
            apply_on_failure: AtomicBool::new(false),
            apply_calls: AtomicU32::new(0),
            read_calls: AtomicU32::new(0),
        }
    }

    pub fn raw(&self) -> String {
        lock(&self.raw).clone()
    }

    /// Overwrite the raw vendor mode, including values outside the known set.
    pub fn set_raw(&self, raw: &str) {
        *lock(&self.raw) = raw.to_string();
    }

    pub fn set_mode(&self, mode: Mode) {
        self.set_raw(raw_mode(mode));
    }

    /// Make the next `n` mode changes fail.
    pub fn fail_next(&self, n: u32) {
        self.failures_remaining.store(n, Ordering::SeqCst);
    }

    /// Make every mode change fail.
    pub fn fail_always(&self) {
        self.fail_next(u32::MAX);
    }

    /// Make the next `n` mode reads fail.
    pub fn fail_next_reads(&self, n: u32) {
        self.read_failures_remaining.store(n, Ordering::SeqCst);
    }

    /// Failed mode changes still take effect, as when the vendor times out
    /// after the device has already switched.
    pub fn apply_on_failure(&self, enabled: bool) {
        self.apply_on_failure.store(enabled, Ordering::SeqCst);
    }

    /// Number of arm/disarm calls received.
    pub fn apply_calls(&self) -> u32 {
        self.apply_calls.load(Ordering::SeqCst)
    }

    pub fn read_calls(&self) -> u32 {
        self.read_calls.load(Ordering::SeqCst)
    }

    fn change(&self, mode: Mode) -> Result<(), ActuatorError> {
        self.apply_calls.fetch_add(1, Ordering::SeqCst);
        if take_failure(&self.failures_remaining) {
            if self.apply_on_failure.load(Ordering::SeqCst) {
                self.set_mode(mode);
            }
            return Err(ActuatorError::Transient(format!(
                "simulated failure setting {} to {}",
                self.id, mode
            )));
        }
        self.set_mode(mode);
        Ok(())
    }
}

#[async_trait]
impl AlarmLocation for SimulatedAlarm {
    fn location_id(&self) -> &str {
        &self.id
    }

    async fn alarm_mode(&self) -> Result<String, ActuatorError> {
        self.read_calls.fetch_add(1, Ordering::SeqCst);
        if take_failure(&self.read_failures_remaining) {
            return Err(ActuatorError::Transient(format!(
                "simulated failure reading {}",
                self.id
            )));
        }
        Ok(self.raw())
    }

    async fn arm_home(&self) -> Result<(), ActuatorError> {
        self.change(Mode::Home)
    }

    async fn arm_away(&self) -> Result<(), ActuatorError> {
        self.change(Mode::Away)
    }

    async fn disarm(&self) -> Result<(), ActuatorError> {
        self.change(Mode::Disarmed)
    }
}

struct SimulatedSession {
    alarm: Arc<SimulatedAlarm>,
}

#[async_trait]
impl AlarmSession for SimulatedSession {
    async fn locations(&self) -> Result<Vec<Arc<dyn AlarmLocation>>, ActuatorError> {
        Ok(vec![self.alarm.clone() as Arc<dyn AlarmLocation>])
    }
}

/// Simulated vendor account service: one alarm per user, created on first
/// use in `initial_mode`.
pub struct SimulatedVendor {
    initial_mode: Mode,
    alarms: Mutex<HashMap<String, Arc<SimulatedAlarm>>>,
    pending_rotations: Mutex<HashMap<String, String>>,
    sessions_opened: Mutex<Vec<(String, String)>>,
    open_failures_remaining: AtomicU32,
}

impl SimulatedVendor {
    pub fn new(initial_mode: Mode) -> Self {
        Self {
            initial_mode,
            alarms: Mutex::new(HashMap::new()),
            pending_rotations: Mutex::new(HashMap::new()),
            sessions_opened: Mutex::new(Vec::new()),
            open_failures_remaining: AtomicU32::new(0),
        }
    }

    /// The user's alarm, created if needed.
    pub fn alarm(&self, user_id: &str) -> Arc<SimulatedAlarm> {
        lock(&self.alarms)
            .entry(user_id.to_string())
            .or_insert_with(|| {
                Arc::new(SimulatedAlarm::new(
                    format!("location-{}", user_id),
                    self.initial_mode,
                ))
            })
            .clone()
    }

    /// Issue `new_token` the next time a session is opened for the user.
    pub fn rotate_on_next_open(&self, user_id: &str, new_token: &str) {
        lock(&self.pending_rotations).insert(user_id.to_string(), new_token.to_string());
    }

    /// Make the next `n` session opens fail, as when the vendor is unreachable.
    pub fn fail_next_opens(&self, n: u32) {
        self.open_failures_remaining.store(n, Ordering::SeqCst);
    }

    /// `(user_id, token)` for every session opened so far, oldest first.
    pub fn sessions_opened(&self) -> Vec<(String, String)> {
        lock(&self.sessions_opened).clone()
    }
}

#[async_trait]
impl SessionFactory for SimulatedVendor {
    async fn open(
        &self,
        user_id: &str,
        credential: &RefreshCredential,
        control_center_name: &str,
        on_rotate: Arc<dyn TokenRotationListener>,
    ) -> Result<Arc<dyn AlarmSession>, ActuatorError> {
        if take_failure(&self.open_failures_remaining) {
            return Err(ActuatorError::Transient(format!(
                "simulated vendor unreachable for {}",
                user_id
            )));
        }
        lock(&self.sessions_opened).push((user_id.to_string(), credential.token.clone()));
        info!(user_id = %user_id, client = %control_center_name, "Simulated session opened");

        let rotation = lock(&self.pending_rotations).remove(user_id);
        if let Some(new_token) = rotation {
            on_rotate.token_rotated(&new_token).await?;
        }

        Ok(Arc::new(SimulatedSession {
            alarm: self.alarm(user_id),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_failures_then_success() {
        let alarm = SimulatedAlarm::new("loc", Mode::Away);
        alarm.fail_next(2);

        assert!(alarm.arm_home().await.is_err());
        assert!(alarm.arm_home().await.is_err());
        assert_eq!(alarm.raw(), "all");
        alarm.arm_home().await.unwrap();
        assert_eq!(alarm.raw(), "some");
        assert_eq!(alarm.apply_calls(), 3);
    }

    #[tokio::test]
    async fn test_fail_always_never_recovers() {
        let alarm = SimulatedAlarm::new("loc", Mode::Away);
        alarm.fail_always();
        for _ in 0..10 {
            assert!(alarm.disarm().await.is_err());
        }
        assert_eq!(alarm.raw(), "all");
    }

    #[tokio::test]
    async fn test_apply_on_failure_changes_mode() {
        let alarm = SimulatedAlarm::new("loc", Mode::Away);
        alarm.fail_next(1);
        alarm.apply_on_failure(true);
        assert!(alarm.arm_home().await.is_err());
        assert_eq!(alarm.alarm_mode().await.unwrap(), "some");
        assert_eq!(alarm.read_calls(), 1);
    }

    #[tokio::test]
    async fn test_scripted_read_failure() {
        let alarm = SimulatedAlarm::new("loc", Mode::Home);
        alarm.fail_next_reads(1);
        assert!(matches!(
            alarm.alarm_mode().await,
            Err(ActuatorError::Transient(_))
        ));
        assert_eq!(alarm.alarm_mode().await.unwrap(), "some");
        assert_eq!(alarm.read_calls(), 2);
    }

    #[tokio::test]
    async fn test_scripted_open_failure() {
        let vendor = SimulatedVendor::new(Mode::Home);
        vendor.fail_next_opens(1);
        let recorder = Arc::new(Recorder(Mutex::new(Vec::new())));
        let credential = RefreshCredential::new("rt-1");
        assert!(vendor
            .open("u1", &credential, "test", recorder.clone())
            .await
            .is_err());
        assert!(vendor.sessions_opened().is_empty());
        vendor.open("u1", &credential, "test", recorder).await.unwrap();
        assert_eq!(vendor.sessions_opened().len(), 1);
    }

    struct Recorder(Mutex<Vec<String>>);

    #[async_trait]
    impl TokenRotationListener for Recorder {
        async fn token_rotated(&self, new_token: &str) -> Result<(), ActuatorError> {
            lock(&self.0).push(new_token.to_string());
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_vendor_rotates_once() {
        let vendor = SimulatedVendor::new(Mode::Home);
        vendor.rotate_on_next_open("u1", "rt-2");
        let recorder = Arc::new(Recorder(Mutex::new(Vec::new())));

        let credential = RefreshCredential::new("rt-1");
        vendor
            .open("u1", &credential, "test", recorder.clone())
            .await
            .unwrap();
        vendor
            .open("u1", &credential, "test", recorder.clone())
            .await
            .unwrap();

        assert_eq!(*lock(&recorder.0), vec!["rt-2"]);
        assert_eq!(vendor.sessions_opened().len(), 2);
    }

    #[tokio::test]
    async fn test_vendor_keeps_one_alarm_per_user() {
        let vendor = SimulatedVendor::new(Mode::Away);
        let a = vendor.alarm("u1");
        a.set_mode(Mode::Home);
        assert_eq!(vendor.alarm("u1").raw(), "some");
        assert_eq!(vendor.alarm("u2").raw(), "all");
    }
}
