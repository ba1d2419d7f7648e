//! Session management for a UDS client
//!
//! [SessionManager] owns a [UdsClient] and takes care of the bookkeeping a
//! non-default diagnostic session needs: it sends periodic TesterPresent
//! keep-alives so the ECU does not fall back to its default session, and it
//! provides scoped guards which are guaranteed to restore ECU state (session
//! mode, DTC recording, communication) on every exit path.
//!
//! The keep-alive is cooperative. [SessionManager::poll] should be called from
//! the application's idle loop; since the client performs one request at a
//! time, a keep-alive can never interleave with an in-flight request.

use std::ops::{Deref, DerefMut};
use std::time::{Duration, Instant};

use log::warn;

use crate::uds::{
    CommunicationControlType, CommunicationType, DtcSettingType, UDSSessionType, UdsClient,
};
use crate::DiagServerResult;

/// Wraps a [UdsClient] with keep-alive scheduling and scoped ECU state guards
pub struct SessionManager {
    client: UdsClient,
    keep_alive_interval_ms: u32,
    last_activity: Instant,
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("client", &self.client)
            .field("keep_alive_interval_ms", &self.keep_alive_interval_ms)
            .finish()
    }
}

impl SessionManager {
    /// Creates a new session manager around a client.
    ///
    /// ## Parameters
    /// * client - The UDS client to manage
    /// * keep_alive_interval_ms - Requested TesterPresent interval. The
    ///   effective interval is additionally bounded by half of the P2* time the
    ///   ECU reported for the active session
    pub fn new(client: UdsClient, keep_alive_interval_ms: u32) -> Self {
        Self {
            client,
            keep_alive_interval_ms,
            last_activity: Instant::now(),
        }
    }

    /// Performs an operation with the managed client.
    ///
    /// Any request counts as bus activity and pushes the next keep-alive back
    pub fn with_client<T, F: FnOnce(&mut UdsClient) -> DiagServerResult<T>>(
        &mut self,
        f: F,
    ) -> DiagServerResult<T> {
        let res = f(&mut self.client);
        self.last_activity = Instant::now();
        res
    }

    /// Returns a reference to the managed client. Direct requests through this
    /// reference do not reset the keep-alive timer, prefer
    /// [SessionManager::with_client]
    pub fn client(&mut self) -> &mut UdsClient {
        &mut self.client
    }

    /// Dissolves the manager, returning the client
    pub fn into_client(self) -> UdsClient {
        self.client
    }

    /// Keep-alive tick, to be called whenever the application is idle.
    ///
    /// Sends a suppressed TesterPresent if a non-default session is active and
    /// the keep-alive interval has elapsed since the last request. Does nothing
    /// in the default session
    pub fn poll(&mut self) -> DiagServerResult<()> {
        if self.client.current_session_mode() == UDSSessionType::Default {
            return Ok(());
        }
        if self.last_activity.elapsed() < self.effective_keep_alive() {
            return Ok(());
        }
        self.with_client(|c| c.tester_present_suppressed())
    }

    /// The effective keep-alive interval: the configured interval, bounded by
    /// half of the ECU's reported P2* time
    fn effective_keep_alive(&self) -> Duration {
        let mut ms = self.keep_alive_interval_ms;
        if let Some(timing) = self.client.current_session_timing() {
            ms = ms.min(timing.p2_star_server_ms / 2);
        }
        Duration::from_millis(ms as u64)
    }

    /// Puts the ECU into the given session mode, returning a guard which
    /// requests the default session again when dropped.
    ///
    /// While the guard is alive, [SessionManager::poll] keeps the session
    /// alive with TesterPresent messages
    pub fn enter_session(&mut self, mode: UDSSessionType) -> DiagServerResult<SessionGuard<'_>> {
        self.with_client(|c| c.set_session_mode(mode))?;
        Ok(SessionGuard { manager: self })
    }

    /// Turns DTC recording off, returning a guard which turns it back on
    /// when dropped
    pub fn disable_dtc_setting(&mut self) -> DiagServerResult<DtcSettingGuard<'_>> {
        self.with_client(|c| c.control_dtc_setting(DtcSettingType::Off))?;
        Ok(DtcSettingGuard { manager: self })
    }

    /// Disables normal message transmission and reception on the ECU,
    /// returning a guard which re-enables it when dropped
    pub fn disable_communication(
        &mut self,
        communication_type: CommunicationType,
    ) -> DiagServerResult<CommunicationGuard<'_>> {
        self.with_client(|c| {
            c.communication_control(CommunicationControlType::DisableRxAndTx, communication_type)
        })?;
        Ok(CommunicationGuard {
            manager: self,
            communication_type,
        })
    }
}

/// Scoped non-default diagnostic session. Requests the default session again
/// when dropped, regardless of how the scope is left
#[derive(Debug)]
pub struct SessionGuard<'a> {
    manager: &'a mut SessionManager,
}

impl Deref for SessionGuard<'_> {
    type Target = SessionManager;
    fn deref(&self) -> &Self::Target {
        self.manager
    }
}

impl DerefMut for SessionGuard<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.manager
    }
}

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        if self.manager.client.current_session_mode() == UDSSessionType::Default {
            return;
        }
        if let Err(e) = self.manager.with_client(|c| c.set_default_mode()) {
            warn!("could not restore default session on scope exit: {e}");
        }
    }
}

/// Scoped DTC recording suspension. Turns DTC recording back on when dropped
#[derive(Debug)]
pub struct DtcSettingGuard<'a> {
    manager: &'a mut SessionManager,
}

impl Deref for DtcSettingGuard<'_> {
    type Target = SessionManager;
    fn deref(&self) -> &Self::Target {
        self.manager
    }
}

impl DerefMut for DtcSettingGuard<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.manager
    }
}

impl Drop for DtcSettingGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self
            .manager
            .with_client(|c| c.control_dtc_setting(DtcSettingType::On))
        {
            warn!("could not re-enable DTC recording on scope exit: {e}");
        }
    }
}

/// Scoped communication suspension. Re-enables normal communication when dropped
#[derive(Debug)]
pub struct CommunicationGuard<'a> {
    manager: &'a mut SessionManager,
    communication_type: CommunicationType,
}

impl Deref for CommunicationGuard<'_> {
    type Target = SessionManager;
    fn deref(&self) -> &Self::Target {
        self.manager
    }
}

impl DerefMut for CommunicationGuard<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.manager
    }
}

impl Drop for CommunicationGuard<'_> {
    fn drop(&mut self) {
        let communication_type = self.communication_type;
        if let Err(e) = self.manager.with_client(|c| {
            c.communication_control(CommunicationControlType::EnableRxAndTx, communication_type)
        }) {
            warn!("could not re-enable communication on scope exit: {e}");
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::uds::test::{scripted_client_with_log, SimEcuScript};

    fn extended_session_script() -> SimEcuScript {
        let mut script = SimEcuScript::new();
        script.respond_to(&[0x10, 0x03], &[&[0x50, 0x03, 0x00, 0x32, 0x01, 0xF4]]);
        script.respond_to(&[0x10, 0x01], &[&[0x50, 0x01, 0x00, 0x32, 0x01, 0xF4]]);
        script.respond_to(&[0x85, 0x02], &[&[0xC5, 0x02]]);
        script.respond_to(&[0x85, 0x01], &[&[0xC5, 0x01]]);
        script.respond_to(&[0x28, 0x03, 0x01], &[&[0x68, 0x03]]);
        script.respond_to(&[0x28, 0x00, 0x01], &[&[0x68, 0x00]]);
        script
    }

    #[test]
    fn session_guard_restores_default_session() {
        let (client, log) = scripted_client_with_log(extended_session_script());
        let mut manager = SessionManager::new(client, 2000);
        {
            let _guard = manager.enter_session(UDSSessionType::Extended).unwrap();
        }
        let writes = log.lock().unwrap().clone();
        assert_eq!(writes, vec![vec![0x10, 0x03], vec![0x10, 0x01]]);
        assert_eq!(
            manager.client().current_session_mode(),
            UDSSessionType::Default
        );
    }

    #[test]
    fn nested_guards_release_in_reverse_order() {
        let (client, log) = scripted_client_with_log(extended_session_script());
        let mut manager = SessionManager::new(client, 2000);
        {
            let mut session = manager.enter_session(UDSSessionType::Extended).unwrap();
            let _dtc_off = session.disable_dtc_setting().unwrap();
        }
        let writes = log.lock().unwrap().clone();
        assert_eq!(
            writes,
            vec![
                vec![0x10, 0x03],
                vec![0x85, 0x02],
                vec![0x85, 0x01],
                vec![0x10, 0x01],
            ]
        );
    }

    #[test]
    fn communication_guard_reenables() {
        let (client, log) = scripted_client_with_log(extended_session_script());
        let mut manager = SessionManager::new(client, 2000);
        {
            let _quiet = manager
                .disable_communication(CommunicationType::NormalCommunication)
                .unwrap();
        }
        let writes = log.lock().unwrap().clone();
        assert_eq!(writes, vec![vec![0x28, 0x03, 0x01], vec![0x28, 0x00, 0x01]]);
    }

    #[test]
    fn keep_alive_only_runs_outside_default_session() {
        let (client, log) = scripted_client_with_log(extended_session_script());
        let mut manager = SessionManager::new(client, 0);
        // Default session: poll must stay silent
        manager.poll().unwrap();
        assert!(log.lock().unwrap().is_empty());

        let mut session = manager.enter_session(UDSSessionType::Extended).unwrap();
        session.poll().unwrap();
        assert_eq!(log.lock().unwrap().last().unwrap(), &vec![0x3E, 0x80]);
    }

    #[test]
    fn keep_alive_respects_interval() {
        let (client, log) = scripted_client_with_log(extended_session_script());
        let mut manager = SessionManager::new(client, 60_000);
        let mut session = manager.enter_session(UDSSessionType::Extended).unwrap();
        // Interval has not elapsed since the session change, nothing to send
        session.poll().unwrap();
        assert_eq!(log.lock().unwrap().len(), 1);
    }
}
