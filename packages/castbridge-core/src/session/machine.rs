//! Pure session state machine.
//!
//! The machine never touches the network. Inputs are parsed receiver
//! messages and connection events; outputs are [`SessionAction`]s the
//! driver in [`super::CastSession`] carries out. This keeps every transition
//! testable without sockets.

use serde::Serialize;

use super::event::{SessionEvent, SessionInfo, SessionUpdate};
use crate::cast::payload::{ReceiverRequest, VolumeRequest};
use crate::receiver::ReceiverStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionState {
    Connecting,
    AwaitingLaunch,
    Active,
    Stopped,
    LaunchError,
}

impl SessionState {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Stopped | Self::LaunchError)
    }
}

/// Side effects requested by a transition.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionAction {
    /// Open the application connection to this transport id.
    OpenAppConnection { transport_id: String },
    /// Deliver an event to the session owner.
    Emit(SessionEvent),
    /// Tear down the underlying connection.
    Close,
}

/// Launch-failure reasons produced locally rather than by the receiver.
pub mod reasons {
    pub const TIMEOUT: &str = "TIMEOUT";
    pub const CONNECTION_FAILED: &str = "CONNECTION_FAILED";
    pub const CONNECTION_CLOSED: &str = "CONNECTION_CLOSED";
    pub const CANCELLED: &str = "CANCELLED";
    pub const UNKNOWN: &str = "UNKNOWN";
}

#[derive(Debug)]
pub struct SessionMachine {
    app_id: String,
    receiver_name: String,
    state: SessionState,
    next_request_id: u32,
    launch_request_id: Option<u32>,
    session_id: Option<String>,
    transport_id: Option<String>,
}

impl SessionMachine {
    pub fn new(app_id: impl Into<String>, receiver_name: impl Into<String>) -> Self {
        Self {
            app_id: app_id.into(),
            receiver_name: receiver_name.into(),
            state: SessionState::Connecting,
            next_request_id: 0,
            launch_request_id: None,
            session_id: None,
            transport_id: None,
        }
    }

    pub fn app_id(&self) -> &str {
        &self.app_id
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn transport_id(&self) -> Option<&str> {
        self.transport_id.as_deref()
    }

    /// Allocates the next receiver-channel request id.
    pub fn next_request_id(&mut self) -> u32 {
        let id = self.next_request_id;
        self.next_request_id = self.next_request_id.wrapping_add(1);
        id
    }

    /// Called once the transport is connected. Returns the requests to send
    /// on the platform receiver channel, in order: a status probe followed
    /// by the `LAUNCH` whose id is recorded for correlation.
    pub fn begin_launch(&mut self) -> Vec<ReceiverRequest> {
        if self.state != SessionState::Connecting {
            return Vec::new();
        }
        let probe = ReceiverRequest::GetStatus {
            request_id: self.next_request_id(),
        };
        let launch_id = self.next_request_id();
        self.launch_request_id = Some(launch_id);
        self.state = SessionState::AwaitingLaunch;
        vec![
            probe,
            ReceiverRequest::Launch {
                app_id: self.app_id.clone(),
                request_id: launch_id,
            },
        ]
    }

    pub fn on_receiver_status(
        &mut self,
        request_id: Option<u32>,
        status: &ReceiverStatus,
    ) -> Vec<SessionAction> {
        match self.state {
            SessionState::AwaitingLaunch => {
                if request_id.is_none() || request_id != self.launch_request_id {
                    return Vec::new();
                }
                let Some(app) = status.find_application(&self.app_id) else {
                    return Vec::new();
                };
                self.session_id = Some(app.session_id.clone());
                self.transport_id = Some(app.transport_id.clone());
                self.state = SessionState::Active;
                vec![
                    SessionAction::OpenAppConnection {
                        transport_id: app.transport_id.clone(),
                    },
                    SessionAction::Emit(SessionEvent::Created(SessionInfo::new(
                        app,
                        &status.volume,
                        &self.receiver_name,
                    ))),
                ]
            }
            SessionState::Active => {
                let session_id = self.session_id.clone().unwrap_or_default();
                let app = status
                    .applications()
                    .iter()
                    .find(|app| app.app_id == self.app_id && app.session_id == session_id);
                match app {
                    Some(app) => vec![SessionAction::Emit(SessionEvent::Updated(
                        SessionUpdate::new(app, &status.volume),
                    ))],
                    None => {
                        log::info!("[Session] Application {} is gone", self.app_id);
                        self.stop_actions()
                    }
                }
            }
            _ => Vec::new(),
        }
    }

    /// `LAUNCH_ERROR`, or `INVALID_REQUEST` answering the launch.
    pub fn on_launch_error(
        &mut self,
        request_id: Option<u32>,
        reason: Option<String>,
    ) -> Vec<SessionAction> {
        if self.state != SessionState::AwaitingLaunch {
            return Vec::new();
        }
        if request_id.is_some() && request_id != self.launch_request_id {
            return Vec::new();
        }
        self.fail_launch(reason.unwrap_or_else(|| reasons::UNKNOWN.to_string()))
    }

    pub fn on_launch_timeout(&mut self) -> Vec<SessionAction> {
        if self.state != SessionState::AwaitingLaunch {
            return Vec::new();
        }
        self.fail_launch(reasons::TIMEOUT.to_string())
    }

    pub fn on_connect_failed(&mut self) -> Vec<SessionAction> {
        if self.state != SessionState::Connecting {
            return Vec::new();
        }
        self.fail_launch(reasons::CONNECTION_FAILED.to_string())
    }

    /// The platform connection or the application connection went away.
    pub fn on_connection_lost(&mut self) -> Vec<SessionAction> {
        match self.state {
            SessionState::Active => self.stop_actions(),
            SessionState::Connecting | SessionState::AwaitingLaunch => {
                self.fail_launch(reasons::CONNECTION_CLOSED.to_string())
            }
            SessionState::Stopped | SessionState::LaunchError => Vec::new(),
        }
    }

    /// Explicit stop. Returns the `STOP` request to send, if any.
    pub fn request_stop(&mut self) -> (Option<ReceiverRequest>, Vec<SessionAction>) {
        match self.state {
            SessionState::Active => {
                let request = ReceiverRequest::Stop {
                    session_id: self.session_id.clone().unwrap_or_default(),
                    request_id: self.next_request_id(),
                };
                (Some(request), self.stop_actions())
            }
            SessionState::Connecting | SessionState::AwaitingLaunch => {
                (None, self.fail_launch(reasons::CANCELLED.to_string()))
            }
            SessionState::Stopped | SessionState::LaunchError => (None, Vec::new()),
        }
    }

    /// Builds a `SET_VOLUME` request while active.
    pub fn volume_request(&mut self, volume: VolumeRequest) -> Option<ReceiverRequest> {
        if self.state != SessionState::Active {
            return None;
        }
        Some(ReceiverRequest::SetVolume {
            volume,
            request_id: self.next_request_id(),
        })
    }

    fn stop_actions(&mut self) -> Vec<SessionAction> {
        self.state = SessionState::Stopped;
        vec![
            SessionAction::Emit(SessionEvent::Stopped {
                session_id: self.session_id.clone().unwrap_or_default(),
            }),
            SessionAction::Close,
        ]
    }

    fn fail_launch(&mut self, reason: String) -> Vec<SessionAction> {
        log::warn!("[Session] Launch of {} failed: {}", self.app_id, reason);
        self.state = SessionState::LaunchError;
        vec![
            SessionAction::Emit(SessionEvent::LaunchFailed {
                app_id: self.app_id.clone(),
                reason,
            }),
            SessionAction::Close,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::receiver::{ReceiverApplication, Volume};

    fn status(apps: Vec<ReceiverApplication>) -> ReceiverStatus {
        ReceiverStatus {
            applications: Some(apps),
            volume: Volume {
                level: Some(0.5),
                muted: Some(false),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn app(app_id: &str, session_id: &str) -> ReceiverApplication {
        ReceiverApplication {
            app_id: app_id.into(),
            session_id: session_id.into(),
            transport_id: "T1".into(),
            display_name: "Test App".into(),
            status_text: Some("Ready".into()),
            ..Default::default()
        }
    }

    fn launched() -> SessionMachine {
        let mut machine = SessionMachine::new("ABCD", "Living Room");
        machine.begin_launch();
        machine
    }

    fn created_count(actions: &[SessionAction]) -> usize {
        actions
            .iter()
            .filter(|a| matches!(a, SessionAction::Emit(SessionEvent::Created(_))))
            .count()
    }

    #[test]
    fn begin_launch_sends_probe_then_launch() {
        let mut machine = SessionMachine::new("ABCD", "Living Room");
        let requests = machine.begin_launch();
        assert_eq!(
            requests,
            vec![
                ReceiverRequest::GetStatus { request_id: 0 },
                ReceiverRequest::Launch {
                    app_id: "ABCD".into(),
                    request_id: 1
                },
            ]
        );
        assert_eq!(machine.state(), SessionState::AwaitingLaunch);
        assert!(machine.begin_launch().is_empty());
    }

    #[test]
    fn request_ids_increase_from_zero() {
        let mut machine = SessionMachine::new("ABCD", "x");
        let ids: Vec<u32> = (0..5).map(|_| machine.next_request_id()).collect();
        assert_eq!(ids, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn matching_status_creates_exactly_once() {
        let mut machine = launched();

        // Probe answer (requestId 0) is not the launch confirmation.
        assert!(machine
            .on_receiver_status(Some(0), &status(vec![app("ABCD", "S1")]))
            .is_empty());

        let actions = machine.on_receiver_status(Some(1), &status(vec![app("ABCD", "S1")]));
        assert_eq!(
            actions[0],
            SessionAction::OpenAppConnection {
                transport_id: "T1".into()
            }
        );
        assert_eq!(created_count(&actions), 1);
        assert_eq!(machine.state(), SessionState::Active);
        assert_eq!(machine.session_id(), Some("S1"));

        let again = machine.on_receiver_status(Some(1), &status(vec![app("ABCD", "S1")]));
        assert_eq!(created_count(&again), 0);
        assert!(matches!(
            again.as_slice(),
            [SessionAction::Emit(SessionEvent::Updated(_))]
        ));
    }

    #[test]
    fn idle_screen_does_not_confirm_launch() {
        let mut machine = launched();
        let mut idle = app("ABCD", "S1");
        idle.is_idle_screen = true;
        assert!(machine.on_receiver_status(Some(1), &status(vec![idle])).is_empty());
        assert_eq!(machine.state(), SessionState::AwaitingLaunch);
    }

    #[test]
    fn missing_application_stops_once() {
        let mut machine = launched();
        machine.on_receiver_status(Some(1), &status(vec![app("ABCD", "S1")]));

        let actions = machine.on_receiver_status(None, &status(vec![]));
        assert_eq!(
            actions,
            vec![
                SessionAction::Emit(SessionEvent::Stopped {
                    session_id: "S1".into()
                }),
                SessionAction::Close,
            ]
        );
        assert_eq!(machine.state(), SessionState::Stopped);
        assert!(machine.on_receiver_status(None, &status(vec![])).is_empty());
        assert!(machine.on_connection_lost().is_empty());
    }

    #[test]
    fn replaced_session_id_counts_as_gone() {
        let mut machine = launched();
        machine.on_receiver_status(Some(1), &status(vec![app("ABCD", "S1")]));
        let actions = machine.on_receiver_status(None, &status(vec![app("ABCD", "S2")]));
        assert!(actions.contains(&SessionAction::Close));
    }

    #[test]
    fn launch_error_is_terminal() {
        let mut machine = launched();
        let actions = machine.on_launch_error(None, Some("NOT_FOUND".into()));
        assert_eq!(
            actions[0],
            SessionAction::Emit(SessionEvent::LaunchFailed {
                app_id: "ABCD".into(),
                reason: "NOT_FOUND".into()
            })
        );
        assert_eq!(machine.state(), SessionState::LaunchError);
        assert!(machine
            .on_receiver_status(Some(1), &status(vec![app("ABCD", "S1")]))
            .is_empty());
    }

    #[test]
    fn invalid_request_for_other_id_is_ignored() {
        let mut machine = launched();
        assert!(machine.on_launch_error(Some(0), Some("BAD".into())).is_empty());
        assert_eq!(machine.state(), SessionState::AwaitingLaunch);
    }

    #[test]
    fn stop_allocates_fresh_request_id() {
        let mut machine = launched();
        machine.on_receiver_status(Some(1), &status(vec![app("ABCD", "S1")]));
        let (request, actions) = machine.request_stop();
        assert_eq!(
            request,
            Some(ReceiverRequest::Stop {
                session_id: "S1".into(),
                request_id: 2
            })
        );
        assert!(actions.contains(&SessionAction::Close));
        assert_eq!(machine.request_stop(), (None, Vec::new()));
    }

    #[test]
    fn connection_lost_while_launching_fails_launch() {
        let mut machine = launched();
        let actions = machine.on_connection_lost();
        assert!(matches!(
            &actions[0],
            SessionAction::Emit(SessionEvent::LaunchFailed { reason, .. }) if reason == reasons::CONNECTION_CLOSED
        ));
    }

    #[test]
    fn volume_requires_active_session() {
        let mut machine = launched();
        assert!(machine.volume_request(VolumeRequest::default()).is_none());
        machine.on_receiver_status(Some(1), &status(vec![app("ABCD", "S1")]));
        assert!(matches!(
            machine.volume_request(VolumeRequest {
                level: Some(0.1),
                muted: None
            }),
            Some(ReceiverRequest::SetVolume { request_id: 2, .. })
        ));
    }
}
