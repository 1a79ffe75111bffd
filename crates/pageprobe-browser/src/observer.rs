//! Console and network observation
//!
//! The observer keeps append-only buffers per session. Capture problems (a page
//! that refuses the shim, a malformed entry, a closed target) are counted as
//! observer faults and never reach the scenario.

use crate::session::{Session, SessionId};
use chrono::{DateTime, Utc};
use pageprobe_core::{ConsoleEvent, ConsoleLevel, NetworkEvent};
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::{debug, warn};

#[derive(Debug, Default)]
struct Buffers {
    console: Vec<ConsoleEvent>,
    network: Vec<NetworkEvent>,
    faults: u32,
}

/// Everything captured for one session, handed over at drain time
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObservedEvents {
    pub console: Vec<ConsoleEvent>,
    pub network: Vec<NetworkEvent>,
    pub faults: u32,
}

impl ObservedEvents {
    pub fn console_errors(&self) -> Vec<String> {
        self.console
            .iter()
            .filter(|e| e.level == ConsoleLevel::Error)
            .map(|e| e.text.clone())
            .collect()
    }
}

#[derive(Debug, Default)]
pub struct Observer {
    sessions: Mutex<HashMap<SessionId, Buffers>>,
}

impl Observer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start observing `session`. Call before navigating: console output from
    /// a document that loaded earlier is not recovered. Never fails; a refused
    /// install is a fault
    pub async fn attach(&self, session: &Session) {
        let installed = session.page().install_observer().await;

        let mut sessions = self.sessions.lock().await;
        let buffers = sessions.entry(session.id()).or_default();
        if let Err(e) = installed {
            warn!(session = %session.id(), "Observer attach failed: {}", e);
            buffers.faults += 1;
        } else {
            debug!(session = %session.id(), "Observer attached");
        }
    }

    /// Move newly captured page events into the session's buffers
    pub async fn poll(&self, session: &Session) {
        let console = session.page().take_console().await;
        let network = session.page().take_resources().await;

        let mut sessions = self.sessions.lock().await;
        let buffers = sessions.entry(session.id()).or_default();

        match console {
            Ok(entries) => {
                buffers.console.extend(entries.into_iter().map(|raw| ConsoleEvent {
                    level: ConsoleLevel::classify(&raw.kind),
                    text: raw.text,
                    timestamp: raw
                        .timestamp_ms
                        .and_then(|ms| DateTime::from_timestamp_millis(ms as i64))
                        .unwrap_or_else(Utc::now),
                }));
            }
            Err(e) => {
                warn!(session = %session.id(), "Console poll failed: {}", e);
                buffers.faults += 1;
            }
        }

        match network {
            Ok(events) => buffers.network.extend(events),
            Err(e) => {
                warn!(session = %session.id(), "Network poll failed: {}", e);
                buffers.faults += 1;
            }
        }
    }

    /// Error-level console text captured so far, without draining
    pub async fn console_errors(&self, session: SessionId) -> Vec<String> {
        let sessions = self.sessions.lock().await;
        sessions
            .get(&session)
            .map(|b| {
                b.console
                    .iter()
                    .filter(|e| e.level == ConsoleLevel::Error)
                    .map(|e| e.text.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Network events captured so far, without draining
    pub async fn network(&self, session: SessionId) -> Vec<NetworkEvent> {
        let sessions = self.sessions.lock().await;
        sessions
            .get(&session)
            .map(|b| b.network.clone())
            .unwrap_or_default()
    }

    /// Return and clear everything captured for `session`
    pub async fn drain(&self, session: SessionId) -> ObservedEvents {
        let buffers = self.sessions.lock().await.remove(&session).unwrap_or_default();
        ObservedEvents {
            console: buffers.console,
            network: buffers.network,
            faults: buffers.faults,
        }
    }
}
