//! Sessions and the session manager seam

use crate::driver::PageDriver;
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pageprobe_core::Profile;
use tracing::debug;
use uuid::Uuid;

/// Identifier keying observer buffers and log lines to one session
pub type SessionId = Uuid;

/// One browser context bound to one viewport profile.
///
/// Owned by exactly one profile run. Closing goes through
/// [`SessionManager::close`], which consumes the session, so a session cannot be
/// closed twice or used after close.
pub struct Session {
    id: SessionId,
    profile: Profile,
    created_at: DateTime<Utc>,
    page: Box<dyn PageDriver>,
}

impl Session {
    pub fn new(profile: Profile, page: Box<dyn PageDriver>) -> Self {
        Self {
            id: Uuid::new_v4(),
            profile,
            created_at: Utc::now(),
            page,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn page(&self) -> &dyn PageDriver {
        self.page.as_ref()
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("profile", &self.profile.name)
            .field("created_at", &self.created_at)
            .finish()
    }
}

/// Creates and releases sessions.
///
/// `open` either returns a fully usable session or a `Session` error; callers
/// never see a half-built one.
#[async_trait]
pub trait SessionManager: Send + Sync {
    async fn open(&self, profile: &Profile) -> Result<Session>;

    async fn close(&self, session: Session) -> Result<()> {
        debug!(session = %session.id(), profile = %session.profile().name, "Closing session");
        session.page().close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::FakePage;

    #[test]
    fn test_session_metadata() {
        let session = Session::new(Profile::mobile(), Box::new(FakePage::new()));
        assert_eq!(session.profile().name, "mobile-iphone12");
        assert!(session.created_at() <= Utc::now());
        assert!(format!("{:?}", session).contains("mobile-iphone12"));
    }

    #[test]
    fn test_session_ids_are_unique() {
        let a = Session::new(Profile::desktop(), Box::new(FakePage::new()));
        let b = Session::new(Profile::desktop(), Box::new(FakePage::new()));
        assert_ne!(a.id(), b.id());
    }
}
