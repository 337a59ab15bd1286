use crate::models::UserProfile;

/// Broadcast buffer for session events. Slow subscribers that fall further
/// behind than this see `RecvError::Lagged` rather than blocking the session.
pub const EVENT_CHANNEL_CAPACITY: usize = 32;

/// Notifications published by the session store.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Login(UserProfile),
    Logout,
    Refreshed,
    ProfileUpdated(UserProfile),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Anonymous,
    Authenticated,
}

impl SessionState {
    pub fn label(&self) -> &'static str {
        match self {
            SessionState::Anonymous => "anonymous",
            SessionState::Authenticated => "authenticated",
        }
    }
}
