//! Signed-in user state, fed by the authentication collaborator.

use bulsho_shared::types::UserId;
use tokio::sync::watch;

/// Read side of the session.
#[derive(Debug, Clone)]
pub struct Session {
    receiver: watch::Receiver<Option<UserId>>,
}

/// Write side of the session, owned by whatever handles sign-in.
#[derive(Debug)]
pub struct SessionHandle {
    sender: watch::Sender<Option<UserId>>,
}

/// Create a session starting with `initial` as the current user.
pub fn session(initial: Option<UserId>) -> (SessionHandle, Session) {
    let (sender, receiver) = watch::channel(initial);
    (SessionHandle { sender }, Session { receiver })
}

impl Session {
    /// A session with a fixed user and no handle.
    pub fn fixed(user: Option<UserId>) -> Self {
        session(user).1
    }

    pub fn current_user(&self) -> Option<UserId> {
        *self.receiver.borrow()
    }

    /// A receiver notified on every sign-in and sign-out.
    pub fn subscribe(&self) -> watch::Receiver<Option<UserId>> {
        self.receiver.clone()
    }
}

impl SessionHandle {
    pub fn sign_in(&self, user: UserId) {
        self.sender.send_replace(Some(user));
    }

    pub fn sign_out(&self) {
        self.sender.send_replace(None);
    }

    pub fn session(&self) -> Session {
        Session {
            receiver: self.sender.subscribe(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_sign_in_and_out_are_observed() {
        let (handle, session) = session(None);
        let mut changes = session.subscribe();
        assert_eq!(session.current_user(), None);

        let user = Uuid::new_v4();
        handle.sign_in(user);
        changes.changed().await.unwrap();
        assert_eq!(*changes.borrow_and_update(), Some(user));
        assert_eq!(session.current_user(), Some(user));

        handle.sign_out();
        changes.changed().await.unwrap();
        assert_eq!(session.current_user(), None);
    }

    #[test]
    fn test_fixed_session() {
        let user = Uuid::new_v4();
        assert_eq!(Session::fixed(Some(user)).current_user(), Some(user));
    }
}
