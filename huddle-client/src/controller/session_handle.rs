use crate::controller::session_command::SessionCommand;
use crate::controller::session_state::SessionSnapshot;
use crate::error::SessionError;
use tokio::sync::{mpsc, oneshot};

/// Cloneable handle to a session running on its own task.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    tx: mpsc::Sender<SessionCommand>,
}

impl SessionHandle {
    pub fn new(tx: mpsc::Sender<SessionCommand>) -> Self {
        Self { tx }
    }

    pub async fn join_room(
        &self,
        room: impl Into<String>,
        username: impl Into<String>,
    ) -> Result<(), SessionError> {
        let room = room.into();
        let username = username.into();
        self.request(|reply| SessionCommand::Join {
            room,
            username,
            reply,
        })
        .await?
    }

    pub async fn leave_room(&self) -> Result<(), SessionError> {
        self.request(|reply| SessionCommand::Leave { reply }).await
    }

    pub async fn start_call(&self) -> Result<(), SessionError> {
        self.request(|reply| SessionCommand::StartCall { reply })
            .await?
    }

    pub async fn end_call(&self) -> Result<(), SessionError> {
        self.request(|reply| SessionCommand::EndCall { reply }).await
    }

    pub async fn snapshot(&self) -> Result<SessionSnapshot, SessionError> {
        self.request(|reply| SessionCommand::Snapshot { reply }).await
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> SessionCommand,
    ) -> Result<T, SessionError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(make(reply))
            .await
            .map_err(|_| SessionError::SessionClosed)?;
        rx.await.map_err(|_| SessionError::SessionClosed)
    }
}
