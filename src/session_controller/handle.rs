//! Cloneable client for the session controller task

use tokio::sync::{mpsc, oneshot};

use crate::error::{Error, Result};
use crate::resource_manager::ImageFile;

use super::SessionSnapshot;

/// Requests handled by `SessionController::run`
#[derive(Debug)]
pub enum SessionCommand {
    LoadModel {
        url: String,
        reply: oneshot::Sender<Result<()>>,
    },
    StartWebcam {
        reply: oneshot::Sender<Result<()>>,
    },
    StopWebcam {
        reply: oneshot::Sender<bool>,
    },
    SubmitImage {
        file: ImageFile,
        reply: oneshot::Sender<Result<()>>,
    },
    /// Upload body refused before it could be read
    RejectUpload {
        size: u64,
        reply: oneshot::Sender<Error>,
    },
    SetVisibility {
        hidden: bool,
        reply: oneshot::Sender<()>,
    },
    Snapshot {
        reply: oneshot::Sender<SessionSnapshot>,
    },
}

#[derive(Debug, Clone)]
pub struct SessionHandle {
    commands: mpsc::Sender<SessionCommand>,
}

impl SessionHandle {
    /// Handle plus the receiver to pass to `SessionController::run`
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<SessionCommand>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { commands: tx }, rx)
    }

    pub async fn load_model(&self, url: impl Into<String>) -> Result<()> {
        let url = url.into();
        self.request(|reply| SessionCommand::LoadModel { url, reply })
            .await?
    }

    pub async fn start_webcam(&self) -> Result<()> {
        self.request(|reply| SessionCommand::StartWebcam { reply })
            .await?
    }

    /// Returns whether a camera was released
    pub async fn stop_webcam(&self) -> Result<bool> {
        self.request(|reply| SessionCommand::StopWebcam { reply })
            .await
    }

    pub async fn submit_image(&self, file: ImageFile) -> Result<()> {
        self.request(|reply| SessionCommand::SubmitImage { file, reply })
            .await?
    }

    /// Report an upload the HTTP layer had to cut off as `FileTooLarge`.
    /// Returns the rendered error.
    pub async fn reject_upload(&self, size: u64) -> Error {
        match self
            .request(|reply| SessionCommand::RejectUpload { size, reply })
            .await
        {
            Ok(err) | Err(err) => err,
        }
    }

    pub async fn set_visibility(&self, hidden: bool) -> Result<()> {
        self.request(|reply| SessionCommand::SetVisibility { hidden, reply })
            .await
    }

    pub async fn snapshot(&self) -> Result<SessionSnapshot> {
        self.request(|reply| SessionCommand::Snapshot { reply })
            .await
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> SessionCommand,
    ) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(command(tx))
            .await
            .map_err(|_| Error::SessionClosed)?;
        rx.await.map_err(|_| Error::SessionClosed)
    }
}
