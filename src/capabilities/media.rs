use crux_core::capability::{Capability, CapabilityContext, Operation};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Opaque reference to a file the shell holds on the core's behalf (a browser
/// `File` object, a platform content URI, ...). The core never sees the path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MediaHandle(pub String);

impl MediaHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MediaHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Metadata for a file the user picked. Only declared properties -- the bytes
/// stay shell-side until an explicit `Read`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PickedFile {
    pub handle: MediaHandle,
    pub name: String,
    pub media_type: String,
    pub size_bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MediaOperation {
    /// Open the file picker, restricted to the given media types.
    Pick { accept: Vec<String> },
    /// Read the full contents of a previously picked file.
    Read { handle: MediaHandle },
    /// Create a locally-resolvable display URL (object URL) for the file.
    CreatePreview { handle: MediaHandle },
    /// Release a display URL. Fire-and-forget; the shell must not resolve it.
    ReleasePreview { url: String },
}

impl Operation for MediaOperation {
    type Output = MediaResult;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MediaOutput {
    Picked(PickedFile),
    Cancelled,
    Data {
        #[serde(with = "serde_bytes")]
        bytes: Vec<u8>,
    },
    Preview {
        handle: MediaHandle,
        url: String,
    },
}

#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
pub enum MediaError {
    #[error("file picker failed: {reason}")]
    PickFailed { reason: String },

    #[error("file could not be read: {reason}")]
    ReadFailed { reason: String },

    #[error("preview could not be created: {reason}")]
    PreviewFailed { reason: String },

    #[error("file handle is no longer valid")]
    StaleHandle,
}

pub type MediaResult = Result<MediaOutput, MediaError>;

pub struct Media<Ev> {
    context: CapabilityContext<MediaOperation, Ev>,
}

impl<Ev> Capability<Ev> for Media<Ev> {
    type Operation = MediaOperation;
    type MappedSelf<MappedEv> = Media<MappedEv>;

    fn map_event<F, NewEv>(&self, f: F) -> Self::MappedSelf<NewEv>
    where
        F: Fn(NewEv) -> Ev + Send + Sync + 'static,
        Ev: 'static,
        NewEv: 'static + Send,
    {
        Media::new(self.context.map_event(f))
    }
}

impl<Ev> Media<Ev>
where
    Ev: 'static,
{
    pub fn new(context: CapabilityContext<MediaOperation, Ev>) -> Self {
        Self { context }
    }

    pub fn pick<F>(&self, accept: Vec<String>, make_event: F)
    where
        F: FnOnce(MediaResult) -> Ev + Send + 'static,
    {
        let context = self.context.clone();
        self.context.spawn(async move {
            let result = context
                .request_from_shell(MediaOperation::Pick { accept })
                .await;
            context.update_app(make_event(result));
        });
    }

    pub fn read<F>(&self, handle: MediaHandle, make_event: F)
    where
        F: FnOnce(MediaResult) -> Ev + Send + 'static,
    {
        let context = self.context.clone();
        self.context.spawn(async move {
            let result = context
                .request_from_shell(MediaOperation::Read { handle })
                .await;
            context.update_app(make_event(result));
        });
    }

    pub fn create_preview<F>(&self, handle: MediaHandle, make_event: F)
    where
        F: FnOnce(MediaResult) -> Ev + Send + 'static,
    {
        let context = self.context.clone();
        self.context.spawn(async move {
            let result = context
                .request_from_shell(MediaOperation::CreatePreview { handle })
                .await;
            context.update_app(make_event(result));
        });
    }

    /// Release must happen exactly once per created preview; the app layer
    /// owns that accounting.
    pub fn release_preview(&self, url: String) {
        let context = self.context.clone();
        self.context.spawn(async move {
            context
                .notify_shell(MediaOperation::ReleasePreview { url })
                .await;
        });
    }
}
