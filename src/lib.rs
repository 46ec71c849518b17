#![forbid(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::too_many_lines)]

pub mod capabilities;
pub mod encoder;
pub mod roast;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::capabilities::{MediaHandle, MediaResult, PickedFile};
use crate::roast::ServiceOutcome;

pub use app::App;
pub use capabilities::{Capabilities, Effect};

/// Hard ceiling on accepted photo size, enforced before any encoding.
pub const MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;

/// Declared media types the picker offers. Validation itself only requires an
/// `image/*` type, so files arriving by other routes (drag and drop) are held
/// to the same rule the browser applies.
pub const ACCEPTED_MEDIA_TYPES: &[&str] = &["image/png", "image/jpeg", "image/webp"];

/// Environment variable the shell reads at startup and forwards in
/// [`Event::AppStarted`].
pub const API_KEY_ENV: &str = "GEMINI_API_KEY";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    Configuration,
    Validation,
    ImageTooLarge,
    ImageTypeUnsupported,
    Read,
    Internal,
}

impl ErrorKind {
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::Configuration => "CONFIG_ERROR",
            Self::Validation => "VALIDATION_ERROR",
            Self::ImageTooLarge => "IMAGE_TOO_LARGE",
            Self::ImageTypeUnsupported => "IMAGE_TYPE_UNSUPPORTED",
            Self::Read => "READ_ERROR",
            Self::Internal => "INTERNAL_ERROR",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppError {
    pub kind: ErrorKind,
    pub message: String,
    pub internal_message: Option<String>,
}

impl AppError {
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            internal_message: None,
        }
    }

    #[must_use]
    pub fn with_internal(mut self, internal: impl Into<String>) -> Self {
        self.internal_message = Some(internal.into());
        self
    }

    #[must_use]
    pub const fn code(&self) -> &'static str {
        self.kind.code()
    }

    #[must_use]
    pub fn user_facing_message(&self) -> String {
        match self.kind {
            ErrorKind::Configuration | ErrorKind::Validation => self.message.clone(),
            ErrorKind::ImageTooLarge => format!(
                "The image is too large. Please use an image smaller than {} MB.",
                MAX_IMAGE_BYTES / (1024 * 1024)
            ),
            ErrorKind::ImageTypeUnsupported => {
                "This file is not an image. Please use a PNG, JPEG, or WebP photo.".into()
            }
            ErrorKind::Read => "The photo could not be read. Please try a different file.".into(),
            ErrorKind::Internal => "An unexpected error occurred. Please try again.".into(),
        }
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code(), self.message)?;
        if let Some(internal) = &self.internal_message {
            write!(f, " (internal: {internal})")?;
        }
        Ok(())
    }
}

impl std::error::Error for AppError {}

/// Where the session is in its lifecycle. `Loading` is never terminal: every
/// in-flight request resolves back to `ImageSelected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AppState {
    #[default]
    Starting,
    ConfigError,
    Idle,
    ImageSelected,
    Loading,
}

impl AppState {
    #[must_use]
    pub const fn is_fatal(self) -> bool {
        matches!(self, Self::ConfigError)
    }

    #[must_use]
    pub const fn is_interactive(self) -> bool {
        matches!(self, Self::Idle | Self::ImageSelected | Self::Loading)
    }

    #[must_use]
    pub const fn can_request_roast(self) -> bool {
        matches!(self, Self::ImageSelected)
    }

    #[must_use]
    pub const fn is_loading(self) -> bool {
        matches!(self, Self::Loading)
    }
}

/// The user's current photo. The preview URL is a browser-level resource the
/// shell created for us; it must be released exactly once, on replacement or
/// reset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectedImage {
    pub handle: MediaHandle,
    pub file_name: String,
    pub media_type: String,
    pub size_bytes: u64,
    pub preview_url: Option<String>,
}

impl SelectedImage {
    #[must_use]
    pub fn new(file: PickedFile) -> Self {
        Self {
            handle: file.handle,
            file_name: file.name,
            media_type: file.media_type,
            size_bytes: file.size_bytes,
            preview_url: None,
        }
    }
}

#[derive(Debug, Default)]
pub struct Model {
    pub state: AppState,
    pub api_key: Option<SecretString>,
    pub selected: Option<SelectedImage>,
    pub roast: Option<String>,
    pub error: Option<AppError>,
}

impl Model {
    /// The display invariant: a roast and an error are never shown together,
    /// and a loading view shows neither.
    #[must_use]
    pub fn result_state_consistent(&self) -> bool {
        if self.roast.is_some() && self.error.is_some() {
            return false;
        }
        if self.state.is_loading() {
            return self.roast.is_none() && self.error.is_none();
        }
        true
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    AppStarted { api_key: Option<String> },

    SelectImageRequested,
    PickResponse(Box<MediaResult>),
    PreviewResponse(Box<MediaResult>),

    RoastRequested,
    ReadResponse(Box<MediaResult>),
    RoastResponse(ServiceOutcome),

    ResetRequested,
}

impl Event {
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::AppStarted { .. } => "app_started",
            Self::SelectImageRequested => "select_image_requested",
            Self::PickResponse(_) => "pick_response",
            Self::PreviewResponse(_) => "preview_response",
            Self::RoastRequested => "roast_requested",
            Self::ReadResponse(_) => "read_response",
            Self::RoastResponse(_) => "roast_response",
            Self::ResetRequested => "reset_requested",
        }
    }

    #[must_use]
    pub const fn is_user_initiated(&self) -> bool {
        matches!(
            self,
            Self::SelectImageRequested | Self::RoastRequested | Self::ResetRequested
        )
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct UserFacingError {
    pub message: String,
    pub error_code: String,
}

impl From<&AppError> for UserFacingError {
    fn from(e: &AppError) -> Self {
        Self {
            message: e.user_facing_message(),
            error_code: e.code().to_string(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ViewState {
    Starting,
    ConfigError {
        message: String,
    },
    Idle {
        accepted_media_types: Vec<String>,
        max_image_bytes: usize,
    },
    Selected {
        file_name: String,
        preview_url: Option<String>,
        is_loading: bool,
        can_request_roast: bool,
        roast: Option<String>,
    },
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ViewModel {
    pub state: ViewState,
    pub error: Option<UserFacingError>,
}

pub mod app {
    use super::*;
    use crate::capabilities::{Capabilities, MediaError, MediaOutput};
    use crate::encoder::{self, EncodedPayload};
    use secrecy::ExposeSecret;
    use tracing::{debug, error, warn};

    #[derive(Default)]
    pub struct App;

    /// Declared-type and size checks for a freshly picked file. Content is not
    /// inspected; a corrupt file surfaces as a read error at roast time.
    pub(crate) fn validate_selection(file: &PickedFile) -> Result<(), AppError> {
        if !file.media_type.starts_with("image/") {
            return Err(AppError::new(
                ErrorKind::ImageTypeUnsupported,
                format!("'{}' is not an image file", file.name),
            )
            .with_internal(format!("declared media type: {}", file.media_type)));
        }

        if file.size_bytes > MAX_IMAGE_BYTES as u64 {
            return Err(AppError::new(
                ErrorKind::ImageTooLarge,
                format!(
                    "'{}' is {} bytes; the limit is {MAX_IMAGE_BYTES}",
                    file.name, file.size_bytes
                ),
            ));
        }

        Ok(())
    }

    impl App {
        /// Drops the current selection, releasing its preview URL. `take`
        /// guarantees the release happens at most once per acquisition.
        fn release_selection(model: &mut Model, caps: &Capabilities) {
            if let Some(previous) = model.selected.take() {
                if let Some(url) = previous.preview_url {
                    caps.media.release_preview(url);
                }
            }
        }

        fn replace_selection(model: &mut Model, file: PickedFile, caps: &Capabilities) {
            Self::release_selection(model, caps);
            model.roast = None;
            model.error = None;

            let handle = file.handle.clone();
            model.selected = Some(SelectedImage::new(file));

            // An in-flight roast is never cancelled; the state stays Loading
            // until it resolves, so no second request can start underneath it.
            if !model.state.is_loading() {
                model.state = AppState::ImageSelected;
            }

            caps.media
                .create_preview(handle, |result| Event::PreviewResponse(Box::new(result)));
        }

        fn media_error_to_app(error: &MediaError) -> AppError {
            match error {
                MediaError::ReadFailed { .. } | MediaError::StaleHandle => {
                    AppError::new(ErrorKind::Read, "The selected photo could not be read")
                        .with_internal(error.to_string())
                }
                MediaError::PickFailed { .. } | MediaError::PreviewFailed { .. } => {
                    AppError::new(ErrorKind::Internal, "The file picker failed")
                        .with_internal(error.to_string())
                }
            }
        }

        /// Failures while assembling the outbound request are absorbed the
        /// same way service failures are: as displayable roast content.
        fn absorb_send_failure(model: &mut Model) {
            model.roast = Some(roast::failure_line(None));
            model.error = None;
            model.state = AppState::ImageSelected;
        }

        fn send_roast_request(payload: &EncodedPayload, model: &mut Model, caps: &Capabilities) {
            let Some(api_key) = &model.api_key else {
                error!("roast requested without a credential");
                Self::absorb_send_failure(model);
                return;
            };

            let url = match roast::endpoint(roast::GEMINI_MODEL) {
                Ok(url) => url,
                Err(e) => {
                    error!("could not build the service endpoint: {e}");
                    Self::absorb_send_failure(model);
                    return;
                }
            };

            let request = roast::build_request(payload);
            let body = match serde_json::to_vec(&request) {
                Ok(body) => body,
                Err(e) => {
                    error!("could not serialize the roast request: {e}");
                    Self::absorb_send_failure(model);
                    return;
                }
            };

            debug!(bytes = body.len(), "sending roast request");

            caps.http
                .post(&url)
                .header("content-type", "application/json")
                .header(roast::API_KEY_HEADER, api_key.expose_secret().as_str())
                .body(body)
                .send(|result| Event::RoastResponse(roast::outcome_from(result)));
        }

        fn idle_view() -> ViewState {
            ViewState::Idle {
                accepted_media_types: ACCEPTED_MEDIA_TYPES
                    .iter()
                    .map(|t| (*t).to_string())
                    .collect(),
                max_image_bytes: MAX_IMAGE_BYTES,
            }
        }
    }

    impl crux_core::App for App {
        type Event = Event;
        type Model = Model;
        type ViewModel = ViewModel;
        type Capabilities = Capabilities;

        fn update(&self, event: Event, model: &mut Model, caps: &Capabilities) {
            debug!(event = event.name(), "update");

            if event.is_user_initiated() && !model.state.is_interactive() {
                debug!(state = ?model.state, "user event ignored; app not interactive");
                return;
            }

            match event {
                Event::AppStarted { api_key } => {
                    match api_key {
                        Some(key) if !key.trim().is_empty() => {
                            model.api_key = Some(SecretString::new(key));
                            model.state = AppState::Idle;
                            debug!("credential received; app ready");
                        }
                        _ => {
                            model.state = AppState::ConfigError;
                            model.roast = None;
                            model.error = Some(AppError::new(
                                ErrorKind::Configuration,
                                format!("{API_KEY_ENV} is not set; the app cannot start"),
                            ));
                            error!("missing {API_KEY_ENV}; refusing to initialize");
                        }
                    }
                    caps.render.render();
                }

                Event::SelectImageRequested => {
                    caps.media.pick(
                        ACCEPTED_MEDIA_TYPES
                            .iter()
                            .map(|t| (*t).to_string())
                            .collect(),
                        |result| Event::PickResponse(Box::new(result)),
                    );
                }

                Event::PickResponse(result) => {
                    match *result {
                        Ok(MediaOutput::Picked(file)) => match validate_selection(&file) {
                            Ok(()) => {
                                debug!(
                                    name = %file.name,
                                    media_type = %file.media_type,
                                    size = file.size_bytes,
                                    "image selected"
                                );
                                Self::replace_selection(model, file, caps);
                            }
                            Err(e) => {
                                warn!("selection rejected: {e}");
                                model.roast = None;
                                model.error = Some(e);
                            }
                        },
                        Ok(MediaOutput::Cancelled) => {
                            debug!("picker cancelled");
                            return;
                        }
                        Ok(other) => {
                            warn!("unexpected media output for pick: {other:?}");
                            return;
                        }
                        Err(e) => {
                            model.roast = None;
                            model.error = Some(Self::media_error_to_app(&e));
                        }
                    }
                    caps.render.render();
                }

                Event::PreviewResponse(result) => {
                    match *result {
                        Ok(MediaOutput::Preview { handle, url }) => match &mut model.selected {
                            Some(selected)
                                if selected.handle == handle
                                    && selected.preview_url.is_none() =>
                            {
                                selected.preview_url = Some(url);
                            }
                            _ => {
                                // The selection was replaced or reset while the
                                // preview was being created. Nothing owns the
                                // URL; release it now.
                                caps.media.release_preview(url);
                                return;
                            }
                        },
                        Ok(other) => {
                            warn!("unexpected media output for preview: {other:?}");
                            return;
                        }
                        Err(e) => {
                            // The selection stays usable without a preview.
                            warn!("preview unavailable: {e}");
                            return;
                        }
                    }
                    caps.render.render();
                }

                Event::RoastRequested => {
                    if !model.state.can_request_roast() {
                        debug!(state = ?model.state, "roast request ignored");
                        return;
                    }

                    let handle = match &model.selected {
                        Some(selected) => selected.handle.clone(),
                        None => {
                            warn!("image-selected state with no selection; resetting");
                            model.state = AppState::Idle;
                            caps.render.render();
                            return;
                        }
                    };

                    model.state = AppState::Loading;
                    model.roast = None;
                    model.error = None;

                    caps.media
                        .read(handle, |result| Event::ReadResponse(Box::new(result)));
                    caps.render.render();
                }

                Event::ReadResponse(result) => {
                    if !model.state.is_loading() {
                        debug!("file read resolved after the request was abandoned");
                        return;
                    }

                    match *result {
                        Ok(MediaOutput::Data { bytes }) => {
                            let media_type = match &model.selected {
                                Some(selected) => selected.media_type.clone(),
                                None => {
                                    warn!("file read resolved with no selection; dropping");
                                    model.state = AppState::Idle;
                                    caps.render.render();
                                    return;
                                }
                            };

                            // Encoded fresh on every request, never cached.
                            let payload = encoder::encode(&bytes, &media_type);
                            Self::send_roast_request(&payload, model, caps);
                        }
                        Ok(other) => {
                            warn!("unexpected media output for read: {other:?}");
                            model.roast = None;
                            model.error = Some(
                                AppError::new(ErrorKind::Internal, "The photo read went wrong")
                                    .with_internal(format!("{other:?}")),
                            );
                            model.state = AppState::ImageSelected;
                        }
                        Err(e) => {
                            model.roast = None;
                            model.error = Some(Self::media_error_to_app(&e));
                            model.state = AppState::ImageSelected;
                        }
                    }
                    caps.render.render();
                }

                Event::RoastResponse(outcome) => {
                    if model.selected.is_none() {
                        debug!("roast resolved after reset; discarding");
                        return;
                    }

                    model.roast = Some(roast::digest(outcome));
                    model.error = None;
                    model.state = AppState::ImageSelected;
                    caps.render.render();
                }

                Event::ResetRequested => {
                    Self::release_selection(model, caps);
                    model.roast = None;
                    model.error = None;
                    model.state = AppState::Idle;
                    caps.render.render();
                }
            }

            debug_assert!(model.result_state_consistent());
        }

        fn view(&self, model: &Model) -> ViewModel {
            let error = model.error.as_ref().map(UserFacingError::from);

            let state = match model.state {
                AppState::Starting => ViewState::Starting,
                AppState::ConfigError => ViewState::ConfigError {
                    message: error.as_ref().map_or_else(
                        || "The app is not configured.".to_string(),
                        |e| e.message.clone(),
                    ),
                },
                AppState::Idle => Self::idle_view(),
                AppState::ImageSelected | AppState::Loading => match &model.selected {
                    Some(selected) => ViewState::Selected {
                        file_name: selected.file_name.clone(),
                        preview_url: selected.preview_url.clone(),
                        is_loading: model.state.is_loading(),
                        can_request_roast: model.state.can_request_roast(),
                        roast: model.roast.clone(),
                    },
                    None => Self::idle_view(),
                },
            };

            ViewModel { state, error }
        }
    }
}
