mod media;

pub use self::media::{
    Media, MediaError, MediaHandle, MediaOperation, MediaOutput, MediaResult, PickedFile,
};

pub use crux_core::render::Render;
pub use crux_http::Http;

use crate::{App, Event};

#[derive(crux_core::macros::Effect)]
#[effect(app = "App")]
pub struct Capabilities {
    pub http: Http<Event>,
    pub media: Media<Event>,
    pub render: Render<Event>,
}
