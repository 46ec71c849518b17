use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

/// Base64 image content plus its declared media type, ready for the roast
/// service. The payload carries no `data:` URI prefix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodedPayload {
    pub data: String,
    pub media_type: String,
}

impl EncodedPayload {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Encode raw file bytes for transport. Pure; no validation -- the caller has
/// already checked the declared type and size ceiling before reading the file.
/// An empty read encodes to an empty payload rather than an error; failures to
/// read at all are reported by the media capability, upstream of this call.
#[must_use]
pub fn encode(bytes: &[u8], media_type: &str) -> EncodedPayload {
    EncodedPayload {
        data: STANDARD.encode(bytes),
        media_type: media_type.to_string(),
    }
}
