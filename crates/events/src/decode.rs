//! SSE frame → [`StreamEvent`].

use jobsync_core::EventId;

use crate::error::DecodeError;
use crate::event::StreamEvent;
use crate::sse::SseFrame;

/// Decode one frame.
///
/// Returns `Ok(None)` for frames with no payload (id-only or retry hints).
/// The frame's `event:` name is used when the body carries no `type`, and the
/// frame `id` becomes the event's resumption token.
pub fn decode_frame(frame: &SseFrame) -> Result<Option<StreamEvent>, DecodeError> {
    if frame.data.trim().is_empty() {
        return Ok(None);
    }

    let value: serde_json::Value = serde_json::from_str(&frame.data)?;
    if !value.is_object() {
        return Err(DecodeError::NotAnObject);
    }

    let mut event: StreamEvent = serde_json::from_value(value)?;
    if event.event_type.is_empty() {
        event.event_type = frame
            .event
            .clone()
            .unwrap_or_else(|| "message".to_string());
    }
    event.event_id = frame.id.as_deref().filter(|id| !id.is_empty()).map(EventId::from);

    Ok(Some(event))
}
