//! Server-sent event encoding of stream frames.
//!
//! Each frame becomes one `data:` event. An error frame is followed by a
//! `[DONE]` event so clients always see the same terminator.

use axum::{
    http::{header, HeaderValue},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
};
use futures::stream::{self, BoxStream, StreamExt};
use gateway_core::StreamFrame;
use std::convert::Infallible;

/// Wire events for one frame
fn events(frame: &StreamFrame) -> Vec<Event> {
    let event = Event::default().data(frame.payload());
    match frame {
        StreamFrame::Error { .. } => {
            vec![event, Event::default().data(StreamFrame::Done.payload())]
        }
        StreamFrame::Delta { .. } | StreamFrame::Done => vec![event],
    }
}

/// Streaming response for a framed turn
pub fn sse_response(frames: BoxStream<'static, StreamFrame>) -> Response {
    let events = frames
        .flat_map(|frame| stream::iter(events(&frame)))
        .map(Ok::<_, Infallible>);

    let mut response = Sse::new(events)
        .keep_alive(KeepAlive::default())
        .into_response();

    let headers = response.headers_mut();
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert("x-accel-buffering", HeaderValue::from_static("no"));
    response
}
