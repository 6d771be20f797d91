use http::header::{HeaderMap, HeaderValue};
use http::StatusCode;

use crate::frame::{Frame, StreamId};

/// Header frame
///
/// Carries either the request/response header block or a trailer block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Headers {
    /// The ID of the stream with which this frame is associated.
    stream_id: StreamId,

    /// The header block, pseudo headers broken out.
    block: HeaderBlock,

    end_stream: bool,
}

/// A decoded header block: pseudo headers plus regular fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderBlock {
    pub pseudo: Pseudo,
    pub fields: HeaderMap,
}

/// Pseudo headers, these must be sent ahead of the regular fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Pseudo {
    // Request
    pub method: Option<http::Method>,
    pub scheme: Option<String>,
    pub authority: Option<String>,
    pub path: Option<String>,

    // Response
    pub status: Option<StatusCode>,
}

/// PUSH_PROMISE frame. The transport refuses pushed streams; the value is
/// only carried so the dispatcher can reset the promised id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushPromise {
    stream_id: StreamId,
    promised_id: StreamId,
    block: HeaderBlock,
}

// ===== impl Headers =====

impl Headers {
    pub fn new(stream_id: StreamId, block: HeaderBlock) -> Self {
        Headers {
            stream_id,
            block,
            end_stream: false,
        }
    }

    /// A trailer block; trailers always end the stream.
    pub fn trailers(stream_id: StreamId, fields: HeaderMap) -> Self {
        Headers {
            stream_id,
            block: HeaderBlock {
                pseudo: Pseudo::default(),
                fields,
            },
            end_stream: true,
        }
    }

    pub fn stream_id(&self) -> StreamId {
        self.stream_id
    }

    pub fn is_end_stream(&self) -> bool {
        self.end_stream
    }

    pub fn set_end_stream(&mut self) {
        self.end_stream = true;
    }

    pub fn block(&self) -> &HeaderBlock {
        &self.block
    }

    pub fn into_block(self) -> HeaderBlock {
        self.block
    }
}

// ===== impl HeaderBlock =====

impl HeaderBlock {
    /// Builds the outbound request block for a call.
    ///
    /// The path is `"/" + method`; the remaining pseudo headers and the
    /// default fields (content type, TE, user agent) follow what RPC peers
    /// expect. Caller metadata wins over the defaults.
    pub fn request(method: &str, authority: &str, metadata: HeaderMap) -> HeaderBlock {
        let mut fields = metadata;

        for (name, value) in [
            (http::header::CONTENT_TYPE, "application/grpc"),
            (http::header::TE, "trailers"),
            (http::header::USER_AGENT, concat!("h2mux/", env!("CARGO_PKG_VERSION"))),
        ] {
            if !fields.contains_key(&name) {
                fields.insert(name, HeaderValue::from_static(value));
            }
        }

        HeaderBlock {
            pseudo: Pseudo {
                method: Some(http::Method::POST),
                scheme: Some("http".to_string()),
                authority: Some(authority.to_string()),
                path: Some(format!("/{}", method)),
                status: None,
            },
            fields,
        }
    }

    /// The response status pseudo header, if present.
    pub fn status(&self) -> Option<StatusCode> {
        self.pseudo.status
    }

    /// Converts an inbound block to the listener-visible representation.
    /// Pseudo headers are dropped; they are transport metadata.
    pub fn into_fields(self) -> HeaderMap {
        self.fields
    }
}

// ===== impl PushPromise =====

impl PushPromise {
    pub fn new(stream_id: StreamId, promised_id: StreamId, block: HeaderBlock) -> Self {
        PushPromise {
            stream_id,
            promised_id,
            block,
        }
    }

    pub fn stream_id(&self) -> StreamId {
        self.stream_id
    }

    pub fn promised_id(&self) -> StreamId {
        self.promised_id
    }
}

impl From<Headers> for Frame {
    fn from(src: Headers) -> Frame {
        Frame::Headers(src)
    }
}

impl From<PushPromise> for Frame {
    fn from(src: PushPromise) -> Frame {
        Frame::PushPromise(src)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn request_block_sets_pseudo_headers() {
        let block = HeaderBlock::request("pkg.Svc/Call", "example.com:443", HeaderMap::new());

        assert_eq!(block.pseudo.path.as_deref(), Some("/pkg.Svc/Call"));
        assert_eq!(block.pseudo.authority.as_deref(), Some("example.com:443"));
        assert_eq!(block.pseudo.method, Some(http::Method::POST));
        assert_eq!(block.fields.get(http::header::TE).unwrap(), "trailers");
    }

    #[test]
    fn caller_metadata_wins_over_defaults() {
        let mut metadata = HeaderMap::new();
        metadata.insert(
            http::header::USER_AGENT,
            HeaderValue::from_static("custom-agent/1.0"),
        );

        let block = HeaderBlock::request("Echo", "localhost", metadata);
        assert_eq!(
            block.fields.get(http::header::USER_AGENT).unwrap(),
            "custom-agent/1.0"
        );
    }
}
