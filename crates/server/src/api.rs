//! The API channel: a tiny path-routed request/reply surface for
//! introspection (`/help`, `/api/n5/...`).
//!
//! Replies are framed as `[return_code][part_count]` followed by
//! `part_count` typed parts, each `[part_type][payload]`. An empty path (or
//! `/`) short-circuits to a single empty frame, so the API channel doubles as
//! a liveness probe.

use zeromq::ZmqMessage;

use crate::codec::{self, CodecError};
use crate::server::ChannelAddresses;

pub const RETURN_OK: i64 = 0;
pub const RETURN_UNKNOWN_ERROR: i64 = 1;
pub const RETURN_ENDPOINT_UNKNOWN: i64 = 2;

pub const PART_STRING: i64 = 0;
pub const PART_BYTES: i64 = 1;
pub const PART_INT: i64 = 2;
pub const PART_UNKNOWN: i64 = 3;

/// One typed part of an API reply.
#[derive(Debug, Clone, PartialEq)]
pub enum ApiPart {
    Str(String),
    Bytes(Vec<u8>),
    Int(i64),
}

impl ApiPart {
    fn type_code(&self) -> i64 {
        match self {
            ApiPart::Str(_) => PART_STRING,
            ApiPart::Bytes(_) => PART_BYTES,
            ApiPart::Int(_) => PART_INT,
        }
    }

    fn payload(&self) -> Vec<u8> {
        match self {
            ApiPart::Str(s) => s.clone().into_bytes(),
            ApiPart::Bytes(b) => b.clone(),
            ApiPart::Int(v) => codec::encode_i64(*v),
        }
    }
}

/// A coded API reply, before framing.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiReply {
    pub return_code: i64,
    pub parts: Vec<ApiPart>,
}

impl ApiReply {
    pub fn ok(parts: Vec<ApiPart>) -> Self {
        Self {
            return_code: RETURN_OK,
            parts,
        }
    }

    fn into_message(self) -> ZmqMessage {
        let mut message = ZmqMessage::from(codec::encode_i64(self.return_code));
        message.push_back(codec::encode_i64(self.parts.len() as i64).into());
        for part in &self.parts {
            message.push_back(codec::encode_i64(part.type_code()).into());
            message.push_back(part.payload().into());
        }
        message
    }
}

/// Static context the endpoint handlers answer from.
pub struct ApiContext {
    pub container: String,
    pub dataset: String,
    pub addresses: ChannelAddresses,
}

/// Answer one API request.
pub fn respond(request: &ZmqMessage, ctx: &ApiContext) -> ZmqMessage {
    let frame = request.get(0).map(|f| f.as_ref()).unwrap_or(&[]);
    let path = match std::str::from_utf8(frame) {
        Ok(path) => path,
        Err(err) => {
            return ApiReply {
                return_code: RETURN_UNKNOWN_ERROR,
                parts: vec![
                    ApiPart::Str("invalid request".to_string()),
                    ApiPart::Str(err.to_string()),
                ],
            }
            .into_message()
        }
    };

    if path.is_empty() || path == "/" {
        // Pong: one empty frame.
        return ZmqMessage::from(Vec::<u8>::new());
    }

    route(&normalize(path), path, ctx).into_message()
}

fn normalize(path: &str) -> String {
    format!("/{}", path.trim_start_matches('/'))
}

/// `path` is normalized for matching; `raw` is the endpoint exactly as
/// received, which is what an unknown-endpoint reply must echo.
fn route(path: &str, raw: &str, ctx: &ApiContext) -> ApiReply {
    match path {
        "/help" => ApiReply::ok(vec![ApiPart::Str(help_text(ctx))]),
        "/api/n5/container" => ApiReply::ok(vec![ApiPart::Str(ctx.container.clone())]),
        "/api/n5/dataset" => ApiReply::ok(vec![ApiPart::Str(ctx.dataset.clone())]),
        "/api/n5/all" => ApiReply::ok(vec![
            ApiPart::Str(ctx.container.clone()),
            ApiPart::Str(ctx.dataset.clone()),
        ]),
        _ => ApiReply {
            return_code: RETURN_ENDPOINT_UNKNOWN,
            parts: vec![
                ApiPart::Str(format!("endpoint unknown: {}", raw)),
                ApiPart::Str(raw.to_string()),
            ],
        },
    }
}

fn help_text(ctx: &ApiContext) -> String {
    let a = &ctx.addresses;
    format!(
        "Solver server for interactive agglomeration.\n\
         \n\
         Channels:\n\
         {api:<width$} REQ/REP  API requests (send an endpoint path, e.g. /help)\n\
         {ping:<width$} REQ/REP  liveness probe, replies with an empty frame\n\
         {current:<width$} REQ/REP  latest successful solution as uint64 block labels\n\
         {labels:<width$} REQ/REP  submit edge labels as (u64, u64, u64) triples\n\
         {update:<width$} REQ/REP  queue a recompute, replies with the solution id\n\
         {new:<width$} PUB/SUB  (solution_id, exit_code) after each recompute\n",
        api = a.api(),
        ping = a.ping(),
        current = a.current_solution(),
        labels = a.set_edge_labels(),
        update = a.update_solution(),
        new = a.new_solution(),
        width = a.new_solution().len(),
    )
}

/// Client-side view of a parsed API reply. `None` is the pong.
pub fn parse_reply(message: &ZmqMessage) -> Result<Option<ApiReply>, CodecError> {
    if message.len() == 1 && message.get(0).map(|f| f.is_empty()) == Some(true) {
        return Ok(None);
    }

    let return_code = codec::frame_i64(message, 0)?;
    let claimed = codec::frame_i64(message, 1)?.max(0) as usize;
    // The frames on the wire bound the real part count; never allocate on
    // the claimed one.
    let mut parts = Vec::with_capacity(claimed.min(message.len() / 2));
    for i in 0..claimed {
        let type_frame = 2 + 2 * i;
        let payload = message
            .get(type_frame + 1)
            .ok_or(CodecError::MissingFrame(type_frame + 1))?
            .as_ref();
        let part = match codec::frame_i64(message, type_frame)? {
            PART_STRING => ApiPart::Str(String::from_utf8_lossy(payload).into_owned()),
            PART_INT => ApiPart::Int(codec::decode_i64(payload)?),
            _ => ApiPart::Bytes(payload.to_vec()),
        };
        parts.push(part);
    }
    Ok(Some(ApiReply { return_code, parts }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> ApiContext {
        ApiContext {
            container: "/data/sample.n5".to_string(),
            dataset: "volumes/seg".to_string(),
            addresses: ChannelAddresses::new("ipc:///tmp/agglo/solver"),
        }
    }

    fn respond_to(path: &str) -> ZmqMessage {
        respond(&ZmqMessage::from(path), &ctx())
    }

    #[test]
    fn empty_path_pongs_with_one_empty_frame() {
        for path in ["", "/"] {
            let reply = respond_to(path);
            assert_eq!(reply.len(), 1);
            assert!(reply.get(0).unwrap().is_empty());
            assert!(parse_reply(&reply).unwrap().is_none());
        }
    }

    #[test]
    fn help_returns_one_string_part() {
        let reply = parse_reply(&respond_to("/help")).unwrap().unwrap();
        assert_eq!(reply.return_code, RETURN_OK);
        assert_eq!(reply.parts.len(), 1);
        let ApiPart::Str(text) = &reply.parts[0] else {
            panic!("expected a string part");
        };
        assert!(text.contains("ipc:///tmp/agglo/solver-new-solution"));
        assert!(text.contains("ipc:///tmp/agglo/solver-ping"));
    }

    #[test]
    fn n5_endpoints_report_container_and_dataset() {
        let reply = parse_reply(&respond_to("/api/n5/container")).unwrap().unwrap();
        assert_eq!(reply.parts, vec![ApiPart::Str("/data/sample.n5".into())]);

        let reply = parse_reply(&respond_to("api/n5/dataset")).unwrap().unwrap();
        assert_eq!(reply.parts, vec![ApiPart::Str("volumes/seg".into())]);

        let reply = parse_reply(&respond_to("//api/n5/all")).unwrap().unwrap();
        assert_eq!(reply.return_code, RETURN_OK);
        assert_eq!(
            reply.parts,
            vec![
                ApiPart::Str("/data/sample.n5".into()),
                ApiPart::Str("volumes/seg".into()),
            ]
        );
    }

    #[test]
    fn unknown_endpoint_echoes_the_path() {
        let reply = parse_reply(&respond_to("/no/such/endpoint")).unwrap().unwrap();
        assert_eq!(reply.return_code, RETURN_ENDPOINT_UNKNOWN);
        assert_eq!(reply.parts.len(), 2);
        assert_eq!(reply.parts[1], ApiPart::Str("/no/such/endpoint".into()));

        // The echo is the endpoint as received, before normalization.
        for raw in ["bogus", "//bogus"] {
            let reply = parse_reply(&respond_to(raw)).unwrap().unwrap();
            assert_eq!(reply.return_code, RETURN_ENDPOINT_UNKNOWN);
            assert_eq!(reply.parts[1], ApiPart::Str(raw.into()));
        }
    }

    #[test]
    fn huge_claimed_part_count_is_a_missing_frame_error() {
        let mut message = ZmqMessage::from(codec::encode_i64(RETURN_OK));
        message.push_back(codec::encode_i64(i64::MAX).into());
        assert!(matches!(
            parse_reply(&message),
            Err(CodecError::MissingFrame(_))
        ));
    }

    #[test]
    fn non_utf8_path_is_an_unknown_error() {
        let reply = respond(&ZmqMessage::from(vec![0xffu8, 0xfe]), &ctx());
        let reply = parse_reply(&reply).unwrap().unwrap();
        assert_eq!(reply.return_code, RETURN_UNKNOWN_ERROR);
        assert_eq!(reply.parts.len(), 2);
    }
}
