//! Frame-level vocabulary of the solver protocol.
//!
//! Every integer frame is an 8-byte little-endian `i64`. Edge-label triples
//! are packed binary, 24 bytes per triple: `(endpoint_a, endpoint_b, label)`,
//! each a little-endian `u64`. Solutions are one little-endian `u64` block
//! label per node, indexed by node label.

use thiserror::Error;
use zeromq::ZmqMessage;

use agglo_core::Edge;

/// Bytes per integer frame.
pub const INT_FRAME_LEN: usize = 8;
/// Bytes per packed edge-label triple.
pub const EDGE_LABEL_TRIPLE_LEN: usize = 24;

/// current-solution reply status: a solution follows.
pub const CURRENT_SOLUTION_SUCCESS: i64 = 0;
/// current-solution reply status: no successful recompute yet.
pub const CURRENT_SOLUTION_NO_SOLUTION: i64 = 1;

/// set-edge-labels request method: packed triple list.
pub const METHOD_EDGE_LIST: i64 = 0;
/// set-edge-labels reply: labels recorded, count follows.
pub const SET_EDGE_LABELS_SUCCESS: i64 = 0;
/// set-edge-labels reply: unknown method, the method frame is echoed back.
pub const SET_EDGE_LABELS_DO_NOT_UNDERSTAND: i64 = 1;
/// set-edge-labels reply: malformed payload or handler failure, message follows.
pub const SET_EDGE_LABELS_EXCEPTION: i64 = 2;

/// update-solution reply: request queued, solution id follows.
pub const UPDATE_RECEIVED: i64 = 0;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("expected an 8-byte integer frame, got {0} bytes")]
    BadIntFrame(usize),

    #[error("message has no frame {0}")]
    MissingFrame(usize),

    #[error("edge label payload of {0} bytes is not a whole number of 24-byte triples")]
    BadTripleLength(usize),

    #[error("solution payload of {0} bytes is not a whole number of 8-byte labels")]
    BadSolutionLength(usize),
}

pub fn encode_i64(value: i64) -> Vec<u8> {
    value.to_le_bytes().to_vec()
}

pub fn decode_i64(frame: &[u8]) -> Result<i64, CodecError> {
    let bytes: [u8; INT_FRAME_LEN] = frame
        .try_into()
        .map_err(|_| CodecError::BadIntFrame(frame.len()))?;
    Ok(i64::from_le_bytes(bytes))
}

/// Decode the frame at `index` as an integer.
pub fn frame_i64(message: &ZmqMessage, index: usize) -> Result<i64, CodecError> {
    let frame = message
        .get(index)
        .ok_or(CodecError::MissingFrame(index))?;
    decode_i64(frame.as_ref())
}

/// Pack `(edge, label)` pairs into the 24-byte triple wire format.
pub fn encode_edge_labels(pairs: &[(Edge, u64)]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(pairs.len() * EDGE_LABEL_TRIPLE_LEN);
    for (edge, label) in pairs {
        bytes.extend_from_slice(&edge.a().to_le_bytes());
        bytes.extend_from_slice(&edge.b().to_le_bytes());
        bytes.extend_from_slice(&label.to_le_bytes());
    }
    bytes
}

/// Unpack a triple payload. Endpoint order within a triple does not matter;
/// edges are normalized on construction.
pub fn decode_edge_labels(payload: &[u8]) -> Result<Vec<(Edge, u64)>, CodecError> {
    if payload.len() % EDGE_LABEL_TRIPLE_LEN != 0 {
        return Err(CodecError::BadTripleLength(payload.len()));
    }
    Ok(payload
        .chunks_exact(EDGE_LABEL_TRIPLE_LEN)
        .map(|triple| {
            let word = |i: usize| {
                u64::from_le_bytes(triple[i * 8..(i + 1) * 8].try_into().expect("8-byte slice"))
            };
            (Edge::new(word(0), word(1)), word(2))
        })
        .collect())
}

pub fn encode_solution(solution: &[u64]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(solution.len() * 8);
    for label in solution {
        bytes.extend_from_slice(&label.to_le_bytes());
    }
    bytes
}

pub fn decode_solution(payload: &[u8]) -> Result<Vec<u64>, CodecError> {
    if payload.len() % 8 != 0 {
        return Err(CodecError::BadSolutionLength(payload.len()));
    }
    Ok(payload
        .chunks_exact(8)
        .map(|c| u64::from_le_bytes(c.try_into().expect("chunks_exact(8)")))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int_frames_are_exactly_eight_bytes() {
        assert_eq!(decode_i64(&encode_i64(-3)).unwrap(), -3);
        assert_eq!(decode_i64(&encode_i64(i64::MAX)).unwrap(), i64::MAX);
        assert!(matches!(decode_i64(&[0; 4]), Err(CodecError::BadIntFrame(4))));
        assert!(matches!(decode_i64(&[0; 9]), Err(CodecError::BadIntFrame(9))));
    }

    #[test]
    fn edge_label_triples_roundtrip() {
        let pairs = vec![(Edge::new(0, 1), 0), (Edge::new(7, 3), 1)];
        let bytes = encode_edge_labels(&pairs);
        assert_eq!(bytes.len(), 48);
        assert_eq!(decode_edge_labels(&bytes).unwrap(), pairs);
    }

    #[test]
    fn triples_normalize_endpoint_order() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&5u64.to_le_bytes());
        bytes.extend_from_slice(&2u64.to_le_bytes());
        bytes.extend_from_slice(&1u64.to_le_bytes());

        let pairs = decode_edge_labels(&bytes).unwrap();
        assert_eq!(pairs, vec![(Edge::new(2, 5), 1)]);
    }

    #[test]
    fn ragged_triple_payload_is_rejected() {
        assert!(matches!(
            decode_edge_labels(&[0; 8]),
            Err(CodecError::BadTripleLength(8))
        ));
        assert!(matches!(
            decode_edge_labels(&[0; 25]),
            Err(CodecError::BadTripleLength(25))
        ));
        assert!(decode_edge_labels(&[]).unwrap().is_empty());
    }

    #[test]
    fn solutions_roundtrip() {
        let solution = vec![0, 0, 0, 3];
        assert_eq!(decode_solution(&encode_solution(&solution)).unwrap(), solution);
        assert!(matches!(
            decode_solution(&[1, 2, 3]),
            Err(CodecError::BadSolutionLength(3))
        ));
    }

    #[test]
    fn missing_frame_is_reported_by_index() {
        let message = ZmqMessage::from(encode_i64(4));
        assert_eq!(frame_i64(&message, 0).unwrap(), 4);
        assert!(matches!(
            frame_i64(&message, 1),
            Err(CodecError::MissingFrame(1))
        ));
    }
}
