//! Wire format: one JSON object per WebSocket text frame.
//!
//! Each frame carries a `type` discriminator; see [`Message`] and
//! [`Response`] for the accepted shapes.

use serde::de::DeserializeOwned;
use serde::Serialize;
use teleop_types::{Message, Response};

use crate::error::ProtocolError;

/// Maximum frame size (64 KiB). Every valid frame is far smaller.
pub const MAX_FRAME_SIZE: usize = 64 * 1024;

/// Encode any wire value as a JSON text frame.
pub fn encode<T: Serialize>(value: &T) -> Result<String, ProtocolError> {
    serde_json::to_string(value).map_err(|e| ProtocolError::Serialization(e.to_string()))
}

/// Encode a client message.
pub fn encode_message(msg: &Message) -> Result<String, ProtocolError> {
    encode(msg)
}

/// Encode a relay response.
pub fn encode_response(response: &Response) -> Result<String, ProtocolError> {
    encode(response)
}

fn decode<T: DeserializeOwned>(frame: &str) -> Result<T, ProtocolError> {
    if frame.len() > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge {
            len: frame.len(),
            max: MAX_FRAME_SIZE,
        });
    }
    serde_json::from_str(frame).map_err(|e| ProtocolError::Deserialization(e.to_string()))
}

/// Decode and validate a client message.
pub fn decode_message(frame: &str) -> Result<Message, ProtocolError> {
    let msg: Message = decode(frame)?;
    msg.validate()?;
    Ok(msg)
}

/// Decode a relay response.
pub fn decode_response(frame: &str) -> Result<Response, ProtocolError> {
    decode(frame)
}

#[cfg(test)]
mod tests {
    use super::*;
    use teleop_types::{Actor, Command, RefusalReason};

    #[test]
    fn command_message_roundtrip() {
        let msg = Message::command(Command::new(0.75, 270).unwrap(), 99);
        let frame = encode_message(&msg).unwrap();
        assert_eq!(decode_message(&frame).unwrap(), msg);
    }

    #[test]
    fn decodes_literal_authorization_frame() {
        let frame = r#"{"type":"Authorization","from":"Robot","accessToken":"s3cret"}"#;
        match decode_message(frame).unwrap() {
            Message::Authorization { from, access_token } => {
                assert_eq!(from, Actor::Robot);
                assert_eq!(access_token, "s3cret");
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn out_of_range_command_is_malformed() {
        let frame = r#"{"type":"Command","from":"UI","command":{"speed":1.5,"angle":10},"time":1}"#;
        let err = decode_message(frame).unwrap_err();
        assert!(err.is_malformed_frame());

        let frame = r#"{"type":"Command","from":"UI","command":{"speed":0.5,"angle":400},"time":1}"#;
        assert!(decode_message(frame).unwrap_err().is_malformed_frame());
    }

    #[test]
    fn wrong_sender_is_malformed() {
        let frame = r#"{"type":"Handshaking","from":"Robot","time":5}"#;
        let err = decode_message(frame).unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidMessage(_)));
        assert!(err.is_malformed_frame());
    }

    #[test]
    fn garbage_is_malformed() {
        assert!(decode_message("not json").unwrap_err().is_malformed_frame());
        assert!(decode_response("{}").unwrap_err().is_malformed_frame());
    }

    #[test]
    fn oversized_frame_is_rejected_before_parsing() {
        let frame = " ".repeat(MAX_FRAME_SIZE + 1);
        assert!(matches!(
            decode_message(&frame),
            Err(ProtocolError::FrameTooLarge { .. })
        ));
    }

    #[test]
    fn refused_response_roundtrip() {
        let response = Response::forbidden("Your access token is expired");
        let frame = encode_response(&response).unwrap();
        match decode_response(&frame).unwrap() {
            Response::Refused { reason, message } => {
                assert_eq!(reason, RefusalReason::Forbidden);
                assert_eq!(message, "Your access token is expired");
            }
            other => panic!("unexpected response: {other:?}"),
        }
    }
}
