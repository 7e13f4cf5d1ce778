use prost::Message;

use crate::error::ChannelError;
use crate::wire;

pub const NAMESPACE_DEVICEAUTH: &str = "urn:x-cast:com.google.cast.tp.deviceauth";
pub const NAMESPACE_CONNECTION: &str = "urn:x-cast:com.google.cast.tp.connection";
pub const NAMESPACE_HEARTBEAT: &str = "urn:x-cast:com.google.cast.tp.heartbeat";
pub const NAMESPACE_RECEIVER: &str = "urn:x-cast:com.google.cast.receiver";
pub const NAMESPACE_MEDIA: &str = "urn:x-cast:com.google.cast.media";

pub const DESTINATION_RECEIVER: &str = "receiver-0";

/// Known protocol versions. Only one value is in active use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolVersion {
    Castv2_1_0,
}

/// Wire value for [`ProtocolVersion::Castv2_1_0`], matching the device side.
const CASTV2_1_0: i32 = 0;

impl From<ProtocolVersion> for i32 {
    fn from(v: ProtocolVersion) -> Self {
        match v {
            ProtocolVersion::Castv2_1_0 => CASTV2_1_0,
        }
    }
}

/// The two shapes a payload can take on the wire.
#[derive(Debug, Clone)]
pub enum Payload {
    String(String),
    Binary(Vec<u8>),
}

/// The protocol envelope described in SPEC_FULL.md §3 — a thin, validated
/// wrapper around the generated `wire::CastMessage`.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub protocol_version: ProtocolVersion,
    pub source_id: String,
    pub destination_id: String,
    pub namespace: String,
    pub payload: Payload,
}

impl Envelope {
    pub fn new_string(
        source_id: impl Into<String>,
        destination_id: impl Into<String>,
        namespace: impl Into<String>,
        payload: impl Into<String>,
    ) -> Self {
        Self {
            protocol_version: ProtocolVersion::Castv2_1_0,
            source_id: source_id.into(),
            destination_id: destination_id.into(),
            namespace: namespace.into(),
            payload: Payload::String(payload.into()),
        }
    }

    pub fn new_binary(
        source_id: impl Into<String>,
        destination_id: impl Into<String>,
        namespace: impl Into<String>,
        payload: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            protocol_version: ProtocolVersion::Castv2_1_0,
            source_id: source_id.into(),
            destination_id: destination_id.into(),
            namespace: namespace.into(),
            payload: Payload::Binary(payload.into()),
        }
    }

    /// Serialise this envelope to its protobuf wire representation.
    pub fn encode(&self) -> Result<Vec<u8>, ChannelError> {
        if self.source_id.is_empty() || self.destination_id.is_empty() || self.namespace.is_empty()
        {
            return Err(ChannelError::Internal(
                "envelope source_id/destination_id/namespace must not be empty".into(),
            ));
        }
        let msg = match &self.payload {
            Payload::String(s) => wire::CastMessage {
                protocol_version: self.protocol_version.into(),
                source_id: self.source_id.clone(),
                destination_id: self.destination_id.clone(),
                namespace: self.namespace.clone(),
                payload_type: wire::cast_message::PayloadType::String as i32,
                payload_utf8: Some(s.clone()),
                payload_binary: None,
            },
            Payload::Binary(b) => wire::CastMessage {
                protocol_version: self.protocol_version.into(),
                source_id: self.source_id.clone(),
                destination_id: self.destination_id.clone(),
                namespace: self.namespace.clone(),
                payload_type: wire::cast_message::PayloadType::Binary as i32,
                payload_utf8: None,
                payload_binary: Some(b.clone()),
            },
        };
        Ok(msg.encode_to_vec())
    }

    /// Parse a previously-framed envelope payload.
    pub fn decode(bytes: &[u8]) -> Result<Self, ChannelError> {
        let msg = wire::CastMessage::decode(bytes)
            .map_err(|e| ChannelError::Protocol(format!("undecodable envelope: {e}")))?;

        let payload = match wire::cast_message::PayloadType::try_from(msg.payload_type) {
            Ok(wire::cast_message::PayloadType::String) => {
                let s = msg.payload_utf8.ok_or_else(|| {
                    ChannelError::Protocol("STRING envelope missing payload_utf8".into())
                })?;
                Payload::String(s)
            }
            Ok(wire::cast_message::PayloadType::Binary) => {
                let b = msg.payload_binary.ok_or_else(|| {
                    ChannelError::Protocol("BINARY envelope missing payload_binary".into())
                })?;
                Payload::Binary(b)
            }
            Err(_) => {
                return Err(ChannelError::Protocol(format!(
                    "unknown payload_type {}",
                    msg.payload_type
                )));
            }
        };

        Ok(Self {
            protocol_version: ProtocolVersion::Castv2_1_0,
            source_id: msg.source_id,
            destination_id: msg.destination_id,
            namespace: msg.namespace,
            payload,
        })
    }

    pub fn as_str(&self) -> Option<&str> {
        match &self.payload {
            Payload::String(s) => Some(s),
            Payload::Binary(_) => None,
        }
    }

    pub fn into_binary(self) -> Option<Vec<u8>> {
        match self.payload {
            Payload::Binary(b) => Some(b),
            Payload::String(_) => None,
        }
    }
}

/// Build the single-frame device-auth challenge sent at the start of `connect()`.
pub fn build_auth_challenge(sender_id: &str) -> Result<Envelope, ChannelError> {
    let msg = wire::DeviceAuthMessage {
        challenge: Some(wire::AuthChallenge::default()),
        response: None,
        error: None,
    };
    Ok(Envelope::new_binary(
        sender_id,
        DESTINATION_RECEIVER,
        NAMESPACE_DEVICEAUTH,
        msg.encode_to_vec(),
    ))
}

/// Decode the device's reply to the auth challenge, surfacing `error` as
/// [`ChannelError::Auth`].
pub fn decode_auth_reply(bytes: &[u8]) -> Result<(), ChannelError> {
    let msg = wire::DeviceAuthMessage::decode(bytes)
        .map_err(|e| ChannelError::Protocol(format!("undecodable auth reply: {e}")))?;
    if let Some(err) = msg.error {
        let error_type = wire::auth_error::ErrorType::try_from(err.error_type.unwrap_or(0))
            .map(|t| format!("{t:?}"))
            .unwrap_or_else(|_| format!("unknown({})", err.error_type.unwrap_or(0)));
        return Err(ChannelError::Auth(error_type));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_envelope_round_trips() {
        let env = Envelope::new_string("sender-1", DESTINATION_RECEIVER, NAMESPACE_RECEIVER, "{}");
        let bytes = env.encode().unwrap();
        let decoded = Envelope::decode(&bytes).unwrap();
        assert_eq!(decoded.source_id, "sender-1");
        assert_eq!(decoded.destination_id, DESTINATION_RECEIVER);
        assert_eq!(decoded.namespace, NAMESPACE_RECEIVER);
        assert_eq!(decoded.as_str(), Some("{}"));
    }

    #[test]
    fn binary_envelope_round_trips() {
        let env = Envelope::new_binary("sender-1", DESTINATION_RECEIVER, NAMESPACE_DEVICEAUTH, vec![1, 2, 3]);
        let bytes = env.encode().unwrap();
        let decoded = Envelope::decode(&bytes).unwrap();
        assert_eq!(decoded.into_binary(), Some(vec![1, 2, 3]));
    }

    #[test]
    fn rejects_empty_identifiers() {
        let env = Envelope::new_string("", DESTINATION_RECEIVER, NAMESPACE_RECEIVER, "{}");
        assert!(env.encode().is_err());
    }

    #[test]
    fn auth_challenge_has_no_error() {
        let challenge = build_auth_challenge("sender-1").unwrap();
        assert_eq!(challenge.namespace, NAMESPACE_DEVICEAUTH);
        assert_eq!(challenge.destination_id, DESTINATION_RECEIVER);
    }

    #[test]
    fn auth_reply_with_error_surfaces_auth_error() {
        let msg = wire::DeviceAuthMessage {
            challenge: None,
            response: None,
            error: Some(wire::AuthError {
                error_type: Some(wire::auth_error::ErrorType::NoTls as i32),
            }),
        };
        let bytes = msg.encode_to_vec();
        let err = decode_auth_reply(&bytes).unwrap_err();
        assert!(matches!(err, ChannelError::Auth(_)));
    }

    #[test]
    fn auth_reply_without_error_succeeds() {
        let msg = wire::DeviceAuthMessage {
            challenge: None,
            response: Some(wire::AuthResponse::default()),
            error: None,
        };
        let bytes = msg.encode_to_vec();
        assert!(decode_auth_reply(&bytes).is_ok());
    }
}
