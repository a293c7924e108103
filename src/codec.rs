//! Text form of keys and invitations.
//!
//! Identities, group keys and invitations travel as standard base64 outside
//! the service and as raw bytes inside it.
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use prost::Message;
use protocol_node::GroupInvitation;

use crate::error::DecodeError;

pub fn encode(bytes: &[u8]) -> String {
    BASE64.encode(bytes)
}

/// Decode a base64 key. Surrounding whitespace is ignored, an empty key is rejected.
pub fn decode_key(field: &'static str, text: &str) -> Result<Vec<u8>, DecodeError> {
    let bytes = BASE64
        .decode(text.trim())
        .map_err(|source| DecodeError::Base64 { field, source })?;
    if bytes.is_empty() {
        return Err(DecodeError::EmptyField(field));
    }
    Ok(bytes)
}

pub fn encode_invitation(invitation: &GroupInvitation) -> String {
    BASE64.encode(invitation.encode_to_vec())
}

pub fn decode_invitation(text: &str) -> Result<GroupInvitation, DecodeError> {
    let bytes = decode_key("invitation", text)?;
    let invitation =
        GroupInvitation::decode(bytes.as_slice()).map_err(|source| DecodeError::Protobuf {
            what: "invitation",
            source,
        })?;
    if invitation.public_key.is_empty() {
        return Err(DecodeError::EmptyField("invitation group key"));
    }
    Ok(invitation)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_key_ignores_trailing_newline() {
        let key = vec![7u8; 32];
        let text = format!("{}\n", encode(&key));
        assert_eq!(decode_key("identity", &text).unwrap(), key);
    }

    #[test]
    fn decode_key_rejects_garbage_and_empty() {
        assert!(matches!(
            decode_key("identity", "not base64!"),
            Err(DecodeError::Base64 {
                field: "identity",
                ..
            })
        ));
        assert!(matches!(
            decode_key("identity", ""),
            Err(DecodeError::EmptyField("identity"))
        ));
    }

    #[test]
    fn invitation_survives_text_form() {
        let invitation = GroupInvitation {
            public_key: vec![1; 32],
            secret: vec![2; 32],
            inviter_pk: vec![3; 32],
        };
        let text = encode_invitation(&invitation);
        assert_eq!(decode_invitation(&text).unwrap(), invitation);
    }

    #[test]
    fn invitation_without_group_key_is_rejected() {
        let text = encode_invitation(&GroupInvitation {
            public_key: Vec::new(),
            secret: vec![2; 32],
            inviter_pk: Vec::new(),
        });
        assert!(matches!(
            decode_invitation(&text),
            Err(DecodeError::EmptyField(_))
        ));
    }

    #[test]
    fn invitation_with_bad_protobuf_is_rejected() {
        // Field 1, wire type 2, length 200 with no bytes following.
        let text = encode(&[0x0a, 0xc8, 0x01]);
        assert!(matches!(
            decode_invitation(&text),
            Err(DecodeError::Protobuf { .. })
        ));
    }
}
