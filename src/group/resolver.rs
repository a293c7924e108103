use log::debug;
use protocol_node::ProtocolNode;

use crate::{codec, error::DecodeError, error::ResolutionError};

/// What a caller addresses a message operation to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// Account key of a contact; the 1:1 channel shared with it is used.
    Peer(Vec<u8>),
    /// Key of a group this account is a member of.
    Group(Vec<u8>),
}

impl Target {
    pub fn decode(text: &str, is_peer_identity: bool) -> Result<Self, DecodeError> {
        let key = codec::decode_key("target", text)?;
        Ok(if is_peer_identity {
            Target::Peer(key)
        } else {
            Target::Group(key)
        })
    }
}

/// A channel resolved for one call. Never cached between calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupSession {
    pub group_key: Vec<u8>,
    pub is_active: bool,
}

/// Look up the channel for `target`. The returned session is not active yet.
pub async fn resolve<N: ProtocolNode + ?Sized>(
    node: &N,
    target: &Target,
) -> Result<GroupSession, ResolutionError> {
    let info = match target {
        Target::Peer(identity) => node
            .group_info_by_contact(identity)
            .await
            .map_err(ResolutionError::UnknownPeer)?,
        Target::Group(group_key) => node
            .group_info_by_key(group_key)
            .await
            .map_err(ResolutionError::UnknownGroup)?,
    };
    debug!("Resolved {:?} channel", info.group_type);
    Ok(GroupSession {
        group_key: info.public_key,
        is_active: false,
    })
}

pub async fn activate<N: ProtocolNode + ?Sized>(
    node: &N,
    mut session: GroupSession,
) -> Result<GroupSession, ResolutionError> {
    if !session.is_active {
        node.activate_group(&session.group_key)
            .await
            .map_err(ResolutionError::Activation)?;
        session.is_active = true;
    }
    Ok(session)
}
