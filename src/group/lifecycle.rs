//! Caller-driven lifecycle of multi-member groups.
//!
//! A creator walks `NonExistent -> Created -> Active -> Invitable`; a peer
//! holding the invitation walks `Joined -> Active`. Every step is one node
//! call and a failing step aborts the whole operation.
use std::fmt;

use log::info;
use protocol_node::{GroupInvitation, ProtocolNode};

use crate::{codec, error::LifecycleError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupState {
    NonExistent,
    Created,
    Active,
    Invitable,
    Joined,
}

impl fmt::Display for GroupState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GroupState::NonExistent => "non-existent",
            GroupState::Created => "created",
            GroupState::Active => "active",
            GroupState::Invitable => "invitable",
            GroupState::Joined => "joined",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreatedGroup {
    pub group_key: Vec<u8>,
    pub invitation: GroupInvitation,
}

impl CreatedGroup {
    pub fn group_key_b64(&self) -> String {
        codec::encode(&self.group_key)
    }

    pub fn invitation_b64(&self) -> String {
        codec::encode_invitation(&self.invitation)
    }
}

fn transition(group_key: &[u8], from: GroupState, to: GroupState) {
    info!(
        "Group {}: {from} -> {to}",
        codec::encode(group_key.get(..8).unwrap_or(group_key))
    );
}

pub async fn create_group<N: ProtocolNode + ?Sized>(
    node: &N,
) -> Result<CreatedGroup, LifecycleError> {
    let group_key = node
        .multi_member_group_create()
        .await
        .map_err(LifecycleError::Create)?;
    transition(&group_key, GroupState::NonExistent, GroupState::Created);

    node.activate_group(&group_key)
        .await
        .map_err(LifecycleError::ActivateCreated)?;
    transition(&group_key, GroupState::Created, GroupState::Active);

    let invitation = node
        .multi_member_group_invitation_create(&group_key)
        .await
        .map_err(LifecycleError::Invite)?;
    transition(&group_key, GroupState::Active, GroupState::Invitable);

    Ok(CreatedGroup {
        group_key,
        invitation,
    })
}

/// Join the group an already decoded invitation describes and activate it.
pub async fn join_group<N: ProtocolNode + ?Sized>(
    node: &N,
    invitation: GroupInvitation,
) -> Result<Vec<u8>, LifecycleError> {
    let group_key = node
        .multi_member_group_join(invitation)
        .await
        .map_err(LifecycleError::Join)?;
    transition(&group_key, GroupState::NonExistent, GroupState::Joined);

    node.activate_group(&group_key)
        .await
        .map_err(LifecycleError::ActivateJoined)?;
    transition(&group_key, GroupState::Joined, GroupState::Active);

    Ok(group_key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use protocol_node::MemoryNetwork;

    #[tokio::test]
    async fn creator_and_joiner_share_the_key() {
        let network = MemoryNetwork::new();
        let alice = network.register_account("alice").await;
        let bob = network.register_account("bob").await;

        let created = create_group(&alice).await.unwrap();
        let invitation = codec::decode_invitation(&created.invitation_b64()).unwrap();
        let joined = join_group(&bob, invitation).await.unwrap();

        assert_eq!(joined, created.group_key);
        assert_eq!(created.invitation.inviter_pk, alice.account_pk());
    }

    #[tokio::test]
    async fn tampered_invitation_fails_at_join() {
        let network = MemoryNetwork::new();
        let alice = network.register_account("alice").await;
        let bob = network.register_account("bob").await;

        let mut invitation = create_group(&alice).await.unwrap().invitation;
        invitation.secret = vec![0; 32];
        assert!(matches!(
            join_group(&bob, invitation).await,
            Err(LifecycleError::Join(_))
        ));
    }

    #[tokio::test]
    async fn unreachable_node_fails_creation() {
        let network = MemoryNetwork::new();
        let alice = network.register_account("alice").await;
        network.set_reachable(false);

        assert!(matches!(
            create_group(&alice).await,
            Err(LifecycleError::Create(_))
        ));
    }

    #[test]
    fn states_render_lowercase() {
        assert_eq!(GroupState::Invitable.to_string(), "invitable");
        assert_eq!(GroupState::NonExistent.to_string(), "non-existent");
    }
}
