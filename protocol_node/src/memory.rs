//! In-process stand-in for a network of protocol nodes.
//!
//! Every account registered on a [`MemoryNetwork`] gets its own
//! [`MemoryNode`] client. Logs are append-only and shared by all members of a
//! group, so two nodes on the same network observe each other's writes.
use std::{
    collections::{HashMap, HashSet},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, PoisonError, RwLock,
    },
};

use async_trait::async_trait;
use futures::{stream, stream::BoxStream, Stream, StreamExt};
use log::{debug, info};
use prost::Message;
use tokio::sync::{watch, Mutex};

use crate::{
    node::{NodeConnector, ProtocolNode},
    types::{
        AccountContactRequestAccepted, AccountContactRequestDiscarded,
        AccountContactRequestEnqueued, AccountContactRequestReceived, AccountInfo, AppMessage,
        EventStream, EventType, GroupInfo, GroupInvitation, GroupType, InstanceConfig,
        ListRange, MemberJoined, MessageStream, MetadataEvent, ShareableContact, ShareableLink,
    },
    NodeError,
};

pub const KEY_LEN: usize = 32;
const LINK_PREFIX: &str = "memory://contact/";

fn random_key() -> Vec<u8> {
    rand::random::<[u8; KEY_LEN]>().to_vec()
}

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Append-only log with any number of readers.
///
/// Readers keep their own cursor into `entries`, so a slow reader never
/// loses items; it resumes where it stopped once it polls again.
struct Log<T> {
    entries: Arc<RwLock<Vec<T>>>,
    /// Number of entries, bumped after every append.
    len: watch::Sender<usize>,
}

impl<T: Clone + Send + Sync + 'static> Log<T> {
    fn new() -> Self {
        let (len, _) = watch::channel(0);
        Self {
            entries: Arc::new(RwLock::new(Vec::new())),
            len,
        }
    }

    fn len(&self) -> usize {
        *self.len.borrow()
    }

    fn next_index(&self) -> u64 {
        self.len() as u64
    }

    fn append(&mut self, item: T) {
        let len = {
            let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
            entries.push(item);
            entries.len()
        };
        self.len.send_replace(len);
    }

    /// The backlog is cut under the same lock as `append`, and the live half
    /// starts right after it, so nothing falls between the two.
    fn subscribe(&self, range: ListRange) -> BoxStream<'static, Result<T, NodeError>> {
        let (mut backlog, cursor) = {
            let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
            (entries.clone(), entries.len())
        };
        if range.reverse {
            backlog.reverse();
        }
        let backlog = stream::iter(backlog.into_iter().map(Ok));
        if range.until_now {
            return backlog.boxed();
        }

        let tail = Tail {
            entries: self.entries.clone(),
            len: self.len.subscribe(),
            cursor,
            closed: false,
        };
        backlog.chain(tail.follow()).boxed()
    }
}

/// Live reader of a [`Log`], positioned at `cursor`.
struct Tail<T> {
    entries: Arc<RwLock<Vec<T>>>,
    len: watch::Receiver<usize>,
    cursor: usize,
    closed: bool,
}

impl<T: Clone + Send + Sync + 'static> Tail<T> {
    fn follow(self) -> impl Stream<Item = Result<T, NodeError>> + Send + 'static {
        stream::unfold(self, |mut tail| async move {
            if tail.closed {
                return None;
            }
            loop {
                // Mark the current length as seen before looking, so an
                // append racing with the lookup still wakes `changed`.
                tail.len.borrow_and_update();
                let next = tail
                    .entries
                    .read()
                    .unwrap_or_else(PoisonError::into_inner)
                    .get(tail.cursor)
                    .cloned();
                if let Some(item) = next {
                    tail.cursor += 1;
                    return Some((Ok(item), tail));
                }
                if tail.len.changed().await.is_err() {
                    tail.closed = true;
                    return Some((Err(NodeError::Closed), tail));
                }
            }
        })
    }
}

struct Account {
    public_key: Vec<u8>,
    device_pk: Vec<u8>,
    rendezvous_seed: Vec<u8>,
    display_name: String,
    account_group_pk: Vec<u8>,
    /// contact pk -> 1:1 group pk
    contacts: HashMap<Vec<u8>, Vec<u8>>,
    /// Pending incoming contact requests.
    incoming: HashSet<Vec<u8>>,
    /// Groups activated on this account's device.
    active: HashSet<Vec<u8>>,
}

struct Group {
    group_type: GroupType,
    secret: Vec<u8>,
    members: HashSet<Vec<u8>>,
    metadata: Log<MetadataEvent>,
    messages: Log<AppMessage>,
}

impl Group {
    fn new(group_type: GroupType, members: impl IntoIterator<Item = Vec<u8>>) -> Self {
        Self {
            group_type,
            secret: random_key(),
            members: members.into_iter().collect(),
            metadata: Log::new(),
            messages: Log::new(),
        }
    }

    fn push_event(&mut self, event_type: EventType, body: impl Message) {
        let event = MetadataEvent {
            index: self.metadata.next_index(),
            event_type,
            event: body.encode_to_vec(),
        };
        self.metadata.append(event);
    }
}

#[derive(Default)]
struct NetworkState {
    accounts: HashMap<Vec<u8>, Account>,
    groups: HashMap<Vec<u8>, Group>,
}

impl NetworkState {
    fn account(&self, pk: &[u8]) -> Result<&Account, NodeError> {
        self.accounts
            .get(pk)
            .ok_or_else(|| NodeError::NotFound(format!("account {}", to_hex(pk))))
    }

    fn account_mut(&mut self, pk: &[u8]) -> Result<&mut Account, NodeError> {
        self.accounts
            .get_mut(pk)
            .ok_or_else(|| NodeError::NotFound(format!("account {}", to_hex(pk))))
    }

    /// Group `group_pk` as seen by `member`. Non-members get `NotFound`.
    fn member_group(&self, group_pk: &[u8], member: &[u8]) -> Result<&Group, NodeError> {
        match self.groups.get(group_pk) {
            Some(group) if group.members.contains(member) => Ok(group),
            _ => Err(NodeError::NotFound(format!("group {}", to_hex(group_pk)))),
        }
    }

    fn member_group_mut(
        &mut self,
        group_pk: &[u8],
        member: &[u8],
    ) -> Result<&mut Group, NodeError> {
        match self.groups.get_mut(group_pk) {
            Some(group) if group.members.contains(member) => Ok(group),
            _ => Err(NodeError::NotFound(format!("group {}", to_hex(group_pk)))),
        }
    }
}

/// A shared, in-process replicated log.
#[derive(Clone)]
pub struct MemoryNetwork {
    state: Arc<Mutex<NetworkState>>,
    reachable: Arc<AtomicBool>,
}

impl Default for MemoryNetwork {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(NetworkState::default())),
            reachable: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Create an account with fresh keys and return the node serving it.
    pub async fn register_account(&self, display_name: &str) -> MemoryNode {
        let public_key = random_key();
        let account_group_pk = random_key();

        let mut account_group = Group::new(GroupType::Account, [public_key.clone()]);
        account_group.push_event(
            EventType::AccountGroupJoined,
            MemberJoined {
                member_pk: public_key.clone(),
            },
        );

        let account = Account {
            public_key: public_key.clone(),
            device_pk: random_key(),
            rendezvous_seed: random_key(),
            display_name: display_name.to_string(),
            account_group_pk: account_group_pk.clone(),
            contacts: HashMap::new(),
            incoming: HashSet::new(),
            active: HashSet::from([account_group_pk.clone()]),
        };

        let mut state = self.state.lock().await;
        state.groups.insert(account_group_pk, account_group);
        state.accounts.insert(public_key.clone(), account);
        info!("Registered account {display_name:?} on memory network");

        MemoryNode {
            account_pk: public_key,
            network: self.clone(),
        }
    }

    /// Simulate losing (or regaining) the connection to every node.
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    pub fn is_reachable(&self) -> bool {
        self.reachable.load(Ordering::SeqCst)
    }

    /// Number of messages stored in a group, regardless of membership.
    pub async fn message_count(&self, group_pk: &[u8]) -> usize {
        self.state
            .lock()
            .await
            .groups
            .get(group_pk)
            .map(|g| g.messages.len())
            .unwrap_or(0)
    }
}

/// Client of one account on a [`MemoryNetwork`].
#[derive(Clone)]
pub struct MemoryNode {
    account_pk: Vec<u8>,
    network: MemoryNetwork,
}

impl MemoryNode {
    pub fn account_pk(&self) -> &[u8] {
        &self.account_pk
    }

    fn check_reachable(&self) -> Result<(), NodeError> {
        if self.network.is_reachable() {
            Ok(())
        } else {
            Err(NodeError::Unreachable("memory network is down".to_string()))
        }
    }
}

#[async_trait]
impl ProtocolNode for MemoryNode {
    async fn account_get(&self) -> Result<AccountInfo, NodeError> {
        self.check_reachable()?;
        let state = self.network.state.lock().await;
        let account = state.account(&self.account_pk)?;
        Ok(AccountInfo {
            public_key: account.public_key.clone(),
            display_name: account.display_name.clone(),
        })
    }

    async fn instance_get_configuration(&self) -> Result<InstanceConfig, NodeError> {
        self.check_reachable()?;
        let state = self.network.state.lock().await;
        let account = state.account(&self.account_pk)?;
        Ok(InstanceConfig {
            account_pk: account.public_key.clone(),
            device_pk: account.device_pk.clone(),
            account_group_pk: account.account_group_pk.clone(),
        })
    }

    async fn instance_shareable_link(&self) -> Result<ShareableLink, NodeError> {
        self.check_reachable()?;
        let state = self.network.state.lock().await;
        let account = state.account(&self.account_pk)?;
        Ok(ShareableLink {
            web_url: format!(
                "{LINK_PREFIX}{}?seed={}",
                to_hex(&account.public_key),
                to_hex(&account.rendezvous_seed)
            ),
            contact: ShareableContact {
                public_key: account.public_key.clone(),
                rendezvous_seed: account.rendezvous_seed.clone(),
                metadata: account.display_name.clone().into_bytes(),
            },
        })
    }

    async fn group_metadata_list(
        &self,
        group_pk: &[u8],
        range: ListRange,
    ) -> Result<EventStream, NodeError> {
        self.check_reachable()?;
        let state = self.network.state.lock().await;
        let group = state.member_group(group_pk, &self.account_pk)?;
        Ok(group.metadata.subscribe(range))
    }

    async fn contact_request_send(
        &self,
        contact: ShareableContact,
        own_metadata: Vec<u8>,
    ) -> Result<(), NodeError> {
        self.check_reachable()?;
        if contact.public_key == self.account_pk {
            return Err(NodeError::Rejected(
                "cannot send a contact request to self".to_string(),
            ));
        }

        let mut guard = self.network.state.lock().await;
        let state = &mut *guard;
        let recipient = state.account(&contact.public_key)?;
        if recipient.rendezvous_seed != contact.rendezvous_seed {
            return Err(NodeError::Rejected("rendezvous seed mismatch".to_string()));
        }
        let recipient_group_pk = recipient.account_group_pk.clone();

        let sender = state.account(&self.account_pk)?;
        let sender_group_pk = sender.account_group_pk.clone();
        let received = AccountContactRequestReceived {
            contact_pk: sender.public_key.clone(),
            contact_rendezvous_seed: sender.rendezvous_seed.clone(),
            contact_metadata: own_metadata,
        };

        state
            .member_group_mut(&sender_group_pk, &self.account_pk)?
            .push_event(
                EventType::AccountContactRequestOutgoingEnqueued,
                AccountContactRequestEnqueued {
                    contact_pk: contact.public_key.clone(),
                    contact_metadata: contact.metadata,
                },
            );
        state
            .member_group_mut(&recipient_group_pk, &contact.public_key)?
            .push_event(EventType::AccountContactRequestIncomingReceived, received);
        state
            .account_mut(&contact.public_key)?
            .incoming
            .insert(self.account_pk.clone());

        debug!("Contact request sent to {}", to_hex(&contact.public_key));
        Ok(())
    }

    async fn contact_request_accept(&self, contact_pk: &[u8]) -> Result<(), NodeError> {
        self.check_reachable()?;
        let mut guard = self.network.state.lock().await;
        let state = &mut *guard;

        let me = state.account_mut(&self.account_pk)?;
        if !me.incoming.remove(contact_pk) {
            return Err(NodeError::NotFound(format!(
                "contact request from {}",
                to_hex(contact_pk)
            )));
        }
        let account_group_pk = me.account_group_pk.clone();

        let contact_group_pk = random_key();
        me.contacts
            .insert(contact_pk.to_vec(), contact_group_pk.clone());
        if let Some(peer) = state.accounts.get_mut(contact_pk) {
            peer.contacts
                .insert(self.account_pk.clone(), contact_group_pk.clone());
        }
        state.groups.insert(
            contact_group_pk,
            Group::new(
                GroupType::Contact,
                [self.account_pk.clone(), contact_pk.to_vec()],
            ),
        );

        state
            .member_group_mut(&account_group_pk, &self.account_pk)?
            .push_event(
                EventType::AccountContactRequestIncomingAccepted,
                AccountContactRequestAccepted {
                    contact_pk: contact_pk.to_vec(),
                },
            );
        debug!("Contact request from {} accepted", to_hex(contact_pk));
        Ok(())
    }

    async fn contact_request_discard(&self, contact_pk: &[u8]) -> Result<(), NodeError> {
        self.check_reachable()?;
        let mut guard = self.network.state.lock().await;
        let state = &mut *guard;

        let me = state.account_mut(&self.account_pk)?;
        if !me.incoming.remove(contact_pk) {
            return Err(NodeError::NotFound(format!(
                "contact request from {}",
                to_hex(contact_pk)
            )));
        }
        let account_group_pk = me.account_group_pk.clone();

        state
            .member_group_mut(&account_group_pk, &self.account_pk)?
            .push_event(
                EventType::AccountContactRequestIncomingDiscarded,
                AccountContactRequestDiscarded {
                    contact_pk: contact_pk.to_vec(),
                },
            );
        Ok(())
    }

    async fn group_info_by_contact(&self, contact_pk: &[u8]) -> Result<GroupInfo, NodeError> {
        self.check_reachable()?;
        let state = self.network.state.lock().await;
        let group_pk = state
            .account(&self.account_pk)?
            .contacts
            .get(contact_pk)
            .ok_or_else(|| NodeError::NotFound(format!("contact {}", to_hex(contact_pk))))?;
        Ok(GroupInfo {
            public_key: group_pk.clone(),
            group_type: GroupType::Contact,
        })
    }

    async fn group_info_by_key(&self, group_pk: &[u8]) -> Result<GroupInfo, NodeError> {
        self.check_reachable()?;
        let state = self.network.state.lock().await;
        let group = state.member_group(group_pk, &self.account_pk)?;
        Ok(GroupInfo {
            public_key: group_pk.to_vec(),
            group_type: group.group_type,
        })
    }

    async fn activate_group(&self, group_pk: &[u8]) -> Result<(), NodeError> {
        self.check_reachable()?;
        let mut state = self.network.state.lock().await;
        state.member_group(group_pk, &self.account_pk)?;
        state
            .account_mut(&self.account_pk)?
            .active
            .insert(group_pk.to_vec());
        Ok(())
    }

    async fn app_message_send(
        &self,
        group_pk: &[u8],
        payload: Vec<u8>,
    ) -> Result<Vec<u8>, NodeError> {
        self.check_reachable()?;
        let mut guard = self.network.state.lock().await;
        let state = &mut *guard;

        let me = state.account(&self.account_pk)?;
        let device_pk = me.device_pk.clone();
        let is_active = me.active.contains(group_pk);

        let group = state.member_group_mut(group_pk, &self.account_pk)?;
        if !is_active {
            return Err(NodeError::GroupNotActive(to_hex(group_pk)));
        }
        let index = group.messages.next_index();
        group.messages.append(AppMessage {
            index,
            group_pk: group_pk.to_vec(),
            device_pk,
            payload,
        });
        Ok(index.to_be_bytes().to_vec())
    }

    async fn group_message_list(
        &self,
        group_pk: &[u8],
        range: ListRange,
    ) -> Result<MessageStream, NodeError> {
        self.check_reachable()?;
        let state = self.network.state.lock().await;
        let group = state.member_group(group_pk, &self.account_pk)?;
        Ok(group.messages.subscribe(range))
    }

    async fn multi_member_group_create(&self) -> Result<Vec<u8>, NodeError> {
        self.check_reachable()?;
        let mut state = self.network.state.lock().await;
        state.account(&self.account_pk)?;

        let group_pk = random_key();
        let mut group = Group::new(GroupType::MultiMember, [self.account_pk.clone()]);
        group.push_event(
            EventType::MultiMemberGroupMemberJoined,
            MemberJoined {
                member_pk: self.account_pk.clone(),
            },
        );
        state.groups.insert(group_pk.clone(), group);
        info!("Created multi-member group {}", to_hex(&group_pk));
        Ok(group_pk)
    }

    async fn multi_member_group_invitation_create(
        &self,
        group_pk: &[u8],
    ) -> Result<GroupInvitation, NodeError> {
        self.check_reachable()?;
        let state = self.network.state.lock().await;
        let group = state.member_group(group_pk, &self.account_pk)?;
        if group.group_type != GroupType::MultiMember {
            return Err(NodeError::Rejected(
                "only multi-member groups can be shared".to_string(),
            ));
        }
        Ok(GroupInvitation {
            public_key: group_pk.to_vec(),
            secret: group.secret.clone(),
            inviter_pk: self.account_pk.clone(),
        })
    }

    async fn multi_member_group_join(
        &self,
        invitation: GroupInvitation,
    ) -> Result<Vec<u8>, NodeError> {
        self.check_reachable()?;
        let mut guard = self.network.state.lock().await;
        let state = &mut *guard;
        state.account(&self.account_pk)?;

        let group = state
            .groups
            .get_mut(&invitation.public_key)
            .ok_or_else(|| {
                NodeError::NotFound(format!("group {}", to_hex(&invitation.public_key)))
            })?;
        if group.group_type != GroupType::MultiMember || group.secret != invitation.secret {
            return Err(NodeError::Rejected("invalid group invitation".to_string()));
        }
        if group.members.insert(self.account_pk.clone()) {
            group.push_event(
                EventType::MultiMemberGroupMemberJoined,
                MemberJoined {
                    member_pk: self.account_pk.clone(),
                },
            );
        }
        Ok(invitation.public_key)
    }
}

#[async_trait]
impl NodeConnector for MemoryNode {
    type Node = MemoryNode;

    async fn connect(&self) -> Result<Arc<MemoryNode>, NodeError> {
        self.check_reachable()?;
        Ok(Arc::new(self.clone()))
    }
}
