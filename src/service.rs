//! Messenger façade over the protocol node.
//!
//! Every operation decodes its text arguments first, then borrows the node
//! client from the [`NodeHandle`] for the node calls it needs. A call that
//! finds the node unreachable returns `Connection` and drops the client so
//! the next call dials a fresh one.
use std::{future::Future, sync::Arc};

use log::{debug, info, warn};
use protocol_node::{ListRange, NodeConnector, ProtocolNode, ShareableContact};
use tokio_util::sync::CancellationToken;

use crate::{
    api::{
        ContactIdentity, ContactPubkeyResponse, ContactRequestsQuery, CreateGroupResponse,
        InvitationLinkResponse, JoinGroupRequest, JoinGroupResponse, ListMessagesRequest,
        SendContactRequest, SendMessageRequest, SuccessResponse,
    },
    codec,
    contact::{self, ContactRequest},
    error::MessengerError,
    group::{self, lifecycle, relay, resolver, ListOptions, Message, Target},
    node_handle::NodeHandle,
    stream::{pump, StreamEnd, Subscription},
};

pub const DEFAULT_STREAM_BUFFER: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceOptions {
    /// Capacity of the channel between a stream producer and its subscriber.
    pub stream_buffer: usize,
}

impl Default for ServiceOptions {
    fn default() -> Self {
        Self {
            stream_buffer: DEFAULT_STREAM_BUFFER,
        }
    }
}

pub struct MessengerService<C: NodeConnector> {
    node: Arc<NodeHandle<C>>,
    account_pk: Vec<u8>,
    display_name: String,
    options: ServiceOptions,
}

impl<C: NodeConnector> MessengerService<C> {
    /// Dial the node and read the account identity once.
    pub async fn connect(connector: C, options: ServiceOptions) -> Result<Self, MessengerError> {
        const OP: &str = "connect";
        let node = Arc::new(NodeHandle::new(connector));
        let client = acquire(&node, OP).await?;
        let account = settle(
            &node,
            &client,
            client
                .account_get()
                .await
                .map_err(|e| MessengerError::node(OP, e)),
        )
        .await?;
        info!(
            "Messenger ready for account {:?} ({})",
            account.display_name,
            codec::encode(&account.public_key)
        );
        Ok(Self {
            node,
            account_pk: account.public_key,
            display_name: account.display_name,
            options,
        })
    }

    pub fn account_pk(&self) -> &[u8] {
        &self.account_pk
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub async fn is_connected(&self) -> bool {
        self.node.is_connected().await
    }

    /// Run `call` with a borrowed client, dropping the client on `Connection`.
    async fn with_client<T, F, Fut>(&self, op: &'static str, call: F) -> Result<T, MessengerError>
    where
        F: FnOnce(Arc<C::Node>) -> Fut,
        Fut: Future<Output = Result<T, MessengerError>>,
    {
        let client = acquire(&self.node, op).await?;
        let result = call(client.clone()).await;
        settle(&self.node, &client, result).await
    }

    pub async fn get_invitation_link(&self) -> Result<InvitationLinkResponse, MessengerError> {
        const OP: &str = "get_invitation_link";
        self.with_client(OP, |client| async move {
            let link = client
                .instance_shareable_link()
                .await
                .map_err(|e| MessengerError::node(OP, e))?;
            Ok(InvitationLinkResponse { link: link.web_url })
        })
        .await
    }

    pub async fn get_contact_pubkey(&self) -> Result<ContactPubkeyResponse, MessengerError> {
        const OP: &str = "get_contact_pubkey";
        self.with_client(OP, |client| async move {
            let link = client
                .instance_shareable_link()
                .await
                .map_err(|e| MessengerError::node(OP, e))?;
            Ok(ContactPubkeyResponse {
                identity_b64: codec::encode(&link.contact.public_key),
                rendezvous_seed_b64: codec::encode(&link.contact.rendezvous_seed),
            })
        })
        .await
    }

    /// Pending contact requests after replaying the whole account log.
    pub async fn contact_requests_snapshot(&self) -> Result<Vec<ContactRequest>, MessengerError> {
        const OP: &str = "get_contact_requests";
        self.with_client(OP, |client| async move {
            let events = open_account_log(client.as_ref(), OP, ListRange::until_now()).await?;
            let set = contact::snapshot(events)
                .await
                .map_err(|e| MessengerError::projection(OP, e))?;
            debug!("{OP}: {} pending requests", set.len());
            Ok(set.snapshot())
        })
        .await
    }

    /// Stream the pending contact requests.
    ///
    /// Without `live_stream` the subscription yields the final set once and
    /// ends. With it, the whole set is published after every change until
    /// the subscription is cancelled or dropped.
    pub async fn get_contact_requests(
        &self,
        query: ContactRequestsQuery,
        cancel: CancellationToken,
    ) -> Result<Subscription<Vec<ContactRequest>>, MessengerError> {
        const OP: &str = "get_contact_requests";
        if !query.live_stream {
            let requests = self.contact_requests_snapshot().await?;
            return Ok(Subscription::spawn(
                OP,
                self.options.stream_buffer,
                cancel,
                |tx, cancel| async move {
                    tokio::select! {
                        _ = cancel.cancelled() => Ok(StreamEnd::Cancelled),
                        sent = tx.send(requests) => Ok(match sent {
                            Ok(()) => StreamEnd::SourceEnded,
                            Err(_) => StreamEnd::SubscriberGone,
                        }),
                    }
                },
            ));
        }

        let client = acquire(&self.node, OP).await?;
        let events = settle(
            &self.node,
            &client,
            open_account_log(client.as_ref(), OP, ListRange::live()).await,
        )
        .await?;
        info!("{OP}: live contact request stream opened");

        let node = self.node.clone();
        Ok(Subscription::spawn(
            OP,
            self.options.stream_buffer,
            cancel,
            move |tx, cancel| async move {
                let result = contact::publish(events, &tx, &cancel)
                    .await
                    .map_err(|e| MessengerError::projection(OP, e));
                log_stream_end(OP, &result);
                settle(&node, &client, result).await
            },
        ))
    }

    pub async fn send_contact_request(
        &self,
        request: SendContactRequest,
    ) -> Result<SuccessResponse, MessengerError> {
        const OP: &str = "send_contact_request";
        let public_key = codec::decode_key("identity_b64", &request.identity_b64)
            .map_err(|e| MessengerError::decode(OP, e))?;
        let rendezvous_seed = codec::decode_key("rendezvous_seed_b64", &request.rendezvous_seed_b64)
            .map_err(|e| MessengerError::decode(OP, e))?;
        let own_name = request
            .display_name
            .unwrap_or_else(|| self.display_name.clone());

        self.with_client(OP, |client| async move {
            let contact = ShareableContact {
                public_key,
                rendezvous_seed,
                metadata: Vec::new(),
            };
            client
                .contact_request_send(contact, own_name.into_bytes())
                .await
                .map_err(|e| MessengerError::node(OP, e))
        })
        .await?;
        info!("{OP}: contact request sent to {}", request.identity_b64);
        Ok(SuccessResponse::ok())
    }

    pub async fn accept_contact_request(
        &self,
        request: ContactIdentity,
    ) -> Result<SuccessResponse, MessengerError> {
        const OP: &str = "accept_contact_request";
        let identity = codec::decode_key("identity_b64", &request.identity_b64)
            .map_err(|e| MessengerError::decode(OP, e))?;
        self.with_client(OP, |client| async move {
            client
                .contact_request_accept(&identity)
                .await
                .map_err(|e| MessengerError::node(OP, e))
        })
        .await?;
        info!("{OP}: accepted {}", request.identity_b64);
        Ok(SuccessResponse::ok())
    }

    pub async fn discard_contact_request(
        &self,
        request: ContactIdentity,
    ) -> Result<SuccessResponse, MessengerError> {
        const OP: &str = "discard_contact_request";
        let identity = codec::decode_key("identity_b64", &request.identity_b64)
            .map_err(|e| MessengerError::decode(OP, e))?;
        self.with_client(OP, |client| async move {
            client
                .contact_request_discard(&identity)
                .await
                .map_err(|e| MessengerError::node(OP, e))
        })
        .await?;
        info!("{OP}: discarded {}", request.identity_b64);
        Ok(SuccessResponse::ok())
    }

    /// Resolve the target, activate its channel and push the payload.
    pub async fn send_message(
        &self,
        request: SendMessageRequest,
    ) -> Result<SuccessResponse, MessengerError> {
        const OP: &str = "send_message";
        let target = Target::decode(&request.target, request.target_is_peer_identity)
            .map_err(|e| MessengerError::decode(OP, e))?;
        let payload = request.payload.into_bytes();

        self.with_client(OP, |client| async move {
            let session = resolver::resolve(client.as_ref(), &target)
                .await
                .map_err(|e| MessengerError::resolution(OP, e))?;
            let session = resolver::activate(client.as_ref(), session)
                .await
                .map_err(|e| MessengerError::resolution(OP, e))?;
            relay::send(client.as_ref(), &session, payload)
                .await
                .map_err(|e| MessengerError::relay(OP, e))
        })
        .await?;
        debug!("{OP}: message pushed");
        Ok(SuccessResponse::ok())
    }

    /// Stream the message history of the target's channel.
    pub async fn list_messages(
        &self,
        request: ListMessagesRequest,
        cancel: CancellationToken,
    ) -> Result<Subscription<Message>, MessengerError> {
        const OP: &str = "list_messages";
        let target = Target::decode(&request.target, request.target_is_peer_identity)
            .map_err(|e| MessengerError::decode(OP, e))?;
        let options = ListOptions {
            until_now: request.until_now,
            reverse: request.reverse,
        };

        let client = acquire(&self.node, OP).await?;
        let opened = async {
            let session = resolver::resolve(client.as_ref(), &target)
                .await
                .map_err(|e| MessengerError::resolution(OP, e))?;
            relay::list(client.as_ref(), &session, options)
                .await
                .map_err(|e| MessengerError::relay(OP, e))
        }
        .await;
        let messages = settle(&self.node, &client, opened).await?;

        let node = self.node.clone();
        Ok(Subscription::spawn(
            OP,
            self.options.stream_buffer,
            cancel,
            move |tx, cancel| async move {
                let result = pump(messages, &tx, &cancel, |message| Ok(Some(message)))
                    .await
                    .map_err(|e| MessengerError::relay(OP, e));
                log_stream_end(OP, &result);
                settle(&node, &client, result).await
            },
        ))
    }

    /// Create a multi-member group and an invitation other accounts can join with.
    pub async fn create_group(&self) -> Result<CreateGroupResponse, MessengerError> {
        const OP: &str = "create_group";
        let created = self
            .with_client(OP, |client| async move {
                group::create_group(client.as_ref())
                    .await
                    .map_err(|e| MessengerError::lifecycle(OP, e))
            })
            .await?;
        Ok(CreateGroupResponse {
            group_key_b64: created.group_key_b64(),
            invitation_b64: created.invitation_b64(),
        })
    }

    pub async fn join_group(
        &self,
        request: JoinGroupRequest,
    ) -> Result<JoinGroupResponse, MessengerError> {
        const OP: &str = "join_group";
        let invitation = codec::decode_invitation(&request.invitation_b64)
            .map_err(|e| MessengerError::decode(OP, e))?;
        let group_key = self
            .with_client(OP, |client| async move {
                lifecycle::join_group(client.as_ref(), invitation)
                    .await
                    .map_err(|e| MessengerError::lifecycle(OP, e))
            })
            .await?;
        Ok(JoinGroupResponse {
            success: true,
            group_key_b64: codec::encode(&group_key),
        })
    }
}

async fn acquire<C: NodeConnector>(
    node: &NodeHandle<C>,
    op: &'static str,
) -> Result<Arc<C::Node>, MessengerError> {
    node.acquire().await.map_err(|e| MessengerError::Connection {
        op,
        source: Box::new(e),
    })
}

/// Pass `result` through, dropping `client` from the handle on `Connection`.
async fn settle<C: NodeConnector, T>(
    node: &NodeHandle<C>,
    client: &Arc<C::Node>,
    result: Result<T, MessengerError>,
) -> Result<T, MessengerError> {
    if let Err(e) = &result {
        if e.is_connection() {
            node.invalidate(client).await;
        }
    }
    result
}

async fn open_account_log<N: ProtocolNode + ?Sized>(
    client: &N,
    op: &'static str,
    range: ListRange,
) -> Result<protocol_node::EventStream, MessengerError> {
    let config = client
        .instance_get_configuration()
        .await
        .map_err(|e| MessengerError::node(op, e))?;
    client
        .group_metadata_list(&config.account_group_pk, range)
        .await
        .map_err(|e| MessengerError::node(op, e))
}

fn log_stream_end(op: &str, result: &Result<StreamEnd, MessengerError>) {
    match result {
        Ok(StreamEnd::SubscriberGone) => warn!("{op}: subscriber went away"),
        Ok(end) => debug!("{op}: stream finished ({end:?})"),
        Err(e) => debug!("{op}: stream failed: {e}"),
    }
}
