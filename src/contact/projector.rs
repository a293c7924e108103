//! Reduction of contact-request events into the set of pending requests.
use std::collections::{BTreeMap, HashMap};

use crate::contact::event::ContactEvent;

/// A peer waiting for us to accept or discard its contact request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContactRequest {
    pub identity: Vec<u8>,
    pub display_name: String,
}

/// Pending contact requests in arrival order.
///
/// Entries live under an arrival sequence number; `by_identity` points from
/// an identity to every sequence number holding it, so resolving an identity
/// never scans the whole set.
#[derive(Debug, Clone, Default)]
pub struct ContactRequestSet {
    next_seq: u64,
    entries: BTreeMap<u64, ContactRequest>,
    by_identity: HashMap<Vec<u8>, Vec<u64>>,
}

impl ContactRequestSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one event in place. Returns whether the set changed.
    ///
    /// A repeated `Received` for an identity already present adds a second
    /// entry. `Accepted` and `Discarded` drop every entry of the identity and
    /// do nothing when it is absent.
    pub fn apply(&mut self, event: &ContactEvent) -> bool {
        match event {
            ContactEvent::Received {
                identity,
                display_name,
            } => {
                let seq = self.next_seq;
                self.next_seq += 1;
                self.entries.insert(
                    seq,
                    ContactRequest {
                        identity: identity.clone(),
                        display_name: display_name.clone(),
                    },
                );
                self.by_identity
                    .entry(identity.clone())
                    .or_default()
                    .push(seq);
                true
            }
            ContactEvent::Accepted { identity } | ContactEvent::Discarded { identity } => {
                match self.by_identity.remove(identity) {
                    Some(seqs) => {
                        for seq in seqs {
                            self.entries.remove(&seq);
                        }
                        true
                    }
                    None => false,
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, identity: &[u8]) -> bool {
        self.by_identity.contains_key(identity)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ContactRequest> {
        self.entries.values()
    }

    /// Owned copy of the current requests, in arrival order.
    pub fn snapshot(&self) -> Vec<ContactRequest> {
        self.iter().cloned().collect()
    }
}

/// Two sets are equal when they list the same requests in the same order.
impl PartialEq for ContactRequestSet {
    fn eq(&self, other: &Self) -> bool {
        self.iter().eq(other.iter())
    }
}

impl Eq for ContactRequestSet {}

impl FromIterator<ContactEvent> for ContactRequestSet {
    fn from_iter<I: IntoIterator<Item = ContactEvent>>(iter: I) -> Self {
        iter.into_iter().fold(ContactRequestSet::new(), |set, event| {
            reduce(set, &event)
        })
    }
}

/// Pure reducer step: `reduce(set, event)` is the set after `event`.
pub fn reduce(mut set: ContactRequestSet, event: &ContactEvent) -> ContactRequestSet {
    set.apply(event);
    set
}

#[cfg(test)]
mod tests {
    use super::*;

    fn received(id: &[u8], name: &str) -> ContactEvent {
        ContactEvent::Received {
            identity: id.to_vec(),
            display_name: name.to_string(),
        }
    }

    fn accepted(id: &[u8]) -> ContactEvent {
        ContactEvent::Accepted {
            identity: id.to_vec(),
        }
    }

    fn discarded(id: &[u8]) -> ContactEvent {
        ContactEvent::Discarded {
            identity: id.to_vec(),
        }
    }

    fn request(id: &[u8], name: &str) -> ContactRequest {
        ContactRequest {
            identity: id.to_vec(),
            display_name: name.to_string(),
        }
    }

    #[test]
    fn accept_after_receive_leaves_nothing_behind() {
        let set: ContactRequestSet = vec![
            received(b"x", "Xavier"),
            received(b"k", "Kim"),
            discarded(b"x"),
            received(b"y", "Yara"),
            accepted(b"k"),
            accepted(b"y"),
        ]
        .into_iter()
        .collect();
        assert!(set.is_empty());
        assert!(!set.contains(b"k"));
    }

    #[test]
    fn resolving_unknown_identity_is_a_no_op() {
        let mut set = ContactRequestSet::new();
        assert!(!set.apply(&accepted(b"k")));
        assert!(!set.apply(&discarded(b"k")));
        assert!(set.is_empty());
    }

    #[test]
    fn accepting_alice_keeps_bob() {
        let set: ContactRequestSet = vec![
            received(b"A", "Alice"),
            received(b"B", "Bob"),
            accepted(b"A"),
        ]
        .into_iter()
        .collect();
        assert_eq!(set.snapshot(), vec![request(b"B", "Bob")]);
    }

    #[test]
    fn repeated_receive_accumulates_and_accept_clears_all() {
        let mut set = ContactRequestSet::new();
        assert!(set.apply(&received(b"A", "Alice")));
        assert!(set.apply(&received(b"B", "Bob")));
        assert!(set.apply(&received(b"A", "Alice again")));
        assert_eq!(
            set.snapshot(),
            vec![
                request(b"A", "Alice"),
                request(b"B", "Bob"),
                request(b"A", "Alice again"),
            ]
        );

        assert!(set.apply(&discarded(b"A")));
        assert_eq!(set.snapshot(), vec![request(b"B", "Bob")]);
    }

    #[test]
    fn chunked_reduction_matches_single_pass() {
        let events = vec![
            received(b"A", "Alice"),
            received(b"B", "Bob"),
            accepted(b"C"),
            received(b"C", "Carol"),
            discarded(b"B"),
            received(b"D", "Dan"),
            accepted(b"A"),
        ];
        let whole: ContactRequestSet = events.iter().cloned().collect();

        for split in 0..=events.len() {
            let (head, tail) = events.split_at(split);
            let partial = head.iter().fold(ContactRequestSet::new(), reduce);
            let resumed = tail.iter().fold(partial, reduce);
            assert_eq!(resumed, whole, "split at {split}");
        }
        assert_eq!(
            whole.snapshot(),
            vec![request(b"C", "Carol"), request(b"D", "Dan")]
        );
    }

    #[test]
    fn re_received_after_accept_is_pending_again() {
        let set: ContactRequestSet = vec![
            received(b"A", "Alice"),
            accepted(b"A"),
            received(b"A", "Alice"),
        ]
        .into_iter()
        .collect();
        assert_eq!(set.len(), 1);
        assert!(set.contains(b"A"));
    }
}
