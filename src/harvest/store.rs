//! Accumulated contacts for the current session.

use parking_lot::RwLock;
use std::collections::{BTreeMap, HashSet, VecDeque};

use crate::model::Contact;

/// Order-preserving contact collection.
///
/// Batches append at the tail in arrival order; monitoring inserts newly
/// discovered members at the head. Stored contacts are never edited in place.
#[derive(Debug, Default)]
pub struct ContactStore {
    contacts: RwLock<VecDeque<Contact>>,
}

/// Totals for display.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreSummary {
    pub total_contacts: usize,
    pub contacts_per_group: BTreeMap<String, usize>,
}

impl ContactStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&self, batch: impl IntoIterator<Item = Contact>) -> usize {
        let mut contacts = self.contacts.write();
        let before = contacts.len();
        contacts.extend(batch);
        contacts.len() - before
    }

    /// Most-recent-first insertion used for monitored discoveries.
    pub fn append_front(&self, contact: Contact) {
        self.contacts.write().push_front(contact);
    }

    /// Drops later contacts that share a `(phone, group)` identity with an
    /// earlier one. Contacts without a collected phone are always kept.
    /// Returns the number removed.
    pub fn dedupe(&self) -> usize {
        let mut contacts = self.contacts.write();
        let before = contacts.len();
        let mut seen: HashSet<(String, String)> = HashSet::new();
        contacts.retain(|c| match c.identity() {
            Some((phone, group)) => seen.insert((phone.to_string(), group.to_string())),
            None => true,
        });
        before - contacts.len()
    }

    /// Read-only snapshot in store order.
    pub fn all(&self) -> Vec<Contact> {
        self.contacts.read().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.contacts.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.contacts.read().is_empty()
    }

    pub fn summary(&self) -> StoreSummary {
        let contacts = self.contacts.read();
        let mut contacts_per_group = BTreeMap::new();
        for c in contacts.iter() {
            *contacts_per_group.entry(c.group.clone()).or_insert(0) += 1;
        }
        StoreSummary {
            total_contacts: contacts.len(),
            contacts_per_group,
        }
    }

    /// Empties the store; only a session reset does this.
    pub(crate) fn clear(&self) {
        self.contacts.write().clear();
    }
}
