//! Closure queue.
//!
//! Activations are appended in the order they happen and may only leave from
//! the head. The queue is a doubly-linked list in persistent storage keyed by
//! recipient, which keeps every operation O(1) and lets an emergency close
//! unlink one entry without disturbing the order of the others.

use soroban_sdk::{contracttype, Address, Env};

use crate::{DataKey, TTL_EXTEND_TO, TTL_THRESHOLD};

/// A recipient whose flow is due to close at `close_at`.
#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ClosureEntry {
    pub recipient: Address,
    pub close_at: u64,
}

#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct QueueMeta {
    pub head: Option<Address>,
    pub tail: Option<Address>,
    pub len: u32,
}

#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct QueueNode {
    pub close_at: u64,
    pub prev: Option<Address>,
    pub next: Option<Address>,
}

pub(crate) struct ClosureQueue<'a> {
    env: &'a Env,
    meta: QueueMeta,
}

impl<'a> ClosureQueue<'a> {
    pub(crate) fn load(env: &'a Env) -> Self {
        let meta = env
            .storage()
            .instance()
            .get(&DataKey::QueueMeta)
            .unwrap_or(QueueMeta {
                head: None,
                tail: None,
                len: 0,
            });
        ClosureQueue { env, meta }
    }

    pub(crate) fn len(&self) -> u32 {
        self.meta.len
    }

    pub(crate) fn contains(&self, who: &Address) -> bool {
        self.env
            .storage()
            .persistent()
            .has(&DataKey::QueueNode(who.clone()))
    }

    pub(crate) fn peek_head(&self) -> Option<ClosureEntry> {
        let head = self.meta.head.clone()?;
        let node = self.node(&head);
        Some(ClosureEntry {
            recipient: head,
            close_at: node.close_at,
        })
    }

    /// Append at the tail. Each recipient may be queued at most once.
    pub(crate) fn enqueue(&mut self, recipient: Address, close_at: u64) {
        assert!(!self.contains(&recipient), "recipient is already queued");

        let node = QueueNode {
            close_at,
            prev: self.meta.tail.clone(),
            next: None,
        };

        match self.meta.tail.clone() {
            Some(tail) => {
                let mut tail_node = self.node(&tail);
                tail_node.next = Some(recipient.clone());
                self.save_node(&tail, &tail_node);
            }
            None => self.meta.head = Some(recipient.clone()),
        }

        self.save_node(&recipient, &node);
        self.meta.tail = Some(recipient);
        self.meta.len += 1;
        self.save_meta();
    }

    /// Remove and return the head.
    ///
    /// # Panics
    /// - If the queue is empty.
    pub(crate) fn pop_head(&mut self) -> ClosureEntry {
        let head = self.peek_head().expect("closure queue is empty");
        self.remove(&head.recipient);
        head
    }

    /// Unlink exactly `who`'s entry. Returns `false` if it was not queued.
    pub(crate) fn remove(&mut self, who: &Address) -> bool {
        let key = DataKey::QueueNode(who.clone());
        let Some(node) = self.env.storage().persistent().get::<_, QueueNode>(&key) else {
            return false;
        };

        match node.prev.clone() {
            Some(prev) => {
                let mut prev_node = self.node(&prev);
                prev_node.next = node.next.clone();
                self.save_node(&prev, &prev_node);
            }
            None => self.meta.head = node.next.clone(),
        }

        match node.next.clone() {
            Some(next) => {
                let mut next_node = self.node(&next);
                next_node.prev = node.prev.clone();
                self.save_node(&next, &next_node);
            }
            None => self.meta.tail = node.prev.clone(),
        }

        self.env.storage().persistent().remove(&key);
        self.meta.len -= 1;
        self.save_meta();
        true
    }

    fn node(&self, who: &Address) -> QueueNode {
        self.env
            .storage()
            .persistent()
            .get(&DataKey::QueueNode(who.clone()))
            .expect("closure queue is corrupt: missing node")
    }

    fn save_node(&self, who: &Address, node: &QueueNode) {
        let key = DataKey::QueueNode(who.clone());
        self.env.storage().persistent().set(&key, node);
        self.env
            .storage()
            .persistent()
            .extend_ttl(&key, TTL_THRESHOLD, TTL_EXTEND_TO);
    }

    fn save_meta(&self) {
        self.env
            .storage()
            .instance()
            .set(&DataKey::QueueMeta, &self.meta);
    }
}
