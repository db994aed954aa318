//! Pick requests and the pending request queue

use crate::foundation::math::{Frame, Vec3};
use crate::model::{EntityId, SubpartId};
use crate::settings::OverflowPolicy;
use std::collections::VecDeque;
use std::fmt;
use std::time::Instant;

/// Coalescing key of a pick request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PickKey {
    /// Entity to place
    pub entity: EntityId,
    /// Vertex of a segmented entity, `None` for the whole entity
    pub subpart: Option<SubpartId>,
}

impl PickKey {
    /// Key for a whole entity
    pub fn entity(entity: EntityId) -> Self {
        Self { entity, subpart: None }
    }

    /// Key for one vertex of a segmented entity
    pub fn subpart(entity: EntityId, subpart: SubpartId) -> Self {
        Self { entity, subpart: Some(subpart) }
    }
}

impl fmt::Display for PickKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.subpart {
            Some(subpart) => write!(f, "{}/{}", self.entity, subpart.0),
            None => write!(f, "{}", self.entity),
        }
    }
}

/// Request to resolve the elevation under a target position
#[derive(Debug, Clone, PartialEq)]
pub struct PickRequest {
    /// What is being placed
    pub key: PickKey,
    /// Position before resolution; a resolved position equal to it issues
    /// no command
    pub origin: Vec3,
    /// Horizontal position to resolve
    pub target: Vec3,
    /// Space `origin` and `target` are expressed in; the ray is cast in
    /// world space and the result mapped back
    pub frame: Frame,
    /// When the request was queued
    pub enqueued_at: Instant,
}

impl PickRequest {
    /// Request whose origin is its own target (the usual case after a move)
    pub fn new(key: PickKey, target: Vec3) -> Self {
        Self {
            key,
            origin: target,
            target,
            frame: Frame::identity(),
            enqueued_at: Instant::now(),
        }
    }

    /// Set the origin position
    pub fn with_origin(mut self, origin: Vec3) -> Self {
        self.origin = origin;
        self
    }

    /// Set the parent space the positions are relative to
    pub fn with_frame(mut self, frame: Frame) -> Self {
        self.frame = frame;
        self
    }

    /// Target position in world space
    pub fn world_target(&self) -> Vec3 {
        self.frame.to_world(self.target)
    }
}

/// Outcome of queueing a request
#[derive(Debug, Clone, PartialEq)]
pub enum Enqueued {
    /// Appended to the back
    Appended,
    /// Superseded a queued request with the same key
    Replaced,
    /// Appended after evicting the oldest queued request
    DroppedOldest(PickRequest),
    /// Refused because the queue is full
    Rejected,
}

/// FIFO of waiting pick requests, at most one per key
#[derive(Debug)]
pub struct PendingPickQueue {
    items: VecDeque<PickRequest>,
    capacity: usize,
    policy: OverflowPolicy,
}

impl PendingPickQueue {
    /// Create an empty queue
    pub fn new(capacity: usize, policy: OverflowPolicy) -> Self {
        Self {
            items: VecDeque::new(),
            capacity: capacity.max(1),
            policy,
        }
    }

    /// Queue a request
    ///
    /// An older request with the same key is removed and the new one goes to
    /// the back.
    pub fn push(&mut self, request: PickRequest) -> Enqueued {
        let before = self.items.len();
        self.items.retain(|queued| queued.key != request.key);
        if self.items.len() < before {
            self.items.push_back(request);
            return Enqueued::Replaced;
        }

        if self.items.len() < self.capacity {
            self.items.push_back(request);
            return Enqueued::Appended;
        }

        match self.policy {
            OverflowPolicy::RejectNewest => Enqueued::Rejected,
            OverflowPolicy::DropOldest => match self.items.pop_front() {
                Some(dropped) => {
                    self.items.push_back(request);
                    Enqueued::DroppedOldest(dropped)
                }
                None => Enqueued::Rejected,
            },
        }
    }

    /// Take the oldest request
    pub fn pop(&mut self) -> Option<PickRequest> {
        self.items.pop_front()
    }

    /// Drop every request for an entity, returning how many were dropped
    pub fn remove_entity(&mut self, entity: EntityId) -> usize {
        let before = self.items.len();
        self.items.retain(|queued| queued.key.entity != entity);
        before - self.items.len()
    }

    /// Drop everything
    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Number of waiting requests
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether nothing is waiting
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Waiting requests, oldest first
    pub fn iter(&self) -> impl Iterator<Item = &PickRequest> {
        self.items.iter()
    }
}
