//! Echo suppression for self-generated moves
//!
//! Every move the coordinator issues is remembered until the model reports
//! it back. Echoes carrying the command's transaction id are matched on the
//! id alone; echoes without one fall back to key + position equality.
//! Records that never see their echo expire after a fixed number of frames.

use super::request::PickKey;
use crate::foundation::math::{positions_match, Vec3};
use crate::foundation::time::FrameCount;
use crate::model::{EntityId, TransactionId};

/// A resolved pick awaiting its echo
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompletedPickRecord {
    /// What was moved
    pub key: PickKey,
    /// Where it was moved to
    pub position: Vec3,
    /// Transaction of the issued command
    pub transaction: TransactionId,
    /// Frame the command was issued in
    pub recorded: FrameCount,
}

/// Set of outstanding completed picks
#[derive(Debug)]
pub struct EchoFilter {
    records: Vec<CompletedPickRecord>,
    ttl_frames: u64,
    epsilon: f32,
}

impl EchoFilter {
    /// Create an empty filter
    pub fn new(ttl_frames: u64, epsilon: f32) -> Self {
        Self {
            records: Vec::new(),
            ttl_frames,
            epsilon,
        }
    }

    /// Remember an issued move
    pub fn record(&mut self, record: CompletedPickRecord) {
        self.records.push(record);
    }

    /// Consume the record matching an incoming move notification
    ///
    /// Returns `true` if the notification is an echo of an issued move.
    pub fn take_match(&mut self, key: PickKey, position: &Vec3, transaction: Option<TransactionId>) -> bool {
        let found = match transaction {
            Some(id) => self
                .records
                .iter()
                .position(|record| record.transaction == id && record.key == key),
            None => self
                .records
                .iter()
                .position(|record| record.key == key && positions_match(&record.position, position, self.epsilon)),
        };
        match found {
            Some(index) => {
                self.records.swap_remove(index);
                true
            }
            None => false,
        }
    }

    /// Drop records older than the TTL, returning how many expired
    pub fn expire(&mut self, now: FrameCount) -> usize {
        let before = self.records.len();
        let ttl = self.ttl_frames;
        self.records.retain(|record| now.since(record.recorded) < ttl);
        before - self.records.len()
    }

    /// Drop every record of an entity
    pub fn forget_entity(&mut self, entity: EntityId) {
        self.records.retain(|record| record.key.entity != entity);
    }

    /// Drop everything
    pub fn clear(&mut self) {
        self.records.clear();
    }

    /// Number of outstanding records
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether no record is outstanding
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
