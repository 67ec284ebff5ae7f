//! Event types for SonicField

use crate::math::Vec3;
use crate::source::{GeoCoord, SourceId};
use std::collections::VecDeque;

/// Events kept for a caller that has not polled yet.
pub const MAX_PENDING_EVENTS: usize = 1024;

#[derive(Debug, Clone, PartialEq)]
pub enum SonicFieldEvent {
    SourceStarted {
        source_id: SourceId,
    },
    SourceFailed {
        source_id: SourceId,
        reason: String,
    },
    SourceStopped {
        source_id: SourceId,
    },
    SourceCompleted {
        source_id: SourceId,
    },
    SourceLooped {
        source_id: SourceId,
    },
    SourceVolumeChanged {
        source_id: SourceId,
        old_volume: f32,
        new_volume: f32,
    },
    SourcePositionChanged {
        source_id: SourceId,
        old_position: Vec3,
        new_position: Vec3,
    },
    ListenerReferenceChanged {
        old_reference: Option<GeoCoord>,
        new_reference: GeoCoord,
    },
    EngineStarted,
    EngineSuspended,
    EngineResumed,
    EngineStopped,
    EngineError {
        error: String,
    },
}

impl SonicFieldEvent {
    pub fn source_id(&self) -> Option<SourceId> {
        match self {
            Self::SourceStarted { source_id }
            | Self::SourceFailed { source_id, .. }
            | Self::SourceStopped { source_id }
            | Self::SourceCompleted { source_id }
            | Self::SourceLooped { source_id }
            | Self::SourceVolumeChanged { source_id, .. }
            | Self::SourcePositionChanged { source_id, .. } => Some(*source_id),
            _ => None,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::SourceFailed { .. } | Self::EngineError { .. })
    }

    pub fn is_source_event(&self) -> bool {
        self.source_id().is_some()
    }
}

/// Pending events, oldest first. Once full, each new event evicts the oldest one.
#[derive(Debug)]
pub(crate) struct EventQueue {
    events: VecDeque<SonicFieldEvent>,
    capacity: usize,
    dropped: u64,
}

impl EventQueue {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            events: VecDeque::with_capacity(capacity),
            capacity,
            dropped: 0,
        }
    }

    pub fn push(&mut self, event: SonicFieldEvent) {
        if self.events.len() == self.capacity {
            self.events.pop_front();
            self.dropped += 1;
            if self.dropped == 1 {
                log::warn!("Event backlog full, dropping the oldest events until the next poll");
            }
        }
        self.events.push_back(event);
    }

    pub fn drain(&mut self) -> Vec<SonicFieldEvent> {
        if self.dropped > 0 {
            log::debug!("{} events were dropped before this poll", self.dropped);
            self.dropped = 0;
        }
        self.events.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::with_capacity(MAX_PENDING_EVENTS)
    }
}
