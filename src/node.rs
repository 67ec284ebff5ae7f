//! Runtime source nodes.
//!
//! A [`SourceNode`] is the control-thread view of one playing source. Its render-thread
//! counterpart is a [`Voice`](crate::mixer::Voice); the two share a [`NodeParams`] block
//! through which the control side pushes position and gain without locking.

use crate::math::Vec3;
use crate::source::{GeoCoord, PlanarPoint, Position, SourceId};
use crate::transform::SpatialVector;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

/// Identity of one node instance. Restarting a source id always yields a fresh key.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeKey(u64);

impl NodeKey {
    pub(crate) fn new(key: u64) -> Self {
        Self(key)
    }
}

impl std::fmt::Display for NodeKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "NodeKey({})", self.0)
    }
}

/// `Created -> Playing -> Stopped`. `Stopped` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    Created,
    Playing,
    Stopped,
}

/// The resolved placement a node was started with.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NodePlacement {
    Ambient,
    Planar(PlanarPoint),
    Geodetic(GeoCoord),
}

impl NodePlacement {
    pub fn is_ambient(&self) -> bool {
        matches!(self, Self::Ambient)
    }

    pub fn is_geodetic(&self) -> bool {
        matches!(self, Self::Geodetic(_))
    }
}

impl From<Position> for NodePlacement {
    fn from(position: Position) -> Self {
        match position {
            Position::Planar(point) => Self::Planar(point),
            Position::Geodetic(coord) => Self::Geodetic(coord),
        }
    }
}

#[inline]
fn load_f32(cell: &AtomicU32) -> f32 {
    f32::from_bits(cell.load(Ordering::Relaxed))
}

#[inline]
fn store_f32(cell: &AtomicU32, value: f32) {
    cell.store(value.to_bits(), Ordering::Relaxed);
}

/// Parameters shared between a node and its voice.
///
/// Writes come only from the control thread and reads only from the render thread.
/// Position components are stored independently; a read racing a write can see a
/// mix of old and new components for one block, which the voice's ramp smooths over.
#[derive(Debug)]
pub struct NodeParams {
    x: AtomicU32,
    y: AtomicU32,
    z: AtomicU32,
    gain: AtomicU32,
    released: AtomicBool,
    finished: AtomicBool,
}

impl NodeParams {
    pub(crate) fn new(position: Vec3, gain: f32) -> Self {
        let params = Self {
            x: AtomicU32::new(0),
            y: AtomicU32::new(0),
            z: AtomicU32::new(0),
            gain: AtomicU32::new(0),
            released: AtomicBool::new(false),
            finished: AtomicBool::new(false),
        };
        params.apply_position(position);
        params.apply_gain(gain);
        params
    }

    /// Push a new listener-relative position. Non-finite components are written as 0.
    pub fn apply_position(&self, position: Vec3) {
        let sanitize = |v: f32| if v.is_finite() { v } else { 0.0 };
        store_f32(&self.x, sanitize(position.x));
        store_f32(&self.y, sanitize(position.y));
        store_f32(&self.z, sanitize(position.z));
    }

    /// Push a new linear gain, clamped to `[0, 1]`.
    pub fn apply_gain(&self, gain: f32) {
        let gain = if gain.is_finite() { gain.clamp(0.0, 1.0) } else { 0.0 };
        store_f32(&self.gain, gain);
    }

    pub fn position(&self) -> Vec3 {
        Vec3::new(load_f32(&self.x), load_f32(&self.y), load_f32(&self.z))
    }

    pub fn gain(&self) -> f32 {
        load_f32(&self.gain)
    }

    pub(crate) fn mark_released(&self) {
        self.released.store(true, Ordering::Release);
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    pub(crate) fn mark_finished(&self) {
        self.finished.store(true, Ordering::Release);
    }

    /// Set by the render thread once a non-looping buffer has played to its end.
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }
}

/// Control-side state of one playing source.
#[derive(Debug)]
pub struct SourceNode {
    id: SourceId,
    key: NodeKey,
    placement: NodePlacement,
    volume: f32,
    looping: bool,
    vector: SpatialVector,
    attenuation: f32,
    state: NodeState,
    params: Arc<NodeParams>,
}

impl SourceNode {
    pub(crate) fn new(
        id: SourceId,
        key: NodeKey,
        placement: NodePlacement,
        volume: f32,
        looping: bool,
        vector: SpatialVector,
        attenuation: f32,
    ) -> Self {
        let params = Arc::new(NodeParams::new(vector.position, volume * attenuation));
        Self {
            id,
            key,
            placement,
            volume,
            looping,
            vector,
            attenuation,
            state: NodeState::Created,
            params,
        }
    }

    pub fn id(&self) -> SourceId {
        self.id
    }

    pub fn key(&self) -> NodeKey {
        self.key
    }

    pub fn placement(&self) -> &NodePlacement {
        &self.placement
    }

    pub fn is_ambient(&self) -> bool {
        self.placement.is_ambient()
    }

    pub fn state(&self) -> NodeState {
        self.state
    }

    pub fn vector(&self) -> SpatialVector {
        self.vector
    }

    pub fn distance(&self) -> f32 {
        self.vector.distance
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn looping(&self) -> bool {
        self.looping
    }

    pub fn attenuation(&self) -> f32 {
        self.attenuation
    }

    /// Effective gain: `volume * attenuation`.
    pub fn gain(&self) -> f32 {
        self.volume * self.attenuation
    }

    /// False once the voice has played a non-looping buffer to the end.
    pub fn is_audible(&self) -> bool {
        self.state == NodeState::Playing && !self.params.is_finished()
    }

    pub(crate) fn params(&self) -> &Arc<NodeParams> {
        &self.params
    }

    pub(crate) fn mark_playing(&mut self) {
        if self.state == NodeState::Created {
            self.state = NodeState::Playing;
            log::debug!("Node {} for {} playing", self.key, self.id);
        }
    }

    /// Returns false when the node was already stopped.
    pub(crate) fn stop(&mut self) -> bool {
        if self.state == NodeState::Stopped {
            return false;
        }
        log::debug!("Node {} for {} stopped ({:?})", self.key, self.id, self.state);
        self.state = NodeState::Stopped;
        self.params.mark_released();
        true
    }

    pub(crate) fn apply_position(
        &mut self,
        placement: NodePlacement,
        vector: SpatialVector,
        attenuation: f32,
    ) {
        if self.placement.is_ambient() {
            return;
        }
        self.placement = placement;
        self.vector = vector;
        self.attenuation = attenuation;
        self.params.apply_position(vector.position);
        self.params.apply_gain(self.gain());
    }

    pub(crate) fn apply_volume(&mut self, volume: f32) {
        self.volume = volume;
        self.params.apply_gain(self.gain());
    }
}
