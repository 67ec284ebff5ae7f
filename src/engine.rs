use crate::audio_data::AudioBuffer;
use crate::config::SpatialEngineDesc;
use crate::device::{CpalDevice, OutputDevice};
use crate::error::{Result, SonicFieldError};
use crate::events::{EventQueue, SonicFieldEvent};
use crate::lifecycle::{EngineLifecycle, LifecycleState};
use crate::listener::Listener;
use crate::mixer::{RenderCommand, RenderNotification, Voice, VoiceRouting};
use crate::node::{NodeKey, NodePlacement, SourceNode};
use crate::source::{AudioSource, GeoCoord, Placement, Position, SourceId, validate_volume};
use crate::transform::SpatialVector;
use std::collections::HashMap;
use std::fmt;

/// Why a declared source did not get a node on [`SpatialEngine::start`].
#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    /// No buffer yet; the caller is still decoding.
    NotLoaded,
    EmptyBuffer,
    /// The position cannot be turned into audio space right now.
    Unresolvable(String),
    /// Volume or coordinates out of range.
    Invalid(String),
    /// The buffer could not be prepared for the device, or the render graph refused it.
    Preparation(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotLoaded => write!(f, "audio buffer not loaded"),
            Self::EmptyBuffer => write!(f, "audio buffer is empty"),
            Self::Unresolvable(reason) => write!(f, "position unresolvable: {}", reason),
            Self::Invalid(reason) => write!(f, "invalid source: {}", reason),
            Self::Preparation(reason) => write!(f, "preparation failed: {}", reason),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SkippedSource {
    pub id: SourceId,
    pub reason: SkipReason,
}

/// Outcome of [`SpatialEngine::start`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StartReport {
    /// Ids that got a node, in declaration order.
    pub started: Vec<SourceId>,
    pub skipped: Vec<SkippedSource>,
}

/// Everything needed to hand a source to the render graph.
struct PreparedSource {
    placement: NodePlacement,
    vector: SpatialVector,
    attenuation: f32,
    buffer: AudioBuffer,
    routing: VoiceRouting,
}

/// Audio-space vector and attenuation for a placement, or `None` for a geodetic
/// placement while no listener reference is known.
fn locate(
    desc: &SpatialEngineDesc,
    reference: Option<GeoCoord>,
    placement: &NodePlacement,
) -> Option<(SpatialVector, f32)> {
    match placement {
        NodePlacement::Ambient => Some((SpatialVector::ZERO, 1.0)),
        NodePlacement::Planar(point) => {
            let vector = desc.planar.to_audio_space(point);
            Some((vector, desc.planar_attenuation.gain(vector.render_distance())))
        }
        NodePlacement::Geodetic(coord) => {
            let reference = reference?;
            let vector = desc.geodetic.to_audio_space(coord, &reference);
            Some((vector, desc.geodetic_attenuation.gain(vector.render_distance())))
        }
    }
}

/// The spatial audio engine.
///
/// `SpatialEngine` runs on the caller's thread and owns the set of live source nodes
/// and the listener. Audio is produced on the output device's thread by a render
/// graph the engine feeds through channels and shared parameter blocks.
///
/// # Architecture
///
/// - **Control thread**: owns the `SpatialEngine`, starts and stops sources, pushes
///   position and volume updates
/// - **Render thread**: drives the mixer from the device callback, reports voices
///   that finished or looped
///
/// Every operation is non-blocking. Nodes are keyed by [`SourceId`]; there is at most
/// one node per id.
pub struct SpatialEngine<D: OutputDevice = CpalDevice> {
    desc: SpatialEngineDesc,
    lifecycle: EngineLifecycle<D>,
    listener: Listener,
    nodes: HashMap<SourceId, SourceNode>,
    next_key: u64,
    events: EventQueue,
}

impl SpatialEngine<CpalDevice> {
    /// Create an engine that plays through the system's default output device.
    ///
    /// The device is not touched until [`init`](Self::init) or [`start`](Self::start).
    pub fn new(desc: SpatialEngineDesc) -> Result<Self> {
        Self::with_device(desc, CpalDevice::new())
    }
}

impl<D: OutputDevice> SpatialEngine<D> {
    /// Create an engine on a specific output device.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `desc` does not validate.
    pub fn with_device(desc: SpatialEngineDesc, device: D) -> Result<Self> {
        desc.validate()?;
        Ok(Self {
            desc,
            lifecycle: EngineLifecycle::new(device),
            listener: Listener::new(),
            nodes: HashMap::new(),
            next_key: 0,
            events: EventQueue::default(),
        })
    }

    pub fn desc(&self) -> &SpatialEngineDesc {
        &self.desc
    }

    pub fn listener(&self) -> &Listener {
        &self.listener
    }

    pub fn lifecycle_state(&self) -> LifecycleState {
        self.lifecycle.state()
    }

    /// Sample rate the device actually runs at, once initialized.
    pub fn output_sample_rate(&self) -> Option<u32> {
        self.lifecycle.device_info().map(|info| info.sample_rate)
    }

    pub fn device(&self) -> &D {
        self.lifecycle.device()
    }

    pub fn device_mut(&mut self) -> &mut D {
        self.lifecycle.device_mut()
    }

    /// Acquire the output device and build the render graph.
    ///
    /// Idempotent. On an initialized engine this only attempts to resume a suspended
    /// device, and a failure to resume is logged, not returned.
    ///
    /// # Errors
    ///
    /// Returns an error if the device or the spatializer cannot be created. Nothing
    /// is left half-initialized.
    pub fn init(&mut self) -> Result<()> {
        match self.lifecycle.init(&self.desc, self.listener.pose()) {
            Ok(true) => {
                self.events.push(SonicFieldEvent::EngineStarted);
                Ok(())
            }
            Ok(false) => Ok(()),
            Err(e) => {
                self.events.push(SonicFieldEvent::EngineError {
                    error: e.to_string(),
                });
                Err(e)
            }
        }
    }

    /// Pause the output device. Nodes and the render graph are kept.
    pub fn suspend(&mut self) -> Result<()> {
        self.lifecycle.suspend()?;
        self.events.push(SonicFieldEvent::EngineSuspended);
        Ok(())
    }

    /// Restart a suspended output device.
    pub fn resume(&mut self) -> Result<()> {
        self.lifecycle.resume()?;
        self.events.push(SonicFieldEvent::EngineResumed);
        Ok(())
    }

    /// Replace everything that is playing with `sources`.
    ///
    /// Stops all nodes, brings the device up, stores `listener_reference` if given and
    /// starts a node for every source that has a buffer and a resolvable position.
    /// Sources that cannot start are listed in the report; a source declared twice
    /// keeps its later declaration.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a malformed `listener_reference` (nothing is
    /// stopped in that case) and the device error if initialization fails, in which
    /// case no node exists afterwards.
    pub fn start(
        &mut self,
        sources: &[AudioSource],
        listener_reference: Option<GeoCoord>,
    ) -> Result<StartReport> {
        if let Some(reference) = listener_reference.as_ref() {
            reference.validate()?;
        }

        self.stop_all();
        self.init()?;

        if let Some(reference) = listener_reference {
            self.set_listener_reference(reference)?;
        }

        let sample_rate = self.output_sample_rate().unwrap_or(self.desc.sample_rate);
        let mut report = StartReport::default();

        for source in sources {
            let outcome = match self.prepare(source, sample_rate) {
                Ok(prepared) => self.spawn(source, prepared),
                Err(reason) => Err(reason),
            };

            match outcome {
                Ok(()) => {
                    report.started.retain(|id| *id != source.id);
                    report.started.push(source.id);
                }
                Err(reason) => {
                    match &reason {
                        SkipReason::NotLoaded => {
                            log::info!("Skipping {}: {}", source.id, reason);
                        }
                        _ => {
                            log::warn!("Skipping {}: {}", source.id, reason);
                            self.events.push(SonicFieldEvent::SourceFailed {
                                source_id: source.id,
                                reason: reason.to_string(),
                            });
                        }
                    }
                    report.skipped.push(SkippedSource {
                        id: source.id,
                        reason,
                    });
                }
            }
        }

        log::info!(
            "Started {} of {} sources ({} skipped)",
            report.started.len(),
            sources.len(),
            report.skipped.len()
        );
        Ok(report)
    }

    fn prepare(&self, source: &AudioSource, sample_rate: u32) -> std::result::Result<PreparedSource, SkipReason> {
        let Some(buffer) = source.buffer.as_ref() else {
            return Err(SkipReason::NotLoaded);
        };
        if buffer.is_empty() {
            return Err(SkipReason::EmptyBuffer);
        }
        validate_volume(source.volume).map_err(|e| SkipReason::Invalid(e.to_string()))?;

        let placement = match source.placement {
            Placement::Ambient => NodePlacement::Ambient,
            Placement::Unplaced => {
                return Err(SkipReason::Unresolvable("no position declared".into()));
            }
            Placement::Spatial(position) => {
                position
                    .validate()
                    .map_err(|e| SkipReason::Invalid(e.to_string()))?;
                NodePlacement::from(position)
            }
        };

        let (vector, attenuation) = locate(&self.desc, self.listener.geo_reference(), &placement)
            .ok_or_else(|| SkipReason::Unresolvable("no listener reference".into()))?;

        let resampled = buffer
            .resample(sample_rate)
            .map_err(|e| SkipReason::Preparation(e.to_string()))?;
        let (buffer, routing) = if placement.is_ambient() {
            (resampled, VoiceRouting::Direct)
        } else {
            let mono = resampled
                .to_mono()
                .map_err(|e| SkipReason::Preparation(e.to_string()))?;
            (mono, VoiceRouting::Spatial)
        };

        Ok(PreparedSource {
            placement,
            vector,
            attenuation,
            buffer,
            routing,
        })
    }

    fn spawn(&mut self, source: &AudioSource, prepared: PreparedSource) -> std::result::Result<(), SkipReason> {
        let key = NodeKey::new(self.next_key);
        self.next_key += 1;

        let mut node = SourceNode::new(
            source.id,
            key,
            prepared.placement,
            source.volume,
            source.looping,
            prepared.vector,
            prepared.attenuation,
        );
        let voice = Voice::new(
            key,
            source.id,
            prepared.buffer,
            source.looping,
            prepared.routing,
            node.params().clone(),
        );
        let Some(link) = self.lifecycle.link() else {
            return Err(SkipReason::Preparation("engine is not initialized".into()));
        };
        link.commands
            .send(RenderCommand::Insert(Box::new(voice)))
            .map_err(|e| SkipReason::Preparation(format!("render graph unavailable: {}", e)))?;

        // A repeated id replaces the node started earlier in the same call
        self.remove(source.id);

        node.mark_playing();
        self.nodes.insert(source.id, node);
        self.events.push(SonicFieldEvent::SourceStarted {
            source_id: source.id,
        });
        Ok(())
    }

    /// Move a live source without restarting it.
    ///
    /// A no-op for unknown ids and for ambient sources. A `listener_reference` that
    /// differs from the stored one replaces it and moves every geodetic source.
    ///
    /// # Errors
    ///
    /// Returns a validation error for malformed coordinates, or for a geodetic
    /// position while no listener reference is known. Nothing changes in that case.
    pub fn update_position(
        &mut self,
        id: SourceId,
        position: Position,
        listener_reference: Option<GeoCoord>,
    ) -> Result<()> {
        let Some(node) = self.nodes.get(&id) else {
            return Ok(());
        };
        if node.is_ambient() {
            return Ok(());
        }

        position.validate()?;
        if let Some(reference) = listener_reference.as_ref() {
            reference.validate()?;
        }

        let placement = NodePlacement::from(position);
        let reference = listener_reference.or(self.listener.geo_reference());
        let Some((vector, attenuation)) = locate(&self.desc, reference, &placement) else {
            return Err(SonicFieldError::Validation(format!(
                "Cannot place {} geodetically without a listener reference",
                id
            )));
        };

        if let Some(reference) = listener_reference {
            self.set_listener_reference(reference)?;
        }

        if let Some(node) = self.nodes.get_mut(&id) {
            let old_position = node.vector().position;
            node.apply_position(placement, vector, attenuation);
            self.events.push(SonicFieldEvent::SourcePositionChanged {
                source_id: id,
                old_position,
                new_position: vector.position,
            });
        }
        Ok(())
    }

    /// Change the volume of a live source without restarting it.
    ///
    /// # Errors
    ///
    /// Returns a validation error if `volume` is outside `[0, 1]` or not finite; the
    /// previous gain is kept.
    pub fn update_volume(&mut self, id: SourceId, volume: f32) -> Result<()> {
        let volume = validate_volume(volume)?;
        let Some(node) = self.nodes.get_mut(&id) else {
            return Ok(());
        };

        let old_volume = node.volume();
        node.apply_volume(volume);
        self.events.push(SonicFieldEvent::SourceVolumeChanged {
            source_id: id,
            old_volume,
            new_volume: volume,
        });
        Ok(())
    }

    /// Store the listener's geographic position and move every geodetic source.
    pub fn set_listener_reference(&mut self, coord: GeoCoord) -> Result<()> {
        let Some(old_reference) = self.listener.set_geo_reference(coord)? else {
            return Ok(());
        };
        log::info!("Listener reference moved to ({}, {})", coord.lat, coord.lng);
        self.events.push(SonicFieldEvent::ListenerReferenceChanged {
            old_reference,
            new_reference: coord,
        });

        for node in self.nodes.values_mut() {
            let placement = *node.placement();
            if !placement.is_geodetic() {
                continue;
            }
            if let Some((vector, attenuation)) = locate(&self.desc, Some(coord), &placement) {
                let old_position = node.vector().position;
                node.apply_position(placement, vector, attenuation);
                self.events.push(SonicFieldEvent::SourcePositionChanged {
                    source_id: node.id(),
                    old_position,
                    new_position: vector.position,
                });
            }
        }
        Ok(())
    }

    /// Stop and forget every node. Safe to call at any time.
    pub fn stop_all(&mut self) {
        if self.nodes.is_empty() {
            return;
        }

        if let Some(link) = self.lifecycle.link() {
            let _ = link.commands.send(RenderCommand::ReleaseAll);
        }
        self.collect_retired();
        for (id, mut node) in self.nodes.drain() {
            node.stop();
            self.events.push(SonicFieldEvent::SourceStopped { source_id: id });
        }
        log::debug!("Stopped all sources");
    }

    /// Stop one node. Unknown ids are ignored.
    pub fn remove(&mut self, id: SourceId) {
        let Some(mut node) = self.nodes.remove(&id) else {
            return;
        };
        if node.stop() {
            if let Some(link) = self.lifecycle.link() {
                let _ = link.commands.send(RenderCommand::Release(node.key()));
            }
        }
        self.events.push(SonicFieldEvent::SourceStopped { source_id: id });
    }

    /// Stop everything and release the output device. A later `init` or `start`
    /// acquires it again.
    pub fn cleanup(&mut self) {
        self.stop_all();
        self.collect_retired();
        let was_initialized = self.lifecycle.is_initialized();
        self.lifecycle.shutdown();
        if was_initialized {
            self.events.push(SonicFieldEvent::EngineStopped);
        }
    }

    /// True while the source has a node that is still producing sound.
    pub fn is_live(&self, id: SourceId) -> bool {
        self.nodes.get(&id).is_some_and(|node| node.is_audible())
    }

    pub fn live_ids(&self) -> Vec<SourceId> {
        let mut ids: Vec<SourceId> = self
            .nodes
            .values()
            .filter(|node| node.is_audible())
            .map(|node| node.id())
            .collect();
        ids.sort();
        ids
    }

    pub fn live_count(&self) -> usize {
        self.nodes.values().filter(|node| node.is_audible()).count()
    }

    pub fn node(&self, id: SourceId) -> Option<&SourceNode> {
        self.nodes.get(&id)
    }

    /// Number of events waiting for [`poll_events`](Self::poll_events). Never exceeds
    /// [`MAX_PENDING_EVENTS`](crate::events::MAX_PENDING_EVENTS).
    pub fn pending_event_count(&self) -> usize {
        self.events.len()
    }

    /// Drop the voices the render thread has handed back.
    fn collect_retired(&mut self) {
        if let Some(link) = self.lifecycle.link() {
            link.retired.try_iter().for_each(drop);
        }
    }

    /// Process notifications from the render thread and reap nodes whose buffer ended.
    ///
    /// Returns the number of nodes reaped.
    pub fn tick(&mut self) -> usize {
        let notifications: Vec<RenderNotification> = match self.lifecycle.link() {
            Some(link) => link.notifications.try_iter().collect(),
            None => return 0,
        };
        self.collect_retired();

        let mut reaped = 0;
        for notification in notifications {
            match notification {
                RenderNotification::Completed { key, source_id } => {
                    // Ignore reports about a node that has since been replaced
                    if self.nodes.get(&source_id).is_some_and(|node| node.key() == key) {
                        if let Some(mut node) = self.nodes.remove(&source_id) {
                            node.stop();
                        }
                        reaped += 1;
                        log::debug!("Source {} completed", source_id);
                        self.events.push(SonicFieldEvent::SourceCompleted { source_id });
                    }
                }
                RenderNotification::Looped { key, source_id } => {
                    if self.nodes.get(&source_id).is_some_and(|node| node.key() == key) {
                        self.events.push(SonicFieldEvent::SourceLooped { source_id });
                    }
                }
            }
        }

        // Completion reports are dropped while nobody drains them; the flag is not
        let finished: Vec<SourceId> = self
            .nodes
            .values()
            .filter(|node| node.params().is_finished())
            .map(|node| node.id())
            .collect();
        for source_id in finished {
            if let Some(mut node) = self.nodes.remove(&source_id) {
                node.stop();
            }
            reaped += 1;
            log::debug!("Source {} completed", source_id);
            self.events.push(SonicFieldEvent::SourceCompleted { source_id });
        }
        reaped
    }

    /// Drain every event raised since the last call.
    ///
    /// At most [`MAX_PENDING_EVENTS`](crate::events::MAX_PENDING_EVENTS) are kept
    /// between polls; older ones are dropped first.
    pub fn poll_events(&mut self) -> Vec<SonicFieldEvent> {
        self.tick();
        self.events.drain()
    }
}

impl<D: OutputDevice> Drop for SpatialEngine<D> {
    fn drop(&mut self) {
        self.cleanup();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{DeviceInfo, OfflineDevice};
    use crate::mixer::Mixer;
    use crate::source::PlanarPoint;

    const RATE: u32 = 48000;

    fn desc() -> SpatialEngineDesc {
        SpatialEngineDesc::default().sample_rate(RATE).block_size(64)
    }

    fn engine() -> SpatialEngine<OfflineDevice> {
        SpatialEngine::with_device(desc(), OfflineDevice::new()).unwrap()
    }

    fn tone(frames: usize) -> AudioBuffer {
        let samples = (0..frames)
            .map(|i| (i as f32 * 440.0 * std::f32::consts::TAU / RATE as f32).sin())
            .collect();
        AudioBuffer::from_mono(samples, RATE).unwrap()
    }

    fn canvas(x: f32, y: f32) -> PlanarPoint {
        PlanarPoint::new(x, y, 800.0, 600.0)
    }

    fn planar(id: u64, x: f32, y: f32) -> AudioSource {
        AudioSource::planar(id, Some(tone(48000)), canvas(x, y)).with_looping(true)
    }

    fn render(engine: &mut SpatialEngine<OfflineDevice>, frames: usize) -> Vec<f32> {
        let mut out = vec![0.0; frames * 2];
        engine.device_mut().render(&mut out);
        out
    }

    /// Opening always fails.
    struct UnavailableDevice;

    impl OutputDevice for UnavailableDevice {
        fn open(&mut self, _desc: &SpatialEngineDesc) -> Result<DeviceInfo> {
            Err(SonicFieldError::AudioDevice("no output device".into()))
        }
        fn attach(&mut self, _mixer: Mixer) -> Result<()> {
            Ok(())
        }
        fn suspend(&mut self) -> Result<()> {
            Ok(())
        }
        fn resume(&mut self) -> Result<()> {
            Ok(())
        }
        fn is_suspended(&self) -> bool {
            false
        }
        fn release(&mut self) {}
    }

    /// Comes up suspended and refuses to resume.
    struct GestureLockedDevice {
        inner: OfflineDevice,
        resume_attempts: usize,
    }

    impl OutputDevice for GestureLockedDevice {
        fn open(&mut self, desc: &SpatialEngineDesc) -> Result<DeviceInfo> {
            self.inner.open(desc)
        }
        fn attach(&mut self, mixer: Mixer) -> Result<()> {
            self.inner.attach(mixer)
        }
        fn suspend(&mut self) -> Result<()> {
            self.inner.suspend()
        }
        fn resume(&mut self) -> Result<()> {
            self.resume_attempts += 1;
            Err(SonicFieldError::AudioDevice("user gesture required".into()))
        }
        fn is_suspended(&self) -> bool {
            self.inner.is_suspended()
        }
        fn release(&mut self) {
            self.inner.release()
        }
    }

    #[test]
    fn planar_scenario_vector() {
        let mut engine = engine();
        engine.start(&[planar(1, 600.0, 300.0)], None).unwrap();

        let node = engine.node(SourceId::new(1)).unwrap();
        let position = node.vector().position;
        assert!((position.x - 2.5).abs() < 1e-5);
        assert!(position.y.abs() < 1e-5);
        assert!((position.z + 1.5).abs() < 1e-5);
        assert!((node.distance() - 0.5).abs() < 1e-5);
    }

    #[test]
    fn centered_source_sits_on_listener() {
        let mut engine = engine();
        engine.start(&[planar(1, 400.0, 300.0)], None).unwrap();
        let node = engine.node(SourceId::new(1)).unwrap();
        assert!(node.vector().is_zero());
        assert_eq!(node.attenuation(), 1.0);
    }

    #[test]
    fn geodetic_source_one_degree_east() {
        let mut engine = engine();
        let source = AudioSource::geodetic(7, Some(tone(4800)), GeoCoord::new(0.0, 1.0));
        let report = engine.start(&[source], Some(GeoCoord::new(0.0, 0.0))).unwrap();
        assert_eq!(report.started, vec![SourceId::new(7)]);

        let node = engine.node(SourceId::new(7)).unwrap();
        let position = node.vector().position;
        // 1 degree of longitude at the equator is about 111.19 km
        assert!((position.x - 111.19).abs() < 0.1, "x = {}", position.x);
        assert!(position.z.abs() < 1e-3);
        assert_eq!(position.y, 0.0);
    }

    #[test]
    fn start_then_stop_all_leaves_nothing() {
        let mut engine = engine();
        let report = engine
            .start(&[planar(1, 100.0, 100.0), planar(2, 700.0, 500.0)], None)
            .unwrap();
        assert_eq!(report.started.len(), 2);
        assert_eq!(engine.live_count(), 2);

        engine.stop_all();
        assert_eq!(engine.live_count(), 0);
        assert!(engine.live_ids().is_empty());
        engine.stop_all();

        render(&mut engine, 256);
        assert_eq!(engine.device().mixer().unwrap().voice_count(), 0);
    }

    #[test]
    fn second_start_replaces_first() {
        let mut engine = engine();
        engine.start(&[planar(1, 100.0, 100.0), planar(2, 200.0, 100.0)], None).unwrap();
        engine.start(&[planar(3, 300.0, 100.0)], None).unwrap();
        assert_eq!(engine.live_ids(), vec![SourceId::new(3)]);
    }

    #[test]
    fn overlapping_starts_replace_shared_ids() {
        let mut engine = engine();
        engine.start(&[planar(1, 100.0, 100.0), planar(2, 200.0, 100.0)], None).unwrap();
        let first_key = engine.node(SourceId::new(2)).unwrap().key();

        engine.start(&[planar(2, 200.0, 100.0), planar(3, 300.0, 100.0)], None).unwrap();
        assert_eq!(engine.live_ids(), vec![SourceId::new(2), SourceId::new(3)]);
        assert_ne!(engine.node(SourceId::new(2)).unwrap().key(), first_key);

        // The released voices fade out within a block and leave the arena
        render(&mut engine, 256);
        assert_eq!(engine.device().mixer().unwrap().voice_count(), 2);
    }

    #[test]
    fn unpolled_engine_keeps_a_bounded_backlog() {
        let mut engine = engine();
        let looping = AudioSource::planar(1, Some(tone(100)), canvas(400.0, 300.0)).with_looping(true);
        engine.start(&[looping], None).unwrap();

        for i in 0..100_000 {
            let x = if i % 2 == 0 { 100.0 } else { 700.0 };
            engine
                .update_position(SourceId::new(1), Position::planar(x, 300.0, 800.0, 600.0), None)
                .unwrap();
        }
        for _ in 0..20 {
            render(&mut engine, 4800);
        }

        assert_eq!(engine.pending_event_count(), crate::events::MAX_PENDING_EVENTS);
        let link = engine.lifecycle.link().unwrap();
        assert!(link.notifications.len() <= crate::mixer::NOTIFICATION_CAPACITY);
        assert!(engine.is_live(SourceId::new(1)));

        let events = engine.poll_events();
        assert!(events.len() <= crate::events::MAX_PENDING_EVENTS);
        assert_eq!(engine.pending_event_count(), 0);
    }

    #[test]
    fn completion_is_seen_when_reports_overflow() {
        let mut engine = engine();
        let looping = AudioSource::planar(1, Some(tone(64)), canvas(100.0, 300.0)).with_looping(true);
        let one_shot = AudioSource::planar(2, Some(tone(24000)), canvas(700.0, 300.0));
        engine.start(&[looping, one_shot], None).unwrap();
        engine.poll_events();

        // Far more loop reports than the channel holds arrive before the one-shot ends
        for _ in 0..10 {
            render(&mut engine, 4800);
        }
        render(&mut engine, 256);

        let events = engine.poll_events();
        let completed = events
            .iter()
            .filter(|e| **e == SonicFieldEvent::SourceCompleted { source_id: SourceId::new(2) })
            .count();
        assert_eq!(completed, 1);
        assert!(!engine.is_live(SourceId::new(2)));
        assert!(engine.is_live(SourceId::new(1)));

        render(&mut engine, 256);
        assert!(engine.poll_events().iter().all(|e| !matches!(e, SonicFieldEvent::SourceCompleted { .. })));
    }

    #[test]
    fn duplicate_ids_keep_the_later_declaration() {
        let mut engine = engine();
        let report = engine
            .start(&[planar(5, 100.0, 100.0), planar(5, 700.0, 100.0)], None)
            .unwrap();
        assert_eq!(report.started, vec![SourceId::new(5)]);
        assert_eq!(engine.live_count(), 1);
        assert!(engine.node(SourceId::new(5)).unwrap().vector().position.x > 0.0);

        render(&mut engine, 256);
        assert_eq!(engine.device().mixer().unwrap().voice_count(), 1);
    }

    #[test]
    fn unusable_sources_are_reported() {
        let mut engine = engine();
        let empty = AudioBuffer::from_mono(Vec::new(), RATE).unwrap();
        let sources = [
            AudioSource::planar(1, None, canvas(10.0, 10.0)),
            AudioSource::planar(2, Some(empty), canvas(10.0, 10.0)),
            AudioSource::new(3, Some(tone(480)), Placement::Unplaced),
            AudioSource::geodetic(4, Some(tone(480)), GeoCoord::new(10.0, 10.0)),
            AudioSource::planar(5, Some(tone(480)), canvas(10.0, 10.0)).with_volume(1.5),
            AudioSource::geodetic(6, Some(tone(480)), GeoCoord::new(95.0, 0.0)),
            planar(7, 10.0, 10.0),
        ];
        let report = engine.start(&sources, None).unwrap();

        assert_eq!(report.started, vec![SourceId::new(7)]);
        let reasons: Vec<_> = report.skipped.iter().map(|s| (s.id.value(), s.reason.clone())).collect();
        assert_eq!(reasons[0], (1, SkipReason::NotLoaded));
        assert_eq!(reasons[1], (2, SkipReason::EmptyBuffer));
        assert!(matches!(reasons[2], (3, SkipReason::Unresolvable(_))));
        assert!(matches!(reasons[3], (4, SkipReason::Unresolvable(_))));
        assert!(matches!(reasons[4], (5, SkipReason::Invalid(_))));
        assert!(matches!(reasons[5], (6, SkipReason::Invalid(_))));

        // Not-yet-loaded sources are routine and raise no failure event
        let failed: Vec<_> = engine
            .poll_events()
            .into_iter()
            .filter(|e| matches!(e, SonicFieldEvent::SourceFailed { .. }))
            .filter_map(|e| e.source_id())
            .collect();
        assert_eq!(failed.len(), 5);
        assert!(!failed.contains(&SourceId::new(1)));
    }

    #[test]
    fn ambient_ignores_position_updates() {
        let mut engine = engine();
        let stereo = AudioBuffer::from_interleaved(vec![0.5; 9600], RATE, 2).unwrap();
        engine
            .start(&[AudioSource::ambient(9, Some(stereo)).with_looping(true)], None)
            .unwrap();

        engine
            .update_position(SourceId::new(9), Position::planar(0.0, 0.0, 800.0, 600.0), None)
            .unwrap();
        let node = engine.node(SourceId::new(9)).unwrap();
        assert!(node.vector().is_zero());
        assert_eq!(node.attenuation(), 1.0);
        assert!(node.is_ambient());
    }

    #[test]
    fn position_update_moves_without_restart() {
        let mut engine = engine();
        engine.start(&[planar(1, 400.0, 300.0)], None).unwrap();
        let key = engine.node(SourceId::new(1)).unwrap().key();

        engine
            .update_position(SourceId::new(1), Position::planar(800.0, 300.0, 800.0, 600.0), None)
            .unwrap();
        let node = engine.node(SourceId::new(1)).unwrap();
        assert_eq!(node.key(), key);
        assert!((node.vector().position.x - 5.0).abs() < 1e-5);
        assert!(node.attenuation() < 1.0);
    }

    #[test]
    fn updates_for_unknown_ids_are_no_ops() {
        let mut engine = engine();
        assert!(
            engine
                .update_position(SourceId::new(42), Position::planar(1.0, 1.0, 800.0, 600.0), None)
                .is_ok()
        );
        assert!(engine.update_volume(SourceId::new(42), 0.3).is_ok());
        engine.remove(SourceId::new(42));
        assert_eq!(engine.live_count(), 0);
    }

    #[test]
    fn malformed_position_is_rejected() {
        let mut engine = engine();
        engine.start(&[planar(1, 600.0, 300.0)], None).unwrap();
        let before = engine.node(SourceId::new(1)).unwrap().vector();

        let err = engine
            .update_position(SourceId::new(1), Position::geodetic(f64::NAN, 0.0), None)
            .unwrap_err();
        assert!(err.is_validation_error());
        // Geodetic placement needs a listener reference
        let err = engine
            .update_position(SourceId::new(1), Position::geodetic(1.0, 1.0), None)
            .unwrap_err();
        assert!(err.is_validation_error());
        assert_eq!(engine.node(SourceId::new(1)).unwrap().vector(), before);
    }

    #[test]
    fn out_of_range_volume_keeps_prior_gain() {
        let mut engine = engine();
        engine
            .start(&[planar(1, 400.0, 300.0).with_volume(0.8)], None)
            .unwrap();

        let err = engine.update_volume(SourceId::new(1), 1.5).unwrap_err();
        assert!(err.is_validation_error());
        assert!(engine.update_volume(SourceId::new(1), f32::NAN).is_err());
        assert_eq!(engine.node(SourceId::new(1)).unwrap().volume(), 0.8);

        engine.update_volume(SourceId::new(1), 0.25).unwrap();
        assert_eq!(engine.node(SourceId::new(1)).unwrap().gain(), 0.25);
    }

    #[test]
    fn listener_reference_change_moves_geodetic_sources() {
        let mut engine = engine();
        let sources = [
            AudioSource::geodetic(1, Some(tone(4800)), GeoCoord::new(0.0, 1.0)).with_looping(true),
            planar(2, 600.0, 300.0),
        ];
        engine.start(&sources, Some(GeoCoord::new(0.0, 0.0))).unwrap();
        let planar_before = engine.node(SourceId::new(2)).unwrap().vector();
        engine.poll_events();

        engine.set_listener_reference(GeoCoord::new(0.0, 1.0)).unwrap();
        assert!(engine.node(SourceId::new(1)).unwrap().vector().is_zero());
        assert_eq!(engine.node(SourceId::new(2)).unwrap().vector(), planar_before);

        let events = engine.poll_events();
        assert!(events.iter().any(|e| matches!(e, SonicFieldEvent::ListenerReferenceChanged { .. })));

        // Same reference again changes nothing
        engine.set_listener_reference(GeoCoord::new(0.0, 1.0)).unwrap();
        assert!(engine.poll_events().is_empty());
    }

    #[test]
    fn update_with_new_reference_recomputes() {
        let mut engine = engine();
        let sources = [
            AudioSource::geodetic(1, Some(tone(4800)), GeoCoord::new(0.0, 1.0)).with_looping(true),
            AudioSource::geodetic(2, Some(tone(4800)), GeoCoord::new(1.0, 0.0)).with_looping(true),
        ];
        engine.start(&sources, Some(GeoCoord::new(0.0, 0.0))).unwrap();

        engine
            .update_position(SourceId::new(1), Position::geodetic(0.0, 2.0), Some(GeoCoord::new(0.0, 2.0)))
            .unwrap();
        assert!(engine.node(SourceId::new(1)).unwrap().vector().is_zero());
        // Source 2 is now north-west of the listener
        let other = engine.node(SourceId::new(2)).unwrap().vector().position;
        assert!(other.x < 0.0);
        assert!(other.z < 0.0);
    }

    #[test]
    fn hard_right_source_is_louder_on_the_right() {
        let mut engine = engine();
        engine.start(&[planar(1, 800.0, 300.0)], None).unwrap();

        let out = render(&mut engine, 2048);
        let left: f32 = out.iter().step_by(2).map(|s| s * s).sum();
        let right: f32 = out.iter().skip(1).step_by(2).map(|s| s * s).sum();
        assert!(right > 0.0);
        assert!(right > 2.0 * left, "left {} right {}", left, right);
    }

    #[test]
    fn one_shot_source_is_reaped_after_it_ends() {
        let mut engine = engine();
        let sources = [
            AudioSource::planar(1, Some(tone(100)), canvas(600.0, 300.0)),
            planar(2, 200.0, 300.0),
        ];
        engine.start(&sources, None).unwrap();
        engine.poll_events();

        render(&mut engine, 512);
        // Finished but not reaped yet
        assert!(!engine.is_live(SourceId::new(1)));
        assert!(engine.node(SourceId::new(1)).is_some());
        assert!(engine.is_live(SourceId::new(2)));

        let events = engine.poll_events();
        assert!(events.contains(&SonicFieldEvent::SourceCompleted {
            source_id: SourceId::new(1)
        }));
        assert!(engine.node(SourceId::new(1)).is_none());
        assert_eq!(engine.live_ids(), vec![SourceId::new(2)]);
    }

    #[test]
    fn looping_source_keeps_playing() {
        let mut engine = engine();
        let source = AudioSource::planar(1, Some(tone(100)), canvas(600.0, 300.0)).with_looping(true);
        engine.start(&[source], None).unwrap();

        render(&mut engine, 1024);
        assert_eq!(engine.tick(), 0);
        assert!(engine.is_live(SourceId::new(1)));
        assert!(
            engine
                .poll_events()
                .contains(&SonicFieldEvent::SourceLooped { source_id: SourceId::new(1) })
        );
    }

    #[test]
    fn failed_acquisition_leaves_no_nodes() {
        let mut engine = SpatialEngine::with_device(desc(), UnavailableDevice).unwrap();
        let err = engine.start(&[planar(1, 100.0, 100.0)], None).unwrap_err();
        assert!(err.is_device_error());
        assert_eq!(engine.live_count(), 0);
        assert_eq!(engine.lifecycle_state(), LifecycleState::Uninitialized);
        assert!(
            engine
                .poll_events()
                .iter()
                .any(|e| matches!(e, SonicFieldEvent::EngineError { .. }))
        );
    }

    #[test]
    fn init_resumes_a_suspended_device() {
        let mut engine = SpatialEngine::with_device(desc(), OfflineDevice::starting_suspended()).unwrap();
        engine.init().unwrap();
        assert_eq!(engine.lifecycle_state(), LifecycleState::Running);

        engine.suspend().unwrap();
        assert!(engine.device().is_suspended());
        engine.start(&[planar(1, 100.0, 100.0)], None).unwrap();
        assert!(!engine.device().is_suspended());
        assert_eq!(engine.lifecycle_state(), LifecycleState::Running);
    }

    #[test]
    fn resume_failure_during_init_is_not_fatal() {
        let device = GestureLockedDevice {
            inner: OfflineDevice::starting_suspended(),
            resume_attempts: 0,
        };
        let mut engine = SpatialEngine::with_device(desc(), device).unwrap();

        let report = engine.start(&[planar(1, 100.0, 100.0)], None).unwrap();
        assert_eq!(report.started.len(), 1);
        assert_eq!(engine.lifecycle_state(), LifecycleState::Suspended);
        assert_eq!(engine.device().resume_attempts, 1);

        // Explicit resume surfaces the error but keeps everything
        assert!(engine.resume().unwrap_err().is_device_error());
        assert!(engine.is_live(SourceId::new(1)));
    }

    #[test]
    fn cleanup_then_start_reacquires() {
        let mut engine = engine();
        engine.start(&[planar(1, 100.0, 100.0)], None).unwrap();
        engine.cleanup();
        assert_eq!(engine.live_count(), 0);
        assert_eq!(engine.lifecycle_state(), LifecycleState::Closed);
        assert!(!engine.device().is_attached());

        engine.start(&[planar(2, 100.0, 100.0)], None).unwrap();
        assert_eq!(engine.lifecycle_state(), LifecycleState::Running);
        assert!(engine.is_live(SourceId::new(2)));
        render(&mut engine, 128);
        assert_eq!(engine.device().mixer().unwrap().voice_count(), 1);
    }

    #[test]
    fn foreign_sample_rates_are_resampled() {
        let mut engine = engine();
        let slow = AudioBuffer::from_mono(vec![0.25; 24000], 24000).unwrap();
        let report = engine
            .start(&[AudioSource::planar(1, Some(slow), canvas(400.0, 300.0))], None)
            .unwrap();
        assert_eq!(report.started.len(), 1);
        assert_eq!(engine.output_sample_rate(), Some(RATE));
    }

    #[test]
    fn invalid_listener_reference_stops_nothing() {
        let mut engine = engine();
        engine.start(&[planar(1, 100.0, 100.0)], None).unwrap();
        assert!(engine.start(&[], Some(GeoCoord::new(-91.0, 0.0))).is_err());
        assert!(engine.is_live(SourceId::new(1)));
    }

    #[test]
    fn removal_is_idempotent() {
        let mut engine = engine();
        engine.start(&[planar(1, 100.0, 100.0), planar(2, 500.0, 100.0)], None).unwrap();
        engine.remove(SourceId::new(1));
        engine.remove(SourceId::new(1));
        assert_eq!(engine.live_ids(), vec![SourceId::new(2)]);

        let stopped = engine
            .poll_events()
            .into_iter()
            .filter(|e| matches!(e, SonicFieldEvent::SourceStopped { .. }))
            .count();
        assert_eq!(stopped, 1);
    }
}
