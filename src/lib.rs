//! SonicField: place sounds on a canvas or a map and hear them around you.
//!
//! Sources are declared with a position on a 2D surface or a latitude/longitude,
//! mapped into a listener-centred 3D audio space, attenuated by distance and
//! spatialized on the output device's thread.

pub mod attenuation;
pub mod audio_data;
pub mod config;
pub mod device;
pub mod engine;
pub mod error;
pub mod events;
pub mod lifecycle;
pub mod listener;
pub mod math;
pub mod mixer;
pub mod node;
pub mod source;
pub mod spatial;
pub mod transform;

pub use attenuation::{AttenuationModel, DistanceCurve};
pub use audio_data::AudioBuffer;
pub use config::SpatialEngineDesc;
pub use device::{CpalDevice, DeviceInfo, OfflineDevice, OutputDevice};
pub use engine::{SkipReason, SkippedSource, SpatialEngine, StartReport};
pub use error::{Result, SonicFieldError};
pub use events::SonicFieldEvent;
pub use lifecycle::LifecycleState;
pub use listener::Listener;
pub use node::{NodeState, SourceNode};
pub use source::{AudioSource, GeoCoord, Placement, PlanarPoint, Position, SourceId};
pub use spatial::{Spatializer, SpatializerKind};
pub use transform::{GeodeticTransform, PlanarTransform, SpatialVector};
