//! mocap-bridge turns a raw motion-capture marker stream into named, stamped
//! rigid-body transforms.
//!
//! The library is split along the natural seams of the system:
//! - [`config`] and [`graph`] resolve a flat, namespaced parameter store into
//!   a typed entity graph (dynamics profiles, marker templates, rigid-body
//!   definitions) with cross-reference validation.
//! - [`mocap`] and [`tracker`] are the external capability boundaries: the
//!   motion-capture backend and the pose-estimation algorithm live behind
//!   those traits.
//! - [`bridge`] is the per-frame orchestration loop gluing the two together
//!   and handing the results to [`sink`]s.

pub mod bridge;
pub mod clock;
pub mod config;
pub mod graph;
pub mod mocap;
pub mod payloads;
pub mod sim;
pub mod sink;
pub mod tracker;

use thiserror::Error;

/// The fixed parent frame every transform is expressed in.
pub const WORLD_FRAME: &str = "world";

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error(transparent)]
    Config(#[from] config::ConfigError),

    #[error("motion-capture source failure: {0}")]
    Source(String),

    #[error("tracker failure: {0}")]
    Tracker(String),

    #[error("sink failure: {0}")]
    Sink(String),

    #[error("unsupported motion-capture backend '{0}'")]
    UnsupportedBackend(String),
}

pub type BridgeResult<T> = Result<T, BridgeError>;

pub use bridge::{FrameOutcome, ShutdownToken, StaleReport, TrackingBridge};
pub use clock::{BridgeClock, BridgeClockMock, BridgeDuration, BridgeTime};
pub use config::{ConfigError, ParamStore, Value};
pub use graph::{DynamicsProfile, EntityGraph, MarkerTemplate, RigidBodyDef};
pub use mocap::{connect, MocapFrame, MotionCaptureSource, RigidBodyReport};
pub use payloads::{PointCloudMsg, StampedTransform};
pub use sink::Sink;
pub use tracker::{RigidBodyTracker, TrackedObject, WarningCallback};
