//! The motion-capture backend boundary.
//!
//! A backend blocks until the next frame is available and hands back an
//! owned [`MocapFrame`]: the raw marker cloud plus whatever rigid bodies the
//! backend tracks natively. Frames are rebuilt from scratch every call;
//! nothing is carried over between iterations.

use crate::graph::EntityGraph;
use crate::sim::SimSource;
use crate::{BridgeError, BridgeResult};
use compact_str::CompactString;
use nalgebra::{Point3, UnitQuaternion};
use std::collections::HashMap;
use std::time::Duration;

/// A rigid body the backend tracks on its own, reported alongside the
/// marker cloud.
#[derive(Debug, Clone)]
pub struct RigidBodyReport {
    pub name: CompactString,
    pub position: Point3<f32>,
    pub rotation: UnitQuaternion<f32>,
}

/// One frame of motion-capture data.
#[derive(Debug, Clone, Default)]
pub struct MocapFrame {
    pub markers: Vec<Point3<f32>>,
    pub rigid_bodies: Vec<RigidBodyReport>,
}

pub trait MotionCaptureSource {
    /// Block until a frame is available and return it.
    fn wait_for_next_frame(&mut self) -> BridgeResult<MocapFrame>;
}

impl<S: MotionCaptureSource + ?Sized> MotionCaptureSource for Box<S> {
    fn wait_for_next_frame(&mut self) -> BridgeResult<MocapFrame> {
        (**self).wait_for_next_frame()
    }
}

/// Connect to a motion-capture backend by kind.
///
/// The only built-in kind is `"sim"`, a loopback source synthesizing frames
/// from the entity graph (its frame period can be set with a `period_ms`
/// option). Real protocol backends plug in by implementing
/// [`MotionCaptureSource`]; an unknown kind is a startup error.
pub fn connect(
    kind: &str,
    options: &HashMap<String, String>,
    graph: &EntityGraph,
) -> BridgeResult<Box<dyn MotionCaptureSource + Send>> {
    match kind {
        "sim" => {
            let period_ms = options
                .get("period_ms")
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(10);
            Ok(Box::new(SimSource::from_graph(
                graph,
                Duration::from_millis(period_ms),
            )))
        }
        other => Err(BridgeError::UnsupportedBackend(other.to_string())),
    }
}
