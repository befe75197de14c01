//! The pose-estimation algorithm boundary.
//!
//! The bridge treats the tracker as an opaque capability: it feeds it one
//! marker cloud per frame and reads back a stable, ordered list of tracked
//! objects. Marker-to-model matching, optimization and filtering all live
//! behind this trait, so the frame loop can be exercised against a scripted
//! implementation.

use crate::clock::BridgeTime;
use crate::BridgeResult;
use compact_str::CompactString;
use nalgebra::{Isometry3, Point3};

/// Warning sink injected into the tracker; the bridge forwards these to the
/// configured logging layer.
pub type WarningCallback = Box<dyn Fn(&str) + Send>;

/// Per-body tracking state as observed by the frame loop. Mutated once per
/// frame by the tracker, never by the loop.
#[derive(Debug, Clone)]
pub struct TrackedObject {
    pub name: CompactString,
    /// Latest pose estimate; only meaningful while `valid` is true.
    pub pose: Isometry3<f32>,
    pub valid: bool,
    /// Stamp of the last frame for which `pose` was valid.
    pub last_valid: BridgeTime,
}

pub trait RigidBodyTracker {
    /// Install the warning sink. Called once by the bridge before the loop
    /// starts.
    fn set_warning_callback(&mut self, callback: WarningCallback);

    /// Consume one frame's markers and recompute every object's
    /// pose/validity/last-valid stamp.
    fn update(&mut self, markers: &[Point3<f32>], now: BridgeTime) -> BridgeResult<()>;

    /// Read-only view of the tracked objects, one per configured rigid body,
    /// in a stable order.
    fn objects(&self) -> &[TrackedObject];
}

impl<T: RigidBodyTracker + ?Sized> RigidBodyTracker for Box<T> {
    fn set_warning_callback(&mut self, callback: WarningCallback) {
        (**self).set_warning_callback(callback)
    }

    fn update(&mut self, markers: &[Point3<f32>], now: BridgeTime) -> BridgeResult<()> {
        (**self).update(markers, now)
    }

    fn objects(&self) -> &[TrackedObject] {
        (**self).objects()
    }
}
