//! The per-frame orchestration loop.
//!
//! One iteration: block on the motion-capture source, publish the raw cloud,
//! run the tracking update, merge backend-native rigid-body reports with the
//! tracker's valid objects into a single transform batch, and report the
//! invalid ones as stale. The loop is strictly sequential; the only blocking
//! point is frame acquisition and the only cancellation point is the
//! shutdown check at the top of each iteration.

use crate::clock::{BridgeClock, BridgeDuration, BridgeTime};
use crate::mocap::MotionCaptureSource;
use crate::payloads::{PointCloudMsg, StampedTransform};
use crate::sink::Sink;
use crate::tracker::RigidBodyTracker;
use crate::{BridgeResult, WORLD_FRAME};
use compact_str::CompactString;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Cooperative cancellation handle. Clones observe the same flag, so one
/// copy can live in a ctrl-c handler while the loop polls another.
#[derive(Clone, Debug, Default)]
pub struct ShutdownToken(Arc<AtomicBool>);

impl ShutdownToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shutdown(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_shutdown(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// A tracked object that had no valid pose this frame: no transform was
/// emitted for it, only this report.
#[derive(Debug, Clone, PartialEq)]
pub struct StaleReport {
    pub name: CompactString,
    /// Time since the object's last valid pose.
    pub elapsed: BridgeDuration,
}

/// What one loop iteration produced; ephemeral, rebuilt every frame.
#[derive(Debug, Clone)]
pub struct FrameOutcome {
    pub stamp: BridgeTime,
    pub marker_count: usize,
    pub transform_count: usize,
    pub stale: Vec<StaleReport>,
}

pub struct TrackingBridge<SRC, TRK, PCS, TFS>
where
    SRC: MotionCaptureSource,
    TRK: RigidBodyTracker,
    PCS: Sink<PointCloudMsg>,
    TFS: Sink<Vec<StampedTransform>>,
{
    source: SRC,
    tracker: TRK,
    cloud_sink: PCS,
    tf_sink: TFS,
    clock: BridgeClock,
    shutdown: ShutdownToken,
}

impl<SRC, TRK, PCS, TFS> TrackingBridge<SRC, TRK, PCS, TFS>
where
    SRC: MotionCaptureSource,
    TRK: RigidBodyTracker,
    PCS: Sink<PointCloudMsg>,
    TFS: Sink<Vec<StampedTransform>>,
{
    pub fn new(
        source: SRC,
        mut tracker: TRK,
        cloud_sink: PCS,
        tf_sink: TFS,
        clock: BridgeClock,
        shutdown: ShutdownToken,
    ) -> Self {
        tracker.set_warning_callback(Box::new(|msg| warn!(target: "tracker", "{msg}")));
        TrackingBridge {
            source,
            tracker,
            cloud_sink,
            tf_sink,
            clock,
            shutdown,
        }
    }

    /// Run until the shutdown token is set. Any source/tracker/sink error
    /// ends the loop; staleness never does.
    pub fn run(&mut self) -> BridgeResult<()> {
        while !self.shutdown.is_shutdown() {
            let outcome = self.step()?;
            debug!(
                "frame at {}: {} markers, {} transforms, {} stale",
                outcome.stamp,
                outcome.marker_count,
                outcome.transform_count,
                outcome.stale.len()
            );
        }
        self.cloud_sink.flush()?;
        self.tf_sink.flush()?;
        Ok(())
    }

    /// One iteration: acquire, publish, track, merge.
    pub fn step(&mut self) -> BridgeResult<FrameOutcome> {
        let frame = self.source.wait_for_next_frame()?;
        let stamp = self.clock.now();

        // Raw cloud goes out unchanged, whatever the tracker makes of it.
        let cloud = PointCloudMsg::from_points(stamp, &frame.markers);
        self.cloud_sink.publish(&cloud)?;

        self.tracker.update(&frame.markers, stamp)?;

        // Fixed batch order: backend-native bodies first, then every tracked
        // object that currently has a valid pose.
        let objects = self.tracker.objects();
        let mut transforms = Vec::with_capacity(frame.rigid_bodies.len() + objects.len());
        for report in &frame.rigid_bodies {
            transforms.push(StampedTransform::from_report(stamp, report));
        }

        let mut stale = Vec::new();
        for object in objects {
            if object.valid {
                transforms.push(StampedTransform::from_pose(
                    stamp,
                    &object.name,
                    &object.pose,
                ));
            } else {
                let elapsed = stamp.elapsed_since(object.last_valid);
                warn!("no updated pose for {} for {}", object.name, elapsed);
                stale.push(StaleReport {
                    name: object.name.clone(),
                    elapsed,
                });
            }
        }

        let transform_count = transforms.len();
        if !transforms.is_empty() {
            self.tf_sink.publish(&transforms)?;
        }

        Ok(FrameOutcome {
            stamp,
            marker_count: frame.markers.len(),
            transform_count,
            stale,
        })
    }

    pub fn shutdown_token(&self) -> ShutdownToken {
        self.shutdown.clone()
    }
}

/// Frame every transform in the batch is parented to.
pub const PARENT_FRAME: &str = WORLD_FRAME;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocap::{MocapFrame, RigidBodyReport};
    use crate::tracker::{TrackedObject, WarningCallback};
    use crate::BridgeError;
    use nalgebra::{Isometry3, Point3, Translation3, UnitQuaternion};
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Yields scripted frames; sets the shutdown token when the last one
    /// goes out so `run` stops after processing it.
    struct ScriptedSource {
        frames: VecDeque<MocapFrame>,
        shutdown: ShutdownToken,
    }

    impl MotionCaptureSource for ScriptedSource {
        fn wait_for_next_frame(&mut self) -> BridgeResult<MocapFrame> {
            let frame = self
                .frames
                .pop_front()
                .ok_or_else(|| BridgeError::Source("no more frames".into()))?;
            if self.frames.is_empty() {
                self.shutdown.shutdown();
            }
            Ok(frame)
        }
    }

    /// Replays a fixed object list on every update.
    struct ScriptedTracker {
        objects: Vec<TrackedObject>,
    }

    impl RigidBodyTracker for ScriptedTracker {
        fn set_warning_callback(&mut self, _callback: WarningCallback) {}

        fn update(&mut self, _markers: &[Point3<f32>], _now: BridgeTime) -> BridgeResult<()> {
            Ok(())
        }

        fn objects(&self) -> &[TrackedObject] {
            &self.objects
        }
    }

    struct RecordingSink<M>(Arc<Mutex<Vec<M>>>);

    impl<M> Default for RecordingSink<M> {
        fn default() -> Self {
            RecordingSink(Arc::new(Mutex::new(Vec::new())))
        }
    }

    impl<M: Clone + Send> Sink<M> for RecordingSink<M> {
        fn publish(&mut self, msg: &M) -> BridgeResult<()> {
            self.0.lock().unwrap().push(msg.clone());
            Ok(())
        }
    }

    fn object(name: &str, z: f32, valid: bool, last_valid: BridgeTime) -> TrackedObject {
        TrackedObject {
            name: name.into(),
            pose: Isometry3::from_parts(
                Translation3::new(0.0, 0.0, z),
                UnitQuaternion::identity(),
            ),
            valid,
            last_valid,
        }
    }

    fn report(name: &str) -> RigidBodyReport {
        RigidBodyReport {
            name: name.into(),
            position: Point3::new(1.0, 0.0, 0.0),
            rotation: UnitQuaternion::identity(),
        }
    }

    fn bridge_with(
        frames: Vec<MocapFrame>,
        objects: Vec<TrackedObject>,
        clock: BridgeClock,
    ) -> (
        TrackingBridge<
            ScriptedSource,
            ScriptedTracker,
            RecordingSink<PointCloudMsg>,
            RecordingSink<Vec<StampedTransform>>,
        >,
        Arc<Mutex<Vec<PointCloudMsg>>>,
        Arc<Mutex<Vec<Vec<StampedTransform>>>>,
    ) {
        let shutdown = ShutdownToken::new();
        let source = ScriptedSource {
            frames: frames.into(),
            shutdown: shutdown.clone(),
        };
        let tracker = ScriptedTracker { objects };
        let clouds = RecordingSink::default();
        let transforms = RecordingSink::default();
        let clouds_log = clouds.0.clone();
        let transforms_log = transforms.0.clone();
        let bridge = TrackingBridge::new(source, tracker, clouds, transforms, clock, shutdown);
        (bridge, clouds_log, transforms_log)
    }

    #[test]
    fn batch_is_backend_reports_then_valid_objects() {
        let (clock, mock) = BridgeClock::mock();
        mock.increment(Duration::from_secs(5));
        let frame = MocapFrame {
            markers: vec![Point3::new(0.0, 0.0, 0.0)],
            rigid_bodies: vec![report("native1"), report("native2")],
        };
        let t3 = Duration::from_secs(3).into();
        let objects = vec![
            object("cf1", 1.0, true, t3),
            object("cf2", 2.0, false, t3),
            object("cf3", 3.0, true, t3),
        ];
        let (mut bridge, _clouds, transforms) = bridge_with(vec![frame], objects, clock);

        let outcome = bridge.step().unwrap();

        // b=2 backend bodies + v=2 valid objects, in that order.
        assert_eq!(outcome.transform_count, 4);
        let batches = transforms.lock().unwrap();
        assert_eq!(batches.len(), 1);
        let names: Vec<&str> = batches[0].iter().map(|t| t.child_frame.as_str()).collect();
        assert_eq!(names, ["native1", "native2", "cf1", "cf3"]);
        assert!(batches[0].iter().all(|t| t.parent_frame == PARENT_FRAME));

        // The invalid object contributed exactly one stale report, 2s old.
        assert_eq!(outcome.stale.len(), 1);
        assert_eq!(outcome.stale[0].name, "cf2");
        assert_eq!(outcome.stale[0].elapsed.as_secs_f64(), 2.0);
    }

    #[test]
    fn empty_batch_is_not_published() {
        let (clock, mock) = BridgeClock::mock();
        mock.increment(Duration::from_secs(1));
        let frame = MocapFrame {
            markers: vec![Point3::new(0.5, 0.5, 0.5)],
            rigid_bodies: vec![],
        };
        let objects = vec![object("cf1", 1.0, false, BridgeDuration(0))];
        let (mut bridge, clouds, transforms) = bridge_with(vec![frame], objects, clock);

        let outcome = bridge.step().unwrap();

        assert_eq!(outcome.transform_count, 0);
        assert!(transforms.lock().unwrap().is_empty());
        // The raw cloud still goes out.
        assert_eq!(clouds.lock().unwrap().len(), 1);
    }

    #[test]
    fn cloud_is_published_unchanged_every_frame() {
        let (clock, _mock) = BridgeClock::mock();
        let markers = vec![Point3::new(1.0, 2.0, 3.0), Point3::new(4.0, 5.0, 6.0)];
        let frame = MocapFrame {
            markers: markers.clone(),
            rigid_bodies: vec![],
        };
        let (mut bridge, clouds, _transforms) = bridge_with(vec![frame], vec![], clock);

        bridge.step().unwrap();

        let clouds = clouds.lock().unwrap();
        assert_eq!(clouds[0].point_count(), 2);
        assert_eq!(clouds[0].points(), markers);
    }

    #[test]
    fn run_processes_every_frame_then_stops_on_shutdown() {
        let (clock, _mock) = BridgeClock::mock();
        let frames = (0..3)
            .map(|i| MocapFrame {
                markers: vec![Point3::new(i as f32, 0.0, 0.0)],
                rigid_bodies: vec![report("native1")],
            })
            .collect();
        let (mut bridge, clouds, transforms) = bridge_with(frames, vec![], clock);

        bridge.run().unwrap();

        assert_eq!(clouds.lock().unwrap().len(), 3);
        assert_eq!(transforms.lock().unwrap().len(), 3);
    }

    #[test]
    fn source_failure_is_fatal_to_the_loop() {
        let (clock, _mock) = BridgeClock::mock();
        // No frames scripted: the source errors on the first acquisition.
        let (mut bridge, _clouds, _transforms) = bridge_with(vec![], vec![], clock);
        assert!(matches!(bridge.run(), Err(BridgeError::Source(_))));
    }
}
