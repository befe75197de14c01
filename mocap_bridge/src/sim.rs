//! Loopback backend: a marker source and a stand-in tracker synthesized
//! from the entity graph.
//!
//! `SimSource` replays each configured body's marker template, transformed
//! by the body's initial pose, at a fixed rate. `SimTracker` is not a
//! tracking algorithm; it marks a body valid at its initial pose whenever
//! the frame carries enough markers for its template. Together they let the
//! node run end to end without any hardware, which is also how the
//! integration tests drive the loop.

use crate::clock::BridgeTime;
use crate::graph::EntityGraph;
use crate::mocap::{MocapFrame, MotionCaptureSource};
use crate::tracker::{RigidBodyTracker, TrackedObject, WarningCallback};
use crate::BridgeResult;
use nalgebra::Point3;
use std::thread;
use std::time::Duration;

pub struct SimSource {
    /// Every configured body's template, transformed to its initial pose.
    markers: Vec<Point3<f32>>,
    period: Duration,
}

impl SimSource {
    pub fn from_graph(graph: &EntityGraph, period: Duration) -> Self {
        let markers = graph
            .bodies()
            .iter()
            .flat_map(|body| {
                graph
                    .template_of(body)
                    .points
                    .iter()
                    .map(|p| body.initial_pose.transform_point(p))
                    .collect::<Vec<_>>()
            })
            .collect();
        SimSource { markers, period }
    }
}

impl MotionCaptureSource for SimSource {
    fn wait_for_next_frame(&mut self) -> BridgeResult<MocapFrame> {
        thread::sleep(self.period);
        let markers = self.markers.clone();
        // Marker-only backend: bodies are left for the tracker to claim.
        Ok(MocapFrame {
            markers,
            rigid_bodies: Vec::new(),
        })
    }
}

pub struct SimTracker {
    objects: Vec<TrackedObject>,
    /// Markers each body's template needs before it is considered seen.
    required: Vec<usize>,
    warn: Option<WarningCallback>,
}

impl SimTracker {
    pub fn from_graph(graph: &EntityGraph) -> Self {
        let objects = graph
            .bodies()
            .iter()
            .map(|body| TrackedObject {
                name: body.name.clone(),
                pose: body.initial_pose,
                valid: false,
                last_valid: BridgeTime::default(),
            })
            .collect();
        let required = graph
            .bodies()
            .iter()
            .map(|body| graph.template_of(body).points.len())
            .collect();
        SimTracker {
            objects,
            required,
            warn: None,
        }
    }
}

impl RigidBodyTracker for SimTracker {
    fn set_warning_callback(&mut self, callback: WarningCallback) {
        self.warn = Some(callback);
    }

    fn update(&mut self, markers: &[Point3<f32>], now: BridgeTime) -> BridgeResult<()> {
        for (object, &required) in self.objects.iter_mut().zip(&self.required) {
            if markers.len() >= required {
                object.valid = true;
                object.last_valid = now;
            } else {
                object.valid = false;
                if let Some(warn) = &self.warn {
                    warn(&format!(
                        "{}: {} markers in frame, template needs {}",
                        object.name,
                        markers.len(),
                        required
                    ));
                }
            }
        }
        Ok(())
    }

    fn objects(&self) -> &[TrackedObject] {
        &self.objects
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::BridgeDuration;
    use crate::config::ParamStore;
    use std::sync::{Arc, Mutex};

    fn graph_with_one_body() -> EntityGraph {
        let mut store = ParamStore::new();
        store.set("dynamics_configurations.default.max_velocity", [1.0, 1.0, 1.0]);
        store.set(
            "dynamics_configurations.default.max_angular_velocity",
            [1.0, 1.0, 1.0],
        );
        store.set("dynamics_configurations.default.max_roll", 0.5);
        store.set("dynamics_configurations.default.max_pitch", 0.5);
        store.set("dynamics_configurations.default.max_fitness_score", 10.0);
        store.set("marker_configurations.frame.offset", [0.0, 0.0, 0.0]);
        store.set("marker_configurations.frame.points.0", [0.1, 0.0, 0.0]);
        store.set("marker_configurations.frame.points.1", [0.0, 0.1, 0.0]);
        store.set("rigid_bodies.cf1.initial_position", [0.0, 0.0, 1.0]);
        store.set("rigid_bodies.cf1.marker", "frame");
        store.set("rigid_bodies.cf1.dynamics", "default");
        EntityGraph::resolve(&store).unwrap()
    }

    #[test]
    fn source_replays_templates_at_the_initial_pose() {
        let graph = graph_with_one_body();
        let mut source = SimSource::from_graph(&graph, Duration::ZERO);
        let frame = source.wait_for_next_frame().unwrap();
        assert_eq!(frame.markers.len(), 2);
        // Template point translated by the body's initial position.
        assert_eq!(frame.markers[0], Point3::new(0.1, 0.0, 1.0));
        assert!(frame.rigid_bodies.is_empty());
    }

    #[test]
    fn tracker_flags_bodies_seen_and_unseen() {
        let graph = graph_with_one_body();
        let mut tracker = SimTracker::from_graph(&graph);
        assert!(!tracker.objects()[0].valid);

        let markers = vec![Point3::new(0.1, 0.0, 1.0), Point3::new(0.0, 0.1, 1.0)];
        tracker.update(&markers, BridgeDuration(100)).unwrap();
        assert!(tracker.objects()[0].valid);
        assert_eq!(tracker.objects()[0].last_valid, BridgeDuration(100));

        tracker.update(&[], BridgeDuration(200)).unwrap();
        assert!(!tracker.objects()[0].valid);
        // last_valid keeps pointing at the last good frame.
        assert_eq!(tracker.objects()[0].last_valid, BridgeDuration(100));
    }

    #[test]
    fn tracker_forwards_warnings_through_the_callback() {
        let graph = graph_with_one_body();
        let mut tracker = SimTracker::from_graph(&graph);
        let seen: Arc<Mutex<Vec<String>>> = Arc::default();
        let log = seen.clone();
        tracker.set_warning_callback(Box::new(move |msg| {
            log.lock().unwrap().push(msg.to_string());
        }));

        tracker.update(&[], BridgeDuration(0)).unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert!(seen[0].contains("cf1"));
    }
}
