//! The resolved entity graph: dynamics profiles, marker templates and
//! rigid-body definitions, built once from a [`ParamStore`] before the frame
//! loop starts and read-only thereafter.
//!
//! The build is two-phase: every namespace is parsed into typed records
//! first, and only then are the rigid bodies' name references resolved to
//! indices. A dangling reference fails the whole build; there is no partial
//! graph. Names come out of [`ParamStore::extract_names`] sorted, so index
//! assignment does not depend on key ordering in the parameter file.

use crate::config::{ConfigError, ParamStore};
use compact_str::CompactString;
use nalgebra::{Isometry3, Point3, Translation3, UnitQuaternion, Vector3};
use std::collections::HashMap;

pub const DYNAMICS_NS: &str = "dynamics_configurations";
pub const MARKERS_NS: &str = "marker_configurations";
pub const BODIES_NS: &str = "rigid_bodies";

/// Named bounds on a rigid body's motion, used by the tracker to gate pose
/// updates.
#[derive(Debug, Clone, PartialEq)]
pub struct DynamicsProfile {
    pub name: CompactString,
    /// Max linear velocity per axis, m/s.
    pub max_velocity: Vector3<f64>,
    /// Max roll/pitch/yaw rate, rad/s.
    pub max_angular_velocity: Vector3<f64>,
    pub max_roll: f64,
    pub max_pitch: f64,
    /// Tracking-quality threshold beyond which a fit is rejected.
    pub max_fitness_score: f64,
}

/// Named geometric pattern of markers on a tracked object. The per-template
/// offset is already applied to every stored point.
#[derive(Debug, Clone, PartialEq)]
pub struct MarkerTemplate {
    pub name: CompactString,
    pub points: Vec<Point3<f32>>,
}

/// A named tracked entity binding one marker template and one dynamics
/// profile (both by resolved index) with an initial pose.
#[derive(Debug, Clone, PartialEq)]
pub struct RigidBodyDef {
    pub name: CompactString,
    /// Translation-only at build time; the tracker owns the live pose.
    pub initial_pose: Isometry3<f32>,
    pub marker: usize,
    pub dynamics: usize,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct EntityGraph {
    dynamics: Vec<DynamicsProfile>,
    templates: Vec<MarkerTemplate>,
    bodies: Vec<RigidBodyDef>,
    dynamics_index: HashMap<CompactString, usize>,
    marker_index: HashMap<CompactString, usize>,
}

/// Rigid-body record before cross-reference resolution.
struct BodyRecord {
    name: String,
    position: [f64; 3],
    marker: String,
    dynamics: String,
}

impl EntityGraph {
    /// Pure function of the store: resolving the same parameters twice
    /// yields identical graphs, indices included.
    pub fn resolve(params: &ParamStore) -> Result<Self, ConfigError> {
        let mut graph = EntityGraph::default();

        for name in params.extract_names(DYNAMICS_NS) {
            let field = |f: &str| format!("{DYNAMICS_NS}.{name}.{f}");
            let profile = DynamicsProfile {
                max_velocity: Vector3::from(params.get_vec3(&field("max_velocity"))?),
                max_angular_velocity: Vector3::from(
                    params.get_vec3(&field("max_angular_velocity"))?,
                ),
                max_roll: params.get_f64(&field("max_roll"))?,
                max_pitch: params.get_f64(&field("max_pitch"))?,
                max_fitness_score: params.get_f64(&field("max_fitness_score"))?,
                name: CompactString::from(name.as_str()),
            };
            graph
                .dynamics_index
                .insert(profile.name.clone(), graph.dynamics.len());
            graph.dynamics.push(profile);
        }

        for name in params.extract_names(MARKERS_NS) {
            let offset = params.get_vec3(&format!("{MARKERS_NS}.{name}.offset"))?;
            let points = Self::collect_points(params, &name, offset)?;
            let template = MarkerTemplate {
                name: CompactString::from(name.as_str()),
                points,
            };
            graph
                .marker_index
                .insert(template.name.clone(), graph.templates.len());
            graph.templates.push(template);
        }

        // Parse all rigid-body records before resolving any reference, so a
        // dangling name never leaves a half-built graph behind.
        let mut records = Vec::new();
        for name in params.extract_names(BODIES_NS) {
            let field = |f: &str| format!("{BODIES_NS}.{name}.{f}");
            records.push(BodyRecord {
                position: params.get_vec3(&field("initial_position"))?,
                marker: params.get_str(&field("marker"))?.to_string(),
                dynamics: params.get_str(&field("dynamics"))?.to_string(),
                name,
            });
        }

        for record in records {
            let marker = *graph
                .marker_index
                .get(record.marker.as_str())
                .ok_or_else(|| ConfigError::UnresolvedReference {
                    body: record.name.clone(),
                    namespace: "marker template",
                    name: record.marker.clone(),
                })?;
            let dynamics = *graph
                .dynamics_index
                .get(record.dynamics.as_str())
                .ok_or_else(|| ConfigError::UnresolvedReference {
                    body: record.name.clone(),
                    namespace: "dynamics profile",
                    name: record.dynamics.clone(),
                })?;
            let [x, y, z] = record.position;
            graph.bodies.push(RigidBodyDef {
                name: CompactString::from(record.name),
                initial_pose: Isometry3::from_parts(
                    Translation3::new(x as f32, y as f32, z as f32),
                    UnitQuaternion::identity(),
                ),
                marker,
                dynamics,
            });
        }

        Ok(graph)
    }

    /// Every key under `<name>.points*` is one 3D point. The suffix after
    /// `points` is parsed as an integer index and the points are sorted by
    /// it, so positional order is explicit rather than whatever the store
    /// iteration happens to give.
    fn collect_points(
        params: &ParamStore,
        name: &str,
        offset: [f64; 3],
    ) -> Result<Vec<Point3<f32>>, ConfigError> {
        let prefix = format!("{MARKERS_NS}.{name}.points");
        let mut point_keys: Vec<(Option<u32>, String)> = params
            .keys_with_prefix(&prefix)
            .map(|key| {
                let suffix = key[prefix.len()..].trim_start_matches('.');
                (suffix.parse::<u32>().ok(), key.to_string())
            })
            .collect();
        point_keys.sort();

        let mut points = Vec::with_capacity(point_keys.len());
        for (_, key) in &point_keys {
            let [x, y, z] = params.get_vec3(key)?;
            points.push(Point3::new(
                (x + offset[0]) as f32,
                (y + offset[1]) as f32,
                (z + offset[2]) as f32,
            ));
        }
        Ok(points)
    }

    pub fn dynamics(&self) -> &[DynamicsProfile] {
        &self.dynamics
    }

    pub fn templates(&self) -> &[MarkerTemplate] {
        &self.templates
    }

    pub fn bodies(&self) -> &[RigidBodyDef] {
        &self.bodies
    }

    pub fn dynamics_index_of(&self, name: &str) -> Option<usize> {
        self.dynamics_index.get(name).copied()
    }

    pub fn marker_index_of(&self, name: &str) -> Option<usize> {
        self.marker_index.get(name).copied()
    }

    /// The marker template a body references.
    pub fn template_of(&self, body: &RigidBodyDef) -> &MarkerTemplate {
        &self.templates[body.marker]
    }
}
