//! Messages the bridge publishes: the raw marker cloud and the per-frame
//! batch of stamped transforms.
//!
//! The point-cloud layout is fixed: three single-precision floats per point
//! at byte offsets 0/4/8, 12-byte point stride, little-endian, one row per
//! marker. The data buffer is a straight byte-copy of the marker matrix so a
//! consumer can reinterpret it without any per-point work.

use crate::clock::BridgeTime;
use crate::mocap::RigidBodyReport;
use crate::WORLD_FRAME;
use bincode::de::Decoder;
use bincode::enc::Encoder;
use bincode::error::{DecodeError, EncodeError};
use bincode::{Decode, Encode};
use compact_str::CompactString;
use nalgebra::{Isometry3, Point3};
use serde::{Deserialize, Serialize};

/// Bytes per point: x, y, z as f32.
pub const POINT_STEP: u32 = 12;

/// Field layout of one point: (name, byte offset).
pub const POINT_FIELDS: [(&str, u32); 3] = [("x", 0), ("y", 4), ("z", 8)];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointCloudMsg {
    pub stamp: BridgeTime,
    pub frame_id: CompactString,
    /// Number of points; the cloud is a single row.
    pub width: u32,
    /// `width * POINT_STEP` bytes, little-endian f32 triplets.
    pub data: Vec<u8>,
}

impl PointCloudMsg {
    pub fn from_points(stamp: BridgeTime, points: &[Point3<f32>]) -> Self {
        let mut data = Vec::with_capacity(points.len() * POINT_STEP as usize);
        for p in points {
            data.extend_from_slice(&p.x.to_le_bytes());
            data.extend_from_slice(&p.y.to_le_bytes());
            data.extend_from_slice(&p.z.to_le_bytes());
        }
        PointCloudMsg {
            stamp,
            frame_id: CompactString::const_new(WORLD_FRAME),
            width: points.len() as u32,
            data,
        }
    }

    pub fn point_count(&self) -> usize {
        self.width as usize
    }

    pub fn row_step(&self) -> usize {
        self.data.len()
    }

    /// Reinterpret the byte buffer back into points.
    pub fn points(&self) -> Vec<Point3<f32>> {
        self.data
            .chunks_exact(POINT_STEP as usize)
            .map(|chunk| {
                let x = f32::from_le_bytes(chunk[0..4].try_into().unwrap());
                let y = f32::from_le_bytes(chunk[4..8].try_into().unwrap());
                let z = f32::from_le_bytes(chunk[8..12].try_into().unwrap());
                Point3::new(x, y, z)
            })
            .collect()
    }
}

impl Encode for PointCloudMsg {
    fn encode<E: Encoder>(&self, encoder: &mut E) -> Result<(), EncodeError> {
        self.stamp.encode(encoder)?;
        self.frame_id.as_str().encode(encoder)?;
        self.width.encode(encoder)?;
        self.data.encode(encoder)
    }
}

impl Decode<()> for PointCloudMsg {
    fn decode<D: Decoder<Context = ()>>(decoder: &mut D) -> Result<Self, DecodeError> {
        Ok(PointCloudMsg {
            stamp: BridgeTime::decode(decoder)?,
            frame_id: CompactString::from(String::decode(decoder)?),
            width: u32::decode(decoder)?,
            data: Vec::<u8>::decode(decoder)?,
        })
    }
}

/// One named transform in the per-frame batch, parented to the world frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StampedTransform {
    pub stamp: BridgeTime,
    pub parent_frame: CompactString,
    pub child_frame: CompactString,
    pub translation: [f32; 3],
    /// Quaternion as x, y, z, w.
    pub rotation: [f32; 4],
}

impl StampedTransform {
    /// From a tracker pose estimate.
    pub fn from_pose(stamp: BridgeTime, child: &str, pose: &Isometry3<f32>) -> Self {
        let t = &pose.translation.vector;
        let q = &pose.rotation;
        StampedTransform {
            stamp,
            parent_frame: CompactString::const_new(WORLD_FRAME),
            child_frame: CompactString::from(child),
            translation: [t.x, t.y, t.z],
            rotation: [q.i, q.j, q.k, q.w],
        }
    }

    /// From a backend-native rigid-body report, taken verbatim.
    pub fn from_report(stamp: BridgeTime, report: &RigidBodyReport) -> Self {
        let q = &report.rotation;
        StampedTransform {
            stamp,
            parent_frame: CompactString::const_new(WORLD_FRAME),
            child_frame: report.name.clone(),
            translation: [report.position.x, report.position.y, report.position.z],
            rotation: [q.i, q.j, q.k, q.w],
        }
    }
}

impl Encode for StampedTransform {
    fn encode<E: Encoder>(&self, encoder: &mut E) -> Result<(), EncodeError> {
        self.stamp.encode(encoder)?;
        self.parent_frame.as_str().encode(encoder)?;
        self.child_frame.as_str().encode(encoder)?;
        self.translation.encode(encoder)?;
        self.rotation.encode(encoder)
    }
}

impl Decode<()> for StampedTransform {
    fn decode<D: Decoder<Context = ()>>(decoder: &mut D) -> Result<Self, DecodeError> {
        Ok(StampedTransform {
            stamp: BridgeTime::decode(decoder)?,
            parent_frame: CompactString::from(String::decode(decoder)?),
            child_frame: CompactString::from(String::decode(decoder)?),
            translation: <[f32; 3]>::decode(decoder)?,
            rotation: <[f32; 4]>::decode(decoder)?,
        })
    }
}
