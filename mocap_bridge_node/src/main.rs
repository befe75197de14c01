//! Runnable bridge node: loads a parameter file, resolves the entity graph,
//! connects a motion-capture backend and runs the frame loop until ctrl-c.
//!
//! The transform/point-cloud sinks here just log what would be broadcast;
//! a deployment swaps in transport-backed [`Sink`] implementations.

use clap::Parser;
use mocap_bridge::sim::SimTracker;
use mocap_bridge::{
    connect, BridgeClock, BridgeResult, EntityGraph, ParamStore, PointCloudMsg, ShutdownToken,
    Sink, StampedTransform, TrackingBridge,
};
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::{debug, info};

#[derive(Parser, Debug)]
#[command(name = "mocap-bridge-node", about = "Motion-capture rigid-body tracking bridge")]
struct Args {
    /// Parameter file: a RON map of dotted keys.
    #[arg(long, default_value = "params.ron")]
    params: PathBuf,

    /// Motion-capture backend kind; overrides the store's "type" key.
    #[arg(long)]
    backend: Option<String>,

    /// Backend hostname; overrides the store's "hostname" key.
    #[arg(long)]
    hostname: Option<String>,
}

struct CloudLogSink;

impl Sink<PointCloudMsg> for CloudLogSink {
    fn publish(&mut self, msg: &PointCloudMsg) -> BridgeResult<()> {
        debug!(
            "point cloud at {}: {} points ({} bytes)",
            msg.stamp,
            msg.point_count(),
            msg.row_step()
        );
        Ok(())
    }
}

struct TransformLogSink;

impl Sink<Vec<StampedTransform>> for TransformLogSink {
    fn publish(&mut self, batch: &Vec<StampedTransform>) -> BridgeResult<()> {
        for tf in batch {
            debug!(
                "{} -> {} at {}: t=[{:.3}, {:.3}, {:.3}]",
                tf.parent_frame,
                tf.child_frame,
                tf.stamp,
                tf.translation[0],
                tf.translation[1],
                tf.translation[2]
            );
        }
        Ok(())
    }
}

fn main() {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let store = ParamStore::load(&args.params).expect("Failed to load the parameter file.");

    let kind = args
        .backend
        .or_else(|| store.get_str("type").ok().map(str::to_string))
        .unwrap_or_else(|| "vicon".to_string());
    let hostname = args
        .hostname
        .or_else(|| store.get_str("hostname").ok().map(str::to_string))
        .unwrap_or_else(|| "localhost".to_string());

    let graph = EntityGraph::resolve(&store).expect("Invalid tracking configuration.");
    info!(
        "entity graph: {} dynamics profiles, {} marker templates, {} rigid bodies",
        graph.dynamics().len(),
        graph.templates().len(),
        graph.bodies().len()
    );

    let mut options = HashMap::new();
    options.insert("hostname".to_string(), hostname);
    let source = connect(&kind, &options, &graph).expect("Failed to connect the backend.");
    info!("connected to '{kind}' motion-capture backend");

    // The estimation algorithm plugs in behind RigidBodyTracker; the
    // loopback tracker keeps the node runnable on its own.
    let tracker = SimTracker::from_graph(&graph);

    let shutdown = ShutdownToken::new();
    let handler_token = shutdown.clone();
    ctrlc::set_handler(move || handler_token.shutdown()).expect("Error setting Ctrl-C handler");

    let mut bridge = TrackingBridge::new(
        source,
        tracker,
        CloudLogSink,
        TransformLogSink,
        BridgeClock::new(),
        shutdown,
    );
    info!("running");
    bridge.run().expect("Bridge loop failed.");
    info!("shut down");
}
