//! Publishing boundary: where the bridge hands off what it produced.
//!
//! Transport and wire encoding live behind this trait; the bridge only
//! guarantees that whatever it publishes is immutable once handed over.

use crate::BridgeResult;

pub trait Sink<M>: Send {
    fn publish(&mut self, msg: &M) -> BridgeResult<()>;

    fn flush(&mut self) -> BridgeResult<()> {
        Ok(())
    }
}

/// Drops everything. Handy when a deployment only cares about one of the two
/// output streams.
#[derive(Debug, Default)]
pub struct NullSink;

impl<M> Sink<M> for NullSink {
    fn publish(&mut self, _msg: &M) -> BridgeResult<()> {
        Ok(())
    }
}
