//! Connector primitive interface consumed by test runners.
//!
//! Every way the harness reaches a device (local serial, remote resource,
//! simulator) presents the same surface. Only remote sessions live in this
//! workspace.

use crate::error::ErrorRecord;
use async_trait::async_trait;
use bytes::Bytes;

#[async_trait]
pub trait ConnectorPrimitive: Send + Sync {
    /// Read up to `count` bytes. Returns empty when nothing is connected.
    async fn read(&self, count: usize) -> Bytes;

    /// Write `payload` as one discrete write and return it unchanged.
    /// With `echo` set the payload is also logged.
    async fn write(&self, payload: Bytes, echo: bool) -> Bytes;

    async fn flush(&self);

    fn connected(&self) -> bool;

    fn error(&self) -> Option<ErrorRecord>;

    /// Release everything held. Idempotent and infallible.
    async fn finish(&mut self);
}
