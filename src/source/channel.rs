//! In-memory packet source backed by a bounded channel.
//!
//! Every blocking capture backend runs on its own thread and feeds a
//! [`PacketSender`]; the session worker reads the paired [`ChannelSource`].
//! Tests and embedders can drive the pipeline the same way.

use std::{collections::VecDeque, sync::Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{CapturedPacket, PacketSource, SourceError, SourceFactory};

type Item = Result<CapturedPacket, SourceError>;

/// Create a connected sender/source pair holding at most `capacity` packets.
///
/// # Panics
///
/// Panics if `capacity` is zero.
#[must_use]
pub fn channel(capacity: usize) -> (PacketSender, ChannelSource) {
    let (tx, rx) = mpsc::channel(capacity);
    (PacketSender { tx }, ChannelSource { rx })
}

/// Producer half of a [`ChannelSource`].
///
/// Dropping every sender signals end of stream.
#[derive(Clone, Debug)]
pub struct PacketSender {
    tx: mpsc::Sender<Item>,
}

impl PacketSender {
    /// Queue a packet, waiting for space.
    ///
    /// Returns `false` once the source has been dropped or closed.
    pub async fn send(&self, packet: CapturedPacket) -> bool {
        self.tx.send(Ok(packet)).await.is_ok()
    }

    /// Queue a packet from a non-async thread.
    ///
    /// Returns `false` once the source has been dropped or closed.
    pub fn blocking_send(&self, packet: CapturedPacket) -> bool {
        self.tx.blocking_send(Ok(packet)).is_ok()
    }

    /// Report a device failure from an async context, ending the stream.
    pub async fn fail(&self, error: SourceError) { let _ = self.tx.send(Err(error)).await; }

    /// Report a device failure from a non-async thread, ending the stream.
    pub fn blocking_fail(&self, error: SourceError) { let _ = self.tx.blocking_send(Err(error)); }

    /// Returns true once the consuming source is gone.
    #[must_use]
    pub fn is_closed(&self) -> bool { self.tx.is_closed() }
}

/// Packet source reading from a [`PacketSender`].
#[derive(Debug)]
pub struct ChannelSource {
    rx: mpsc::Receiver<Item>,
}

#[async_trait]
impl PacketSource for ChannelSource {
    async fn next_packet(&mut self) -> Result<Option<CapturedPacket>, SourceError> {
        self.rx.recv().await.transpose()
    }

    fn close(&mut self) { self.rx.close(); }
}

/// Factory handing out pre-built channel sources, one per session.
#[derive(Debug, Default)]
pub struct ChannelFactory {
    sources: Mutex<VecDeque<ChannelSource>>,
}

impl ChannelFactory {
    /// Empty factory.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Create a new channel, queue its source, and return the sender.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn push_channel(&self, capacity: usize) -> PacketSender {
        let (tx, source) = channel(capacity);
        self.push(source);
        tx
    }

    /// Queue a source for a later session.
    pub fn push(&self, source: ChannelSource) {
        self.sources
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push_back(source);
    }
}

#[async_trait]
impl SourceFactory for ChannelFactory {
    async fn open(&self) -> Result<Box<dyn PacketSource>, SourceError> {
        let source = self
            .sources
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .pop_front()
            .ok_or(SourceError::Exhausted)?;
        Ok(Box::new(source))
    }

    fn describe(&self) -> String { "channel".to_owned() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::client_packet;

    #[tokio::test]
    async fn yields_packets_then_end_of_stream() {
        let (tx, mut source) = channel(4);
        assert!(tx.send(client_packet(&b"abc"[..], 1)).await);
        drop(tx);

        let packet = source
            .next_packet()
            .await
            .expect("no error")
            .expect("one packet");
        assert_eq!(packet.payload.as_ref(), b"abc");
        assert!(source.next_packet().await.expect("no error").is_none());
    }

    #[tokio::test]
    async fn failure_is_reported() {
        let (tx, mut source) = channel(1);
        tx.fail(SourceError::Device("link down".into())).await;
        let err = source.next_packet().await.expect_err("device failure");
        assert!(matches!(err, SourceError::Device(ref msg) if msg == "link down"));
    }

    #[tokio::test]
    async fn closing_the_source_is_visible_to_senders() {
        let (tx, mut source) = channel(1);
        source.close();
        assert!(tx.is_closed());
        assert!(!tx.send(client_packet(&b"x"[..], 0)).await);
    }

    #[tokio::test]
    async fn factory_hands_out_each_source_once() {
        let factory = ChannelFactory::new();
        let _tx = factory.push_channel(1);
        assert!(factory.open().await.is_ok());
        assert!(matches!(factory.open().await, Err(SourceError::Exhausted)));
    }
}
