//! Byte streams and the tee splitter

use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use std::io;
use std::pin::Pin;
use tokio::sync::mpsc;

/// A chunked binary stream, the currency between sources, writers and decoders
pub type ByteStream = Pin<Box<dyn Stream<Item = io::Result<Bytes>> + Send>>;

/// Split one stream into two independently consumable copies.
///
/// A forwarder task reads the source exactly once and fans each chunk out to
/// both outputs, so a single remote read can feed a decoder and a background
/// writer at the same time. Dropping one output does not stall the other; the
/// forwarder stops once both are gone.
pub fn tee(mut stream: ByteStream) -> (ByteStream, ByteStream) {
    let (tx_a, rx_a) = mpsc::unbounded_channel::<io::Result<Bytes>>();
    let (tx_b, rx_b) = mpsc::unbounded_channel::<io::Result<Bytes>>();

    tokio::spawn(async move {
        while let Some(item) = stream.next().await {
            let (a, b) = match item {
                Ok(chunk) => (Ok(chunk.clone()), Ok(chunk)),
                // io::Error is not Clone; both sides get an equivalent copy
                Err(err) => {
                    let copy = io::Error::new(err.kind(), err.to_string());
                    (Err(copy), Err(err))
                }
            };
            let a_alive = tx_a.send(a).is_ok();
            let b_alive = tx_b.send(b).is_ok();
            if !a_alive && !b_alive {
                break;
            }
        }
    });

    (receiver_stream(rx_a), receiver_stream(rx_b))
}

fn receiver_stream(rx: mpsc::UnboundedReceiver<io::Result<Bytes>>) -> ByteStream {
    Box::pin(futures_util::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|item| (item, rx))
    }))
}
