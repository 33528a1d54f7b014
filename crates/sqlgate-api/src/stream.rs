//! Bridging synchronous result encoding to the async response body.
//!
//! The encoder runs on a blocking worker and writes through [`ChannelWriter`]
//! into a bounded channel; [`BodyStream`] drains the channel as the HTTP
//! response body. Backpressure is the channel bound: the driver's row loop
//! stalls when the client reads slowly. A dropped receiver (client gone)
//! surfaces as a write error, aborting the row loop on the worker.

use actix_web::web::Bytes;
use futures_util::Stream;
use sqlgate_commons::GatewayError;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc::{Receiver, Sender};

pub type StreamItem = Result<Bytes, GatewayError>;

const FLUSH_THRESHOLD: usize = 16 * 1024;

/// `io::Write` over a bounded byte channel, chunking output.
pub struct ChannelWriter {
    tx: Sender<StreamItem>,
    buffer: Vec<u8>,
}

impl ChannelWriter {
    pub fn new(tx: Sender<StreamItem>) -> Self {
        Self {
            tx,
            buffer: Vec::with_capacity(FLUSH_THRESHOLD),
        }
    }

    fn send_buffer(&mut self) -> io::Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let chunk = Bytes::from(std::mem::take(&mut self.buffer));
        self.tx
            .blocking_send(Ok(chunk))
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "response receiver dropped"))
    }
}

impl io::Write for ChannelWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        if self.buffer.len() >= FLUSH_THRESHOLD {
            self.send_buffer()?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.send_buffer()
    }
}

/// Response body stream: an optional already-received first chunk, then the
/// rest of the channel.
pub struct BodyStream {
    first: Option<Bytes>,
    rx: Receiver<StreamItem>,
}

impl BodyStream {
    pub fn new(first: Bytes, rx: Receiver<StreamItem>) -> Self {
        Self {
            first: Some(first),
            rx,
        }
    }
}

impl Stream for BodyStream {
    type Item = StreamItem;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if let Some(first) = self.first.take() {
            return Poll::Ready(Some(Ok(first)));
        }
        self.rx.poll_recv(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;
    use std::io::Write;

    #[tokio::test]
    async fn test_writer_chunks_reach_stream_in_order() {
        let (tx, rx) = tokio::sync::mpsc::channel(8);
        let worker = tokio::task::spawn_blocking(move || {
            let mut w = ChannelWriter::new(tx);
            w.write_all(b"hello ").unwrap();
            w.write_all(b"world").unwrap();
            w.flush().unwrap();
        });
        worker.await.unwrap();

        let mut stream = BodyStream::new(Bytes::from_static(b"head:"), rx);
        let mut collected = Vec::new();
        while let Some(item) = stream.next().await {
            collected.extend_from_slice(&item.unwrap());
        }
        assert_eq!(collected, b"head:hello world");
    }

    #[tokio::test]
    async fn test_dropped_receiver_fails_writes() {
        let (tx, rx) = tokio::sync::mpsc::channel(1);
        drop(rx);
        let worker = tokio::task::spawn_blocking(move || {
            let mut w = ChannelWriter::new(tx);
            w.write_all(b"data").unwrap();
            w.flush()
        });
        let result = worker.await.unwrap();
        assert_eq!(result.unwrap_err().kind(), io::ErrorKind::BrokenPipe);
    }
}
