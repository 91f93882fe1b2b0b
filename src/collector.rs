//! Synchronous Zipkin collector client.

use std::fmt;

use thrift::protocol::{TBinaryOutputProtocol, TOutputProtocol};
use thrift::transport::{TFramedWriteTransport, TIoChannel, TTcpChannel, WriteHalf};

use crate::error::TraceResult;
use crate::model;
use crate::sink::SpanSink;
use crate::span::Span;
use crate::tracer_debug;

type CollectorProtocol = TBinaryOutputProtocol<TFramedWriteTransport<WriteHalf<TTcpChannel>>>;

/// [`SpanSink`] delivering spans to a Zipkin collector over framed TCP,
/// one binary-Thrift span per frame.
///
/// The connection is opened lazily on first delivery and dropped on any
/// failure, so the first delivery after the collector recovers
/// reconnects.
pub struct CollectorSink {
    address: String,
    connection: Option<CollectorProtocol>,
}

impl CollectorSink {
    /// Create a sink for the collector at `host:port`. No connection is
    /// attempted until the first delivery.
    pub fn new(host: &str, port: u16) -> Self {
        CollectorSink {
            address: format!("{host}:{port}"),
            connection: None,
        }
    }

    fn connect(address: &str) -> thrift::Result<CollectorProtocol> {
        let mut channel = TTcpChannel::new();
        channel.open(address)?;
        let (_read_half, write_half) = channel.split()?;
        Ok(TBinaryOutputProtocol::new(
            TFramedWriteTransport::new(write_half),
            true,
        ))
    }

    fn write_batch(&mut self, batch: &[Span]) -> thrift::Result<()> {
        let mut connection = match self.connection.take() {
            Some(connection) => connection,
            None => {
                let connection = Self::connect(&self.address)?;
                tracer_debug!(name: "CollectorSink.Connected", address = self.address.clone());
                connection
            }
        };
        let outcome = write_all(&mut connection, batch);
        if outcome.is_ok() {
            self.connection = Some(connection);
        }
        outcome
    }
}

fn write_all(protocol: &mut CollectorProtocol, batch: &[Span]) -> thrift::Result<()> {
    for span in batch {
        model::write_span(span, protocol)?;
        protocol.flush()?;
    }
    Ok(())
}

impl SpanSink for CollectorSink {
    fn submit(&mut self, batch: Vec<Span>) -> TraceResult<()> {
        // On failure the connection stays dropped; the next submit after
        // the health probe re-enables tracing will reconnect.
        self.write_batch(&batch).map_err(Into::into)
    }

    fn shutdown(&mut self) {
        if let Some(mut connection) = self.connection.take() {
            let _ = connection.flush();
        }
    }
}

impl fmt::Debug for CollectorSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollectorSink")
            .field("address", &self.address)
            .field("connected", &self.connection.is_some())
            .finish()
    }
}
