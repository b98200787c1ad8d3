//! Per-connection frame loop.
//!
//! A [`Connection`] owns one upgraded stream and runs until the peer
//! closes, the liveness monitor gives up, or a fatal error occurs.
//!
//! # Event Loop
//!
//! Each iteration waits on four sources:
//!
//! - Shutdown signal: sends Close and ends the loop
//! - Fragment deadline: flushes a stalled fragmented message as partial
//! - Liveness tick: pings an idle peer, later closes the connection
//! - Readable stream: decodes and dispatches one frame
//!
//! Protocol violations (unmasked frames, stray continuations, reserved
//! length markers) are logged and skipped. Everything else ends the loop.

// ============================================================================
// Imports
// ============================================================================

use std::future;
use std::io;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::watch;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, error, trace, warn};

use crate::error::{Error, Result};
use crate::identifiers::ConnectionId;
use crate::protocol::{
    Frame, FrameReader, Opcode, decode_frame, encode_ping, encode_pong, encode_text,
};
use crate::server::ServerOptions;
use crate::session::{
    ControlAction, LivenessAction, LivenessMonitor, Message, Reassembler, close_connection,
    handle_control,
};
use crate::sink::MessageSink;
use crate::visualize::visualization_message;

// ============================================================================
// Constants
// ============================================================================

/// Prefix of the text reply sent for single-frame messages.
pub const ECHO_PREFIX: &str = "We received this message: ";

// ============================================================================
// Disconnect
// ============================================================================

/// Why a connection loop ended without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disconnect {
    /// The peer sent a Close frame.
    CloseFrame,
    /// No activity within the connection timeout.
    IdleTimeout,
    /// The peer closed the stream between frames.
    PeerHangup,
    /// The server is shutting down.
    Shutdown,
}

// ============================================================================
// Connection
// ============================================================================

/// One upgraded WebSocket connection.
///
/// Generic over the stream so tests can drive it with in-memory pipes.
pub struct Connection<S> {
    id: ConnectionId,
    reader: FrameReader<ReadHalf<S>>,
    writer: WriteHalf<S>,
    fragments: Reassembler,
    liveness: LivenessMonitor,
    options: Arc<ServerOptions>,
    sink: Arc<dyn MessageSink>,
    shutdown: Option<watch::Receiver<bool>>,
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Wraps an upgraded stream.
    ///
    /// `buffered` holds bytes that arrived together with the upgrade
    /// request; they are decoded before anything read from `stream`.
    pub fn new(
        id: ConnectionId,
        stream: S,
        buffered: Vec<u8>,
        options: Arc<ServerOptions>,
        sink: Arc<dyn MessageSink>,
    ) -> Self {
        let (read_half, writer) = tokio::io::split(stream);
        Self {
            id,
            reader: FrameReader::with_buffered(read_half, buffered, options.read_timeout()),
            writer,
            fragments: Reassembler::new(options.fragment_timeout()),
            liveness: LivenessMonitor::new(
                options.liveness_interval(),
                options.ping_timeout(),
                options.connection_timeout(),
            ),
            options,
            sink,
            shutdown: None,
        }
    }

    /// Ends the loop with [`Disconnect::Shutdown`] once `signal` turns true.
    #[must_use]
    pub fn with_shutdown(mut self, signal: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(signal);
        self
    }

    /// Connection identifier.
    #[inline]
    #[must_use]
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Runs the frame loop to completion.
    ///
    /// Any message still being reassembled is delivered as partial before
    /// returning.
    ///
    /// # Errors
    ///
    /// Returns the first fatal error: [`Error::ReadTimeout`],
    /// [`Error::PayloadTooLarge`], [`Error::StreamEnded`] mid-frame,
    /// [`Error::ConnectionClosed`] or [`Error::Io`].
    pub async fn run(mut self) -> Result<Disconnect> {
        let outcome = self.event_loop().await;

        if let Some(message) = self.fragments.flush() {
            debug!(kind = %message.kind, "Flushing unfinished message on teardown");
            self.deliver(message).await;
        }
        self.liveness.stop();

        match &outcome {
            Ok(reason) => debug!(?reason, "Connection finished"),
            Err(Error::ConnectionClosed) => debug!("Peer went away mid-write"),
            Err(e) => error!(error = %e, "Connection failed"),
        }
        outcome
    }

    async fn event_loop(&mut self) -> Result<Disconnect> {
        loop {
            tokio::select! {
                biased;

                () = shutdown_requested(self.shutdown.as_mut()) => {
                    debug!("Server shutting down, closing connection");
                    close_connection(&mut self.writer, self.options.close_grace()).await?;
                    return Ok(Disconnect::Shutdown);
                }

                () = until(self.fragments.deadline()) => {
                    if let Some(message) = self.fragments.expire(Instant::now()) {
                        warn!(
                            kind = %message.kind,
                            fragments = message.fragments(),
                            "Fragmented message timed out, delivering partial"
                        );
                        self.deliver(message).await;
                    }
                }

                _ = self.liveness.tick() => {
                    match self.liveness.check(Instant::now()) {
                        LivenessAction::SendPing => self.send(&encode_ping()).await?,
                        LivenessAction::Close => {
                            close_connection(&mut self.writer, self.options.close_grace()).await?;
                            return Ok(Disconnect::IdleTimeout);
                        }
                        LivenessAction::None => {}
                    }
                }

                readable = self.reader.wait_readable() => {
                    match readable {
                        Ok(()) => {}
                        Err(Error::StreamEnded) => return Ok(Disconnect::PeerHangup),
                        Err(e) => return Err(e),
                    }

                    match self.process_frame().await {
                        Ok(Some(reason)) => return Ok(reason),
                        Ok(None) => {}
                        Err(e) if e.is_fatal() => return Err(e),
                        Err(e) => warn!(error = %e, "Frame rejected"),
                    }
                }
            }
        }
    }

    /// Decodes and dispatches one frame.
    async fn process_frame(&mut self) -> Result<Option<Disconnect>> {
        let frame = decode_frame(&mut self.reader, self.options.max_payload_size).await?;
        let now = Instant::now();
        self.liveness.record_activity(now);

        trace!(
            opcode = %frame.opcode,
            fin = frame.fin,
            len = frame.payload_length,
            "Frame received"
        );

        let diagram = self
            .options
            .visualize_frames
            .then(|| visualization_message(&frame));

        match frame.opcode {
            Opcode::Text | Opcode::Binary | Opcode::Continuation => {
                self.handle_data(frame, now).await?;
            }

            Opcode::Close | Opcode::Ping | Opcode::Pong => {
                match handle_control(&frame, self.options.reply_to_ping) {
                    ControlAction::Close => {
                        close_connection(&mut self.writer, self.options.close_grace()).await?;
                        return Ok(Some(Disconnect::CloseFrame));
                    }
                    ControlAction::Pong(payload) => self.send(&encode_pong(&payload)).await?,
                    ControlAction::None => {}
                }
            }

            Opcode::Reserved(code) => {
                warn!(opcode = code, "Reserved opcode ignored");
            }
        }

        if let Some(diagram) = diagram {
            self.send(&encode_text(&diagram)).await?;
        }
        Ok(None)
    }

    async fn handle_data(&mut self, frame: Frame, now: Instant) -> Result<()> {
        let single = frame.fin && frame.opcode != Opcode::Continuation;

        let Some(message) = self.fragments.push(frame, now)? else {
            return Ok(());
        };

        let echo = (single && self.options.echo_messages)
            .then(|| format!("{ECHO_PREFIX}{}", message.text_lossy()));

        self.deliver(message).await;

        if let Some(echo) = echo {
            self.send(&encode_text(&echo)).await?;
        }
        Ok(())
    }

    async fn deliver(&mut self, message: Message) {
        debug!(
            kind = %message.kind,
            len = message.len(),
            partial = message.partial,
            "Message complete"
        );
        if let Err(e) = self.sink.persist(&message).await {
            warn!(error = %e, "Failed to persist message");
        }
    }

    async fn send(&mut self, bytes: &[u8]) -> Result<()> {
        self.writer.write_all(bytes).await.map_err(closed_on_reset)?;
        self.writer.flush().await.map_err(closed_on_reset)?;
        Ok(())
    }
}

/// Maps peer-reset write failures to [`Error::ConnectionClosed`].
fn closed_on_reset(e: io::Error) -> Error {
    match e.kind() {
        io::ErrorKind::BrokenPipe | io::ErrorKind::ConnectionReset => Error::ConnectionClosed,
        _ => Error::Io(e),
    }
}

/// Resolves once the signal reads true. Pends forever without a signal or
/// after its sender is dropped.
async fn shutdown_requested(signal: Option<&mut watch::Receiver<bool>>) {
    match signal {
        Some(signal) => {
            let closed = signal.wait_for(|stop| *stop).await.is_err();
            if closed {
                future::pending::<()>().await;
            }
        }
        None => future::pending().await,
    }
}

/// Sleeps until `deadline`, or forever when there is none.
async fn until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => future::pending().await,
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use tokio::io::{AsyncReadExt, DuplexStream};
    use tokio::task::JoinHandle;

    use crate::protocol::encode_masked_frame;
    use crate::session::MessageKind;
    use crate::sink::MemorySink;

    const KEY: [u8; 4] = [0x37, 0xfa, 0x21, 0x3d];

    struct Harness {
        client: DuplexStream,
        sink: Arc<MemorySink>,
        handle: JoinHandle<Result<Disconnect>>,
    }

    fn spawn(options: ServerOptions, buffered: Vec<u8>) -> Harness {
        let (client, server) = tokio::io::duplex(64 * 1024);
        let sink = Arc::new(MemorySink::new());
        let connection = Connection::new(
            ConnectionId::new(1),
            server,
            buffered,
            Arc::new(options),
            sink.clone(),
        );
        Harness {
            client,
            sink,
            handle: tokio::spawn(connection.run()),
        }
    }

    fn quiet() -> ServerOptions {
        ServerOptions::new().without_visualization()
    }

    async fn send(client: &mut DuplexStream, opcode: Opcode, fin: bool, payload: &[u8]) {
        client
            .write_all(&encode_masked_frame(opcode, fin, payload, KEY))
            .await
            .unwrap();
    }

    /// Reads one unmasked server frame as (first byte, payload).
    async fn recv(client: &mut DuplexStream) -> (u8, Vec<u8>) {
        let mut head = [0u8; 2];
        client.read_exact(&mut head).await.unwrap();
        assert_eq!(head[1] & 0x80, 0, "server frames must not be masked");

        let len = match head[1] & 0x7F {
            126 => {
                let mut ext = [0u8; 2];
                client.read_exact(&mut ext).await.unwrap();
                u16::from_be_bytes(ext) as usize
            }
            127 => {
                let mut ext = [0u8; 8];
                client.read_exact(&mut ext).await.unwrap();
                u64::from_be_bytes(ext) as usize
            }
            n => n as usize,
        };

        let mut payload = vec![0u8; len];
        client.read_exact(&mut payload).await.unwrap();
        (head[0], payload)
    }

    async fn recv_text(client: &mut DuplexStream) -> String {
        let (first, payload) = recv(client).await;
        assert_eq!(first, 0x81);
        String::from_utf8(payload).unwrap()
    }

    #[tokio::test]
    async fn test_single_text_frame_is_echoed_and_delivered() {
        let mut h = spawn(quiet(), Vec::new());

        send(&mut h.client, Opcode::Text, true, b"hi").await;
        assert_eq!(recv_text(&mut h.client).await, "We received this message: hi");

        let messages = h.sink.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].kind, MessageKind::Text);
        assert_eq!(messages[0].bytes(), b"hi");
        assert!(!messages[0].partial);

        drop(h.client);
        assert_eq!(h.handle.await.unwrap().unwrap(), Disconnect::PeerHangup);
    }

    #[tokio::test]
    async fn test_fragmented_message_reassembled_without_echo() {
        let mut h = spawn(quiet(), Vec::new());

        send(&mut h.client, Opcode::Text, false, b"AB").await;
        send(&mut h.client, Opcode::Continuation, false, b"CD").await;
        send(&mut h.client, Opcode::Continuation, true, b"EF").await;
        send(&mut h.client, Opcode::Text, true, b"next").await;

        assert_eq!(recv_text(&mut h.client).await, "We received this message: next");

        let messages = h.sink.take();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].bytes(), b"ABCDEF");
        assert_eq!(messages[0].fragments(), 3);
        assert!(!messages[0].partial);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_fragments_flushed_as_partial() {
        let mut h = spawn(quiet(), Vec::new());

        send(&mut h.client, Opcode::Binary, false, &[1, 2]).await;
        tokio::time::sleep(Duration::from_millis(3100)).await;

        // Arrives after the window closed, so it has nothing to continue.
        send(&mut h.client, Opcode::Continuation, true, &[3]).await;
        send(&mut h.client, Opcode::Text, true, b"x").await;
        recv_text(&mut h.client).await;

        let messages = h.sink.take();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].kind, MessageKind::Binary);
        assert_eq!(messages[0].bytes(), [1, 2]);
        assert!(messages[0].partial);
    }

    #[tokio::test]
    async fn test_unmasked_frame_skipped() {
        let mut h = spawn(quiet(), Vec::new());

        h.client
            .write_all(&crate::protocol::encode_frame(Opcode::Text, true, b"bad"))
            .await
            .unwrap();
        send(&mut h.client, Opcode::Text, true, b"ok").await;

        assert_eq!(recv_text(&mut h.client).await, "We received this message: ok");
        assert_eq!(h.sink.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_frame_answered_once_then_eof() {
        let mut h = spawn(quiet(), Vec::new());

        send(&mut h.client, Opcode::Close, true, &[0x03, 0xE8]).await;
        assert_eq!(recv(&mut h.client).await, (0x88, Vec::new()));

        let mut rest = Vec::new();
        h.client.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());

        assert_eq!(h.handle.await.unwrap().unwrap(), Disconnect::CloseFrame);
    }

    #[tokio::test]
    async fn test_ping_answered_with_matching_pong() {
        let mut h = spawn(quiet(), Vec::new());

        send(&mut h.client, Opcode::Ping, true, b"abc").await;
        assert_eq!(recv(&mut h.client).await, (0x8A, b"abc".to_vec()));
    }

    #[tokio::test]
    async fn test_ping_reply_disabled() {
        let mut h = spawn(quiet().without_ping_reply(), Vec::new());

        send(&mut h.client, Opcode::Ping, true, b"abc").await;
        send(&mut h.client, Opcode::Text, true, b"t").await;
        assert_eq!(recv_text(&mut h.client).await, "We received this message: t");
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_connection_pinged_then_closed() {
        let mut h = spawn(quiet().without_echo(), Vec::new());
        let start = Instant::now();

        send(&mut h.client, Opcode::Text, true, b"hi").await;

        assert_eq!(recv(&mut h.client).await, (0x89, Vec::new()));
        let pinged = start.elapsed();
        assert!(pinged >= Duration::from_secs(30) && pinged < Duration::from_secs(36));

        assert_eq!(recv(&mut h.client).await, (0x88, Vec::new()));
        assert!(start.elapsed() >= Duration::from_secs(60));

        let mut rest = Vec::new();
        h.client.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());
        assert_eq!(h.handle.await.unwrap().unwrap(), Disconnect::IdleTimeout);
    }

    #[tokio::test]
    async fn test_visualization_follows_echo() {
        let mut h = spawn(ServerOptions::new(), Vec::new());

        send(&mut h.client, Opcode::Text, true, b"hi").await;
        assert_eq!(recv_text(&mut h.client).await, "We received this message: hi");

        let diagram = recv_text(&mut h.client).await;
        assert!(diagram.starts_with("FRAME_VISUALIZATION:"));
        assert!(diagram.contains("Masking key: 37 fa 21 3d"));
    }

    #[tokio::test]
    async fn test_unfinished_message_flushed_on_hangup() {
        let mut h = spawn(quiet(), Vec::new());

        send(&mut h.client, Opcode::Text, false, b"AB").await;
        // Round-trip a ping so the fragment is known to be consumed.
        send(&mut h.client, Opcode::Ping, true, &[]).await;
        recv(&mut h.client).await;
        drop(h.client);

        assert_eq!(h.handle.await.unwrap().unwrap(), Disconnect::PeerHangup);
        let messages = h.sink.take();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].bytes(), b"AB");
        assert!(messages[0].partial);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_signal_closes_and_flushes() {
        let (tx, rx) = watch::channel(false);
        let (mut client, server) = tokio::io::duplex(64 * 1024);
        let sink = Arc::new(MemorySink::new());
        let connection = Connection::new(
            ConnectionId::new(1),
            server,
            Vec::new(),
            Arc::new(quiet()),
            sink.clone(),
        )
        .with_shutdown(rx);
        let handle = tokio::spawn(connection.run());

        send(&mut client, Opcode::Text, false, b"AB").await;
        send(&mut client, Opcode::Ping, true, &[]).await;
        recv(&mut client).await;

        tx.send_replace(true);
        assert_eq!(recv(&mut client).await, (0x88, Vec::new()));
        assert_eq!(handle.await.unwrap().unwrap(), Disconnect::Shutdown);

        let messages = sink.take();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].bytes(), b"AB");
        assert!(messages[0].partial);
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_timeout_mid_frame_flushes_partial() {
        let mut h = spawn(quiet(), Vec::new());

        send(&mut h.client, Opcode::Binary, false, b"AB").await;
        // Header byte of a continuation frame that never gets its length.
        h.client.write_all(&[0x80]).await.unwrap();

        let err = h.handle.await.unwrap().unwrap_err();
        assert!(matches!(err, Error::ReadTimeout { timeout_ms: 5000 }));

        let messages = h.sink.take();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].kind, MessageKind::Binary);
        assert_eq!(messages[0].bytes(), b"AB");
        assert!(messages[0].partial);
        drop(h.client);
    }

    #[tokio::test]
    async fn test_stream_ended_mid_frame_flushes_partial() {
        let mut h = spawn(quiet(), Vec::new());

        send(&mut h.client, Opcode::Text, false, b"AB").await;
        h.client.write_all(&[0x80]).await.unwrap();
        drop(h.client);

        let err = h.handle.await.unwrap().unwrap_err();
        assert!(matches!(err, Error::StreamEnded));

        let messages = h.sink.take();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].kind, MessageKind::Text);
        assert_eq!(messages[0].bytes(), b"AB");
        assert!(messages[0].partial);
    }

    #[tokio::test]
    async fn test_unmasked_oversized_frame_is_fatal() {
        let mut h = spawn(quiet().with_max_payload_size(4), Vec::new());

        h.client
            .write_all(&crate::protocol::encode_frame(Opcode::Binary, true, &[0; 8]))
            .await
            .unwrap();

        let err = h.handle.await.unwrap().unwrap_err();
        assert!(matches!(err, Error::PayloadTooLarge { .. }));
        assert!(h.sink.is_empty());
    }

    #[tokio::test]
    async fn test_bytes_buffered_during_handshake_are_decoded() {
        let early = encode_masked_frame(Opcode::Text, true, b"early", KEY);
        let mut h = spawn(quiet(), early);

        assert_eq!(recv_text(&mut h.client).await, "We received this message: early");
    }

    #[test]
    fn test_reset_maps_to_connection_closed() {
        let reset = io::Error::from(io::ErrorKind::ConnectionReset);
        assert!(matches!(closed_on_reset(reset), Error::ConnectionClosed));

        let other = io::Error::from(io::ErrorKind::PermissionDenied);
        assert!(matches!(closed_on_reset(other), Error::Io(_)));
    }

    #[tokio::test]
    async fn test_oversized_payload_is_fatal() {
        let mut h = spawn(quiet().with_max_payload_size(4), Vec::new());

        send(&mut h.client, Opcode::Binary, true, &[0; 8]).await;

        let err = h.handle.await.unwrap().unwrap_err();
        assert!(matches!(err, Error::PayloadTooLarge { .. }));
    }
}
