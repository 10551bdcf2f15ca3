//! Stdio transport: one JSON-RPC envelope per line in, one per line out.

use std::io;
use std::sync::Arc;

use bytes::BytesMut;
use futures::StreamExt;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::codec::{Decoder, FramedRead, LinesCodec, LinesCodecError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::dispatcher::Dispatcher;
use crate::error::GatewayResult;

const RESPONSE_QUEUE: usize = 64;

/// One unit read from the request stream.
#[derive(Debug, PartialEq, Eq)]
enum Frame {
    Line(String),
    /// A line over the limit. Its bytes were dropped as they arrived.
    TooLong,
}

/// Newline framing with a length cap.
///
/// An oversized line becomes [`Frame::TooLong`] instead of a stream error,
/// and the rest of it is skipped up to the next newline, so the server
/// never buffers more than the cap and keeps reading afterwards.
struct RequestCodec(LinesCodec);

impl RequestCodec {
    fn new(max_request_bytes: usize) -> Self {
        Self(LinesCodec::new_with_max_length(max_request_bytes))
    }

    fn frame(decoded: Result<Option<String>, LinesCodecError>) -> io::Result<Option<Frame>> {
        match decoded {
            Ok(line) => Ok(line.map(Frame::Line)),
            Err(LinesCodecError::MaxLineLengthExceeded) => Ok(Some(Frame::TooLong)),
            Err(LinesCodecError::Io(e)) => Err(e),
        }
    }
}

impl Decoder for RequestCodec {
    type Item = Frame;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> io::Result<Option<Frame>> {
        Self::frame(self.0.decode(src))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> io::Result<Option<Frame>> {
        Self::frame(self.0.decode_eof(src))
    }
}

/// Serve requests from `reader`, writing responses to `writer`.
///
/// Every line is handled in its own task, so responses may arrive out of
/// order; callers correlate them by id. On end of input or shutdown the
/// server stops reading and waits for in-flight calls to finish.
///
/// # Errors
///
/// Returns [`crate::GatewayError::Io`] if reading or writing fails.
pub async fn serve<R, W>(
    dispatcher: Arc<Dispatcher>,
    reader: R,
    writer: W,
    shutdown: CancellationToken,
) -> GatewayResult<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel::<String>(RESPONSE_QUEUE);
    let writer_task = tokio::spawn(write_responses(writer, rx));

    let mut frames = FramedRead::new(reader, RequestCodec::new(dispatcher.max_request_bytes()));
    let mut calls = JoinSet::new();
    let read_result = loop {
        tokio::select! {
            () = shutdown.cancelled() => {
                info!("shutdown requested, draining in-flight calls");
                break Ok(());
            },
            next = frames.next() => match next {
                Some(Ok(Frame::TooLong)) => {
                    warn!(limit = dispatcher.max_request_bytes(), "request line too large");
                    if tx.send(dispatcher.oversized_response()).await.is_err() {
                        warn!("response writer closed, dropping response");
                    }
                },
                Some(Ok(Frame::Line(line))) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    let dispatcher = Arc::clone(&dispatcher);
                    let tx = tx.clone();
                    calls.spawn(async move {
                        if let Some(response) = dispatcher.handle_line(&line).await
                            && tx.send(response).await.is_err()
                        {
                            warn!("response writer closed, dropping response");
                        }
                    });
                },
                None => {
                    debug!("end of input");
                    break Ok(());
                },
                Some(Err(e)) => break Err(e),
            },
            Some(joined) = calls.join_next(), if !calls.is_empty() => log_join(joined),
        }
    };

    while let Some(joined) = calls.join_next().await {
        log_join(joined);
    }
    drop(tx);

    let written = writer_task.await.map_err(io::Error::other)?;
    read_result?;
    written?;
    Ok(())
}

/// Serve on the process's stdin and stdout.
///
/// # Errors
///
/// See [`serve`].
pub async fn serve_stdio(dispatcher: Arc<Dispatcher>, shutdown: CancellationToken) -> GatewayResult<()> {
    serve(dispatcher, tokio::io::stdin(), tokio::io::stdout(), shutdown).await
}

async fn write_responses<W>(mut writer: W, mut rx: mpsc::Receiver<String>) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(line) = rx.recv().await {
        writer.write_all(line.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
    }
    writer.shutdown().await
}

fn log_join(joined: Result<(), tokio::task::JoinError>) {
    if let Err(e) = joined {
        error!(error = %e, "request task failed");
    }
}
