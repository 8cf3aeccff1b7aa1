//! Native messaging host loop.
//!
//! The browser launches the bridge and talks to it over stdin/stdout using
//! length-prefixed JSON frames. One router serves the whole process. A
//! dedicated writer task owns the output half so frames never interleave.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;

use crate::framing::{FrameError, JsonFrameCodec};
use crate::router::{BridgeRouter, RouterContext};

/// How long queued output may take to flush after the input side ends.
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Serves the native messaging channel until the input ends, a fatal frame
/// error occurs, or `cancel` fires.
///
/// Malformed JSON frames are logged and skipped. Oversize frames and I/O
/// failures end the loop with an error.
pub async fn run_native_host<R, W>(
    ctx: RouterContext,
    reader: R,
    writer: W,
    cancel: CancellationToken,
) -> Result<(), FrameError>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let max_length = ctx.config.max_native_message_length;
    let (tx, mut outgoing) = mpsc::unbounded_channel::<Value>();
    let router = BridgeRouter::new(ctx, tx);

    let mut writer_task = tokio::spawn(async move {
        let mut sink = FramedWrite::new(writer, JsonFrameCodec::new(max_length));
        while let Some(value) = outgoing.recv().await {
            if let Err(e) = sink.send(value).await {
                log::warn!("[Native] Failed to write frame: {}", e);
                break;
            }
        }
        log::debug!("[Native] Writer stopped");
    });

    log::info!("[Native] Host started");
    let mut frames = FramedRead::new(reader, JsonFrameCodec::new(max_length));
    let result = loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                log::info!("[Native] Shutdown requested");
                break Ok(());
            }
            frame = frames.next() => match frame {
                Some(Ok(Ok(value))) => router.handle_value(value),
                Some(Ok(Err(e))) => log::warn!("[Native] Skipping malformed frame: {}", e),
                Some(Err(e)) => {
                    log::error!("[Native] Input channel failed: {}", e);
                    break Err(e);
                }
                None => {
                    log::info!("[Native] Input closed by browser");
                    break Ok(());
                }
            }
        }
    };

    router.close();
    drop(router);
    if tokio::time::timeout(WRITER_DRAIN_TIMEOUT, &mut writer_task)
        .await
        .is_err()
    {
        log::debug!("[Native] Writer still busy after close; aborting");
        writer_task.abort();
    }
    result
}
