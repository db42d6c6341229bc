use std::collections::VecDeque;
use std::sync::Arc;

use async_stream::stream;
use bytes::{Bytes, BytesMut};
use futures::Stream;
use log::{debug, info, warn};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Child;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::time::{interval, timeout, MissedTickBehavior};

use crate::camera_registry::CameraDescriptor;
use crate::configuration::StreamConfig;
use crate::data_capture::codec::{self, DEFAULT_JPEG_QUALITY};
use crate::data_capture::Frame;
use crate::error_handling::types::CaptureError;
use crate::streaming::mjpeg::{multipart_part, MjpegSplitter};
use crate::streaming::transcoder::{transport_plan, Transcoder, TransportAttempt};

const READ_CHUNK: usize = 64 * 1024;
const MAX_JPEG_LEN: usize = 8 * 1024 * 1024;

/// Serves live multipart streams to viewers.
///
/// Every viewer gets its own feed: a transcoder process per viewer, or a
/// subscription to the running session's frames for cameras that cannot be
/// opened twice. Nothing is shared between viewers.
pub struct StreamMultiplexer {
    transcoder: Arc<dyn Transcoder>,
    config: StreamConfig,
    error_part: Bytes,
}

impl StreamMultiplexer {
    pub fn new(
        transcoder: Arc<dyn Transcoder>,
        config: StreamConfig,
        frame_size: (u32, u32),
    ) -> Result<Self, CaptureError> {
        let jpeg = codec::connection_failed_jpeg(frame_size.0, frame_size.1)?;
        Ok(Self {
            transcoder,
            config,
            error_part: multipart_part(&jpeg),
        })
    }

    /// The part served once no transport works.
    pub fn error_part(&self) -> &Bytes {
        &self.error_part
    }

    /// Infinite sequence of multipart parts for `camera`. It ends only when
    /// the viewer drops it.
    ///
    /// Attempts from [`transport_plan`] are tried in order and each must
    /// produce a part within the connect timeout. When all of them fail, or
    /// the one that worked stops producing, the stream switches to the
    /// synthetic error frame for good.
    pub fn open_stream(
        &self,
        camera: CameraDescriptor,
        tap: Option<broadcast::Receiver<Frame>>,
    ) -> impl Stream<Item = Bytes> + Send + 'static {
        let transcoder = Arc::clone(&self.transcoder);
        let connect_timeout = self.config.connect_timeout();
        let error_interval = self.config.error_frame_interval();
        let error_part = self.error_part.clone();

        stream! {
            let label = camera.label();
            let mut tap = tap;

            for attempt in transport_plan(&camera.source_kind()) {
                let mut feed = match Feed::start(transcoder.as_ref(), &camera, attempt, &mut tap) {
                    Ok(feed) => feed,
                    Err(e) => {
                        debug!("{}[view] {} unavailable: {}", label, attempt, e);
                        continue;
                    }
                };

                match timeout(connect_timeout, feed.next_part()).await {
                    Ok(Some(part)) => {
                        info!("{}[view] Streaming over {}", label, attempt);
                        yield part;
                    }
                    Ok(None) => {
                        warn!("{}[view] {} ended before the first frame", label, attempt);
                        feed.close().await;
                        continue;
                    }
                    Err(_) => {
                        warn!(
                            "{}[view] No frame over {} within {:?}",
                            label, attempt, connect_timeout
                        );
                        feed.close().await;
                        continue;
                    }
                }

                while let Some(part) = feed.next_part().await {
                    yield part;
                }
                warn!("{}[view] Feed over {} ended", label, attempt);
                feed.close().await;
                break;
            }

            warn!("{}[view] Serving the connection-failed frame", label);
            let mut ticker = interval(error_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                yield error_part.clone();
            }
        }
    }
}

/// Source of parts for one transport attempt.
enum Feed {
    Tap(broadcast::Receiver<Frame>),
    Transcoded {
        reader: Box<dyn AsyncRead + Send + Unpin>,
        process: Option<Child>,
        splitter: MjpegSplitter,
        pending: VecDeque<Bytes>,
    },
}

impl Feed {
    fn start(
        transcoder: &dyn Transcoder,
        camera: &CameraDescriptor,
        attempt: TransportAttempt,
        tap: &mut Option<broadcast::Receiver<Frame>>,
    ) -> Result<Feed, CaptureError> {
        if attempt == TransportAttempt::SessionTap {
            return tap
                .take()
                .map(Feed::Tap)
                .ok_or_else(|| CaptureError::ConnectFailure("camera is not monitored".into()));
        }
        let output = transcoder.spawn(camera, attempt)?;
        Ok(Feed::Transcoded {
            reader: output.reader,
            process: output.process,
            splitter: MjpegSplitter::new(MAX_JPEG_LEN),
            pending: VecDeque::new(),
        })
    }

    /// Next multipart part, or `None` once the feed is exhausted.
    async fn next_part(&mut self) -> Option<Bytes> {
        match self {
            Feed::Tap(frames) => loop {
                match frames.recv().await {
                    Ok(frame) => match codec::encode_jpeg(&frame, DEFAULT_JPEG_QUALITY) {
                        Ok(jpeg) => return Some(multipart_part(&jpeg)),
                        Err(e) => warn!("Dropping a live frame: {}", e),
                    },
                    Err(RecvError::Lagged(skipped)) => {
                        debug!("Viewer lagging, {} frames skipped", skipped)
                    }
                    Err(RecvError::Closed) => return None,
                }
            },
            Feed::Transcoded {
                reader,
                splitter,
                pending,
                ..
            } => loop {
                if let Some(jpeg) = pending.pop_front() {
                    return Some(multipart_part(&jpeg));
                }
                let mut chunk = BytesMut::with_capacity(READ_CHUNK);
                match reader.read_buf(&mut chunk).await {
                    Ok(0) => return None,
                    Ok(_) => pending.extend(splitter.push(&chunk)),
                    Err(e) => {
                        warn!("Transcoder output failed: {}", e);
                        return None;
                    }
                }
            },
        }
    }

    async fn close(&mut self) {
        if let Feed::Transcoded {
            process: Some(child),
            ..
        } = self
        {
            let _ = child.kill().await;
        }
    }
}
