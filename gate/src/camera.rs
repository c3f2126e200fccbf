//! Camera reader adapter.
//!
//! A [`CameraDevice`] opens a [`FrameDecoder`] bound to a mount point. The
//! [`CameraReader`] polls that decoder at a fixed cadence and turns what it
//! sees into a stream of [`CameraEvent`]s. The reader owns no business logic.
//!
//! The open decoder lives in a guard that releases it on every exit path:
//! explicit stop, view teardown, or the stream simply being dropped.

use crate::error::{CameraError, DecodeError};
use crate::types::MountPoint;
use async_stream::stream;
use futures::Stream;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

/// Shortest time between frames a reader will use
pub const MIN_FRAME_INTERVAL: Duration = Duration::from_millis(1);

/// Longest time between frames a reader will use
pub const MAX_FRAME_INTERVAL: Duration = Duration::from_secs(60);

/// Bring `interval` into the range a reader can tick at
#[must_use]
pub fn clamp_frame_interval(interval: Duration) -> Duration {
    interval.clamp(MIN_FRAME_INTERVAL, MAX_FRAME_INTERVAL)
}

/// A live camera handle that can decode the current frame
pub trait FrameDecoder: Send {
    /// Decode whatever code is in front of the camera right now
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::NoCode`] for a frame without a readable code and
    /// [`DecodeError::Device`] if the frame could not be read at all.
    fn decode_frame(&mut self) -> Result<String, DecodeError>;

    /// Give the camera back
    ///
    /// # Errors
    ///
    /// Returns [`CameraError::ReleaseFailed`] if the device refuses.
    fn release(&mut self) -> Result<(), CameraError>;
}

/// Something that can hand out camera handles
pub trait CameraDevice: Send + Sync {
    /// Open the camera bound to `mount_point`
    ///
    /// # Errors
    ///
    /// Returns [`CameraError::MountPointUnavailable`] if nothing is mounted
    /// there, or [`CameraError::OpenFailed`] if the device refuses.
    fn open(&self, mount_point: &MountPoint) -> Result<Box<dyn FrameDecoder>, CameraError>;
}

/// What a running reader reports
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CameraEvent {
    /// The camera is open and frames will follow
    Opened,
    /// A frame decoded to this text
    Decoded(String),
    /// A frame could not be decoded
    DecodeFailed(DecodeError),
    /// The camera could not be opened; no other event follows
    Unavailable(CameraError),
    /// The camera has been released; no other event follows
    Closed,
}

/// Holds an open decoder and releases it exactly once
struct DecoderGuard {
    decoder: Option<Box<dyn FrameDecoder>>,
    mount_point: MountPoint,
}

impl DecoderGuard {
    fn new(decoder: Box<dyn FrameDecoder>, mount_point: MountPoint) -> Self {
        metrics::gauge!("scanner.camera.live").increment(1.0);
        Self {
            decoder: Some(decoder),
            mount_point,
        }
    }

    fn decode(&mut self) -> Result<String, DecodeError> {
        match self.decoder.as_mut() {
            Some(decoder) => decoder.decode_frame(),
            None => Err(DecodeError::Device("camera already released".to_string())),
        }
    }

    fn release(&mut self) {
        let Some(mut decoder) = self.decoder.take() else {
            return;
        };

        metrics::gauge!("scanner.camera.live").decrement(1.0);
        match decoder.release() {
            Ok(()) => tracing::info!(mount_point = %self.mount_point, "Camera released"),
            Err(error) => {
                tracing::warn!(mount_point = %self.mount_point, %error, "Camera release failed");
                metrics::counter!("scanner.camera.release_failures").increment(1);
            },
        }
    }
}

impl Drop for DecoderGuard {
    fn drop(&mut self) {
        self.release();
    }
}

/// Polls one camera at a fixed cadence
#[derive(Clone)]
pub struct CameraReader {
    device: Arc<dyn CameraDevice>,
    mount_point: MountPoint,
    frame_interval: Duration,
}

impl std::fmt::Debug for CameraReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CameraReader")
            .field("mount_point", &self.mount_point)
            .field("frame_interval", &self.frame_interval)
            .finish_non_exhaustive()
    }
}

impl CameraReader {
    /// Create a reader for `mount_point` that reads one frame per `frame_interval`
    ///
    /// The interval is clamped to [`MIN_FRAME_INTERVAL`]..=[`MAX_FRAME_INTERVAL`].
    #[must_use]
    pub fn new(
        device: Arc<dyn CameraDevice>,
        mount_point: MountPoint,
        frame_interval: Duration,
    ) -> Self {
        Self {
            device,
            mount_point,
            frame_interval: clamp_frame_interval(frame_interval),
        }
    }

    /// Time between frames
    #[must_use]
    pub const fn frame_interval(&self) -> Duration {
        self.frame_interval
    }

    /// Open the camera and stream events until `stop` or `teardown` fires
    ///
    /// Either receiver fires when its value becomes `true` or its sender is
    /// dropped. The camera is not opened at all if a stop is already pending
    /// when the stream is first polled. Missed ticks are skipped, so a slow
    /// consumer never causes a burst of catch-up frames.
    pub fn events(
        self,
        mut stop: watch::Receiver<bool>,
        mut teardown: watch::Receiver<bool>,
    ) -> impl Stream<Item = CameraEvent> + Send + 'static {
        let Self {
            device,
            mount_point,
            frame_interval,
        } = self;

        stream! {
            if stop_requested(&stop) || stop_requested(&teardown) {
                tracing::debug!(%mount_point, "Reader stopped before opening the camera");
                return;
            }

            let decoder = match device.open(&mount_point) {
                Ok(decoder) => decoder,
                Err(error) => {
                    tracing::warn!(%mount_point, %error, "Camera unavailable");
                    metrics::counter!("scanner.camera.unavailable").increment(1);
                    yield CameraEvent::Unavailable(error);
                    return;
                },
            };

            let mut guard = DecoderGuard::new(decoder, mount_point.clone());
            tracing::info!(%mount_point, ?frame_interval, "Camera opened");
            yield CameraEvent::Opened;

            let mut ticker = tokio::time::interval(frame_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                let frame = tokio::select! {
                    biased;
                    () = signalled(&mut stop) => None,
                    () = signalled(&mut teardown) => None,
                    _ = ticker.tick() => Some(guard.decode()),
                };

                match frame {
                    None => break,
                    Some(Ok(text)) => {
                        tracing::trace!(%mount_point, "Frame decoded");
                        yield CameraEvent::Decoded(text);
                    },
                    Some(Err(error)) => yield CameraEvent::DecodeFailed(error),
                }
            }

            guard.release();
            yield CameraEvent::Closed;
        }
    }
}

fn stop_requested(rx: &watch::Receiver<bool>) -> bool {
    *rx.borrow() || rx.has_changed().is_err()
}

/// Resolves once the flag is `true` or its sender is gone
async fn signalled(rx: &mut watch::Receiver<bool>) {
    let _ = rx.wait_for(|flag| *flag).await;
}

// ============================================================================
// Lens camera
// ============================================================================

#[derive(Debug, Default)]
struct Lens {
    payload: Option<String>,
    live_handles: usize,
    opened: usize,
    frames_read: usize,
}

/// Camera whose frames show whatever payload is held in front of its lens
///
/// Each mount point has its own lens. Every frame decodes to the current
/// payload, the way a QR code held still in front of a real camera keeps
/// decoding on every frame. Clones share the same lenses.
#[derive(Debug, Clone, Default)]
pub struct LensCamera {
    lenses: Arc<Mutex<HashMap<MountPoint, Lens>>>,
}

impl LensCamera {
    /// A camera with no mount points
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A camera with one mount point already attached
    #[must_use]
    pub fn with_mount_point(mount_point: MountPoint) -> Self {
        let camera = Self::new();
        camera.mount(mount_point);
        camera
    }

    /// Attach a surface at `mount_point`
    pub fn mount(&self, mount_point: MountPoint) {
        self.lock().entry(mount_point).or_default();
    }

    /// Detach the surface at `mount_point`
    pub fn unmount(&self, mount_point: &MountPoint) {
        self.lock().remove(mount_point);
    }

    /// Hold `payload` in front of the lens
    pub fn present(&self, mount_point: &MountPoint, payload: impl Into<String>) {
        let payload = payload.into();
        self.with_lens(mount_point, |lens| lens.payload = Some(payload));
    }

    /// Take whatever was in front of the lens away
    pub fn clear(&self, mount_point: &MountPoint) {
        self.with_lens(mount_point, |lens| lens.payload = None);
    }

    /// Handles opened and not yet released
    #[must_use]
    pub fn live_handles(&self, mount_point: &MountPoint) -> usize {
        self.with_lens(mount_point, |lens| lens.live_handles).unwrap_or(0)
    }

    /// Handles opened over the camera's lifetime
    #[must_use]
    pub fn opened_count(&self, mount_point: &MountPoint) -> usize {
        self.with_lens(mount_point, |lens| lens.opened).unwrap_or(0)
    }

    /// Frames decoded over the camera's lifetime
    #[must_use]
    pub fn frames_read(&self, mount_point: &MountPoint) -> usize {
        self.with_lens(mount_point, |lens| lens.frames_read).unwrap_or(0)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<MountPoint, Lens>> {
        self.lenses.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn with_lens<T>(
        &self,
        mount_point: &MountPoint,
        f: impl FnOnce(&mut Lens) -> T,
    ) -> Option<T> {
        self.lock().get_mut(mount_point).map(f)
    }
}

impl CameraDevice for LensCamera {
    fn open(&self, mount_point: &MountPoint) -> Result<Box<dyn FrameDecoder>, CameraError> {
        self.with_lens(mount_point, |lens| {
            lens.live_handles += 1;
            lens.opened += 1;
        })
        .ok_or_else(|| CameraError::MountPointUnavailable(mount_point.clone()))?;

        Ok(Box::new(LensDecoder {
            camera: self.clone(),
            mount_point: mount_point.clone(),
            released: false,
        }))
    }
}

struct LensDecoder {
    camera: LensCamera,
    mount_point: MountPoint,
    released: bool,
}

impl FrameDecoder for LensDecoder {
    fn decode_frame(&mut self) -> Result<String, DecodeError> {
        self.camera
            .with_lens(&self.mount_point, |lens| {
                lens.frames_read += 1;
                lens.payload.clone()
            })
            .ok_or_else(|| DecodeError::Device("surface detached".to_string()))?
            .ok_or(DecodeError::NoCode)
    }

    fn release(&mut self) -> Result<(), CameraError> {
        if !self.released {
            self.released = true;
            self.camera.with_lens(&self.mount_point, |lens| {
                lens.live_handles = lens.live_handles.saturating_sub(1);
            });
        }
        Ok(())
    }
}
