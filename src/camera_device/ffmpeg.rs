//! ffmpeg-backed camera
//!
//! ffmpeg decodes the device (V4L2 node, RTSP URL or file) and writes raw
//! RGB24 frames at the requested size to stdout. A reader task keeps only the
//! latest frame in a `watch` channel; the inference loop samples it.
//! `kill_on_drop(true)` guarantees the process does not outlive the handle.

use image::RgbImage;
use std::io;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStdout, Command};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::{Camera, CameraDevice, CameraError, CaptureSettings};

type FrameSlot = Option<Arc<RgbImage>>;

/// Opens cameras through an ffmpeg subprocess
#[derive(Debug, Clone)]
pub struct FfmpegCameraDevice {
    uri: String,
    ffmpeg_bin: String,
    startup_timeout: Duration,
}

impl FfmpegCameraDevice {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            ffmpeg_bin: "ffmpeg".to_string(),
            startup_timeout: Duration::from_secs(10),
        }
    }

    pub fn with_ffmpeg_bin(mut self, bin: impl Into<String>) -> Self {
        self.ffmpeg_bin = bin.into();
        self
    }

    pub fn with_startup_timeout(mut self, timeout: Duration) -> Self {
        self.startup_timeout = timeout;
        self
    }

    fn is_v4l(&self) -> bool {
        self.uri.starts_with("/dev/video")
    }

    fn command(&self, settings: CaptureSettings) -> Command {
        let mut filters = format!("scale={}:{}", settings.width, settings.height);
        if settings.mirrored {
            filters.push_str(",hflip");
        }

        let mut cmd = Command::new(&self.ffmpeg_bin);
        cmd.args(["-hide_banner", "-loglevel", "error"]);

        if self.is_v4l() {
            cmd.args(["-f", "video4linux2"]);
        } else if self.uri.starts_with("rtsp://") {
            cmd.args(["-rtsp_transport", "tcp"]);
        }

        cmd.args(["-i", self.uri.as_str()])
            .args(["-an", "-vf", filters.as_str()])
            .args(["-pix_fmt", "rgb24", "-f", "rawvideo", "-"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        cmd
    }
}

impl CameraDevice for FfmpegCameraDevice {
    type Camera = FfmpegCamera;

    async fn open(&self, settings: CaptureSettings) -> Result<FfmpegCamera, CameraError> {
        if settings.width == 0 || settings.height == 0 {
            return Err(CameraError::Unavailable(format!(
                "invalid capture size {}x{}",
                settings.width, settings.height
            )));
        }

        if self.uri.starts_with("/dev/") {
            probe_device(&self.uri).await?;
        }

        let mut child = self.command(settings).spawn().map_err(|e| match e.kind() {
            io::ErrorKind::PermissionDenied => {
                CameraError::PermissionDenied(format!("{}: {}", self.ffmpeg_bin, e))
            }
            _ => CameraError::Unavailable(format!("ffmpeg spawn failed: {}", e)),
        })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| CameraError::Unavailable("ffmpeg stdout not captured".to_string()))?;

        let (tx, frames) = watch::channel(None);
        let reader = tokio::spawn(read_frames(stdout, settings, tx));

        tracing::info!(
            uri = %self.uri,
            width = settings.width,
            height = settings.height,
            mirrored = settings.mirrored,
            "Camera opened"
        );

        Ok(FfmpegCamera {
            uri: self.uri.clone(),
            child,
            reader,
            frames,
            startup_timeout: self.startup_timeout,
            stopped: false,
        })
    }
}

/// Running ffmpeg capture
pub struct FfmpegCamera {
    uri: String,
    child: Child,
    reader: JoinHandle<()>,
    frames: watch::Receiver<FrameSlot>,
    startup_timeout: Duration,
    stopped: bool,
}

impl Camera for FfmpegCamera {
    async fn play(&mut self) -> Result<(), CameraError> {
        let waited = tokio::time::timeout(
            self.startup_timeout,
            self.frames.wait_for(Option::is_some),
        )
        .await
        .map(|first| first.is_ok());

        match waited {
            Ok(true) => Ok(()),
            Ok(false) => Err(CameraError::Unavailable(format!(
                "{} produced no frames",
                self.uri
            ))),
            Err(_) => Err(CameraError::Unavailable(format!(
                "{} timed out after {:?} waiting for the first frame",
                self.uri, self.startup_timeout
            ))),
        }
    }

    async fn capture_frame(&mut self) -> Result<Arc<RgbImage>, CameraError> {
        // has_changed errs once the reader task has dropped the sender
        if self.stopped || self.frames.has_changed().is_err() {
            return Err(CameraError::StreamEnded);
        }
        let frame = self.frames.borrow_and_update().clone();
        frame.ok_or(CameraError::StreamEnded)
    }

    fn stop(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        self.reader.abort();
        if let Err(e) = self.child.start_kill() {
            tracing::debug!(uri = %self.uri, error = %e, "ffmpeg already exited");
        }
        tracing::info!(uri = %self.uri, "Camera released");
    }
}

impl Drop for FfmpegCamera {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn read_frames(
    mut stdout: ChildStdout,
    settings: CaptureSettings,
    tx: watch::Sender<FrameSlot>,
) {
    let frame_len = settings.width as usize * settings.height as usize * 3;
    let mut buffer = vec![0u8; frame_len];
    let mut count: u64 = 0;

    loop {
        if let Err(e) = stdout.read_exact(&mut buffer).await {
            tracing::debug!(frames = count, error = %e, "Camera stream ended");
            break;
        }

        let Some(frame) = RgbImage::from_raw(settings.width, settings.height, buffer.clone())
        else {
            break;
        };

        count += 1;
        if tx.send(Some(Arc::new(frame))).is_err() {
            break;
        }
    }
}

/// Distinguish permission problems from missing devices before spawning
async fn probe_device(path: &str) -> Result<(), CameraError> {
    match tokio::fs::OpenOptions::new().read(true).open(path).await {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
            Err(CameraError::PermissionDenied(format!("{}: {}", path, e)))
        }
        Err(e) => Err(CameraError::Unavailable(format!("{}: {}", path, e))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_mirrors_with_hflip() {
        let device = FfmpegCameraDevice::new("/dev/video0");
        let cmd = device.command(CaptureSettings::default());
        let args: Vec<String> = cmd
            .as_std()
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();

        assert!(args.windows(2).any(|w| w == ["-f", "video4linux2"]));
        assert!(args.windows(2).any(|w| w == ["-vf", "scale=640:480,hflip"]));
        assert!(args.windows(2).any(|w| w == ["-pix_fmt", "rgb24"]));
    }

    #[test]
    fn test_command_without_mirroring() {
        let device = FfmpegCameraDevice::new("rtsp://camera.local/stream");
        let settings = CaptureSettings {
            width: 320,
            height: 240,
            mirrored: false,
        };
        let args: Vec<String> = device
            .command(settings)
            .as_std()
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();

        assert!(args.windows(2).any(|w| w == ["-vf", "scale=320:240"]));
        assert!(args.windows(2).any(|w| w == ["-rtsp_transport", "tcp"]));
    }

    #[test]
    fn test_configured_binary_is_spawned() {
        let device = FfmpegCameraDevice::new("/dev/video0")
            .with_ffmpeg_bin("/opt/ffmpeg/bin/ffmpeg")
            .with_startup_timeout(Duration::from_millis(250));
        let cmd = device.command(CaptureSettings::default());

        assert_eq!(cmd.as_std().get_program(), "/opt/ffmpeg/bin/ffmpeg");
        assert_eq!(device.startup_timeout, Duration::from_millis(250));
    }

    #[tokio::test]
    async fn test_missing_device_is_unavailable() {
        let device = FfmpegCameraDevice::new("/dev/video-does-not-exist");
        let err = device.open(CaptureSettings::default()).await.err().unwrap();
        assert!(matches!(err, CameraError::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_missing_ffmpeg_is_unavailable() {
        let device = FfmpegCameraDevice::new("rtsp://camera.local/stream")
            .with_ffmpeg_bin("ffmpeg-binary-that-does-not-exist");
        let err = device.open(CaptureSettings::default()).await.err().unwrap();
        assert!(matches!(err, CameraError::Unavailable(_)));
    }
}
