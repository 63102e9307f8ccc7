//! SessionController - the classifier session façade
//!
//! ## Responsibilities
//!
//! - Validate preconditions for every operator action
//! - Tear down the previous source before a new one is acquired
//! - Drive mode transitions and push status/results to the render sink
//! - Run the webcam inference loop and the one-shot upload inference
//!
//! ## Concurrency
//!
//! The controller runs as one task (`run`). Commands, engine completions and
//! frame-clock ticks are handled one at a time, so every transition is
//! atomic from a caller's point of view. At most one engine call is
//! outstanding; `settle` drains a stale call before a new source starts.

mod handle;
mod types;

pub use handle::{SessionCommand, SessionHandle};
pub use types::{CompletionOutcome, SessionConfig, SessionSnapshot, TickOutcome};

use futures::FutureExt;
use image::RgbImage;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};

use crate::camera_device::{Camera, CameraDevice};
use crate::error::{Error, Result};
use crate::inference_engine::{InferenceEngine, ModelLoader, ModelSource};
use crate::inference_loop::{Completion, InferenceLoop};
use crate::render_sink::{
    BusyView, EmptyReason, MediaView, ModeView, RenderEvent, RenderSink, ResultView,
    ANALYZING_IMAGE_TEXT, REQUESTING_CAMERA_TEXT,
};
use crate::resource_manager::{
    BlobStats, BlobStore, ImageFile, ImageReference, ResourceManager, SourceKind,
};
use crate::result_ranker::rank;
use crate::session_mode::{Mode, ModeMachine};

const WEBCAM_PREDICTION_FAILED: &str = "Prediction failed. Please restart the webcam.";

/// Per-session state, owned by the controller task
struct Session<E, C: Camera> {
    mode: ModeMachine,
    model: Option<Arc<E>>,
    model_source: Option<ModelSource>,
    class_count: usize,
    resources: ResourceManager<C>,
    inference: InferenceLoop,
}

pub struct SessionController<L, D, S>
where
    L: ModelLoader,
    D: CameraDevice,
    S: RenderSink,
{
    config: SessionConfig,
    loader: L,
    camera_device: D,
    sink: S,
    session: Session<L::Engine, D::Camera>,
}

impl<L, D, S> SessionController<L, D, S>
where
    L: ModelLoader,
    D: CameraDevice,
    S: RenderSink,
{
    pub fn new(
        config: SessionConfig,
        loader: L,
        camera_device: D,
        sink: S,
        blobs: Arc<BlobStore>,
    ) -> Self {
        let session = Session {
            mode: ModeMachine::new(),
            model: None,
            model_source: None,
            class_count: 0,
            resources: ResourceManager::new(blobs),
            inference: InferenceLoop::new(config.prediction_interval),
        };

        let controller = Self {
            config,
            loader,
            camera_device,
            sink,
            session,
        };
        controller.publish_mode();
        controller
    }

    pub fn mode(&self) -> Mode {
        self.session.mode.mode()
    }

    pub fn class_count(&self) -> usize {
        self.session.class_count
    }

    pub fn has_model(&self) -> bool {
        self.session.model.is_some()
    }

    pub fn blob_stats(&self) -> BlobStats {
        self.session.resources.blobs().stats()
    }

    pub fn is_tick_scheduled(&self) -> bool {
        self.session.inference.is_scheduled()
    }

    pub fn has_inference_in_flight(&self) -> bool {
        self.session.inference.has_in_flight()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            mode: self.mode(),
            mode_since: self.session.mode.entered_at(),
            status: self.session.mode.status_text().to_string(),
            error: self.session.mode.error_cause().map(str::to_string),
            model_url: self
                .session
                .model_source
                .as_ref()
                .map(|source| source.base_url().to_string()),
            class_count: self.session.class_count,
            source: self.session.resources.source_kind(),
            image_url: self
                .session
                .resources
                .image_reference()
                .map(ImageReference::url),
            loop_running: self.session.inference.is_running(),
            predictions_dispatched: self.session.inference.dispatched(),
            blobs: self.blob_stats(),
        }
    }

    /// Replace the model. An invalid URL is reported without touching the
    /// current session.
    pub async fn load_model(&mut self, url: &str) -> Result<()> {
        let source = match ModelSource::parse(url, &self.config.model_host) {
            Ok(source) => source,
            Err(err) => return Err(self.report(err)),
        };

        self.teardown_sources().await;
        self.session.model = None;
        self.session.model_source = None;
        self.session.class_count = 0;
        self.enter(Mode::Loading);
        self.render_results(ResultView::empty(EmptyReason::NoPredictions));

        let loaded = self.loader.load(&source).await;

        match loaded {
            Ok(engine) => {
                let classes = engine.total_classes();
                tracing::info!(model_url = %source, classes = classes, "Model ready");
                self.session.model = Some(Arc::new(engine));
                self.session.model_source = Some(source);
                self.session.class_count = classes;
                self.enter(Mode::Idle);
                Ok(())
            }
            Err(err) => {
                tracing::error!(model_url = %source, error = %err, "Model load failed");
                Err(self.report(Error::ModelLoad(err)))
            }
        }
    }

    pub async fn start_webcam(&mut self) -> Result<()> {
        if self.session.model.is_none() {
            return Err(self.report(Error::ModelNotReady));
        }
        if self.mode() == Mode::WebcamActive {
            tracing::debug!("Webcam already active");
            return Ok(());
        }
        if !self.mode().can_transition_to(Mode::WebcamActive) {
            let err = Error::InvalidTransition {
                from: self.mode(),
                to: Mode::WebcamActive,
            };
            return Err(self.report(err));
        }

        // the uploaded image goes away before the camera is requested
        if self.session.resources.release_image_reference() {
            self.render_media(MediaView::None);
        }
        self.settle().await;

        self.render_busy(Some(REQUESTING_CAMERA_TEXT));
        let acquired = self
            .session
            .resources
            .acquire_camera(&self.camera_device, self.config.capture)
            .await;
        self.render_busy(None);

        if let Err(err) = acquired {
            tracing::error!(error = %err, "Webcam start failed");
            return Err(self.report(err.into()));
        }

        self.enter(Mode::WebcamActive);
        self.render_media(MediaView::Camera);
        self.session.inference.start();
        tracing::info!(
            width = self.config.capture.width,
            height = self.config.capture.height,
            "Webcam started"
        );
        Ok(())
    }

    /// Always safe. Returns whether a camera was released.
    pub fn stop_webcam(&mut self) -> bool {
        let released = self.teardown_webcam();
        if self.mode() == Mode::WebcamActive {
            self.enter(Mode::Idle);
        }
        released
    }

    pub async fn submit_image(&mut self, file: ImageFile) -> Result<()> {
        if let Err(err) = file.validate(self.config.max_upload_bytes) {
            return Err(self.report(err));
        }
        let Some(engine) = self.session.model.clone() else {
            return Err(self.report(Error::ModelNotReady));
        };

        self.teardown_webcam();
        self.settle().await;

        let file_name = file.file_name.clone();
        let reference = self.session.resources.acquire_image_reference(file);
        self.enter(Mode::UploadActive);
        self.render_media(MediaView::Image {
            url: reference.url(),
        });
        tracing::info!(
            blob_id = %reference.id,
            file_name = ?file_name,
            size = reference.size,
            "Image submitted"
        );

        let image = match decode_image(self.session.resources.blobs(), &reference).await {
            Ok(image) => image,
            Err(err) => {
                tracing::warn!(blob_id = %reference.id, error = %err, "Image decode failed");
                self.session.resources.release_image_reference();
                self.render_media(MediaView::None);
                self.enter(Mode::Idle);
                return Err(self.report(err));
            }
        };

        self.render_busy(Some(ANALYZING_IMAGE_TEXT));
        let outcome = engine.predict(&image).await;
        self.render_busy(None);

        match outcome {
            Ok(predictions) => {
                let ranked = rank(&predictions, self.config.confidence_threshold);
                tracing::debug!(
                    classes = predictions.len(),
                    top = ?ranked.top().map(|entry| entry.label.as_str()),
                    "Image classified"
                );
                self.render_results(ranked.into());
                Ok(())
            }
            Err(err) if err.is_unrecoverable() => {
                tracing::error!(error = %err, "Inference engine lost");
                self.session.resources.release_image_reference();
                self.render_media(MediaView::None);
                self.session.model = None;
                self.session.class_count = 0;
                Err(self.report(err.into()))
            }
            Err(err) => {
                // the image stays on screen so another one can be tried
                tracing::warn!(error = %err, "Image prediction failed");
                Err(self.advise(err.into()))
            }
        }
    }

    /// Upload cut off before its bytes were read. Reported like any other
    /// oversized file; nothing is acquired.
    pub fn reject_upload(&self, size: u64) -> Error {
        self.advise(Error::FileTooLarge {
            size,
            limit: self.config.max_upload_bytes,
        })
    }

    /// Hiding the page while streaming stops the webcam
    pub fn set_visibility(&mut self, hidden: bool) {
        if hidden && self.mode() == Mode::WebcamActive {
            tracing::info!("Page hidden, stopping webcam");
            self.stop_webcam();
        }
    }

    /// Release everything the session holds
    pub fn shutdown(&mut self) {
        self.teardown_webcam();
        self.session.resources.release_all();
        let stats = self.blob_stats();
        tracing::info!(
            blobs_created = stats.created,
            blobs_revoked = stats.revoked,
            "Session shut down"
        );
    }

    /// One webcam loop step: capture, throttle check, dispatch
    pub async fn tick(&mut self) -> TickOutcome {
        let Some(handle) = self.session.inference.take_tick() else {
            return TickOutcome::Idle;
        };

        if self.mode() != Mode::WebcamActive {
            self.session.inference.cancel();
            return TickOutcome::Cancelled;
        }

        let Some(engine) = self.session.model.clone() else {
            self.session.inference.cancel();
            return TickOutcome::Cancelled;
        };

        let Some(camera) = self.session.resources.camera_mut() else {
            self.session.inference.cancel();
            return TickOutcome::Cancelled;
        };

        let frame = match camera.capture_frame().await {
            Ok(frame) => frame,
            Err(err) => {
                tracing::error!(error = %err, "Frame capture failed");
                self.fail_webcam(err.into());
                return TickOutcome::Failed;
            }
        };

        let now = Instant::now();
        if !self.session.inference.throttle_allows(now) {
            self.session.inference.reschedule();
            return TickOutcome::Throttled;
        }

        let call = async move { engine.predict(&frame).await }.boxed();
        if !self.session.inference.dispatch(call, now) {
            self.session.inference.reschedule();
            return TickOutcome::Throttled;
        }

        tracing::trace!(generation = handle.generation(), "Inference dispatched");
        TickOutcome::Dispatched
    }

    /// Await the in-flight engine call and apply its result
    pub async fn complete_inference(&mut self) -> Option<CompletionOutcome> {
        if !self.session.inference.has_in_flight() {
            return None;
        }
        let completion = self.session.inference.next_completion().await;
        Some(self.apply_completion(completion))
    }

    fn apply_completion(&mut self, completion: Completion) -> CompletionOutcome {
        if completion.stale || self.mode() != Mode::WebcamActive {
            tracing::debug!(
                generation = completion.generation,
                "Discarding stale inference result"
            );
            return CompletionOutcome::Discarded;
        }

        match completion.result {
            Ok(predictions) => {
                self.session
                    .inference
                    .record_prediction(completion.finished_at);
                let ranked = rank(&predictions, self.config.confidence_threshold);
                self.render_results(ranked.into());
                self.session.inference.reschedule();
                CompletionOutcome::Rendered
            }
            Err(err) => {
                tracing::error!(error = %err, "Webcam prediction failed");
                self.fail_webcam(err.into());
                CompletionOutcome::Failed
            }
        }
    }

    /// Controller task: commands, engine completions and the frame clock,
    /// one at a time. Returns once every `SessionHandle` is dropped.
    pub async fn run(
        mut self,
        mut commands: mpsc::Receiver<SessionCommand>,
        initial_model: Option<String>,
    ) {
        if let Some(url) = initial_model {
            if let Err(err) = self.load_model(&url).await {
                tracing::warn!(model_url = %url, error = %err, "Initial model load failed");
            }
        }

        let mut frames = tokio::time::interval(self.config.frame_interval);
        frames.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => break,
                },
                completion = self.session.inference.next_completion(),
                    if self.session.inference.has_in_flight() =>
                {
                    self.apply_completion(completion);
                }
                _ = frames.tick(), if self.session.inference.is_scheduled() => {
                    self.tick().await;
                }
            }
        }

        self.shutdown();
    }

    async fn handle_command(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::LoadModel { url, reply } => {
                let _ = reply.send(self.load_model(&url).await);
            }
            SessionCommand::StartWebcam { reply } => {
                let _ = reply.send(self.start_webcam().await);
            }
            SessionCommand::StopWebcam { reply } => {
                let _ = reply.send(self.stop_webcam());
            }
            SessionCommand::SubmitImage { file, reply } => {
                let _ = reply.send(self.submit_image(file).await);
            }
            SessionCommand::RejectUpload { size, reply } => {
                let _ = reply.send(self.reject_upload(size));
            }
            SessionCommand::SetVisibility { hidden, reply } => {
                self.set_visibility(hidden);
                let _ = reply.send(());
            }
            SessionCommand::Snapshot { reply } => {
                let _ = reply.send(self.snapshot());
            }
        }
    }

    /// Cancel the loop and release the camera without a mode change
    fn teardown_webcam(&mut self) -> bool {
        self.session.inference.cancel();
        let released = self.session.resources.release_camera();
        if released {
            self.render_media(MediaView::None);
            tracing::info!("Webcam stopped");
        }
        released
    }

    async fn teardown_sources(&mut self) {
        self.teardown_webcam();
        if self.session.resources.release_image_reference() {
            self.render_media(MediaView::None);
        }
        self.settle().await;
    }

    async fn settle(&mut self) {
        if let Some(completion) = self.session.inference.settle().await {
            if !completion.stale {
                tracing::warn!("Settled a live inference call, result dropped");
            }
        }
    }

    /// Loop failure: camera released, no retry
    fn fail_webcam(&mut self, err: Error) -> Error {
        self.teardown_webcam();
        let message = match &err {
            Error::Inference(_) => WEBCAM_PREDICTION_FAILED.to_string(),
            other => other.user_message(),
        };
        self.fail_with(err, message)
    }

    /// Advisory errors are only rendered; the rest move the session to Error
    fn report(&mut self, err: Error) -> Error {
        if err.is_advisory() {
            self.advise(err)
        } else {
            let message = err.user_message();
            self.fail_with(err, message)
        }
    }

    fn fail_with(&mut self, err: Error, message: String) -> Error {
        self.session.mode.fail(message.clone());
        self.check_source_invariant();
        self.publish_mode();
        self.render_results(ResultView::error(message));
        err
    }

    /// Message rendered, mode untouched
    fn advise(&self, err: Error) -> Error {
        tracing::debug!(error = %err, mode = %self.mode(), "Operation rejected");
        self.render_results(ResultView::error(err.user_message()));
        err
    }

    fn enter(&mut self, next: Mode) {
        match self.session.mode.transition(next) {
            Ok(_) => {
                self.check_source_invariant();
                self.publish_mode();
            }
            Err(err) => tracing::warn!(error = %err, "Mode transition rejected"),
        }
    }

    /// A source is only held in a mode that owns one
    fn check_source_invariant(&self) {
        debug_assert!(
            self.session.resources.source_kind() == SourceKind::None
                || self.mode().holds_source(),
            "{:?} held in mode {}",
            self.session.resources.source_kind(),
            self.mode()
        );
    }

    fn publish_mode(&self) {
        self.sink.render(RenderEvent::ModeChanged(ModeView {
            mode: self.mode(),
            status: self.session.mode.status_text().to_string(),
            error: self.session.mode.error_cause().map(str::to_string),
        }));
    }

    fn render_results(&self, view: ResultView) {
        self.sink.render(RenderEvent::Results(view));
    }

    fn render_busy(&self, message: Option<&str>) {
        self.sink.render(RenderEvent::Busy(BusyView {
            message: message.map(str::to_string),
        }));
    }

    fn render_media(&self, view: MediaView) {
        self.sink.render(RenderEvent::Media(view));
    }
}

/// Decode the referenced bytes off the async threads
async fn decode_image(blobs: &BlobStore, reference: &ImageReference) -> Result<Arc<RgbImage>> {
    let (_, data) = blobs
        .get(&reference.id)
        .ok_or_else(|| Error::ImageDecode(format!("image reference {} revoked", reference.id)))?;

    tokio::task::spawn_blocking(move || {
        image::load_from_memory(&data).map(|img| Arc::new(img.to_rgb8()))
    })
    .await
    .map_err(|e| Error::Internal(format!("decode task failed: {}", e)))?
    .map_err(|e| Error::ImageDecode(e.to_string()))
}
