//! Instrumented collaborators shared by the integration tests

#![allow(dead_code)]

use image::{ImageFormat, RgbImage};
use std::io::Cursor;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tm_classifier::camera_device::{Camera, CameraDevice, CameraError, CaptureSettings};
use tm_classifier::inference_engine::{
    InferenceEngine, InferenceError, ModelLoadError, ModelLoader, ModelSource, Prediction,
};
use tm_classifier::render_sink::{MediaView, RenderEvent, RenderSink, ResultView};
use tm_classifier::resource_manager::ImageFile;

pub const MODEL_URL: &str = "https://teachablemachine.withgoogle.com/models/YFgzqdy36/";
pub const MIB: usize = 1024 * 1024;

#[derive(Clone, Default)]
pub struct Journal(pub Arc<Mutex<Vec<String>>>);

impl Journal {
    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.0.lock().unwrap().clear();
    }

    pub fn position(&self, entry: &str) -> Option<usize> {
        self.entries().iter().position(|e| e == entry)
    }
}

pub struct EngineSpy {
    pub calls: AtomicUsize,
    pub in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    pub delay: Mutex<Duration>,
    pub failure: Mutex<Option<InferenceError>>,
    pub predictions: Mutex<Vec<Prediction>>,
}

impl EngineSpy {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            delay: Mutex::new(Duration::ZERO),
            failure: Mutex::new(None),
            predictions: Mutex::new(vec![
                Prediction::new("Cat", 0.2),
                Prediction::new("Dog", 0.7),
                Prediction::new("Bird", 0.1),
            ]),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    pub fn fail_with(&self, err: InferenceError) {
        *self.failure.lock().unwrap() = Some(err);
    }
}

pub struct MockEngine {
    pub spy: Arc<EngineSpy>,
    pub classes: usize,
}

impl InferenceEngine for MockEngine {
    fn total_classes(&self) -> usize {
        self.classes
    }

    async fn predict(&self, _image: &RgbImage) -> Result<Vec<Prediction>, InferenceError> {
        let spy = &self.spy;
        spy.calls.fetch_add(1, Ordering::SeqCst);
        let running = spy.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        spy.max_in_flight.fetch_max(running, Ordering::SeqCst);

        let delay = *spy.delay.lock().unwrap();
        tokio::time::sleep(delay).await;

        spy.in_flight.fetch_sub(1, Ordering::SeqCst);
        let failure = spy.failure.lock().unwrap().clone();
        match failure {
            Some(err) => Err(err),
            None => Ok(spy.predictions.lock().unwrap().clone()),
        }
    }
}

pub struct MockLoader {
    pub spy: Arc<EngineSpy>,
    pub failure: Arc<Mutex<Option<ModelLoadError>>>,
    pub loads: Arc<AtomicUsize>,
}

impl ModelLoader for MockLoader {
    type Engine = MockEngine;

    async fn load(&self, _source: &ModelSource) -> Result<MockEngine, ModelLoadError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        let failure = self.failure.lock().unwrap().clone();
        if let Some(err) = failure {
            return Err(err);
        }
        Ok(MockEngine {
            spy: Arc::clone(&self.spy),
            classes: 3,
        })
    }
}

#[derive(Default)]
pub struct CameraSpy {
    pub opened: AtomicUsize,
    pub stopped: AtomicUsize,
    pub fail_capture: AtomicBool,
    pub open_failure: Mutex<Option<CameraError>>,
}

pub struct MockCamera {
    pub spy: Arc<CameraSpy>,
    pub journal: Journal,
    pub stopped: bool,
}

impl Camera for MockCamera {
    async fn play(&mut self) -> Result<(), CameraError> {
        self.journal.push("camera:play");
        Ok(())
    }

    async fn capture_frame(&mut self) -> Result<Arc<RgbImage>, CameraError> {
        if self.stopped || self.spy.fail_capture.load(Ordering::SeqCst) {
            return Err(CameraError::StreamEnded);
        }
        Ok(Arc::new(RgbImage::new(4, 4)))
    }

    fn stop(&mut self) {
        if !self.stopped {
            self.stopped = true;
            self.spy.stopped.fetch_add(1, Ordering::SeqCst);
            self.journal.push("camera:stop");
        }
    }
}

pub struct MockDevice {
    pub spy: Arc<CameraSpy>,
    pub journal: Journal,
}

impl CameraDevice for MockDevice {
    type Camera = MockCamera;

    async fn open(&self, _settings: CaptureSettings) -> Result<MockCamera, CameraError> {
        let failure = self.spy.open_failure.lock().unwrap().clone();
        if let Some(err) = failure {
            return Err(err);
        }
        self.spy.opened.fetch_add(1, Ordering::SeqCst);
        self.journal.push("camera:open");
        Ok(MockCamera {
            spy: Arc::clone(&self.spy),
            journal: self.journal.clone(),
            stopped: false,
        })
    }
}

pub struct RecordingSink {
    pub events: Mutex<Vec<RenderEvent>>,
    pub journal: Journal,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<RenderEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn last_results(&self) -> Option<ResultView> {
        self.events().into_iter().rev().find_map(|event| match event {
            RenderEvent::Results(view) => Some(view),
            _ => None,
        })
    }

    pub fn ranked_count(&self) -> usize {
        self.events()
            .iter()
            .filter(|event| matches!(event, RenderEvent::Results(ResultView::Ranked { .. })))
            .count()
    }
}

impl RenderSink for RecordingSink {
    fn render(&self, event: RenderEvent) {
        let tag = match &event {
            RenderEvent::ModeChanged(view) => format!("mode:{}", view.mode),
            RenderEvent::Busy(view) => format!("busy:{}", view.message.as_deref().unwrap_or("-")),
            RenderEvent::Results(_) => "results".to_string(),
            RenderEvent::Media(MediaView::None) => "media:none".to_string(),
            RenderEvent::Media(MediaView::Camera) => "media:camera".to_string(),
            RenderEvent::Media(MediaView::Image { .. }) => "media:image".to_string(),
        };
        self.journal.push(tag);
        self.events.lock().unwrap().push(event);
    }
}


pub fn png_file() -> ImageFile {
    let mut buf = Cursor::new(Vec::new());
    RgbImage::from_pixel(8, 8, image::Rgb([200, 10, 10]))
        .write_to(&mut buf, ImageFormat::Png)
        .unwrap();
    ImageFile::new("image/png", buf.into_inner()).with_file_name("cat.png")
}

/// Model loader, camera device and their spies, wired to one journal
pub struct Collaborators {
    pub loader: MockLoader,
    pub device: MockDevice,
    pub engine: Arc<EngineSpy>,
    pub camera: Arc<CameraSpy>,
    pub load_failure: Arc<Mutex<Option<ModelLoadError>>>,
    pub journal: Journal,
}

pub fn collaborators() -> Collaborators {
    let journal = Journal::default();
    let engine = Arc::new(EngineSpy::new());
    let camera = Arc::new(CameraSpy::default());
    let load_failure = Arc::new(Mutex::new(None));

    let loader = MockLoader {
        spy: Arc::clone(&engine),
        failure: Arc::clone(&load_failure),
        loads: Arc::new(AtomicUsize::new(0)),
    };
    let device = MockDevice {
        spy: Arc::clone(&camera),
        journal: journal.clone(),
    };

    Collaborators {
        loader,
        device,
        engine,
        camera,
        load_failure,
        journal,
    }
}

impl RecordingSink {
    pub fn new(journal: Journal) -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            journal,
        }
    }
}
