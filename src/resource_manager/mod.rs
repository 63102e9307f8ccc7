//! Resource Lifecycle Manager
//!
//! Owns the single active input source. Acquiring one source always releases
//! the other first, so a camera and an image reference are never held at the
//! same time. Release is idempotent and deterministic; dropping the manager
//! releases whatever is still held.

mod blob_store;

pub use blob_store::{BlobStats, BlobStore, ImageFile, ImageReference};

use serde::Serialize;
use std::sync::Arc;

use crate::camera_device::{Camera, CameraDevice, CameraError, CaptureSettings};

/// The session's input source
pub enum ActiveSource<C> {
    None,
    Camera(C),
    Image(ImageReference),
}

/// Source kind without the handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    None,
    Camera,
    Image,
}

pub struct ResourceManager<C: Camera> {
    active: ActiveSource<C>,
    blobs: Arc<BlobStore>,
}

impl<C: Camera> ResourceManager<C> {
    pub fn new(blobs: Arc<BlobStore>) -> Self {
        Self {
            active: ActiveSource::None,
            blobs,
        }
    }

    pub fn source_kind(&self) -> SourceKind {
        match self.active {
            ActiveSource::None => SourceKind::None,
            ActiveSource::Camera(_) => SourceKind::Camera,
            ActiveSource::Image(_) => SourceKind::Image,
        }
    }

    pub fn blobs(&self) -> &Arc<BlobStore> {
        &self.blobs
    }

    /// Open and start the camera. Any image reference is released first.
    pub async fn acquire_camera<D>(
        &mut self,
        device: &D,
        settings: CaptureSettings,
    ) -> Result<(), CameraError>
    where
        D: CameraDevice<Camera = C>,
    {
        self.release_image_reference();
        self.release_camera();

        let mut camera = device.open(settings).await?;
        if let Err(e) = camera.play().await {
            camera.stop();
            return Err(e);
        }

        self.active = ActiveSource::Camera(camera);
        Ok(())
    }

    /// Stop the camera if held. Returns whether anything was released.
    pub fn release_camera(&mut self) -> bool {
        match std::mem::replace(&mut self.active, ActiveSource::None) {
            ActiveSource::Camera(mut camera) => {
                camera.stop();
                true
            }
            other => {
                self.active = other;
                false
            }
        }
    }

    /// Store the file as the active source. Any camera is released first.
    pub fn acquire_image_reference(&mut self, file: ImageFile) -> ImageReference {
        self.release_camera();
        self.release_image_reference();

        let reference = self.blobs.create(file);
        self.active = ActiveSource::Image(reference.clone());
        reference
    }

    /// Revoke the image reference if held. Returns whether anything was released.
    pub fn release_image_reference(&mut self) -> bool {
        match std::mem::replace(&mut self.active, ActiveSource::None) {
            ActiveSource::Image(reference) => {
                self.blobs.revoke(&reference.id);
                true
            }
            other => {
                self.active = other;
                false
            }
        }
    }

    pub fn release_all(&mut self) {
        self.release_camera();
        self.release_image_reference();
    }

    pub fn camera_mut(&mut self) -> Option<&mut C> {
        match &mut self.active {
            ActiveSource::Camera(camera) => Some(camera),
            _ => None,
        }
    }

    pub fn image_reference(&self) -> Option<&ImageReference> {
        match &self.active {
            ActiveSource::Image(reference) => Some(reference),
            _ => None,
        }
    }
}

impl<C: Camera> Drop for ResourceManager<C> {
    fn drop(&mut self) {
        self.release_all();
    }
}
