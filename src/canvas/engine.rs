/*
 *  canvas/engine.rs
 *
 *  PinFrame - ink at a glance
 *  (c) 2024-26 PinFrame project
 *
 *  Canvas persistence, element operations and display path
 *
 *  This program is free software: you can redistribute it and/or modify
 *  it under the terms of the GNU General Public License as published by
 *  the Free Software Foundation, either version 3 of the License, or
 *  (at your option) any later version.
 *
 *  This program is distributed in the hope that it will be useful,
 *  but WITHOUT ANY WARRANTY; without even the implied warranty of
 *  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 *  GNU General Public License for more details.
 *
 *  See <http://www.gnu.org/licenses/> to get a copy of the GNU General
 *  Public License.
 *
 */

use std::fmt;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::canvas::json;
use crate::canvas::model::{
    validate_id, Canvas, Element, ImageFormat, MAX_ELEMENTS, MAX_ID_LEN, MAX_IMAGE_SIZE,
    MAX_NAME_LEN,
};
use crate::canvas::render;
use crate::display_service::{DisplayService, OpClass, ServiceError};
use crate::panel::{FrameBuffer, RefreshMode};
use crate::store::{KvStore, StoreError, NS_CANVAS, NS_IMAGES};

/// Error type for canvas operations.
#[derive(Debug)]
pub enum CanvasError {
    /// Malformed id, name or payload
    InvalidArgument(String),

    /// Canvas, element or image does not exist
    NotFound,

    /// A canvas with this id already exists
    AlreadyExists,

    /// The canvas holds the maximum number of elements
    Full,

    /// The element id collides within the canvas
    Duplicate,

    /// Image exceeds the 64 KiB store limit
    TooLarge,

    /// The underlying key-value store failed
    Storage(StoreError),

    /// Rendering or refreshing the panel failed
    Display(ServiceError),
}

impl fmt::Display for CanvasError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CanvasError::InvalidArgument(msg) => write!(f, "Invalid argument: {}", msg),
            CanvasError::NotFound => write!(f, "Canvas not found"),
            CanvasError::AlreadyExists => write!(f, "Canvas already exists"),
            CanvasError::Full => write!(f, "Canvas element limit reached"),
            CanvasError::Duplicate => write!(f, "Element id already exists in canvas"),
            CanvasError::TooLarge => write!(f, "Image too large"),
            CanvasError::Storage(e) => write!(f, "Canvas storage failed: {}", e),
            CanvasError::Display(e) => write!(f, "Canvas display failed: {}", e),
        }
    }
}

impl std::error::Error for CanvasError {}

impl From<StoreError> for CanvasError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound => CanvasError::NotFound,
            other => CanvasError::Storage(other),
        }
    }
}

impl From<ServiceError> for CanvasError {
    fn from(e: ServiceError) -> Self {
        CanvasError::Display(e)
    }
}

/// Image store metadata, persisted as `<image_id>_meta`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageMeta {
    pub format: ImageFormat,
    pub size: usize,
    pub stored_time: u32,
}

/// Summary row for canvas listings.
#[derive(Debug, Serialize)]
pub struct CanvasSummary {
    pub id: String,
    pub name: String,
    pub created_time: u32,
    pub modified_time: u32,
    pub element_count: usize,
}

fn unix_now() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as u32)
        .unwrap_or(0)
}

/// Scene persistence and the render path.
///
/// Scene mutations and rendering are serialized by an internal mutex; the
/// engine holds no canvas copy across calls, only during one operation.
/// The panel framebuffer is borrowed from the display service only for the
/// duration of `render`/`display`.
pub struct CanvasEngine {
    store: Arc<dyn KvStore>,
    lock: Mutex<()>,
}

impl CanvasEngine {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self {
            store,
            lock: Mutex::new(()),
        }
    }

    /// Create an empty canvas. Fails with `AlreadyExists` on id collision.
    pub async fn create(&self, id: &str, name: &str) -> Result<(), CanvasError> {
        if !validate_id(id) {
            return Err(CanvasError::InvalidArgument(format!(
                "canvas id must be 1..={} bytes",
                MAX_ID_LEN
            )));
        }
        if name.is_empty() || name.len() > MAX_NAME_LEN {
            return Err(CanvasError::InvalidArgument(format!(
                "canvas name must be 1..={} bytes",
                MAX_NAME_LEN
            )));
        }

        let _guard = self.lock.lock().await;
        if self.store.get_blob(NS_CANVAS, id).is_ok() {
            return Err(CanvasError::AlreadyExists);
        }

        let canvas = Canvas::new(id, name, unix_now());
        self.persist(&canvas)?;
        info!("Created canvas {} ({})", id, name);
        Ok(())
    }

    /// Delete a canvas.
    pub async fn delete(&self, id: &str) -> Result<(), CanvasError> {
        let _guard = self.lock.lock().await;
        self.store.erase(NS_CANVAS, id)?;
        self.store.commit(NS_CANVAS)?;
        info!("Deleted canvas {}", id);
        Ok(())
    }

    /// Load a canvas.
    pub async fn get(&self, id: &str) -> Result<Canvas, CanvasError> {
        let _guard = self.lock.lock().await;
        self.load(id)
    }

    /// Upsert a canvas, touching its modification time.
    pub async fn update(&self, canvas: &Canvas) -> Result<(), CanvasError> {
        if !validate_id(&canvas.id) {
            return Err(CanvasError::InvalidArgument("invalid canvas id".to_string()));
        }
        let _guard = self.lock.lock().await;
        let mut updated = canvas.clone();
        updated.modified_time = unix_now();
        self.persist(&updated)
    }

    /// Ids of all stored canvases.
    pub async fn list(&self) -> Result<Vec<String>, CanvasError> {
        let _guard = self.lock.lock().await;
        Ok(self.store.keys(NS_CANVAS)?)
    }

    /// Summaries of all stored canvases, for the web listing.
    pub async fn summaries(&self) -> Result<Vec<CanvasSummary>, CanvasError> {
        let _guard = self.lock.lock().await;
        let mut rows = Vec::new();
        for id in self.store.keys(NS_CANVAS)? {
            match self.load(&id) {
                Ok(canvas) => rows.push(CanvasSummary {
                    id: canvas.id,
                    name: canvas.name,
                    created_time: canvas.created_time,
                    modified_time: canvas.modified_time,
                    element_count: canvas.elements.len(),
                }),
                Err(e) => warn!("Skipping unreadable canvas {}: {}", id, e),
            }
        }
        Ok(rows)
    }

    /// Append an element. Fails with `Full` at the element cap and
    /// `Duplicate` on id collision.
    pub async fn add_element(&self, id: &str, element: Element) -> Result<(), CanvasError> {
        if !validate_id(&element.id) {
            return Err(CanvasError::InvalidArgument("invalid element id".to_string()));
        }

        let _guard = self.lock.lock().await;
        let mut canvas = self.load(id)?;

        if canvas.elements.len() >= MAX_ELEMENTS {
            return Err(CanvasError::Full);
        }
        if canvas.element(&element.id).is_some() {
            return Err(CanvasError::Duplicate);
        }

        canvas.elements.push(element);
        canvas.modified_time = unix_now();
        self.persist(&canvas)
    }

    /// Replace an element in place.
    pub async fn update_element(
        &self,
        id: &str,
        element_id: &str,
        element: Element,
    ) -> Result<(), CanvasError> {
        let _guard = self.lock.lock().await;
        let mut canvas = self.load(id)?;

        let index = canvas.element_index(element_id).ok_or(CanvasError::NotFound)?;
        canvas.elements[index] = element;
        canvas.modified_time = unix_now();
        self.persist(&canvas)
    }

    /// Remove an element, preserving the order of the rest.
    pub async fn remove_element(&self, id: &str, element_id: &str) -> Result<(), CanvasError> {
        let _guard = self.lock.lock().await;
        let mut canvas = self.load(id)?;

        let index = canvas.element_index(element_id).ok_or(CanvasError::NotFound)?;
        canvas.elements.remove(index);
        canvas.modified_time = unix_now();
        self.persist(&canvas)
    }

    /// Store image bytes with a metadata sidecar.
    pub async fn store_image(
        &self,
        image_id: &str,
        data: &[u8],
        format: ImageFormat,
    ) -> Result<(), CanvasError> {
        if !validate_id(image_id) {
            return Err(CanvasError::InvalidArgument("invalid image id".to_string()));
        }
        if data.is_empty() {
            return Err(CanvasError::InvalidArgument("empty image".to_string()));
        }
        if data.len() > MAX_IMAGE_SIZE {
            return Err(CanvasError::TooLarge);
        }

        let _guard = self.lock.lock().await;
        let meta = ImageMeta {
            format,
            size: data.len(),
            stored_time: unix_now(),
        };
        let meta_bytes = serde_json::to_vec(&meta)
            .map_err(|e| CanvasError::InvalidArgument(e.to_string()))?;

        self.store.set_blob(NS_IMAGES, &format!("{}_meta", image_id), &meta_bytes)?;
        self.store.set_blob(NS_IMAGES, image_id, data)?;
        self.store.commit(NS_IMAGES)?;
        info!("Stored image {} ({} bytes, {:?})", image_id, data.len(), format);
        Ok(())
    }

    /// Delete an image and its metadata. A missing meta key is tolerated.
    pub async fn delete_image(&self, image_id: &str) -> Result<(), CanvasError> {
        let _guard = self.lock.lock().await;
        match self.store.erase(NS_IMAGES, &format!("{}_meta", image_id)) {
            Ok(()) | Err(StoreError::NotFound) => {}
            Err(e) => return Err(e.into()),
        }
        self.store.erase(NS_IMAGES, image_id)?;
        self.store.commit(NS_IMAGES)?;
        info!("Deleted image {}", image_id);
        Ok(())
    }

    /// Fetch image bytes and metadata.
    pub async fn get_image(&self, image_id: &str) -> Result<(Vec<u8>, ImageMeta), CanvasError> {
        let _guard = self.lock.lock().await;
        let data = self.store.get_blob(NS_IMAGES, image_id)?;
        let meta_bytes = self.store.get_blob(NS_IMAGES, &format!("{}_meta", image_id))?;
        let meta = serde_json::from_slice(&meta_bytes)
            .map_err(|e| CanvasError::InvalidArgument(e.to_string()))?;
        Ok((data, meta))
    }

    /// Rasterize a canvas into the given framebuffer.
    pub async fn render(&self, id: &str, fb: &mut FrameBuffer) -> Result<(), CanvasError> {
        let _guard = self.lock.lock().await;
        let canvas = self.load(id)?;
        render::render_canvas(fb, &canvas);
        debug!("Rendered canvas {} with {} elements", id, canvas.elements.len());
        Ok(())
    }

    /// Render a canvas into the panel framebuffer and trigger a full
    /// refresh.
    pub async fn display(&self, id: &str, service: &DisplayService) -> Result<(), CanvasError> {
        let canvas = {
            let _guard = self.lock.lock().await;
            self.load(id)?
        };

        service
            .with_driver(OpClass::Draw, |driver| {
                render::render_canvas(driver.framebuffer_mut(), &canvas);
            })
            .await?;
        service.refresh(RefreshMode::Full).await?;

        info!("Displayed canvas {}", id);
        Ok(())
    }

    /// Export a canvas to its canonical JSON form.
    pub async fn export_json(&self, id: &str) -> Result<String, CanvasError> {
        let _guard = self.lock.lock().await;
        let canvas = self.load(id)?;
        Ok(json::export(&canvas))
    }

    /// Import (upsert) a canvas from canonical JSON, touching its
    /// modification time.
    pub async fn import_json(&self, json_str: &str) -> Result<String, CanvasError> {
        let mut canvas = json::import(json_str)
            .map_err(|e| CanvasError::InvalidArgument(e.to_string()))?;

        let _guard = self.lock.lock().await;
        canvas.modified_time = unix_now();
        self.persist(&canvas)?;
        info!("Imported canvas {}", canvas.id);
        Ok(canvas.id)
    }

    fn load(&self, id: &str) -> Result<Canvas, CanvasError> {
        let bytes = self.store.get_blob(NS_CANVAS, id)?;
        let text = String::from_utf8(bytes)
            .map_err(|_| CanvasError::Storage(StoreError::InvalidKey(id.to_string())))?;
        json::import(&text).map_err(|e| CanvasError::InvalidArgument(e.to_string()))
    }

    fn persist(&self, canvas: &Canvas) -> Result<(), CanvasError> {
        let text = json::export(canvas);
        self.store.set_blob(NS_CANVAS, &canvas.id, text.as_bytes())?;
        self.store.commit(NS_CANVAS)?;
        Ok(())
    }
}
