//! Per-element surfaces shared by the engine backends.

use super::{ElementId, EngineError, RenderEvent, RenderedFrame, Translation, Viewport};
use crate::model::{DecodedImage, PixelData, Size};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;

const RENDER_EVENT_CAPACITY: usize = 64;

#[derive(Default)]
struct Surface {
    canvas: Size,
    image: Option<Arc<DecodedImage>>,
    viewport: Viewport,
}

/// Enabled elements, what they show and how.
pub struct ElementTable {
    surfaces: Mutex<HashMap<ElementId, Surface>>,
    renders: broadcast::Sender<RenderEvent>,
}

impl Default for ElementTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ElementTable {
    pub fn new() -> Self {
        let (renders, _) = broadcast::channel(RENDER_EVENT_CAPACITY);
        Self {
            surfaces: Mutex::new(HashMap::new()),
            renders,
        }
    }

    pub fn enable(&self, element: ElementId) -> Result<(), EngineError> {
        let mut surfaces = self.surfaces.lock();
        if surfaces.contains_key(&element) {
            return Err(EngineError::AlreadyEnabled(element));
        }
        surfaces.insert(element, Surface::default());
        Ok(())
    }

    pub fn disable(&self, element: ElementId) -> Result<(), EngineError> {
        self.surfaces
            .lock()
            .remove(&element)
            .map(|_| ())
            .ok_or(EngineError::NotEnabled(element))
    }

    pub fn is_enabled(&self, element: ElementId) -> bool {
        self.surfaces.lock().contains_key(&element)
    }

    pub fn enabled_count(&self) -> usize {
        self.surfaces.lock().len()
    }

    pub fn display(&self, element: ElementId, image: Arc<DecodedImage>) -> Result<(), EngineError> {
        let viewport = {
            let mut surfaces = self.surfaces.lock();
            let surface = surfaces
                .get_mut(&element)
                .ok_or(EngineError::NotEnabled(element))?;
            if surface.canvas.is_empty() {
                surface.canvas = image.size();
            }
            surface.viewport = fit_viewport(&image, surface.canvas);
            surface.image = Some(image);
            surface.viewport
        };
        self.notify(element, viewport);
        Ok(())
    }

    pub fn image(&self, element: ElementId) -> Option<Arc<DecodedImage>> {
        self.surfaces
            .lock()
            .get(&element)
            .and_then(|surface| surface.image.clone())
    }

    pub fn resize(&self, element: ElementId, size: Size) -> Result<(), EngineError> {
        let viewport = {
            let mut surfaces = self.surfaces.lock();
            let surface = surfaces
                .get_mut(&element)
                .ok_or(EngineError::NotEnabled(element))?;
            surface.canvas = size;
            surface.viewport
        };
        self.notify(element, viewport);
        Ok(())
    }

    pub fn canvas(&self, element: ElementId) -> Result<Size, EngineError> {
        self.surfaces
            .lock()
            .get(&element)
            .map(|surface| surface.canvas)
            .ok_or(EngineError::NotEnabled(element))
    }

    pub fn viewport(&self, element: ElementId) -> Result<Viewport, EngineError> {
        self.surfaces
            .lock()
            .get(&element)
            .map(|surface| surface.viewport)
            .ok_or(EngineError::NotEnabled(element))
    }

    pub fn set_viewport(&self, element: ElementId, viewport: Viewport) -> Result<(), EngineError> {
        {
            let mut surfaces = self.surfaces.lock();
            let surface = surfaces
                .get_mut(&element)
                .ok_or(EngineError::NotEnabled(element))?;
            surface.viewport = viewport;
        }
        self.notify(element, viewport);
        Ok(())
    }

    pub fn default_viewport(&self, element: ElementId) -> Result<Viewport, EngineError> {
        let surfaces = self.surfaces.lock();
        let surface = surfaces
            .get(&element)
            .ok_or(EngineError::NotEnabled(element))?;
        let image = surface
            .image
            .as_ref()
            .ok_or(EngineError::NoImage(element))?;
        Ok(fit_viewport(image, surface.canvas))
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RenderEvent> {
        self.renders.subscribe()
    }

    /// Draw the element's image into its canvas.
    pub fn render(&self, element: ElementId) -> Result<RenderedFrame, EngineError> {
        let (canvas, image, viewport) = {
            let surfaces = self.surfaces.lock();
            let surface = surfaces
                .get(&element)
                .ok_or(EngineError::NotEnabled(element))?;
            let image = surface
                .image
                .clone()
                .ok_or(EngineError::NoImage(element))?;
            (surface.canvas, image, surface.viewport)
        };
        Ok(rasterize(&image, canvas, &viewport))
    }

    fn notify(&self, element: ElementId, viewport: Viewport) {
        // No subscribers is fine.
        let _ = self.renders.send(RenderEvent { element, viewport });
    }
}

fn fit_viewport(image: &DecodedImage, canvas: Size) -> Viewport {
    let scale = if image.size().is_empty() || canvas.is_empty() {
        1.0
    } else {
        let sx = f64::from(canvas.width) / f64::from(image.width());
        let sy = f64::from(canvas.height) / f64::from(image.height());
        sx.min(sy)
    };
    Viewport {
        scale,
        translation: Translation::default(),
        rotation: 0.0,
        voi: image.default_voi(),
        invert: image.invert(),
    }
}

fn rasterize(image: &DecodedImage, canvas: Size, viewport: &Viewport) -> RenderedFrame {
    let canvas = if canvas.is_empty() { image.size() } else { canvas };
    let (out_w, out_h) = (canvas.width as usize, canvas.height as usize);
    let mut rgba = vec![0u8; out_w * out_h * 4];
    for chunk in rgba.chunks_exact_mut(4) {
        chunk[3] = 255;
    }

    let (img_w, img_h) = (f64::from(image.width()), f64::from(image.height()));
    let scale = if viewport.scale > 0.0 { viewport.scale } else { 1.0 };
    let (sin, cos) = viewport.rotation.to_radians().sin_cos();
    let (cx, cy) = (out_w as f64 / 2.0, out_h as f64 / 2.0);

    for y in 0..out_h {
        for x in 0..out_w {
            let dx = x as f64 + 0.5 - cx;
            let dy = y as f64 + 0.5 - cy;
            // Inverse of rotate(scale(p + translation)).
            let rx = dx * cos + dy * sin;
            let ry = -dx * sin + dy * cos;
            let ix = rx / scale - viewport.translation.x + img_w / 2.0;
            let iy = ry / scale - viewport.translation.y + img_h / 2.0;
            if ix < 0.0 || iy < 0.0 || ix >= img_w || iy >= img_h {
                continue;
            }
            let src = iy as usize * image.width() as usize + ix as usize;
            let dst = (y * out_w + x) * 4;
            if let Some(pixel) = sample(image, src, viewport) {
                rgba[dst..dst + 4].copy_from_slice(&pixel);
            }
        }
    }

    RenderedFrame {
        width: canvas.width,
        height: canvas.height,
        rgba,
    }
}

fn sample(image: &DecodedImage, index: usize, viewport: &Viewport) -> Option<[u8; 4]> {
    match image.pixels() {
        PixelData::Gray(samples) => {
            let value = samples.value(index)?;
            let mut level = match viewport.voi {
                Some(voi) => voi.apply(value),
                None => value.clamp(0.0, 255.0) as u8,
            };
            if viewport.invert {
                level = 255 - level;
            }
            Some([level, level, level, 255])
        }
        PixelData::Rgba(rgba) => {
            let start = index * 4;
            let px = rgba.get(start..start + 4)?;
            Some([px[0], px[1], px[2], px[3]])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checker() -> Arc<DecodedImage> {
        // 2x2: red, green / blue, white
        Arc::new(DecodedImage::raster(
            2,
            2,
            vec![
                255, 0, 0, 255, 0, 255, 0, 255, //
                0, 0, 255, 255, 255, 255, 255, 255,
            ],
        ))
    }

    #[test]
    fn test_enable_twice_is_an_error() {
        let table = ElementTable::new();
        let element = ElementId::next();
        table.enable(element).unwrap();
        assert_eq!(
            table.enable(element),
            Err(EngineError::AlreadyEnabled(element))
        );
        table.disable(element).unwrap();
        assert!(table.enable(element).is_ok());
    }

    #[test]
    fn test_display_fits_image_into_canvas() {
        let table = ElementTable::new();
        let element = ElementId::next();
        table.enable(element).unwrap();
        table.resize(element, Size::new(8, 4)).unwrap();
        table.display(element, checker()).unwrap();
        assert_eq!(table.viewport(element).unwrap().scale, 2.0);
    }

    #[test]
    fn test_render_identity_copies_pixels() {
        let table = ElementTable::new();
        let element = ElementId::next();
        table.enable(element).unwrap();
        table.display(element, checker()).unwrap();
        let frame = table.render(element).unwrap();
        assert_eq!((frame.width, frame.height), (2, 2));
        assert_eq!(&frame.rgba[0..4], &[255, 0, 0, 255]);
        assert_eq!(&frame.rgba[12..16], &[255, 255, 255, 255]);
    }

    #[test]
    fn test_render_rotation_moves_corners() {
        let table = ElementTable::new();
        let element = ElementId::next();
        table.enable(element).unwrap();
        table.display(element, checker()).unwrap();
        let mut viewport = table.viewport(element).unwrap();
        viewport.rotation = 180.0;
        table.set_viewport(element, viewport).unwrap();
        let frame = table.render(element).unwrap();
        assert_eq!(&frame.rgba[0..4], &[255, 255, 255, 255]);
    }

    #[test]
    fn test_viewport_changes_are_broadcast() {
        let table = ElementTable::new();
        let element = ElementId::next();
        let mut events = table.subscribe();
        table.enable(element).unwrap();
        table.display(element, checker()).unwrap();
        let event = events.try_recv().unwrap();
        assert_eq!(event.element, element);
        assert_eq!(event.viewport.scale, 1.0);
    }
}
