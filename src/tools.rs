//! Interaction tools bound to enabled elements.

use crate::engine::{ElementId, EngineError, RenderingEngine, Viewport};
use crate::model::Voi;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ToolName {
    Zoom,
    Pan,
    WindowLevel,
    Rotate,
}

impl ToolName {
    pub const ALL: [ToolName; 4] = [
        ToolName::Zoom,
        ToolName::Pan,
        ToolName::WindowLevel,
        ToolName::Rotate,
    ];

    pub fn label(self) -> &'static str {
        match self {
            ToolName::Zoom => "Zoom",
            ToolName::Pan => "Pan",
            ToolName::WindowLevel => "Window/Level",
            ToolName::Rotate => "Rotate",
        }
    }

    fn cursor(self) -> Cursor {
        match self {
            ToolName::Zoom => Cursor::ZoomIn,
            ToolName::Pan => Cursor::Grab,
            ToolName::WindowLevel => Cursor::ContextMenu,
            ToolName::Rotate => Cursor::Rotate,
        }
    }
}

impl fmt::Display for ToolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Pointer buttons, one bit each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ButtonMask(u8);

impl ButtonMask {
    pub const NONE: ButtonMask = ButtonMask(0);
    pub const PRIMARY: ButtonMask = ButtonMask(1);
    pub const SECONDARY: ButtonMask = ButtonMask(2);
    pub const AUXILIARY: ButtonMask = ButtonMask(4);

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn intersects(self, other: ButtonMask) -> bool {
        self.0 & other.0 != 0
    }
}

impl std::ops::BitOr for ButtonMask {
    type Output = ButtonMask;

    fn bitor(self, rhs: ButtonMask) -> ButtonMask {
        ButtonMask(self.0 | rhs.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ToolMode {
    #[default]
    Disabled,
    Active(ButtonMask),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Cursor {
    #[default]
    Default,
    ZoomIn,
    Grab,
    ContextMenu,
    Rotate,
}

/// Scale bounds enforced by the Zoom tool.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ZoomConfig {
    pub min_scale: f64,
    pub max_scale: f64,
    pub invert: bool,
}

impl Default for ZoomConfig {
    fn default() -> Self {
        Self {
            min_scale: 0.1,
            max_scale: 20.0,
            invert: false,
        }
    }
}

impl ZoomConfig {
    pub fn clamp(&self, scale: f64) -> f64 {
        scale.clamp(self.min_scale, self.max_scale)
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ToolError {
    #[error("tools have not been registered")]
    NotRegistered,

    #[error("{0} is not enabled")]
    NotEnabled(ElementId),

    #[error("no tools are bound to {0}")]
    NotBound(ElementId),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

#[derive(Debug, Default)]
struct ElementTools {
    modes: BTreeMap<ToolName, ToolMode>,
    cursor: Cursor,
}

impl ElementTools {
    fn active(&self) -> Option<(ToolName, ButtonMask)> {
        self.modes.iter().find_map(|(tool, mode)| match mode {
            ToolMode::Active(mask) => Some((*tool, *mask)),
            ToolMode::Disabled => None,
        })
    }
}

/// Tool catalogue plus the per-element tool tables.
pub struct ToolRegistry {
    engine: Arc<dyn RenderingEngine>,
    zoom: ZoomConfig,
    catalogue: Mutex<Vec<ToolName>>,
    elements: Mutex<HashMap<ElementId, ElementTools>>,
}

impl ToolRegistry {
    pub fn new(engine: Arc<dyn RenderingEngine>, zoom: ZoomConfig) -> Self {
        Self {
            engine,
            zoom,
            catalogue: Mutex::new(Vec::new()),
            elements: Mutex::new(HashMap::new()),
        }
    }

    pub fn zoom_config(&self) -> ZoomConfig {
        self.zoom
    }

    /// Add every tool to the catalogue. Later calls do nothing.
    pub fn register_all(&self) -> Result<(), ToolError> {
        let mut catalogue = self.catalogue.lock();
        if catalogue.is_empty() {
            catalogue.extend(ToolName::ALL);
            log::debug!(
                "Registered tools (zoom bounds {}..{})",
                self.zoom.min_scale,
                self.zoom.max_scale
            );
        }
        Ok(())
    }

    pub fn is_registered(&self) -> bool {
        !self.catalogue.lock().is_empty()
    }

    /// Give `element` its own table with every tool disabled. Binding an
    /// element that already has tools keeps its current modes.
    pub fn bind_tool_to_element(&self, element: ElementId) -> Result<(), ToolError> {
        if !self.is_registered() {
            return Err(ToolError::NotRegistered);
        }
        if !self.engine.is_enabled(element) {
            return Err(ToolError::NotEnabled(element));
        }
        let mut elements = self.elements.lock();
        let tools = elements.entry(element).or_default();
        for tool in ToolName::ALL {
            tools.modes.entry(tool).or_default();
        }
        Ok(())
    }

    /// Make `tool` the only active tool on `element`.
    pub fn activate(
        &self,
        element: ElementId,
        tool: ToolName,
        mask: ButtonMask,
    ) -> Result<(), ToolError> {
        if !self.engine.is_enabled(element) {
            return Err(ToolError::NotEnabled(element));
        }
        let mut elements = self.elements.lock();
        let tools = elements
            .get_mut(&element)
            .ok_or(ToolError::NotBound(element))?;
        for mode in tools.modes.values_mut() {
            *mode = ToolMode::Disabled;
        }
        tools.modes.insert(tool, ToolMode::Active(mask));
        tools.cursor = tool.cursor();
        log::debug!("{element}: activated {tool}");
        Ok(())
    }

    /// Back to the engine's default transform at natural pixel size.
    pub fn reset(&self, element: ElementId) -> Result<(), ToolError> {
        if !self.engine.is_enabled(element) {
            return Err(ToolError::NotEnabled(element));
        }
        let mut viewport = self.engine.default_viewport(element)?;
        viewport.scale = 1.0;
        self.engine.set_viewport(element, viewport)?;
        Ok(())
    }

    pub fn active_tool(&self, element: ElementId) -> Option<ToolName> {
        self.elements
            .lock()
            .get(&element)
            .and_then(|tools| tools.active())
            .map(|(tool, _)| tool)
    }

    pub fn tool_mode(&self, element: ElementId, tool: ToolName) -> Option<ToolMode> {
        self.elements
            .lock()
            .get(&element)
            .and_then(|tools| tools.modes.get(&tool).copied())
    }

    pub fn cursor(&self, element: ElementId) -> Cursor {
        self.elements
            .lock()
            .get(&element)
            .map(|tools| tools.cursor)
            .unwrap_or_default()
    }

    pub fn forget(&self, element: ElementId) {
        self.elements.lock().remove(&element);
    }

    /// Apply a pointer drag of `(dx, dy)` pixels to the active tool whose
    /// button mask matches `buttons`. Returns whether a tool handled it.
    pub fn apply_drag(
        &self,
        element: ElementId,
        buttons: ButtonMask,
        dx: f64,
        dy: f64,
    ) -> Result<bool, ToolError> {
        let active = self
            .elements
            .lock()
            .get(&element)
            .ok_or(ToolError::NotBound(element))?
            .active();
        let Some((tool, mask)) = active else {
            return Ok(false);
        };
        if !mask.intersects(buttons) {
            return Ok(false);
        }

        let viewport = self.engine.viewport(element)?;
        let updated = self.drag(tool, viewport, dx, dy);
        self.engine.set_viewport(element, updated)?;
        Ok(true)
    }

    fn drag(&self, tool: ToolName, mut viewport: Viewport, dx: f64, dy: f64) -> Viewport {
        match tool {
            ToolName::Pan => {
                let scale = if viewport.scale > 0.0 { viewport.scale } else { 1.0 };
                viewport.translation.x += dx / scale;
                viewport.translation.y += dy / scale;
            }
            ToolName::Zoom => {
                let step = if self.zoom.invert { dy } else { -dy };
                viewport.scale = self.zoom.clamp(viewport.scale * (1.0 + step / 100.0));
            }
            ToolName::WindowLevel => {
                let voi = viewport.voi.unwrap_or(Voi::new(127.5, 256.0));
                viewport.voi = Some(Voi::new(
                    voi.window_center + dy,
                    (voi.window_width + dx).max(1.0),
                ));
            }
            ToolName::Rotate => {
                viewport.rotation = (viewport.rotation + dx / 2.0).rem_euclid(360.0);
            }
        }
        viewport
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::FakeEngine;
    use crate::model::DecodedImage;

    fn bound() -> (Arc<FakeEngine>, ToolRegistry, ElementId) {
        let engine = Arc::new(FakeEngine::new());
        let registry = ToolRegistry::new(engine.clone(), ZoomConfig::default());
        let element = ElementId::next();
        engine.enable(element).unwrap();
        engine
            .display_image(
                element,
                Arc::new(DecodedImage::raster(10, 10, vec![0; 400])),
            )
            .unwrap();
        registry.register_all().unwrap();
        registry.bind_tool_to_element(element).unwrap();
        (engine, registry, element)
    }

    #[test]
    fn test_binding_requires_enabled_element() {
        let engine = Arc::new(FakeEngine::new());
        let registry = ToolRegistry::new(engine, ZoomConfig::default());
        let element = ElementId::next();
        assert_eq!(
            registry.bind_tool_to_element(element),
            Err(ToolError::NotRegistered)
        );
        registry.register_all().unwrap();
        registry.register_all().unwrap();
        assert_eq!(
            registry.bind_tool_to_element(element),
            Err(ToolError::NotEnabled(element))
        );
    }

    #[test]
    fn test_binding_twice_is_a_no_op() {
        let (_engine, registry, element) = bound();
        registry
            .activate(element, ToolName::Rotate, ButtonMask::PRIMARY)
            .unwrap();
        registry.bind_tool_to_element(element).unwrap();
        assert_eq!(registry.active_tool(element), Some(ToolName::Rotate));
    }

    #[test]
    fn test_activation_is_exclusive_and_sets_cursor() {
        let (_engine, registry, element) = bound();
        assert_eq!(registry.active_tool(element), None);

        registry
            .activate(element, ToolName::Pan, ButtonMask::PRIMARY)
            .unwrap();
        assert_eq!(registry.cursor(element), Cursor::Grab);

        registry
            .activate(element, ToolName::Zoom, ButtonMask::PRIMARY)
            .unwrap();
        assert_eq!(registry.active_tool(element), Some(ToolName::Zoom));
        assert_eq!(
            registry.tool_mode(element, ToolName::Pan),
            Some(ToolMode::Disabled)
        );
        assert_eq!(
            registry.tool_mode(element, ToolName::Zoom),
            Some(ToolMode::Active(ButtonMask::PRIMARY))
        );
        assert_eq!(registry.cursor(element), Cursor::ZoomIn);
    }

    #[test]
    fn test_activation_on_unbound_element_is_reported() {
        let engine = Arc::new(FakeEngine::new());
        let registry = ToolRegistry::new(engine.clone(), ZoomConfig::default());
        let element = ElementId::next();
        assert_eq!(
            registry.activate(element, ToolName::Pan, ButtonMask::PRIMARY),
            Err(ToolError::NotEnabled(element))
        );
        engine.enable(element).unwrap();
        assert_eq!(
            registry.activate(element, ToolName::Pan, ButtonMask::PRIMARY),
            Err(ToolError::NotBound(element))
        );
    }

    #[test]
    fn test_reset_restores_natural_scale() {
        let (engine, registry, element) = bound();
        let mut viewport = engine.viewport(element).unwrap();
        viewport.scale = 3.0;
        viewport.rotation = 90.0;
        viewport.translation.x = 12.0;
        engine.set_viewport(element, viewport).unwrap();

        registry.reset(element).unwrap();
        let viewport = engine.viewport(element).unwrap();
        assert_eq!(viewport.scale, 1.0);
        assert_eq!(viewport.rotation, 0.0);
        assert_eq!(viewport.translation.x, 0.0);
    }

    #[test]
    fn test_drag_pans_in_image_pixels() {
        let (engine, registry, element) = bound();
        registry
            .activate(element, ToolName::Pan, ButtonMask::PRIMARY)
            .unwrap();
        let mut viewport = engine.viewport(element).unwrap();
        viewport.scale = 2.0;
        engine.set_viewport(element, viewport).unwrap();

        assert!(registry
            .apply_drag(element, ButtonMask::PRIMARY, 10.0, -4.0)
            .unwrap());
        let viewport = engine.viewport(element).unwrap();
        assert_eq!(viewport.translation.x, 5.0);
        assert_eq!(viewport.translation.y, -2.0);

        assert!(!registry
            .apply_drag(element, ButtonMask::SECONDARY, 10.0, 0.0)
            .unwrap());
    }

    #[test]
    fn test_drag_zoom_is_clamped() {
        let (engine, registry, element) = bound();
        registry
            .activate(element, ToolName::Zoom, ButtonMask::PRIMARY)
            .unwrap();
        registry
            .apply_drag(element, ButtonMask::PRIMARY, 0.0, -10_000.0)
            .unwrap();
        assert_eq!(engine.viewport(element).unwrap().scale, 20.0);
        registry
            .apply_drag(element, ButtonMask::PRIMARY, 0.0, 99.99)
            .unwrap();
        assert_eq!(engine.viewport(element).unwrap().scale, 0.1);
    }

    #[test]
    fn test_drag_window_level_and_rotate() {
        let (engine, registry, element) = bound();
        registry
            .activate(element, ToolName::WindowLevel, ButtonMask::PRIMARY)
            .unwrap();
        registry
            .apply_drag(element, ButtonMask::PRIMARY, 20.0, 5.0)
            .unwrap();
        let voi = engine.viewport(element).unwrap().voi.unwrap();
        assert_eq!(voi.window_width, 276.0);
        assert_eq!(voi.window_center, 132.5);

        registry
            .activate(element, ToolName::Rotate, ButtonMask::PRIMARY)
            .unwrap();
        registry
            .apply_drag(element, ButtonMask::PRIMARY, -180.0, 0.0)
            .unwrap();
        assert_eq!(engine.viewport(element).unwrap().rotation, 270.0);
    }

    #[test]
    fn test_forget_drops_element_table() {
        let (_engine, registry, element) = bound();
        registry
            .activate(element, ToolName::Pan, ButtonMask::PRIMARY)
            .unwrap();
        registry.forget(element);
        assert_eq!(registry.active_tool(element), None);
        assert_eq!(registry.cursor(element), Cursor::Default);
    }
}
