//! Wheel and pointer routing for one bound element.

use crate::engine::{ElementId, EngineError, RenderEvent, RenderingEngine};
use crate::tools::{ButtonMask, ToolName, ToolRegistry};
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::TryRecvError};

const WHEEL_ZOOM_IN: f64 = 1.1;
const WHEEL_ZOOM_OUT: f64 = 0.9;
const WHEEL_PAN_DIVISOR: f64 = 5.0;

/// Wheel deltas use the DOM sign convention: negative `delta_y` is wheel-up.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct WheelInput {
    pub delta_x: f64,
    pub delta_y: f64,
    /// Ctrl (or Cmd) held.
    pub modifier: bool,
}

/// What the arbiter did with a wheel event. `Ignored` means the host should
/// let the event through (e.g. scroll the page).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WheelOutcome {
    Ignored,
    Zoomed { scale: f64 },
    Panned,
}

impl WheelOutcome {
    pub fn is_consumed(self) -> bool {
        !matches!(self, WheelOutcome::Ignored)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy)]
struct Drag {
    buttons: ButtonMask,
    last: Point,
}

pub struct InputArbiter {
    element: ElementId,
    engine: Arc<dyn RenderingEngine>,
    tools: Arc<ToolRegistry>,
    drag: Option<Drag>,
    renders: broadcast::Receiver<RenderEvent>,
    zoom_percent: Option<u32>,
}

impl InputArbiter {
    pub fn new(
        element: ElementId,
        engine: Arc<dyn RenderingEngine>,
        tools: Arc<ToolRegistry>,
    ) -> Self {
        let renders = engine.render_events();
        let zoom_percent = engine.viewport(element).ok().map(|v| percent(v.scale));
        Self {
            element,
            engine,
            tools,
            drag: None,
            renders,
            zoom_percent,
        }
    }

    pub fn element(&self) -> ElementId {
        self.element
    }

    pub fn handle_wheel(&mut self, input: WheelInput) -> WheelOutcome {
        let Some(tool) = self.tools.active_tool(self.element) else {
            return WheelOutcome::Ignored;
        };

        let outcome = if input.modifier {
            if tool != ToolName::Zoom {
                return WheelOutcome::Ignored;
            }
            self.wheel_zoom(input.delta_y)
        } else {
            if tool != ToolName::Pan || (input.delta_x == 0.0 && input.delta_y == 0.0) {
                return WheelOutcome::Ignored;
            }
            self.wheel_pan(input.delta_x, input.delta_y)
        };

        outcome.unwrap_or_else(|err| {
            log::debug!("{}: wheel ignored ({err})", self.element);
            WheelOutcome::Ignored
        })
    }

    /// Start a drag. Returns whether an active tool listens to `buttons`.
    pub fn pointer_down(&mut self, buttons: ButtonMask, at: Point) -> bool {
        if self.tools.active_tool(self.element).is_none() {
            return false;
        }
        self.drag = Some(Drag { buttons, last: at });
        true
    }

    pub fn pointer_move(&mut self, at: Point) -> bool {
        let Some(drag) = self.drag.as_mut() else {
            return false;
        };
        let (dx, dy) = (at.x - drag.last.x, at.y - drag.last.y);
        drag.last = at;
        let buttons = drag.buttons;
        match self.tools.apply_drag(self.element, buttons, dx, dy) {
            Ok(handled) => handled,
            Err(err) => {
                log::debug!("{}: drag ignored ({err})", self.element);
                false
            }
        }
    }

    pub fn pointer_up(&mut self) {
        self.drag = None;
    }

    pub fn is_dragging(&self) -> bool {
        self.drag.is_some()
    }

    /// Consume pending render-complete events, refreshing the zoom readout.
    pub fn sync_render_events(&mut self) -> Option<u32> {
        loop {
            match self.renders.try_recv() {
                Ok(event) if event.element == self.element => {
                    self.zoom_percent = Some(percent(event.viewport.scale));
                }
                Ok(_) | Err(TryRecvError::Lagged(_)) => {}
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            }
        }
        self.zoom_percent
    }

    pub fn zoom_percent(&self) -> Option<u32> {
        self.zoom_percent
    }

    fn wheel_zoom(&self, delta_y: f64) -> Result<WheelOutcome, EngineError> {
        let factor = if delta_y < 0.0 {
            WHEEL_ZOOM_IN
        } else {
            WHEEL_ZOOM_OUT
        };
        let mut viewport = self.engine.viewport(self.element)?;
        viewport.scale *= factor;
        self.engine.set_viewport(self.element, viewport)?;
        Ok(WheelOutcome::Zoomed {
            scale: viewport.scale,
        })
    }

    fn wheel_pan(
        &self,
        delta_x: f64,
        delta_y: f64,
    ) -> Result<WheelOutcome, EngineError> {
        let mut viewport = self.engine.viewport(self.element)?;
        viewport.translation.x -= delta_x / WHEEL_PAN_DIVISOR;
        viewport.translation.y -= delta_y / WHEEL_PAN_DIVISOR;
        self.engine.set_viewport(self.element, viewport)?;
        Ok(WheelOutcome::Panned)
    }
}

fn percent(scale: f64) -> u32 {
    (scale * 100.0).round().max(0.0) as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::FakeEngine;
    use crate::model::DecodedImage;
    use crate::tools::ZoomConfig;

    fn arbiter() -> (Arc<FakeEngine>, Arc<ToolRegistry>, InputArbiter) {
        let engine = Arc::new(FakeEngine::new());
        let tools = Arc::new(ToolRegistry::new(engine.clone(), ZoomConfig::default()));
        let element = ElementId::next();
        engine.enable(element).unwrap();
        engine
            .display_image(element, Arc::new(DecodedImage::raster(4, 4, vec![0; 64])))
            .unwrap();
        tools.register_all().unwrap();
        tools.bind_tool_to_element(element).unwrap();
        let arbiter = InputArbiter::new(element, engine.clone(), tools.clone());
        (engine, tools, arbiter)
    }

    fn wheel(delta_x: f64, delta_y: f64, modifier: bool) -> WheelInput {
        WheelInput {
            delta_x,
            delta_y,
            modifier,
        }
    }

    #[test]
    fn test_no_active_tool_ignores_wheel() {
        let (engine, _tools, mut arbiter) = arbiter();
        let element = arbiter.element();
        assert_eq!(
            arbiter.handle_wheel(wheel(0.0, -100.0, true)),
            WheelOutcome::Ignored
        );
        assert_eq!(engine.viewport(element).unwrap().scale, 1.0);
    }

    #[test]
    fn test_modifier_wheel_up_zooms_by_ten_percent() {
        let (engine, tools, mut arbiter) = arbiter();
        let element = arbiter.element();
        tools
            .activate(element, ToolName::Zoom, ButtonMask::PRIMARY)
            .unwrap();

        let outcome = arbiter.handle_wheel(wheel(0.0, -100.0, true));
        assert_eq!(outcome, WheelOutcome::Zoomed { scale: 1.1 });
        assert_eq!(engine.viewport(element).unwrap().scale, 1.1);

        arbiter.handle_wheel(wheel(0.0, 100.0, true));
        assert_eq!(engine.viewport(element).unwrap().scale, 1.1 * 0.9);
    }

    #[test]
    fn test_modifier_wheel_with_pan_active_leaves_scale() {
        let (engine, tools, mut arbiter) = arbiter();
        let element = arbiter.element();
        tools
            .activate(element, ToolName::Pan, ButtonMask::PRIMARY)
            .unwrap();
        let outcome = arbiter.handle_wheel(wheel(0.0, -100.0, true));
        assert!(!outcome.is_consumed());
        assert_eq!(engine.viewport(element).unwrap().scale, 1.0);
    }

    #[test]
    fn test_plain_wheel_pans_with_pan_active() {
        let (engine, tools, mut arbiter) = arbiter();
        let element = arbiter.element();
        tools
            .activate(element, ToolName::Pan, ButtonMask::PRIMARY)
            .unwrap();

        assert_eq!(
            arbiter.handle_wheel(wheel(25.0, 0.0, false)),
            WheelOutcome::Panned
        );
        let translation = engine.viewport(element).unwrap().translation;
        assert_eq!(translation.x, -5.0);
        assert_eq!(translation.y, 0.0);

        assert_eq!(
            arbiter.handle_wheel(wheel(0.0, 0.0, false)),
            WheelOutcome::Ignored
        );
    }

    #[test]
    fn test_plain_wheel_ignored_for_other_tools() {
        let (engine, tools, mut arbiter) = arbiter();
        let element = arbiter.element();
        for tool in [ToolName::Zoom, ToolName::WindowLevel, ToolName::Rotate] {
            tools.activate(element, tool, ButtonMask::PRIMARY).unwrap();
            assert_eq!(
                arbiter.handle_wheel(wheel(10.0, 10.0, false)),
                WheelOutcome::Ignored
            );
        }
        assert_eq!(engine.viewport(element).unwrap().translation.x, 0.0);
    }

    #[test]
    fn test_drag_routes_to_active_tool() {
        let (engine, tools, mut arbiter) = arbiter();
        let element = arbiter.element();
        tools
            .activate(element, ToolName::Rotate, ButtonMask::PRIMARY)
            .unwrap();

        assert!(arbiter.pointer_down(ButtonMask::PRIMARY, Point::new(10.0, 10.0)));
        assert!(arbiter.pointer_move(Point::new(30.0, 10.0)));
        arbiter.pointer_up();
        assert!(!arbiter.pointer_move(Point::new(90.0, 10.0)));
        assert_eq!(engine.viewport(element).unwrap().rotation, 10.0);
    }

    #[test]
    fn test_render_events_update_zoom_percent() {
        let (_engine, tools, mut arbiter) = arbiter();
        let element = arbiter.element();
        assert_eq!(arbiter.zoom_percent(), Some(100));
        tools
            .activate(element, ToolName::Zoom, ButtonMask::PRIMARY)
            .unwrap();
        arbiter.handle_wheel(wheel(0.0, -1.0, true));
        assert_eq!(arbiter.sync_render_events(), Some(110));
    }
}
