use crate::tools::{ButtonMask, ToolName};
use crate::viewport::{LoadOutcome, ViewportId};
use iced::keyboard::Modifiers;
use iced::mouse::ScrollDelta;
use iced::Point;

#[derive(Debug, Clone)]
pub enum Message {
    UrlChanged(String),
    OpenUrl,
    PickFile,
    FilePicked(Option<String>),
    Loaded(ViewportId, LoadOutcome),
    SelectThumbnail(usize),
    SelectTool(ToolName),
    ResetView,
    PurgeCache,
    Wheel(ScrollDelta),
    PointerPressed(ButtonMask),
    PointerMoved(Point),
    PointerReleased,
    ModifiersChanged(Modifiers),
}
