use crate::input::WheelInput;
use crate::message::Message;
use crate::tools::{ButtonMask, Cursor};
use crate::viewport::DisplayState;
use iced::mouse::{Interaction, ScrollDelta};
use iced::widget::image::Handle;
use iced::widget::text::Wrapping;
use iced::widget::{column, container, mouse_area, text, Image};
use iced::{Alignment, Background, ContentFit, Element, Length, Theme};

/// Pixels per wheel "line" when the platform reports line deltas.
const LINE_HEIGHT: f32 = 40.0;

pub fn viewport_panel<'a>(
    state: DisplayState,
    frame: Option<&'a Handle>,
    cursor: Cursor,
) -> Element<'a, Message> {
    match state {
        DisplayState::Placeholder => overlay(text("No image available").size(16).into()),
        DisplayState::Loading => overlay(text("Loading image...").size(16).into()),
        DisplayState::Failed(message) => overlay(
            container(
                column![
                    text("Unable to display image").size(18),
                    text(message).size(14).wrapping(Wrapping::Word),
                ]
                .spacing(8),
            )
            .padding(16)
            .max_width(480.0)
            .style(error_style)
            .into(),
        ),
        DisplayState::Ready => match frame {
            Some(handle) => interactive(handle, cursor),
            None => overlay(text("Loading image...").size(16).into()),
        },
    }
}

fn interactive(handle: &Handle, cursor: Cursor) -> Element<'_, Message> {
    let image = Image::new(handle.clone())
        .width(Length::Fill)
        .height(Length::Fill)
        .content_fit(ContentFit::Contain);

    mouse_area(container(image).width(Length::Fill).height(Length::Fill))
        .on_scroll(Message::Wheel)
        .on_move(Message::PointerMoved)
        .on_press(Message::PointerPressed(ButtonMask::PRIMARY))
        .on_right_press(Message::PointerPressed(ButtonMask::SECONDARY))
        .on_middle_press(Message::PointerPressed(ButtonMask::AUXILIARY))
        .on_release(Message::PointerReleased)
        .on_right_release(Message::PointerReleased)
        .on_middle_release(Message::PointerReleased)
        .interaction(interaction_for(cursor))
        .into()
}

fn overlay(content: Element<'_, Message>) -> Element<'_, Message> {
    container(content)
        .width(Length::Fill)
        .height(Length::Fill)
        .align_x(Alignment::Center)
        .align_y(Alignment::Center)
        .into()
}

fn error_style(theme: &Theme) -> container::Style {
    let palette = theme.extended_palette();

    container::Style {
        background: Some(Background::Color(palette.danger.weak.color.scale_alpha(0.3))),
        text_color: Some(palette.danger.strong.text),
        border: iced::border::Border {
            color: palette.danger.base.color,
            width: 1.0,
            radius: iced::border::Radius::new(8.0),
        },
        ..Default::default()
    }
}

pub fn interaction_for(cursor: Cursor) -> Interaction {
    match cursor {
        Cursor::Default => Interaction::Idle,
        Cursor::ZoomIn => Interaction::Crosshair,
        Cursor::Grab => Interaction::Grab,
        Cursor::ContextMenu => Interaction::Pointer,
        Cursor::Rotate => Interaction::Grabbing,
    }
}

/// Convert an iced scroll delta (positive `y` scrolls up) into DOM-style
/// wheel deltas (negative `delta_y` is wheel-up).
pub fn wheel_input(delta: ScrollDelta, modifier: bool) -> WheelInput {
    let (x, y) = match delta {
        ScrollDelta::Lines { x, y } => (x * LINE_HEIGHT, y * LINE_HEIGHT),
        ScrollDelta::Pixels { x, y } => (x, y),
    };
    WheelInput {
        delta_x: -f64::from(x),
        delta_y: -f64::from(y),
        modifier,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scroll_up_is_negative_wheel_delta() {
        let input = wheel_input(ScrollDelta::Lines { x: 0.0, y: 1.0 }, true);
        assert_eq!(input.delta_y, -40.0);
        assert_eq!(input.delta_x, 0.0);
        assert!(input.modifier);
    }

    #[test]
    fn test_pixel_deltas_pass_through_negated() {
        let input = wheel_input(ScrollDelta::Pixels { x: -25.0, y: 0.0 }, false);
        assert_eq!(input.delta_x, 25.0);
        assert!(!input.modifier);
    }
}
