use crate::message::Message;
use crate::tools::ToolName;
use iced::border::{Border, Radius};
use iced::widget::button::{self, Button, Status};
use iced::widget::text::Wrapping;
use iced::widget::{container, text, Container, Row};
use iced::{Alignment, Background, Color, Length, Theme};

const PILL: f32 = 999.0;
const INNER: f32 = 6.0;

/// One segment per tool, highlighted when active. Disabled until an image is
/// on screen.
pub fn tool_toggle(active: Option<ToolName>, enabled: bool) -> Container<'static, Message> {
    let count = ToolName::ALL.len();
    let segments = ToolName::ALL.into_iter().enumerate().map(|(index, tool)| {
        let edge = Edge::of(index, count);
        segment(tool, active == Some(tool), enabled, edge).into()
    });

    container(Row::with_children(segments).spacing(2))
        .padding(3)
        .width(Length::Fixed(420.0))
        .style(track_style)
}

/// Which outer corners of a segment are rounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Edge {
    Leading,
    Inner,
    Trailing,
}

impl Edge {
    fn of(index: usize, count: usize) -> Self {
        if index == 0 {
            Edge::Leading
        } else if index + 1 == count {
            Edge::Trailing
        } else {
            Edge::Inner
        }
    }

    fn radius(self) -> Radius {
        let (leading, trailing) = match self {
            Edge::Leading => (PILL, INNER),
            Edge::Inner => (INNER, INNER),
            Edge::Trailing => (INNER, PILL),
        };
        Radius {
            top_left: leading,
            bottom_left: leading,
            top_right: trailing,
            bottom_right: trailing,
        }
    }
}

fn segment(tool: ToolName, active: bool, enabled: bool, edge: Edge) -> Button<'static, Message> {
    let label = container(text(tool.label()).size(14).wrapping(Wrapping::None))
        .width(Length::Fill)
        .height(Length::Fixed(32.0))
        .align_x(Alignment::Center)
        .align_y(Alignment::Center)
        .padding([6, 12]);

    Button::new(label)
        .padding(0)
        .width(Length::FillPortion(1))
        .on_press_maybe(enabled.then_some(Message::SelectTool(tool)))
        .style(move |theme, status| segment_style(theme, status, active, edge))
}

fn track_style(theme: &Theme) -> container::Style {
    let strong = theme.extended_palette().background.strong.color;
    container::Style {
        background: Some(Background::Color(strong)),
        border: Border {
            color: strong.scale_alpha(0.6),
            width: 1.0,
            radius: Radius::new(PILL),
        },
        ..Default::default()
    }
}

fn segment_style(theme: &Theme, status: Status, active: bool, edge: Edge) -> button::Style {
    let palette = theme.extended_palette();
    let (accent, neutral) = (palette.primary, palette.background);

    let fill = match status {
        Status::Disabled => neutral.strong.color.scale_alpha(0.2),
        Status::Active if active => accent.strong.color,
        Status::Active => neutral.strong.color.scale_alpha(0.4),
        Status::Hovered if active => accent.base.color,
        Status::Hovered => neutral.base.color.scale_alpha(0.8),
        Status::Pressed if active => accent.base.color.scale_alpha(0.9),
        Status::Pressed => neutral.base.color.scale_alpha(0.9),
    };

    button::Style {
        background: Some(Background::Color(fill)),
        text_color: if active {
            accent.strong.text
        } else {
            neutral.base.text
        },
        border: Border {
            color: Color::TRANSPARENT,
            width: 0.0,
            radius: edge.radius(),
        },
        ..button::Style::default()
    }
}
