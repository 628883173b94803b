use crate::message::Message;
use crate::viewport::DisplayState;
use iced::widget::image::Handle;
use iced::widget::text::Wrapping;
use iced::widget::{button, column, container, scrollable, text, Image};
use iced::{Alignment, Element, Length};

const THUMBNAIL_SIZE: f32 = 96.0;

pub struct ThumbnailView<'a> {
    pub label: &'a str,
    pub state: DisplayState,
    pub frame: Option<&'a Handle>,
    pub selected: bool,
}

pub fn thumbnail_strip<'a>(thumbnails: Vec<ThumbnailView<'a>>) -> Element<'a, Message> {
    if thumbnails.is_empty() {
        return text("Recently opened images appear here").size(14).into();
    }

    let mut strip = column![text("Recent").size(18)].spacing(10);
    for (index, thumbnail) in thumbnails.into_iter().enumerate() {
        strip = strip.push(thumbnail_button(index, thumbnail));
    }
    scrollable(strip).height(Length::Fill).into()
}

fn thumbnail_button(index: usize, thumbnail: ThumbnailView<'_>) -> Element<'_, Message> {
    let preview: Element<'_, Message> = match (&thumbnail.state, thumbnail.frame) {
        (DisplayState::Ready, Some(handle)) => Image::new(handle.clone())
            .width(Length::Fixed(THUMBNAIL_SIZE))
            .height(Length::Fixed(THUMBNAIL_SIZE))
            .into(),
        (DisplayState::Failed(_), _) => text("Failed").size(12).into(),
        _ => text("Loading...").size(12).into(),
    };

    let label = if thumbnail.selected {
        format!("▶ {}", file_name(thumbnail.label))
    } else {
        file_name(thumbnail.label).to_string()
    };

    let content = column![
        container(preview)
            .width(Length::Fixed(THUMBNAIL_SIZE))
            .height(Length::Fixed(THUMBNAIL_SIZE))
            .align_x(Alignment::Center)
            .align_y(Alignment::Center),
        text(label).size(12).wrapping(Wrapping::WordOrGlyph),
    ]
    .spacing(4)
    .width(Length::Fixed(THUMBNAIL_SIZE + 16.0));

    button(content)
        .on_press(Message::SelectThumbnail(index))
        .into()
}

/// Last path segment of a URL, without its query.
pub fn file_name(url: &str) -> &str {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|name| !name.is_empty())
        .unwrap_or(url)
}
