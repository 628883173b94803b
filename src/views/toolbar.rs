use crate::components::tool_toggle;
use crate::message::Message;
use crate::tools::ToolName;
use crate::utils::format_zoom;
use iced::widget::{button, row, text, text_input};
use iced::{Alignment, Element, Length};

pub struct ToolbarState<'a> {
    pub url_input: &'a str,
    pub active_tool: Option<ToolName>,
    pub tools_enabled: bool,
    pub zoom_percent: Option<u32>,
    /// Why the last tool switch did not take effect.
    pub notice: Option<&'a str>,
}

pub fn toolbar(state: ToolbarState<'_>) -> Element<'_, Message> {
    let url_row = row![
        text_input("Image URL or path", state.url_input)
            .on_input(Message::UrlChanged)
            .on_submit(Message::OpenUrl)
            .width(Length::Fill),
        button("Open").on_press(Message::OpenUrl),
        button("Browse...").on_press(Message::PickFile),
    ]
    .spacing(8)
    .align_y(Alignment::Center);

    let tools_row = row![
        tool_toggle(state.active_tool, state.tools_enabled),
        button("Reset").on_press_maybe(state.tools_enabled.then_some(Message::ResetView)),
        text(format_zoom(state.zoom_percent)).size(14),
        button("Clear cache").on_press(Message::PurgeCache),
    ]
    .spacing(12)
    .align_y(Alignment::Center);

    let mut toolbar = iced::widget::column![url_row, tools_row].spacing(12);
    if let Some(notice) = state.notice {
        toolbar = toolbar.push(text(notice).size(13));
    }
    toolbar.into()
}
