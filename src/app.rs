use crate::config::ViewerConfig;
use crate::engine::{ElementId, RenderedFrame, SoftwareEngine};
use crate::input::{InputArbiter, Point};
use crate::message::Message;
use crate::model::{DecodedImage, DiagnosticMetadata};
use crate::viewport::{
    DisplayState, LoadOutcome, NoopObserver, ViewerContext, ViewportController, ViewportId,
    ViewportObserver,
};
use crate::views::{
    metadata_panel, thumbnail_strip, toolbar, viewport_panel, wheel_input, ThumbnailView,
    ToolbarState,
};
use iced::widget::image::Handle;
use iced::widget::{column, container, row};
use iced::{application, event, keyboard, Element, Event, Length, Subscription, Task, Theme};
use rfd::AsyncFileDialog;
use std::sync::Arc;

const APP_TITLE: &str = "Radview";
const MAX_THUMBNAILS: usize = 8;

pub fn run(config: ViewerConfig) -> iced::Result {
    application(APP_TITLE, App::update, App::view)
        .subscription(App::subscription)
        .theme(App::theme)
        .run_with(move || App::new(&config))
}

struct HostObserver;

impl ViewportObserver for HostObserver {
    fn on_metadata(&self, viewport: ViewportId, metadata: &DiagnosticMetadata) {
        log::info!(
            "{viewport}: modality {}",
            metadata.modality.as_deref().unwrap_or("unknown")
        );
    }

    fn on_ready(&self, viewport: ViewportId) {
        log::debug!("{viewport}: ready");
    }
}

struct Thumbnail {
    url: String,
    controller: ViewportController,
    frame: Option<Handle>,
}

pub struct App {
    context: ViewerContext,
    viewport: ViewportController,
    arbiter: InputArbiter,
    frame: Option<Handle>,
    image: Option<Arc<DecodedImage>>,
    metadata: Option<DiagnosticMetadata>,
    zoom_percent: Option<u32>,
    url_input: String,
    tool_notice: Option<String>,
    modifier_held: bool,
    pointer: Point,
    thumbnails: Vec<Thumbnail>,
    selected: Option<usize>,
}

impl App {
    pub fn new(config: &ViewerConfig) -> (Self, Task<Message>) {
        let context = ViewerContext::new(Arc::new(SoftwareEngine::new()), config);
        let viewport =
            ViewportController::new(ElementId::next(), context.clone(), Arc::new(HostObserver));
        let arbiter = viewport.input_arbiter();

        let loader = Arc::clone(&context.loader);
        let engine = Arc::clone(&context.engine);
        let startup = Task::future(async move {
            // Runs on the executor, which provides the runtime the sweeper needs.
            let _sweeper = loader.spawn_sweeper();
            engine.initialize().await;
        })
        .discard();

        let app = Self {
            context,
            viewport,
            arbiter,
            frame: None,
            image: None,
            metadata: None,
            zoom_percent: None,
            url_input: String::new(),
            tool_notice: None,
            modifier_held: false,
            pointer: Point::default(),
            thumbnails: Vec::new(),
            selected: None,
        };
        (app, startup)
    }

    pub fn update(&mut self, message: Message) -> Task<Message> {
        match message {
            Message::UrlChanged(value) => {
                self.url_input = value;
                Task::none()
            }
            Message::OpenUrl => self.open(self.url_input.clone()),
            Message::PickFile => Task::perform(
                async {
                    AsyncFileDialog::new()
                        .pick_file()
                        .await
                        .map(|handle| format!("file://{}", handle.path().display()))
                },
                Message::FilePicked,
            ),
            Message::FilePicked(Some(url)) => self.open(url),
            Message::FilePicked(None) => Task::none(),
            Message::Loaded(viewport, outcome) => {
                self.finish_load(viewport, outcome);
                Task::none()
            }
            Message::SelectThumbnail(index) => {
                let url = self.thumbnails.get(index).map(|t| t.url.clone());
                url.map_or_else(Task::none, |url| self.open(url))
            }
            Message::SelectTool(tool) => {
                self.tool_notice = match self.viewport.activate_tool(tool) {
                    Ok(()) => None,
                    Err(err) => {
                        log::debug!("{}: {tool} not selected, toggle unchanged", self.viewport.id());
                        Some(format!("{tool} unavailable: {err}"))
                    }
                };
                Task::none()
            }
            Message::ResetView => {
                if self.viewport.reset_view().is_ok() {
                    self.refresh_frame();
                }
                Task::none()
            }
            Message::PurgeCache => {
                self.context.loader.purge();
                Task::none()
            }
            Message::Wheel(delta) => {
                let outcome = self
                    .arbiter
                    .handle_wheel(wheel_input(delta, self.modifier_held));
                if outcome.is_consumed() {
                    self.refresh_frame();
                }
                Task::none()
            }
            Message::PointerPressed(buttons) => {
                self.arbiter.pointer_down(buttons, self.pointer);
                Task::none()
            }
            Message::PointerMoved(position) => {
                self.pointer = Point::new(f64::from(position.x), f64::from(position.y));
                if self.arbiter.pointer_move(self.pointer) {
                    self.refresh_frame();
                }
                Task::none()
            }
            Message::PointerReleased => {
                self.arbiter.pointer_up();
                Task::none()
            }
            Message::ModifiersChanged(modifiers) => {
                self.modifier_held = modifiers.control() || modifiers.command();
                Task::none()
            }
        }
    }

    pub fn view(&self) -> Element<'_, Message> {
        let display_state = self.viewport.display_state();
        let toolbar = toolbar(ToolbarState {
            url_input: &self.url_input,
            active_tool: self.viewport.active_tool(),
            tools_enabled: display_state == DisplayState::Ready,
            zoom_percent: self.zoom_percent,
            notice: self.tool_notice.as_deref(),
        });

        let thumbnails = self
            .thumbnails
            .iter()
            .enumerate()
            .map(|(index, thumbnail)| ThumbnailView {
                label: &thumbnail.url,
                state: thumbnail.controller.display_state(),
                frame: thumbnail.frame.as_ref(),
                selected: self.selected == Some(index),
            })
            .collect();
        let thumbnail_panel = container(thumbnail_strip(thumbnails))
            .padding(16)
            .width(Length::Fixed(150.0))
            .height(Length::Fill);

        let viewport_panel = container(viewport_panel(
            display_state,
            self.frame.as_ref(),
            self.viewport.cursor(),
        ))
        .padding(16)
        .width(Length::FillPortion(5))
        .height(Length::Fill);

        let metadata_panel = container(metadata_panel(
            self.metadata.as_ref(),
            self.image.as_deref(),
        ))
        .padding(16)
        .width(Length::FillPortion(3));

        column![
            toolbar,
            row![thumbnail_panel, viewport_panel, metadata_panel]
                .spacing(16)
                .width(Length::Fill)
                .height(Length::Fill),
        ]
        .padding(20)
        .spacing(20)
        .into()
    }

    pub fn subscription(&self) -> Subscription<Message> {
        event::listen_with(|event, _status, _window| match event {
            Event::Keyboard(keyboard::Event::ModifiersChanged(modifiers)) => {
                Some(Message::ModifiersChanged(modifiers))
            }
            _ => None,
        })
    }

    pub fn theme(&self) -> Theme {
        Theme::Dark
    }

    fn open(&mut self, url: String) -> Task<Message> {
        let url = url.trim().to_string();
        if url.is_empty() {
            return Task::none();
        }
        self.url_input = url.clone();

        let main = load_task(&self.viewport, &url);
        let thumbnail = match self.thumbnails.iter().position(|t| t.url == url) {
            Some(index) => {
                self.selected = Some(index);
                Task::none()
            }
            None => self.add_thumbnail(url),
        };
        Task::batch([main, thumbnail])
    }

    fn add_thumbnail(&mut self, url: String) -> Task<Message> {
        let controller = ViewportController::new(
            ElementId::next(),
            self.context.clone(),
            Arc::new(NoopObserver),
        );
        let task = load_task(&controller, &url);
        self.thumbnails.push(Thumbnail {
            url,
            controller,
            frame: None,
        });
        if self.thumbnails.len() > MAX_THUMBNAILS {
            // Dropping the controller unmounts it.
            self.thumbnails.remove(0);
        }
        self.selected = Some(self.thumbnails.len() - 1);
        task
    }

    fn finish_load(&mut self, viewport: ViewportId, outcome: LoadOutcome) {
        if viewport == self.viewport.id() {
            match outcome {
                LoadOutcome::Displayed(metadata) => {
                    self.tool_notice = None;
                    self.metadata = metadata;
                    self.image = self.viewport.image();
                    self.refresh_frame();
                }
                LoadOutcome::Failed(_) => {
                    self.metadata = None;
                    self.image = None;
                    self.frame = None;
                }
                LoadOutcome::Cancelled => {}
            }
            return;
        }

        if let Some(thumbnail) = self
            .thumbnails
            .iter_mut()
            .find(|thumbnail| thumbnail.controller.id() == viewport)
        {
            if matches!(outcome, LoadOutcome::Displayed(_)) {
                thumbnail.frame = thumbnail.controller.render().map(frame_handle);
            }
        }
    }

    fn refresh_frame(&mut self) {
        self.frame = self.viewport.render().map(frame_handle);
        self.zoom_percent = self.arbiter.sync_render_events();
    }
}

fn load_task(controller: &ViewportController, url: &str) -> Task<Message> {
    let id = controller.id();
    match controller.load(Some(url)) {
        Some(load) => Task::perform(load, move |outcome| Message::Loaded(id, outcome)),
        None => Task::none(),
    }
}

fn frame_handle(frame: RenderedFrame) -> Handle {
    Handle::from_rgba(frame.width, frame.height, frame.rgba)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::ToolName;

    #[test]
    fn test_tool_selection_without_image_shows_notice() {
        let (mut app, _startup) = App::new(&ViewerConfig::default());

        let _ = app.update(Message::SelectTool(ToolName::Zoom));
        assert_eq!(app.viewport.active_tool(), None);
        let notice = app.tool_notice.clone().unwrap();
        assert!(notice.starts_with("Zoom unavailable: "), "{notice}");
    }
}
