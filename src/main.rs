mod api;
mod app;
mod application;
mod background;
mod config;
mod content;
mod domain;
mod host;
mod logging;
mod ui;
mod utils;

use iced::window;

fn main() -> iced::Result {
    logging::init();

    iced::application(app::PopupApp::default, app::update, app::view)
        .title("Motion Downloader")
        .window(window::Settings {
            size: iced::Size::new(420.0, 320.0),
            ..Default::default()
        })
        .run()
}
