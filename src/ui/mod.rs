use iced::{
    widget::{button, column, text, text_input, Space},
    Color, Element, Length,
};

use crate::domain::{StatusKind, StatusLine};

/// Popup view state
pub struct PopupView {
    /// Address of the page the popup acts on.
    pub page_url: String,
    pub status_message: String,
    pub status_kind: Option<StatusKind>,
    pub is_downloading: bool,
}

impl Default for PopupView {
    fn default() -> Self {
        Self {
            page_url: String::new(),
            status_message: "Open a video page and press Start Download".to_string(),
            status_kind: None,
            is_downloading: false,
        }
    }
}

#[derive(Debug, Clone)]
pub enum PopupMessage {
    PageUrlChanged(String),
    DownloadPressed,
}

impl PopupView {
    pub fn update(&mut self, message: PopupMessage) {
        match message {
            PopupMessage::PageUrlChanged(url) => {
                self.page_url = url;
            }
            PopupMessage::DownloadPressed => {
                // Will be handled by the app
            }
        }
    }

    /// Clears the previous result and locks the button.
    pub fn begin(&mut self) {
        self.is_downloading = true;
        self.status_kind = None;
        self.status_message.clear();
    }

    pub fn progress(&mut self, message: String) {
        if self.is_downloading {
            self.status_message = message;
        }
    }

    pub fn finish(&mut self, status: StatusLine) {
        self.is_downloading = false;
        self.status_kind = Some(status.kind);
        self.status_message = status.to_string();
    }

    pub fn view(&self) -> Element<'_, PopupMessage> {
        let label = if self.is_downloading {
            "Downloading..."
        } else {
            "Start Download"
        };

        column![
            text("Motion Downloader").size(28),
            Space::new().height(Length::Fixed(12.0)),
            text("Page URL:").size(16),
            text_input("https://www.tokyomotion.net/video/...", &self.page_url)
                .on_input(PopupMessage::PageUrlChanged)
                .padding(10),
            Space::new().height(Length::Fixed(10.0)),
            button(label)
                .on_press_maybe((!self.is_downloading).then_some(PopupMessage::DownloadPressed))
                .padding([10, 20]),
            Space::new().height(Length::Fixed(10.0)),
            text(&self.status_message)
                .size(14)
                .color_maybe(self.status_kind.map(status_color)),
        ]
        .padding(20)
        .spacing(10)
        .into()
    }
}

fn status_color(kind: StatusKind) -> Color {
    match kind {
        StatusKind::Success => Color::from_rgb(0.13, 0.55, 0.13),
        StatusKind::Warning => Color::from_rgb(0.8, 0.5, 0.0),
        StatusKind::Error => Color::from_rgb(0.8, 0.1, 0.1),
    }
}
