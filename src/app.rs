use std::sync::Arc;

use futures::channel::mpsc::{unbounded, UnboundedSender};
use futures::StreamExt;
use iced::Task;
use tokio::sync::OnceCell;

use crate::application::{Orchestrator, StatusSink};
use crate::config::AppConfig;
use crate::domain::StatusLine;
use crate::host::Browser;
use crate::ui::{PopupMessage, PopupView};

pub struct PopupApp {
    view: PopupView,
    config: AppConfig,
    // Launched on first use, inside the iced tokio executor
    browser: Arc<OnceCell<Arc<Browser>>>,
}

impl Default for PopupApp {
    fn default() -> Self {
        let config = AppConfig::load().unwrap_or_else(|e| {
            log::error!("{}; using defaults", e);
            AppConfig::default()
        });
        Self::new(config)
    }
}

impl PopupApp {
    pub fn new(config: AppConfig) -> Self {
        Self {
            view: PopupView::default(),
            config,
            browser: Arc::new(OnceCell::new()),
        }
    }
}

#[derive(Debug, Clone)]
pub enum Message {
    UiMessage(PopupMessage),
    /// Intermediate status while a flow runs
    Progress(String),
    /// Terminal status of a flow
    FlowFinished(StatusLine),
}

/// Forwards flow progress into the iced message stream.
struct ChannelStatusSink(UnboundedSender<String>);

impl StatusSink for ChannelStatusSink {
    fn progress(&self, message: &str) {
        // The popup may be gone already
        let _ = self.0.unbounded_send(message.to_string());
    }
}

pub fn update(app: &mut PopupApp, message: Message) -> Task<Message> {
    match message {
        Message::UiMessage(ui_msg) => {
            app.view.update(ui_msg.clone());

            if let PopupMessage::DownloadPressed = ui_msg {
                if !app.view.is_downloading {
                    app.view.begin();
                    return start_flow(app);
                }
            }
        }
        Message::Progress(status) => app.view.progress(status),
        Message::FlowFinished(status) => app.view.finish(status),
    }
    Task::none()
}

fn start_flow(app: &PopupApp) -> Task<Message> {
    let page_url = app.view.page_url.trim().to_string();
    let config = app.config.clone();
    let browser = app.browser.clone();
    let (tx, rx) = unbounded();

    let flow = async move {
        let browser = match browser
            .get_or_try_init(|| async { Browser::launch(config).map(Arc::new) })
            .await
        {
            Ok(browser) => browser.clone(),
            Err(e) => return Message::FlowFinished(StatusLine::error(e.to_string())),
        };

        let tab = match browser.show(&page_url).await {
            Ok(tab) => tab,
            Err(e) => return Message::FlowFinished(StatusLine::error(e.to_string())),
        };

        let sink = ChannelStatusSink(tx);
        let report = Orchestrator::new(browser.config().popup.clone())
            .with_runtime(browser.runtime().clone())
            .run(&*tab, &sink)
            .await;
        log::debug!("flow phases: {:?}", report.phases);
        Message::FlowFinished(report.status)
    };

    Task::stream(futures::stream::select(
        rx.map(Message::Progress),
        futures::stream::once(flow),
    ))
}

pub fn view(app: &PopupApp) -> iced::Element<'_, Message> {
    app.view.view().map(Message::UiMessage)
}
