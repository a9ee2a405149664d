//! Request/response messaging between contexts.
//!
//! A context owns a [`MessageListener`]; everyone else talks to it through a
//! cloned [`MessagePort`]. Payloads are plain JSON so an unknown action can
//! still reach the listener and be answered.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::{mpsc, oneshot};

use super::models::Request;
use crate::domain::AppError;

pub const NO_RECEIVER: &str = "Could not establish connection. Receiving end does not exist.";
pub const PORT_CLOSED: &str = "The message port closed before a response was received.";

pub struct Envelope {
    pub payload: Value,
    reply: oneshot::Sender<Value>,
}

impl Envelope {
    pub fn action(&self) -> &str {
        self.payload
            .get("action")
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    /// Sends the answer back. The sender may already be gone; that is not an error here.
    pub fn respond<T: Serialize>(self, response: &T) {
        let value = serde_json::to_value(response)
            .unwrap_or_else(|e| json!({ "success": false, "message": e.to_string() }));
        let _ = self.reply.send(value);
    }
}

#[derive(Debug, Clone)]
pub struct MessagePort {
    tx: mpsc::UnboundedSender<Envelope>,
}

pub struct MessageListener {
    rx: mpsc::UnboundedReceiver<Envelope>,
}

pub fn channel() -> (MessagePort, MessageListener) {
    let (tx, rx) = mpsc::unbounded_channel();
    (MessagePort { tx }, MessageListener { rx })
}

impl MessagePort {
    pub async fn send_raw(&self, payload: Value) -> Result<Value, AppError> {
        let (reply, response) = oneshot::channel();
        self.tx
            .send(Envelope { payload, reply })
            .map_err(|_| AppError::MessagingFailure(NO_RECEIVER.to_string()))?;

        response
            .await
            .map_err(|_| AppError::MessagingFailure(PORT_CLOSED.to_string()))
    }

    /// Sends `request` and decodes the answer as `T`.
    pub async fn send<T: DeserializeOwned>(&self, request: &Request) -> Result<T, AppError> {
        let payload = serde_json::to_value(request)
            .map_err(|e| AppError::InvalidResponse(e.to_string()))?;
        let response = self.send_raw(payload).await?;
        serde_json::from_value(response).map_err(|e| AppError::InvalidResponse(e.to_string()))
    }
}

impl MessageListener {
    pub async fn recv(&mut self) -> Option<Envelope> {
        self.rx.recv().await
    }
}
