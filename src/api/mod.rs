pub mod bus;
pub mod client;
pub mod models;

pub use bus::{channel, Envelope, MessageListener, MessagePort};
pub use client::{ClientError, MediaClient};
pub use models::{ActionResponse, Request, VideoInfoResponse};
