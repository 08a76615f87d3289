//! # TaskHub Notify
//!
//! Turns an [`OutboundMessage`](taskhub_core::types::OutboundMessage) into
//! delivered email and push notifications.
//!
//! - `dispatcher`: enrichment, active-user filter, push batching, result report
//! - `email`: SMTP sender (lettre), fire-and-forget
//! - `push`: Expo-style push sender (reqwest)

pub mod dispatcher;
pub mod email;
pub mod push;

pub use dispatcher::{ChannelReport, DispatchReport, NotificationDispatcher};
pub use email::{SmtpEmailSender, render_body};
pub use push::ExpoPushSender;
