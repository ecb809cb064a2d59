//! Shared library for the support chat widget.
//!
//! Provides the conversation client used by the widget front end: backend
//! client, session management, question dispatch, answer personalization and
//! lead capture.

pub mod backend;
pub mod config;
pub mod dispatcher;
pub mod display;
pub mod error;
pub mod flush;
pub mod http;
pub mod lead_capture;
pub mod models;
pub mod personalize;
pub mod retry;
pub mod session;
pub mod store;
pub mod transcript;
pub mod widget;

#[cfg(test)]
pub(crate) mod testing;

pub use backend::Backend;
pub use config::{Config, Timings};
pub use error::{Error, Result};
pub use flush::{BlockingFlush, FinalFlush};
pub use http::HttpBackend;
pub use lead_capture::{parse_user_info, UserInfo};
pub use models::{ChatMessage, LoadingStage, Sender};
pub use store::{CookieStore, FileCookieStore, MemoryCookieStore};
pub use widget::ChatWidget;
