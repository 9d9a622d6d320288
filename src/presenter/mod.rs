//! Presenters
//!
//! View state fed by bus events. Both presenters accept duplicate and
//! out-of-order events; applying the same event twice is harmless.

pub mod badge;
pub mod inbox;

pub use badge::{BadgePresenter, DEFAULT_BADGE_CAP};
pub use inbox::{preview, InboxPresenter, DEFAULT_PREVIEW_CHARS};
