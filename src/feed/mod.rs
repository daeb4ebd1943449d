//! Live attendance feed: a publisher that pushes the current top-N check-ins
//! of an event, and the view that renders them.

use axum::Router;

use crate::state::AppState;

pub mod handlers;
pub mod listener;
pub mod publisher;
pub mod view;

pub use listener::spawn_attendance_listener;
pub use publisher::{FeedSnapshot, FeedSubscription, LiveFeedHub};
pub use view::{FeedEntry, LiveFeedView, RenderedFeed};

pub fn router() -> Router<AppState> {
    handlers::feed_routes()
}
