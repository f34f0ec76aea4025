mod event;
mod notification;
mod user;

pub use event::*;
pub use notification::*;
pub use user::*;

pub type UserId = i64;
pub type EventId = i64;
