//! Data models for rows, change events, query specifications, and the
//! change-feed wire protocol.

mod change_event;
mod query_spec;
mod row;
mod session;
mod wire;

pub use change_event::ChangeEvent;
pub use query_spec::{Filter, QuerySpec};
pub use row::{row_id, Row};
pub use session::{LoginRequest, Session, UserInfo};
pub use wire::{FeedMessage, FeedRequest, Operation, RowRef};
