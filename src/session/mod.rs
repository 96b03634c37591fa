//! Live voice session: lifecycle, event loop and published state

mod event_loop;
pub mod live;
mod record;
pub mod state;

pub use live::LiveSession;
pub use state::{ConnectionState, SessionEvent, SessionStatus};
