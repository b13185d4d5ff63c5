//! Session-backed cursor pagination over the contact table

pub mod render;
pub mod session;

pub use render::{render_page, NavCallback, EMPTY_LISTING};
pub use session::{PageSession, SessionManager};
