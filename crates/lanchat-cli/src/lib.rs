//! `LanChat` Client Library
//!
//! Session engine for talking to a `LanChat` relay:
//! - One authenticated connection per session, demultiplexed in the background
//! - Bounded retries per request cycle
//! - Observable collections refreshed on relay pushes
//! - An interactive line-oriented front end

pub mod error;
pub mod filter;
pub mod observable;
pub mod repl;
pub mod retry;
pub mod session;
pub mod transport;

pub use error::SessionError;
pub use filter::{RoleGroups, group_by_role};
pub use observable::Observable;
pub use retry::RetryPolicy;
pub use session::ClientSession;
