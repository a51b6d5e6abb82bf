//! Resilient execution of remote API calls
//!
//! `Executor::execute` runs one logical call through a bounded retry loop,
//! pacing itself on rate limits and refreshing the bearer token on 401.
//! `Executor::execute_paging` and `Executor::execute_cursor_paging` walk a
//! paginated collection to the end, one page at a time.

pub mod error;
pub mod executor;
pub mod paging;
pub mod policy;

pub use error::ApiError;
pub use executor::Executor;
pub use paging::{CursorPage, Cursors, Page};
pub use policy::RetryPolicy;
