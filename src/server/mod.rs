//! Stdio server exposing the worker to an out-of-process front end
//!
//! # Module Structure
//! - `protocol` - request lines and error replies
//! - `session` - the read/dispatch/relay loop

pub mod protocol;
pub mod session;

pub use protocol::{Request, Response, ErrorResponse, IncomingLine, error_codes};
pub use session::serve;
