mod backend;
mod conversation;
mod error;
mod generation;
mod protocol;
mod session;
mod tool;

pub use backend::*;
pub use conversation::*;
pub use error::*;
pub use generation::*;
pub use protocol::*;
pub use session::*;
pub use tool::*;
