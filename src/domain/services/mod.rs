pub mod flows;
mod prompts;
mod relay;
mod sessions;
mod tools;
mod transformer;

pub use flows::*;
pub use prompts::*;
pub use relay::*;
pub use sessions::*;
pub use tools::*;
pub use transformer::*;
