pub mod conversations;
pub mod record;
pub mod system;

pub use conversations::*;
pub use record::*;
pub use system::*;
