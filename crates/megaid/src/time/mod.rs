mod clock;
mod interface;

pub use clock::*;
pub use interface::*;
