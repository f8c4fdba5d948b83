mod clock;
mod id_generator;
mod mutex;
mod status;

pub use clock::*;
pub use id_generator::*;
pub use mutex::*;
pub use status::*;
