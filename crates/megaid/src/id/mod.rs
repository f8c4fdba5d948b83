mod layout;
mod numeric;
mod profile;

pub use layout::*;
pub use numeric::*;
pub use profile::*;
