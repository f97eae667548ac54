mod gatherer;
pub use gatherer::*;

mod compress;
pub use compress::*;
