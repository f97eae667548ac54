mod classifier;
pub use classifier::*;

mod strategies;
pub use strategies::*;
