mod accountant;
pub use accountant::*;
