mod verifier;
pub use verifier::*;

#[cfg(feature = "syntax-check")]
mod python;
#[cfg(feature = "syntax-check")]
pub use python::*;
