mod model_router;
pub use model_router::*;
