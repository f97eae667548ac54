mod tool_parser;
pub use tool_parser::*;

mod fix;
pub use fix::*;
