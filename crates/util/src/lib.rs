pub mod json_stream;
pub mod path_processing;

pub use json_stream::*;
pub use path_processing::*;
