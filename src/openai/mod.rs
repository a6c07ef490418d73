pub mod core;
pub use core::{BoxedToolCall, Function, Items, Parameters, Property, ToolCall, ToolType};
