//! Tool registry and built-in effectors

pub mod implementations;
pub mod outbound;
pub mod registry;
pub mod validate;

pub use implementations::register_builtin_tools;
pub use outbound::{LogOnlyOutbound, OutboundAdapter};
pub use registry::{parse_params, Tool, ToolContext, ToolOutcome, ToolRegistry};
pub use validate::validate_args;
