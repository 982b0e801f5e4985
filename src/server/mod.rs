mod context;
pub mod http;

pub use context::ServiceContext;
