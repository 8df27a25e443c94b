pub mod relay;
pub mod service;

pub use relay::Relay;
pub use service::Bridge;
