pub mod converger;
pub mod handler;
pub mod resource;

pub use converger::Converger;
pub use handler::TaskHandler;
pub use resource::{resource_fn, FnResource, Resource};
