mod mongo;
mod rabbitmq;

pub use mongo::*;
pub use rabbitmq::*;
