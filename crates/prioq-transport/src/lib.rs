pub use prioq_core::{ClientId, PqError, QueueInfo, QueueService, ServiceConfig};
pub mod client;
pub mod command;
pub mod dispatcher;
pub mod server;
pub mod wire;

pub use client::{ClientError, EndpointClient};
pub use command::{Command, CommandCode, CommandReply};
pub use dispatcher::Dispatcher;
pub use server::EndpointServer;
