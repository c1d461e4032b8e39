//! Outbound event publishing

pub mod amqp;
pub mod gateway;

pub use amqp::{AmqpConnection, AmqpGateway, MessageEnvelope};
pub use gateway::{NotificationGateway, NullGateway, RecordingGateway};
