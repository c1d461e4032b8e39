//! Bot provisioning for matchmaking backfill

pub mod provisioner;

pub use provisioner::BotProvisioner;
