//! Background tasks

pub mod scheduled_sync;
