//! regionfan — region-keyed CSV fan-out pipeline.
//!
//! A producer streams a life-expectancy dataset into durable per-region
//! queues; one consumer worker per region filters records against two
//! thresholds into per-region output files, and emails them on shutdown.

pub mod broker;
pub mod config;
pub mod consumer;
pub mod error;
pub mod notify;
pub mod producer;
pub mod record;
pub mod signal;
pub mod sink;
