//! MonitoredAgent (§4.7) and GraphObserver (§4.9): the monitoring layer
//! built on top of `genesis-fabric`'s topology and activity topics.

pub mod graph_observer;
pub mod monitored_agent;

pub use graph_observer::{GraphChange, GraphObserver};
pub use monitored_agent::MonitoredAgent;
