//! Request scheduling: the dispatcher actor, its worker pool and the hunters it runs.

mod dispatcher;
mod executor;
mod hunter;
mod network;
mod stats;

pub use dispatcher::{
    DEFAULT_BATCH_DELAY, DEFAULT_RETRY_DELAY, Dispatcher, DispatcherConfig, DispatcherHandle,
    HuntExecutor, MainMessage,
};
pub use executor::{Job, PriorityExecutor};
pub use hunter::{HuntContext, HuntOutput, Hunter};
pub use network::{CELLULAR_THREAD_COUNT, DEFAULT_THREAD_COUNT, NetworkState, Transport};
pub use stats::Stats;
