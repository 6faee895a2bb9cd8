//! Realtime progress publishing

mod bar;
mod channel;
mod logging;

pub use bar::ProgressBarChannel;
pub use channel::{owner_channel, JobEvent, JobEventKind, NoOpChannel, PublishError, RealtimeChannel};
pub use logging::LoggingChannel;
