//! WebSocket side of progress delivery: the per-job fan-out manager, the
//! upgrade handler and the heartbeat task.

mod handler;
mod heartbeat;
pub mod manager;

pub use handler::ws_handler;
pub use heartbeat::start_heartbeat;
pub use manager::FanoutManager;
