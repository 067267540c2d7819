pub mod item;
pub mod job;
pub mod session;
