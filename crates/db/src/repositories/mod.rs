mod item_repo;
mod job_repo;
mod session_repo;

pub use item_repo::ItemRepo;
pub use job_repo::JobRepo;
pub use session_repo::SessionRepo;
