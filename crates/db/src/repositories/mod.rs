pub mod history_repo;
pub mod job_repo;
pub mod schedule_repo;
pub mod worker_repo;

pub use history_repo::HistoryRepo;
pub use job_repo::JobRepo;
pub use schedule_repo::ScheduleRepo;
pub use worker_repo::WorkerRepo;
