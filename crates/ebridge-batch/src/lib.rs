pub mod runner;
pub mod scheduler;
pub mod upload;

pub use runner::BatchRunner;
pub use scheduler::BatchScheduler;
pub use upload::UploadService;
