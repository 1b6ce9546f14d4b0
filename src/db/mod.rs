pub mod repository;
pub mod task_repository;

pub use repository::{QueryOptions, Repository};
pub use task_repository::TaskRepository;
