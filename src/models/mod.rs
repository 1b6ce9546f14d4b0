pub mod category;
pub mod task;

pub use category::Category;
pub use task::Task;
