mod lifecycle;
pub mod task_manager;

pub use lifecycle::TaskManagerSlot;
pub use task_manager::TaskManager;
