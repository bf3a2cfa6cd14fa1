pub mod db;
pub mod memory;
pub mod uploads;

pub use db::DbAdapter;
pub use memory::MemoryStore;
pub use uploads::LocalUploadStore;
