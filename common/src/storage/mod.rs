// Event storage: the repository contract, query windows and both backends

pub mod memory;
pub mod postgres;
pub mod repository;
pub mod window;

pub use memory::MemoryEventRepository;
pub use postgres::PostgresEventRepository;
pub use repository::EventRepository;
pub use window::{Period, TimeWindow};
