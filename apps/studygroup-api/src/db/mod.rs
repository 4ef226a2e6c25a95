pub mod memory;
pub mod pool;
pub mod postgres;
pub mod retry;
pub mod schema;
pub mod store;

pub use memory::MemoryStore;
pub use postgres::PgStore;
pub use store::{finish, MemberCounts, Store, StoreTx};
pub use retry::{with_retry, RetryPolicy};
