pub mod failures;
pub mod flaky;
pub mod queries;
pub(crate) mod rows;
pub(crate) mod runs;
pub mod schema;
pub mod store;

pub use failures::FailureStore;
pub use queries::{FailureCount, FlakyCandidate, Window};
pub use store::{Store, StoreStats};
