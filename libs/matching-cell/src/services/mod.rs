pub mod lifecycle;
pub mod store;
pub mod memory;
pub mod supabase;
pub mod ledger;
pub mod watch;
pub mod matching;

pub use lifecycle::MatchLifecycle;
pub use store::MatchStore;
pub use memory::InMemoryMatchStore;
pub use supabase::SupabaseMatchStore;
pub use ledger::MatchLedger;
pub use watch::{RelationshipStream, WatchCancel};
pub use matching::{DoctorMatchingService, RetryPolicy};
