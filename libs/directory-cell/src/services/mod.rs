pub mod store;
pub mod memory;
pub mod supabase;
pub mod specialty;
pub mod registration;

pub use store::{DirectoryBackend, DirectoryStore, DirectoryWriter};
pub use memory::InMemoryDirectory;
pub use supabase::SupabaseDirectory;
pub use specialty::{SpecialtyCatalog, SpecialtyIndex, normalize_specialty};
pub use registration::RegistrationService;
