pub mod memory;
pub mod password;
pub mod store;
pub mod supabase;

pub use memory::MemoryStore;
pub use password::PasswordService;
pub use store::{ClinicStore, EntityStore, Filter};
pub use supabase::SupabaseStore;
