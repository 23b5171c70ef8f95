pub mod supabase;

pub use supabase::{DatabaseError, PostgrestError, SupabaseClient};
