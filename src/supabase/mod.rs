//! Supabase-backed implementations of the identity and profile seams

mod identity;
mod profiles;

pub use identity::SupabaseIdentityProvider;
pub use profiles::PostgrestProfileStore;
