pub mod supabase_auth;
pub mod supabase_data;
pub mod supabase_http;

pub use supabase_auth::SupabaseAuthAdapter;
pub use supabase_data::SupabaseDataAdapter;
pub use supabase_http::SupabaseHttp;
