pub mod schema;
pub mod state;
pub mod test_utils;
pub mod utils;

pub use schema::*;
pub use utils::{create_conn, redact_database_url, run_migrations, DbPool};
