pub mod schema;
pub mod state;
pub mod utils;

pub use schema::*;
pub use utils::{create_conn, normalize_page, page_offset, run_migrations, total_pages, DbPool};
