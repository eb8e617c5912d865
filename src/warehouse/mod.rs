mod diagram;
mod models;
mod schema;
mod store;
mod writer;

pub use diagram::render_dot;
pub use models::*;
pub use schema::{latest_schema, WAREHOUSE_VERSIONED_SCHEMAS};
pub use store::SqliteWarehouse;
pub use writer::WarehouseWriter;
