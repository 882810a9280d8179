pub mod csv_file;
pub mod engine;
pub mod reconcile;

pub use csv_file::write_csv;
pub use engine::{SyncEngine, validate_range};
pub use reconcile::reconcile_sheet;
