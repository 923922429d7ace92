pub mod context;
pub mod history;
pub mod runner;
pub mod source;
pub mod unit;

pub use self::context::MigrationContext;
pub use self::history::{AppliedMigration, CqlHistoryStore, HistoryStore};
pub use self::runner::{MigrationPlan, MigrationRunner, RollbackTarget, RunPhase, RunReport, StatusReport};
pub use self::source::MigrationDirectory;
pub use self::unit::{CqlMigration, Migration, MigrationSet};
