pub use sea_orm_migration::prelude::*;

mod m20251201_000001_deals;
mod m20251201_000002_stage_transitions;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20251201_000001_deals::Migration),
            Box::new(m20251201_000002_stage_transitions::Migration),
        ]
    }
}
