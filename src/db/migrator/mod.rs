use sea_orm_migration::prelude::*;

mod m20260301_membership;
mod m20260302_access_rules;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20260301_membership::Migration),
            Box::new(m20260302_access_rules::Migration),
        ]
    }
}
