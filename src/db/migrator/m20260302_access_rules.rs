use crate::entities::prelude::*;
use crate::entities::{request_names, request_roles, requests};
use sea_orm_migration::prelude::*;
use sea_orm_migration::sea_orm::Schema;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let backend = manager.get_database_backend();
        let schema = Schema::new(backend);

        manager
            .create_table(schema.create_table_from_entity(Requests).if_not_exists().to_owned())
            .await?;

        manager
            .create_table(
                schema
                    .create_table_from_entity(RequestNames)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                schema
                    .create_table_from_entity(RequestRoles)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        // Seeding relies on these for insert-if-absent
        manager
            .create_index(
                Index::create()
                    .name("idx_requests_method_url_unique")
                    .table(Requests)
                    .col(requests::Column::Method)
                    .col(requests::Column::Url)
                    .unique()
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_request_names_request_language_unique")
                    .table(RequestNames)
                    .col(request_names::Column::RequestId)
                    .col(request_names::Column::Language)
                    .unique()
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_request_roles_request_role_unique")
                    .table(RequestRoles)
                    .col(request_roles::Column::RequestId)
                    .col(request_roles::Column::RoleId)
                    .unique()
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(RequestRoles).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(RequestNames).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Requests).to_owned())
            .await?;

        Ok(())
    }
}
