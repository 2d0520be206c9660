use crate::entities::prelude::*;
use crate::entities::{user_passwords, user_roles};
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
            .create_table(schema.create_table_from_entity(Users).if_not_exists().to_owned())
            .await?;

        manager
            .create_table(
                schema
                    .create_table_from_entity(UserPasswords)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(schema.create_table_from_entity(UserIps).if_not_exists().to_owned())
            .await?;

        manager
            .create_table(schema.create_table_from_entity(Roles).if_not_exists().to_owned())
            .await?;

        manager
            .create_table(schema.create_table_from_entity(UserRoles).if_not_exists().to_owned())
            .await?;

        manager
            .create_table(
                schema
                    .create_table_from_entity(UserRoleHistory)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_user_roles_user_role_unique")
                    .table(UserRoles)
                    .col(user_roles::Column::UserId)
                    .col(user_roles::Column::RoleId)
                    .unique()
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_user_passwords_user_valid_until")
                    .table(UserPasswords)
                    .col(user_passwords::Column::UserId)
                    .col(user_passwords::Column::ValidUntil)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(UserRoleHistory).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(UserRoles).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Roles).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(UserIps).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(UserPasswords).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Users).to_owned())
            .await?;

        Ok(())
    }
}
