use sea_orm::entity::prelude::*;

/// A routable (method, url) pair. Absent template/action/redirects are stored as `-`.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "requests")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    /// `GET`, `POST` or `*`
    pub method: String,

    pub url: String,

    pub parent_id: Option<i32>,

    pub template: String,

    pub controller: String,

    pub action: String,

    pub success_url: String,

    pub error_url: String,

    pub sort_order: i32,

    pub in_menu: bool,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::request_names::Entity")]
    RequestNames,
    #[sea_orm(has_many = "super::request_roles::Entity")]
    RequestRoles,
}

impl Related<super::request_names::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::RequestNames.def()
    }
}

impl Related<super::request_roles::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::RequestRoles.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
