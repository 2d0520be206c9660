use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "users")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    pub username: String,

    /// Case-folded shadow of `username`, used for every lookup.
    #[sea_orm(unique)]
    pub lowered_username: String,

    pub name: String,

    pub surname: String,

    pub email: String,

    #[sea_orm(unique)]
    pub lowered_email: String,

    /// New credentials get an expiry when a change interval is configured.
    pub password_expires: bool,

    pub activated: bool,

    pub activation_time: Option<String>,

    pub locked_out: bool,

    pub valid: bool,

    pub failed_password_attempts: i32,

    pub first_failed_password: Option<String>,

    pub last_failed_password: Option<String>,

    pub last_password_change: Option<String>,

    pub last_connect_time: Option<String>,

    pub last_connect_ip: Option<String>,

    pub created_at: String,

    pub updated_at: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::user_passwords::Entity")]
    UserPasswords,
    #[sea_orm(has_many = "super::user_ips::Entity")]
    UserIps,
    #[sea_orm(has_many = "super::user_roles::Entity")]
    UserRoles,
}

impl Related<super::user_passwords::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::UserPasswords.def()
    }
}

impl Related<super::user_ips::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::UserIps.def()
    }
}

impl Related<super::user_roles::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::UserRoles.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
