use sea_orm::{entity::prelude::*, Set, DatabaseConnection};
use sea_orm::sea_query::Expr;
use uuid::Uuid;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors;
use crate::user;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "session")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub user_id: Uuid,
    pub refresh_token_hash: String,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
    pub is_active: bool,
    pub expires_at: DateTimeWithTimeZone,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter)]
pub enum Relation { User }

impl RelationTrait for Relation {
    fn def(&self) -> RelationDef {
        match self { Relation::User => Entity::belongs_to(user::Entity).from(Column::UserId).to(user::Column::Id).into() }
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool { self.expires_at <= now }
}

pub struct NewSession<'a> {
    pub user_id: Uuid,
    pub refresh_token_hash: &'a str,
    pub user_agent: Option<&'a str>,
    pub ip_address: Option<&'a str>,
    pub expires_at: DateTime<Utc>,
}

pub async fn create(db: &DatabaseConnection, input: NewSession<'_>) -> Result<Model, errors::ModelError> {
    if input.refresh_token_hash.len() != 64 {
        return Err(errors::ModelError::Validation("refresh_token_hash must be a sha256 hex digest".into()));
    }
    let now = Utc::now().into();
    let am = ActiveModel {
        id: Set(Uuid::new_v4()),
        user_id: Set(input.user_id),
        refresh_token_hash: Set(input.refresh_token_hash.to_string()),
        user_agent: Set(input.user_agent.map(|s| s.chars().take(512).collect())),
        ip_address: Set(input.ip_address.map(|s| s.chars().take(64).collect())),
        is_active: Set(true),
        expires_at: Set(input.expires_at.into()),
        created_at: Set(now),
        updated_at: Set(now),
    };
    Ok(am.insert(db).await?)
}

pub async fn find_by_id(db: &DatabaseConnection, id: Uuid) -> Result<Option<Model>, errors::ModelError> {
    Ok(Entity::find_by_id(id).one(db).await?)
}

pub async fn find_by_refresh_hash(db: &DatabaseConnection, hash: &str) -> Result<Option<Model>, errors::ModelError> {
    Ok(Entity::find().filter(Column::RefreshTokenHash.eq(hash)).one(db).await?)
}

/// Active, unexpired sessions of a user, newest first.
pub async fn list_active_for_user(db: &DatabaseConnection, user_id: Uuid) -> Result<Vec<Model>, errors::ModelError> {
    let now = Utc::now();
    let mut rows: Vec<Model> = Entity::find()
        .filter(Column::UserId.eq(user_id))
        .filter(Column::IsActive.eq(true))
        .all(db)
        .await?
        .into_iter()
        .filter(|s| !s.is_expired_at(now))
        .collect();
    rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(rows)
}

/// Returns whether the session exists; deactivating twice is not an error.
pub async fn deactivate(db: &DatabaseConnection, id: Uuid) -> Result<bool, errors::ModelError> {
    let now: DateTimeWithTimeZone = Utc::now().into();
    let res = Entity::update_many()
        .col_expr(Column::IsActive, Expr::value(false))
        .col_expr(Column::UpdatedAt, Expr::value(now))
        .filter(Column::Id.eq(id))
        .exec(db)
        .await?;
    Ok(res.rows_affected > 0)
}

/// Deactivate every active session of a user; returns how many flipped.
pub async fn deactivate_all_for_user(db: &DatabaseConnection, user_id: Uuid) -> Result<u64, errors::ModelError> {
    let now: DateTimeWithTimeZone = Utc::now().into();
    let res = Entity::update_many()
        .col_expr(Column::IsActive, Expr::value(false))
        .col_expr(Column::UpdatedAt, Expr::value(now))
        .filter(Column::UserId.eq(user_id))
        .filter(Column::IsActive.eq(true))
        .exec(db)
        .await?;
    Ok(res.rows_affected)
}
