use sea_orm::{entity::prelude::*, Set, DatabaseConnection};
use sea_orm::sea_query::Expr;
use uuid::Uuid;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors;
use crate::user;

pub const TYPE_EMAIL_VERIFICATION: &str = "email_verification";
pub const TYPE_PASSWORD_RESET: &str = "password_reset";

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "verification_token")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub user_id: Uuid,
    pub token_hash: String,
    pub token_type: String,
    pub expires_at: DateTimeWithTimeZone,
    pub is_used: bool,
    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter)]
pub enum Relation { User }

impl RelationTrait for Relation {
    fn def(&self) -> RelationDef {
        match self { Relation::User => Entity::belongs_to(user::Entity).from(Column::UserId).to(user::Column::Id).into() }
    }
}

impl ActiveModelBehavior for ActiveModel {}

pub async fn create(
    db: &DatabaseConnection,
    user_id: Uuid,
    token_hash: &str,
    token_type: &str,
    expires_at: DateTime<Utc>,
) -> Result<Model, errors::ModelError> {
    if token_type != TYPE_EMAIL_VERIFICATION && token_type != TYPE_PASSWORD_RESET {
        return Err(errors::ModelError::Validation(format!("unknown token type {token_type}")));
    }
    let am = ActiveModel {
        id: Set(Uuid::new_v4()),
        user_id: Set(user_id),
        token_hash: Set(token_hash.to_string()),
        token_type: Set(token_type.to_string()),
        expires_at: Set(expires_at.into()),
        is_used: Set(false),
        created_at: Set(Utc::now().into()),
    };
    Ok(am.insert(db).await?)
}

pub async fn find_by_hash(db: &DatabaseConnection, token_hash: &str, token_type: &str) -> Result<Option<Model>, errors::ModelError> {
    Ok(Entity::find()
        .filter(Column::TokenHash.eq(token_hash))
        .filter(Column::TokenType.eq(token_type))
        .one(db)
        .await?)
}

/// Conditional `UPDATE ... SET is_used = true WHERE id = ? AND is_used = false`.
/// Exactly one concurrent caller observes `true`.
pub async fn mark_used(db: &DatabaseConnection, id: Uuid) -> Result<bool, errors::ModelError> {
    let res = Entity::update_many()
        .col_expr(Column::IsUsed, Expr::value(true))
        .filter(Column::Id.eq(id))
        .filter(Column::IsUsed.eq(false))
        .exec(db)
        .await?;
    Ok(res.rows_affected == 1)
}
