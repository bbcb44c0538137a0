//! `ipfs_files`: one row per file a tenant has pushed through the IPFS
//! gateway adapter (C8). Ownership is `exists(user_id, cid)` — see
//! [`Entity::find_owned`].

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(Some(8))")]
pub enum PinStatus {
    #[sea_orm(string_value = "pin")]
    Pin,
    #[sea_orm(string_value = "unpin")]
    Unpin,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "ipfs_files")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub user_id: i64,
    pub cid: String,
    pub name: String,
    pub size: i64,
    pub pin_status: PinStatus,
    pub wrap_dir_cid: Option<String>,
    pub wrap_dir_name: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Entity {
    /// `exists(user_id, cid)` — the ownership predicate a download/pin
    /// request is checked against before it is allowed to proceed.
    pub fn find_owned(user_id: i64, cid: &str) -> Select<Entity> {
        Self::find()
            .filter(Column::UserId.eq(user_id))
            .filter(Column::Cid.eq(cid.to_string()))
    }
}
