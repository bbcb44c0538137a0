//! CID ownership (`exists(user_id, cid)`) and upload-result persistence.

use gateway_entities::ipfs_files::{self, PinStatus};
use sea_orm::{ActiveModelTrait, ActiveValue::Set, DatabaseConnection, EntityTrait};
use serde::Deserialize;

/// One line of the IPFS daemon's `/add` reply stream.
#[derive(Debug, Clone, Deserialize)]
pub struct AddResult {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Hash")]
    pub hash: String,
    #[serde(rename = "Size")]
    pub size: String,
}

pub async fn owns_cid(db: &DatabaseConnection, user_id: i64, cid: &str) -> Result<bool, sea_orm::DbErr> {
    Ok(ipfs_files::Entity::find_owned(user_id, cid)
        .one(db)
        .await?
        .is_some())
}

/// The `/add` reply stream's directory-wrapper entry is the one result with
/// an empty `Name` (ipfs-cluster's convention for the root of a
/// `wrap-with-directory` upload). Every other entry should be linked to it
/// via `wrap_dir_cid`.
fn wrap_dir_cid_of(results: &[AddResult]) -> Option<&str> {
    results.iter().find(|r| r.name.is_empty()).map(|r| r.hash.as_str())
}

/// Persists newly uploaded files, skipping any CID the tenant already owns
/// (re-uploading a CID you already have must not double-count storage).
/// Returns the total byte size counted toward storage — the directory
/// wrapper entry (see [`wrap_dir_cid_of`]) is persisted like any other
/// result so its CID is ownable and pinnable, but its own size is excluded
/// from the storage sum: it wraps bytes already accounted for by its
/// children, and is already counted toward transfer via the request's
/// content length.
pub async fn record_uploads(
    db: &DatabaseConnection,
    user_id: i64,
    results: &[AddResult],
) -> Result<i64, sea_orm::DbErr> {
    let wrap_dir_cid = wrap_dir_cid_of(results).map(str::to_string);

    let mut new_bytes = 0i64;
    for result in results {
        if owns_cid(db, user_id, &result.hash).await? {
            continue;
        }
        let size: i64 = result.size.parse().unwrap_or(0);
        let is_wrap_dir = result.name.is_empty();
        let model = ipfs_files::ActiveModel {
            user_id: Set(user_id),
            cid: Set(result.hash.clone()),
            name: Set(result.name.clone()),
            size: Set(size),
            pin_status: Set(PinStatus::Pin),
            wrap_dir_cid: Set(if is_wrap_dir { None } else { wrap_dir_cid.clone() }),
            wrap_dir_name: Set(None),
            ..Default::default()
        };
        model.insert(db).await?;
        if !is_wrap_dir {
            new_bytes += size;
        }
    }
    Ok(new_bytes)
}

pub async fn set_pin_status(
    db: &DatabaseConnection,
    user_id: i64,
    cid: &str,
    status: PinStatus,
) -> Result<(), sea_orm::DbErr> {
    if let Some(model) = ipfs_files::Entity::find_owned(user_id, cid).one(db).await? {
        let mut active: ipfs_files::ActiveModel = model.into();
        active.pin_status = Set(status);
        active.update(db).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(name: &str, hash: &str, size: &str) -> AddResult {
        AddResult {
            name: name.to_string(),
            hash: hash.to_string(),
            size: size.to_string(),
        }
    }

    #[test]
    fn wrap_dir_cid_of_finds_the_unnamed_entry() {
        let results = vec![
            result("a.txt", "cid-a", "10"),
            result("", "cid-dir", "30"),
            result("b.txt", "cid-b", "20"),
        ];
        assert_eq!(wrap_dir_cid_of(&results), Some("cid-dir"));
    }

    #[test]
    fn wrap_dir_cid_of_is_none_for_a_plain_upload() {
        let results = vec![result("a.txt", "cid-a", "10")];
        assert_eq!(wrap_dir_cid_of(&results), None);
    }
}

