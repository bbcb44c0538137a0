use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[sea_orm_migration::async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(IpfsFiles::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(IpfsFiles::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(IpfsFiles::UserId).big_integer().not_null())
                    .col(ColumnDef::new(IpfsFiles::Cid).string().not_null())
                    .col(ColumnDef::new(IpfsFiles::Name).string().not_null())
                    .col(ColumnDef::new(IpfsFiles::Size).big_integer().not_null())
                    .col(
                        ColumnDef::new(IpfsFiles::PinStatus)
                            .string_len(8)
                            .not_null()
                            .default("pin"),
                    )
                    .col(ColumnDef::new(IpfsFiles::WrapDirCid).string().null())
                    .col(ColumnDef::new(IpfsFiles::WrapDirName).string().null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx-ipfs_files-user_id-cid")
                    .table(IpfsFiles::Table)
                    .col(IpfsFiles::UserId)
                    .col(IpfsFiles::Cid)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(IpfsFiles::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum IpfsFiles {
    Table,
    Id,
    UserId,
    Cid,
    Name,
    Size,
    PinStatus,
    WrapDirCid,
    WrapDirName,
}
