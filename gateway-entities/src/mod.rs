pub mod ipfs_files;

pub use sea_orm;
