pub mod backup;
pub mod list;
pub mod restore;
pub mod trim;
pub mod world;
