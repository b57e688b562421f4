pub mod classify;
pub mod index;
pub mod path_mapper;

pub use classify::{classify, item_root, MediaKind};
pub use index::{LibraryCategory, LibraryIndex, LibraryRoot, LibrarySection, RemotePath};
pub use path_mapper::{map_path, MapMode};
