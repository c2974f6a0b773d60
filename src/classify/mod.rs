//! Pure, stateless classification: size band, heat band, file type, owner, mount info.

pub mod filetype;
pub mod heat_band;
pub mod mount;
pub mod owner;
pub mod size_band;

pub use filetype::{detect_filetype, detect_filetype_from_metadata};
pub use heat_band::{age_seconds, all_heat_bands, heat_band};
pub use mount::{MountInfo, mount_info};
pub use owner::username_from_uid;
pub use size_band::{all_size_bands, size_band};
