pub mod installer;
pub mod loader;

pub use installer::ZipApplianceInstaller;
pub use loader::{DirectoryApplianceLoader, HttpApplianceLoader};
