pub mod adapter;
pub mod gcs_adapter;

pub use adapter::FilesystemAdapter;
pub use gcs_adapter::GcsAdapter;
