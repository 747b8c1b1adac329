pub mod file_loader;

pub use file_loader::{is_supported_document, load_upload_file, load_upload_files};
