pub mod document;
pub mod exception;
pub mod loaders;
pub mod stage;
pub mod status;

pub use document::{
    Confidence, Document, DocumentId, DocumentStatus, DocumentType, ExtractedData, LineItem,
    UploadFile,
};
pub use exception::{ExceptionEntry, ExceptionKind};
pub use loaders::{load_upload_file, load_upload_files};
pub use stage::PipelineStage;
pub use status::{RemoteDocumentStatus, RemoteState, StatusRecord};
