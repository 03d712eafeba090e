mod directory;
mod error;
mod paths;
mod schema;
mod store;

pub use directory::SharedCatalog;
pub use error::CatalogError;
pub use paths::{catalog_path, catalog_root, CATALOG_FILE_NAME};
pub use schema::{CatalogFile, ChatPatch, Flow, FlowNode, Project, Template, CATALOG_VERSION};
pub use store::CatalogStore;
