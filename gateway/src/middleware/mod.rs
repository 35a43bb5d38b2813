mod collapse_base_path;

pub use collapse_base_path::{CollapseBasePath, CollapseBasePathMiddleware};
