pub mod config;
pub mod run;
pub mod slots;

use std::path::Path;

use dayanchor_core::{AnchoringRequest, CoreError};

/// Read an anchoring request from a JSON file, or stdin when `path` is `-`.
pub fn read_request(path: &Path) -> Result<AnchoringRequest, CoreError> {
    let content = if path == Path::new("-") {
        std::io::read_to_string(std::io::stdin())?
    } else {
        std::fs::read_to_string(path)?
    };
    AnchoringRequest::from_json(&content)
}
