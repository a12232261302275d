//! Writes the OpenAPI document for house-api to `docs/openapi.json`, or to
//! the path given as the first argument.

use std::path::PathBuf;

use utoipa::OpenApi;

fn main() {
    let doc = house_api::routes::ApiDoc::openapi()
        .to_pretty_json()
        .expect("failed to serialize OpenAPI document");

    let out = std::env::args().nth(1).map(PathBuf::from).unwrap_or_else(|| {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../docs/openapi.json")
    });
    if let Some(parent) = out.parent() {
        std::fs::create_dir_all(parent).expect("failed to create output directory");
    }
    std::fs::write(&out, doc).expect("failed to write OpenAPI document");
    println!("Wrote {}", out.display());
}
