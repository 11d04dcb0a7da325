//! Idempotent session image provisioning.
//!
//! The image is referenced by a fixed name. When it already exists the
//! engine is only queried; when absent, the bundled build recipe and
//! bootstrap script are staged into a temporary context and built once.
//! There is no fallback image: a failed build aborts the run.

use crate::engine::{Engine, EngineError};
use std::fs;
use thiserror::Error;
use tracing::{debug, info};

pub const IMAGE_NAME: &str = "burrow-session:latest";

const CONTAINERFILE: &str = include_str!("../assets/Containerfile");
const BOOTSTRAP: &str = include_str!("../assets/bootstrap.sh");

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("failed to stage image build context: {0}")]
    Stage(#[from] std::io::Error),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// Make sure the session image exists, building it on demand. Returns the
/// image reference to launch from.
pub async fn ensure_image(engine: &Engine) -> Result<String, BuildError> {
    if engine.image_exists(IMAGE_NAME).await? {
        debug!(image = IMAGE_NAME, "session image already present");
        return Ok(IMAGE_NAME.to_string());
    }

    info!(image = IMAGE_NAME, "session image not found, building");
    let context = tempfile::tempdir()?;
    fs::write(context.path().join("Containerfile"), CONTAINERFILE)?;
    fs::write(context.path().join("bootstrap.sh"), BOOTSTRAP)?;

    engine.build_image(IMAGE_NAME, context.path()).await?;
    info!(image = IMAGE_NAME, "session image built");
    Ok(IMAGE_NAME.to_string())
}
