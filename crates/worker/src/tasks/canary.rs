//! Health-check canary bodies.
//!
//! Two probes share the `health_check` job kind, distinguished by the
//! `probe` parameter. The queue probe is a no-op whose completion is
//! the signal: reaching it proves submit, claim, execute, and the
//! terminal write all work. The image probe additionally pushes a tiny
//! embedded image pair through the real transform command.

use std::path::Path;

use picstyle_core::error::CoreError;
use serde_json::{json, Value};

use crate::transform::{StyleTransform, TransformSpec};

/// A minimal valid 1x1 RGBA PNG, used as both canary inputs.
const CANARY_PNG: [u8; 67] = [
    0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, // signature
    0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44, 0x52, // IHDR
    0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1F, 0x15,
    0xC4, 0x89, //
    0x00, 0x00, 0x00, 0x0D, 0x49, 0x44, 0x41, 0x54, // IDAT
    0x78, 0x9C, 0x63, 0x00, 0x01, 0x00, 0x00, 0x05, 0x00, 0x01, 0x0D, 0x0A, 0x2D, 0xB4, //
    0x00, 0x00, 0x00, 0x00, 0x49, 0x45, 0x4E, 0x44, 0xAE, 0x42, 0x60, 0x82, // IEND
];

/// Run the probe named in `parameters`.
pub async fn run(
    transform: &dyn StyleTransform,
    jobs_dir: &Path,
    parameters: &Value,
) -> Result<Value, CoreError> {
    match parameters.get("probe").and_then(Value::as_str) {
        Some("queue") | None => Ok(json!({ "probe": "queue" })),
        Some("image") => image_probe(transform, jobs_dir).await,
        Some(other) => Err(CoreError::WorkerFailed(format!("Unknown probe: {other}"))),
    }
}

/// Exercise the actual transform on embedded 1x1 inputs. The scratch
/// directory lives under the jobs dir so a crash mid-probe is swept by
/// the ordinary cleanup.
async fn image_probe(
    transform: &dyn StyleTransform,
    jobs_dir: &Path,
) -> Result<Value, CoreError> {
    let scratch = jobs_dir.join(format!(".canary-{}", uuid::Uuid::new_v4()));
    tokio::fs::create_dir_all(&scratch)
        .await
        .map_err(|e| CoreError::Infra(format!("Cannot create canary scratch dir: {e}")))?;

    let content = scratch.join("content.png");
    let style = scratch.join("style.png");
    for path in [&content, &style] {
        tokio::fs::write(path, CANARY_PNG)
            .await
            .map_err(|e| CoreError::Infra(format!("Cannot write canary input: {e}")))?;
    }

    let spec = TransformSpec {
        content,
        style,
        output: scratch.join("result.jpg"),
        artifact_path: String::new(),
        strength: 50,
    };
    let result = transform.run(&spec).await;

    if let Err(e) = tokio::fs::remove_dir_all(&scratch).await {
        tracing::warn!(error = %e, "Canary scratch dir cleanup failed");
    }

    let artifact = result?;
    Ok(json!({ "probe": "image", "size_bytes": artifact.size_bytes }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use picstyle_core::job::Artifact;

    struct OkTransform;

    #[async_trait::async_trait]
    impl StyleTransform for OkTransform {
        async fn run(&self, spec: &TransformSpec) -> Result<Artifact, CoreError> {
            tokio::fs::write(&spec.output, b"result").await.unwrap();
            Ok(Artifact {
                path: spec.artifact_path.clone(),
                size_bytes: 6,
            })
        }
    }

    struct FailTransform;

    #[async_trait::async_trait]
    impl StyleTransform for FailTransform {
        async fn run(&self, _spec: &TransformSpec) -> Result<Artifact, CoreError> {
            Err(CoreError::WorkerFailed("model exploded".into()))
        }
    }

    #[tokio::test]
    async fn queue_probe_succeeds_without_touching_disk() {
        let dir = tempfile::tempdir().unwrap();
        let result = run(&OkTransform, dir.path(), &json!({ "probe": "queue" }))
            .await
            .unwrap();
        assert_eq!(result["probe"], "queue");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn image_probe_runs_transform_and_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let result = run(&OkTransform, dir.path(), &json!({ "probe": "image" }))
            .await
            .unwrap();
        assert_eq!(result["probe"], "image");
        // Scratch dir removed after the probe.
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn image_probe_cleans_up_even_on_transform_failure() {
        let dir = tempfile::tempdir().unwrap();
        let result = run(&FailTransform, dir.path(), &json!({ "probe": "image" })).await;
        assert!(result.is_err());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn unknown_probe_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(run(&OkTransform, dir.path(), &json!({ "probe": "chaos" }))
            .await
            .is_err());
    }

    #[test]
    fn embedded_canary_input_is_a_png() {
        assert_eq!(&CANARY_PNG[..8], b"\x89PNG\r\n\x1a\n");
    }
}
