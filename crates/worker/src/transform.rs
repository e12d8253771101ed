//! The style transfer itself, behind a seam.
//!
//! The expensive transform is an external program as far as this
//! service is concerned; [`CommandTransform`] shells out to it. Tests
//! and the canary can substitute their own [`StyleTransform`].

use std::path::{Path, PathBuf};

use picstyle_core::error::CoreError;
use picstyle_core::job::Artifact;

/// One transform invocation, all paths resolved.
#[derive(Debug, Clone)]
pub struct TransformSpec {
    pub content: PathBuf,
    pub style: PathBuf,
    /// Absolute path the artifact must be written to.
    pub output: PathBuf,
    /// Artifact identity as stored in the job record (relative to the
    /// shared jobs directory).
    pub artifact_path: String,
    /// Style strength in percent, `0..=100`.
    pub strength: u8,
}

/// Applies a style image to a content image.
#[async_trait::async_trait]
pub trait StyleTransform: Send + Sync {
    async fn run(&self, spec: &TransformSpec) -> Result<Artifact, CoreError>;
}

/// [`StyleTransform`] that invokes a configured external command as
/// `<command> <content> <style> <output> <strength>`.
pub struct CommandTransform {
    program: String,
}

impl CommandTransform {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

#[async_trait::async_trait]
impl StyleTransform for CommandTransform {
    async fn run(&self, spec: &TransformSpec) -> Result<Artifact, CoreError> {
        // kill_on_drop: an aborted or timed-out job must not leave the
        // child running.
        let output = tokio::process::Command::new(&self.program)
            .arg(&spec.content)
            .arg(&spec.style)
            .arg(&spec.output)
            .arg(spec.strength.to_string())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                CoreError::WorkerFailed(format!("Failed to launch {}: {e}", self.program))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CoreError::WorkerFailed(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }

        artifact_for(&spec.output, &spec.artifact_path).await
    }
}

/// Verify the artifact exists and capture its size.
async fn artifact_for(output: &Path, artifact_path: &str) -> Result<Artifact, CoreError> {
    let meta = tokio::fs::metadata(output).await.map_err(|e| {
        CoreError::WorkerFailed(format!("Transform produced no artifact: {e}"))
    })?;
    if meta.len() == 0 {
        return Err(CoreError::WorkerFailed(
            "Transform produced an empty artifact".into(),
        ));
    }
    Ok(Artifact {
        path: artifact_path.to_string(),
        size_bytes: meta.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[tokio::test]
    async fn missing_program_is_a_worker_failure() {
        let transform = CommandTransform::new("definitely-not-a-real-program");
        let dir = tempfile::tempdir().unwrap();
        let spec = TransformSpec {
            content: dir.path().join("c.png"),
            style: dir.path().join("s.png"),
            output: dir.path().join("out.jpg"),
            artifact_path: "x/out.jpg".into(),
            strength: 50,
        };
        assert_matches!(
            transform.run(&spec).await,
            Err(CoreError::WorkerFailed(_))
        );
    }

    #[tokio::test]
    async fn empty_artifact_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.jpg");
        tokio::fs::write(&out, b"").await.unwrap();
        assert_matches!(
            artifact_for(&out, "x/out.jpg").await,
            Err(CoreError::WorkerFailed(_))
        );
    }

    #[tokio::test]
    async fn artifact_size_is_captured() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.jpg");
        tokio::fs::write(&out, b"jpegbytes").await.unwrap();
        let artifact = artifact_for(&out, "x/out.jpg").await.unwrap();
        assert_eq!(artifact.path, "x/out.jpg");
        assert_eq!(artifact.size_bytes, 9);
    }
}
