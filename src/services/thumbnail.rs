use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ThumbnailError {
    #[error("frame capture timed out after {0:?}")]
    Timeout(Duration),

    #[error("frame capture exited with {code:?}: {stderr}")]
    Failed { code: Option<i32>, stderr: String },

    #[error("frame capture could not run: {0}")]
    Io(#[from] std::io::Error),
}

/// Grabs a single still frame from a file or a live URL.
#[async_trait::async_trait]
pub trait FrameGrabber: Send + Sync {
    /// Writes one frame of `input`, taken at `seek`, to `output`.
    async fn capture(
        &self,
        input: &str,
        output: &Path,
        seek: &str,
        timeout: Duration,
    ) -> Result<(), ThumbnailError>;
}

#[derive(Debug, Clone)]
pub struct FfmpegGrabber {
    binary: String,
}

impl FfmpegGrabber {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

impl Default for FfmpegGrabber {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

#[async_trait::async_trait]
impl FrameGrabber for FfmpegGrabber {
    async fn capture(
        &self,
        input: &str,
        output: &Path,
        seek: &str,
        timeout: Duration,
    ) -> Result<(), ThumbnailError> {
        if let Some(parent) = output.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        debug!(input = %input, output = %output.display(), "Capturing frame");

        // kill_on_drop: when the timeout drops the future the child is killed
        let child = Command::new(&self.binary)
            .arg("-y")
            .args(["-ss", seek])
            .args(["-i", input])
            .args(["-frames:v", "1"])
            .args(["-f", "image2"])
            .arg(output)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let result = tokio::time::timeout(timeout, child.wait_with_output())
            .await
            .map_err(|_| ThumbnailError::Timeout(timeout))??;

        if result.status.success() {
            return Ok(());
        }

        Err(ThumbnailError::Failed {
            code: result.status.code(),
            stderr: stderr_tail(&result.stderr),
        })
    }
}

/// Last few lines of ffmpeg's stderr; the banner before them is noise.
fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let lines: Vec<&str> = text.lines().rev().take(5).collect();
    lines.into_iter().rev().collect::<Vec<_>>().join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stderr_tail() {
        let stderr = b"banner\n1\n2\n3\n4\n5\n";
        assert_eq!(stderr_tail(stderr), "1\n2\n3\n4\n5");
        assert_eq!(stderr_tail(b""), "");
    }

    #[tokio::test]
    async fn test_missing_binary_is_io_error() {
        let grabber = FfmpegGrabber::new("/nonexistent/dvrvault-ffmpeg");
        let output = std::env::temp_dir().join(format!("dvrvault-{}.jpg", uuid::Uuid::new_v4()));
        let result = grabber
            .capture("in.flv", &output, "0", Duration::from_secs(1))
            .await;
        assert!(matches!(result, Err(ThumbnailError::Io(_))));
    }
}
