use std::{io::ErrorKind, path::Path, process::Stdio};

use tracing::{debug, error, info, instrument};

use crate::{assemble::AssembledOutput, error::DownloadError};

/// Checks if `program` is an ffmpeg that runs
pub async fn is_installed(program: &Path) -> bool {
    debug!("Checking for ffmpeg installation at {}", program.display());
    tokio::process::Command::new(program)
        .arg("-version")
        .stderr(Stdio::null())
        .stdout(Stdio::null())
        .status()
        .await
        .is_ok_and(|status| status.success())
}

/// Arguments that copy every stream of the playlist into an mp4 at `out_file`
#[must_use]
pub fn remux_args(playlist_url: &str, user_agent: &str, out_file: &Path) -> Vec<String> {
    [
        "-hide_banner",
        "-nostdin",
        "-y",
        "-loglevel",
        "error",
        "-user_agent",
        user_agent,
        "-i",
        playlist_url,
        "-c",
        "copy",
        "-avoid_negative_ts",
        "make_zero",
        "-f",
        "mp4",
    ]
    .into_iter()
    .map(str::to_string)
    .chain(std::iter::once(out_file.to_string_lossy().into_owned()))
    .collect()
}

/// Lets ffmpeg fetch the playlist and its segments and remux them into one
/// temporary mp4, without re-encoding
///
/// ffmpeg is killed if the returned future is dropped.
///
/// # Errors
/// [`DownloadError::Remux`] when ffmpeg is missing or exits unsuccessfully
#[instrument(skip(program, user_agent, temp_dir))]
pub async fn remux_playlist(
    program: &Path,
    playlist_url: &str,
    user_agent: &str,
    temp_dir: &Path,
) -> Result<AssembledOutput, DownloadError> {
    let (file, guard) = AssembledOutput::create_file(temp_dir)?;
    drop(file);

    let child = match tokio::process::Command::new(program)
        .args(remux_args(playlist_url, user_agent, guard.path()))
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
    {
        Ok(c) => c,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(DownloadError::Remux(
                format!("`{}` is not installed or available in PATH!", program.display()),
            ));
        }
        Err(e) => return Err(DownloadError::Remux(format!("Unable to spawn ffmpeg: {e}"))),
    };

    let out = child
        .wait_with_output()
        .await
        .map_err(|e| DownloadError::Remux(format!("Waiting for ffmpeg: {e}")))?;
    if !out.status.success() {
        let stderr = String::from_utf8_lossy(&out.stderr);
        error!("Playlist remux is unsuccessful");
        error!("stderr: {stderr}");
        return Err(DownloadError::Remux(format!(
            "ffmpeg exited with {}: {}",
            out.status,
            stderr.trim()
        )));
    }

    let output = AssembledOutput::finish(guard).await?;
    info!("Remuxed playlist into {} bytes", output.len());

    Ok(output)
}
