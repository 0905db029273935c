use crate::http::TracedBody;
use anyhow::Context;
use futures::StreamExt;
use http_body_util::BodyStream;
use indicatif::{ProgressBar, ProgressStyle};
use std::fs::OpenOptions;
use std::io::Write as WriteStd;
use std::path::Path;

/// Reads the body to the end and discards it. Returns the number of bytes read.
pub async fn drain(body: TracedBody) -> Result<u64, anyhow::Error> {
    let mut body_stream = BodyStream::new(body);
    let mut read = 0;
    while let Some(frame) = body_stream.next().await {
        let frame = frame.context("Error while reading response body")?;
        if let Ok(data) = frame.into_data() {
            read += data.len() as u64;
        }
    }
    Ok(read)
}

pub async fn download_file_with_progress(
    file_path: &Path,
    total_size: Option<u64>,
    body: TracedBody,
) -> Result<u64, anyhow::Error> {
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(file_path)
        .with_context(|| format!("Failed to open or create file: {}", file_path.display()))?;

    let pb = match total_size {
        Some(total) => {
            let pb = ProgressBar::new(total);
            pb.set_style(
                ProgressStyle::with_template(
                    "{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta})",
                )?
                .progress_chars("#>-"),
            );
            pb
        }
        None => ProgressBar::new_spinner(),
    };

    let mut body_stream = BodyStream::new(body);
    let mut downloaded = 0;
    while let Some(frame) = body_stream.next().await {
        let frame = frame.context("Error while downloading file stream")?;
        if let Ok(bytes) = frame.into_data() {
            file.write_all(&bytes)
                .context("Error writing chunk to file")?;
            downloaded += bytes.len() as u64;
            pb.set_position(downloaded);
        }
    }

    pb.finish_with_message("Download complete");
    Ok(downloaded)
}
