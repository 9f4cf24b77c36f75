use anyhow::Context;
use std::path::{Path, PathBuf};
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tracing::{debug, info};

pub struct FileDownloadConfig {
    pub url: String,
    pub resources_dir: PathBuf,
}

pub struct FileDownload {
    url: String,
    resources_dir: PathBuf,
    client: reqwest::Client,
}

impl Default for FileDownloadConfig {
    fn default() -> Self {
        Self {
            url: "https://huggingface.co".to_string(),
            resources_dir: PathBuf::from("resources"),
        }
    }
}

impl FileDownload {
    pub fn new(config: FileDownloadConfig) -> Self {
        Self {
            url: config.url.trim_end_matches('/').to_string(),
            resources_dir: config.resources_dir,
            client: reqwest::Client::new(),
        }
    }

    pub fn resources_dir(&self) -> &Path {
        &self.resources_dir
    }

    /// Remote location of `uri`, with `\` normalized so Windows paths still form a valid URL.
    pub fn download_url(&self, uri: impl AsRef<Path>) -> String {
        let uri = uri.as_ref().to_string_lossy().replace('\\', "/");
        format!("{}/{}", self.url, uri.trim_start_matches('/'))
    }

    pub async fn download_to_path_if_not_exists(
        &self,
        uri: impl AsRef<Path>,
        file_path: impl AsRef<Path>,
    ) -> anyhow::Result<PathBuf> {
        let file_path = file_path.as_ref().to_path_buf();
        debug!("check file path: {:?}", file_path);
        if file_path.exists() {
            return Ok(file_path);
        }

        let download_url = self.download_url(uri);
        info!("downloading {} to {:?}", download_url, file_path);

        let mut response = self
            .client
            .get(&download_url)
            .send()
            .await
            .with_context(|| format!("failed to request {}", download_url))?
            .error_for_status()
            .with_context(|| format!("failed to download {}", download_url))?;

        // create parent folder
        if let Some(parent_dir) = file_path.parent() {
            fs::create_dir_all(parent_dir).await?;
        }

        // a partial download never shows up under the final name
        let temp_download_path = file_path.with_extension("temp");
        let mut file = File::create(&temp_download_path).await?;
        while let Some(chunk) = response.chunk().await? {
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        fs::rename(&temp_download_path, &file_path).await?;

        info!("file {:?} downloaded", file_path);

        Ok(file_path)
    }

    pub async fn download_if_not_exists(&self, uri: impl AsRef<Path>) -> anyhow::Result<PathBuf> {
        let file_path = self.resources_dir.join(&uri);
        self.download_to_path_if_not_exists(uri, file_path).await
    }
}
