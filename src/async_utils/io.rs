//! I/O utilities.
//!
//! Reads configuration files (JSON or TOML) and text from files or standard
//! input, and writes text, JSON and JSONL to files or standard output.

use tokio::{
    fs::{self, File},
    io::{AsyncReadExt as _, AsyncWrite, AsyncWriteExt as _, BufWriter},
};

use crate::{
    prelude::*,
    toml_utils::{deser_error_to_anyhow, from_toml_str},
};

/// Read TOML or JSON from a file.
///
/// We treat the file as JSON if it has a `.json` extension or starts with
/// `{`, and as TOML otherwise.
pub async fn read_json_or_toml<T>(path: &Path) -> Result<T>
where
    T: serde::de::DeserializeOwned + for<'de> toml_span::Deserialize<'de>,
{
    let data = fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read file at path: {:?}", path))?;
    let is_json = path.extension().is_some_and(|ext| ext == "json")
        || data.trim_start().starts_with('{');
    if is_json {
        serde_json::from_str(&data).with_context(|| {
            format!("Failed to parse JSON from file at path: {:?}", path)
        })
    } else {
        from_toml_str(&data)
            .map_err(|err| deser_error_to_anyhow(err, &path.display().to_string()))
    }
}

/// Read UTF-8 text from a file, or from standard input if `path` is `None`.
pub async fn read_text(path: Option<&Path>) -> Result<String> {
    match path {
        Some(path) => fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read text from {:?}", path)),
        None => {
            let mut text = String::new();
            tokio::io::stdin()
                .read_to_string(&mut text)
                .await
                .context("Failed to read text from stdin")?;
            Ok(text)
        }
    }
}

/// Create an [`AsyncWrite`] for a file or stdout. Missing parent directories
/// are created.
pub async fn create_writer(
    path: Option<&Path>,
) -> Result<Box<dyn AsyncWrite + Unpin + Send + Sync + 'static>> {
    match path {
        Some(path) => {
            if let Some(parent) = path.parent()
                && !parent.as_os_str().is_empty()
            {
                fs::create_dir_all(parent).await.with_context(|| {
                    format!("Failed to create directory: {:?}", parent)
                })?;
            }
            let file = File::create(path)
                .await
                .with_context(|| format!("Failed to create file at path: {:?}", path))?;
            Ok(Box::new(file))
        }
        None => Ok(Box::new(tokio::io::stdout())),
    }
}

/// Write text to a file or stdout.
pub async fn write_text(path: Option<&Path>, text: &str) -> Result<()> {
    let mut writer = BufWriter::new(create_writer(path).await?);
    writer
        .write_all(text.as_bytes())
        .await
        .context("Failed to write output")?;
    if !text.ends_with('\n') {
        writer
            .write_all(b"\n")
            .await
            .context("Failed to write newline to output")?;
    }
    writer.flush().await.context("Failed to flush output")?;
    Ok(())
}

/// Write a single JSON value to a file or stdout.
pub async fn write_json<T: Serialize>(
    path: Option<&Path>,
    value: &T,
    pretty: bool,
) -> Result<()> {
    let json = if pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    }
    .context("Failed to serialize JSON")?;
    write_text(path, &json).await
}

/// Write values as JSONL (one JSON object per line) to a file or stdout.
pub async fn write_jsonl<T: Serialize>(path: Option<&Path>, values: &[T]) -> Result<()> {
    let mut writer = BufWriter::new(create_writer(path).await?);
    for value in values {
        let json = serde_json::to_string(value).context("Failed to serialize JSON")?;
        writer
            .write_all(json.as_bytes())
            .await
            .context("Failed to write JSON to output")?;
        writer
            .write_all(b"\n")
            .await
            .context("Failed to write newline to output")?;
    }
    writer.flush().await.context("Failed to flush output")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::config::ParserConfig;

    #[tokio::test]
    async fn reads_toml_and_json_configs() -> Result<()> {
        let dir = tempfile::tempdir()?;

        let toml_path = dir.path().join("labels.toml");
        fs::write(&toml_path, "min_label_similarity = 0.9\n").await?;
        let config = read_json_or_toml::<ParserConfig>(&toml_path).await?;
        assert_eq!(config.min_label_similarity, 0.9);

        let json_path = dir.path().join("labels.json");
        fs::write(&json_path, r#"{"min_label_similarity": 0.8}"#).await?;
        let config = read_json_or_toml::<ParserConfig>(&json_path).await?;
        assert_eq!(config.min_label_similarity, 0.8);
        Ok(())
    }

    #[tokio::test]
    async fn toml_errors_mention_the_file() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("bad.toml");
        fs::write(&path, "min_label_similarity = \"high\"\n").await?;
        let err = read_json_or_toml::<ParserConfig>(&path).await.unwrap_err();
        assert!(err.to_string().contains("bad.toml"));
        Ok(())
    }

    #[tokio::test]
    async fn writers_create_parent_directories() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("results/nested/out.jsonl");
        write_jsonl(Some(&path), &[json!({"a": 1}), json!({"a": 2})]).await?;
        let text = fs::read_to_string(&path).await?;
        assert_eq!(text, "{\"a\":1}\n{\"a\":2}\n");
        Ok(())
    }
}
