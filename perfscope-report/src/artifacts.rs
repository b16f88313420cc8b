//! On-disk store of figures and the tables behind them.
//!
//! Saving the entries `[("WVA", ..), ("merged_figure", ..)]` as plot `itl` writes
//!
//! ```text
//! itl-01-WVA.table.json
//! itl-01-WVA.hidden.figure.json
//! itl-01-WVA.hidden.svg
//! itl-02-merged_figure.figure.json
//! itl-02-merged_figure.svg
//! ```
//!
//! Hidden entries are kept for reference but skipped by [`ArtifactStore::load`].

use anyhow::{Context, Result};
use perfscope_core::{AlignedTable, RunTable, SampleFrame};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::figure::Figure;
use crate::render::render_svg;

/// Entry name that hides every other entry of the same plot
pub const MERGED_FIGURE: &str = "merged_figure";

const HIDDEN_MARKER: &str = ".hidden";
const FIGURE_SUFFIX: &str = ".figure.json";
const TABLE_SUFFIX: &str = ".table.json";

/// Data a figure was built from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum ArtifactTable {
    Runs(RunTable),
    Aligned(AlignedTable),
    Samples(SampleFrame),
}

/// A named figure with its optional source table
#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    pub name: String,
    pub table: Option<ArtifactTable>,
    pub figure: Figure,
}

impl Artifact {
    pub fn new<S: Into<String>>(name: S, table: Option<ArtifactTable>, figure: Figure) -> Self {
        Self {
            name: name.into(),
            table,
            figure,
        }
    }
}

/// Directory of saved artifacts
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    directory: PathBuf,
    width: u32,
    height: u32,
}

impl ArtifactStore {
    /// Store writing SVG renders of the given size
    pub fn new<P: Into<PathBuf>>(directory: P, width: u32, height: u32) -> Self {
        Self {
            directory: directory.into(),
            width,
            height,
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Save entries in order, numbering them from 1.
    ///
    /// Returns the written figure description paths.
    pub async fn save(&self, plot_name: &str, entries: &[Artifact]) -> Result<Vec<PathBuf>> {
        tokio::fs::create_dir_all(&self.directory)
            .await
            .with_context(|| format!("Failed to create {}", self.directory.display()))?;

        let has_merged = entries.iter().any(|e| e.name == MERGED_FIGURE);
        let mut written = Vec::with_capacity(entries.len());

        for (i, entry) in entries.iter().enumerate() {
            let stem = format!("{}-{:02}-{}", plot_name, i + 1, entry.name);
            let hidden = if has_merged && entry.name != MERGED_FIGURE {
                HIDDEN_MARKER
            } else {
                ""
            };

            if let Some(table) = &entry.table {
                let path = self.directory.join(format!("{}{}", stem, TABLE_SUFFIX));
                write_json(&path, table).await?;
            }

            let figure_path = self
                .directory
                .join(format!("{}{}{}", stem, hidden, FIGURE_SUFFIX));
            write_json(&figure_path, &entry.figure).await?;

            let svg = render_svg(&entry.figure, self.width, self.height)
                .with_context(|| format!("Failed to render {}", stem))?;
            let svg_path = self.directory.join(format!("{}{}.svg", stem, hidden));
            tokio::fs::write(&svg_path, svg)
                .await
                .with_context(|| format!("Failed to write {}", svg_path.display()))?;

            debug!(path = %figure_path.display(), hidden = !hidden.is_empty(), "Saved artifact");
            written.push(figure_path);
        }

        info!(plot = plot_name, entries = entries.len(), dir = %self.directory.display(), "Saved plot");
        Ok(written)
    }

    /// Read back every visible figure, keyed by `<plot>-<nn>-<name>`
    pub async fn load(&self) -> Result<BTreeMap<String, (Option<ArtifactTable>, Figure)>> {
        let mut entries = tokio::fs::read_dir(&self.directory)
            .await
            .with_context(|| format!("Failed to read {}", self.directory.display()))?;

        let mut loaded = BTreeMap::new();
        while let Some(entry) = entries.next_entry().await? {
            let file_name = entry.file_name();
            let Some(file_name) = file_name.to_str() else {
                continue;
            };
            let Some(key) = file_name.strip_suffix(FIGURE_SUFFIX) else {
                continue;
            };
            if key.contains(HIDDEN_MARKER) {
                continue;
            }

            let figure: Figure = read_json(&entry.path()).await?;
            let table_path = self.directory.join(format!("{}{}", key, TABLE_SUFFIX));
            let table = if tokio::fs::try_exists(&table_path).await.unwrap_or(false) {
                Some(read_json(&table_path).await?)
            } else {
                None
            };
            loaded.insert(key.to_string(), (table, figure));
        }

        debug!(count = loaded.len(), dir = %self.directory.display(), "Loaded artifacts");
        Ok(loaded)
    }
}

async fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_vec_pretty(value)
        .with_context(|| format!("Failed to serialize {}", path.display()))?;
    tokio::fs::write(path, json)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))
}

async fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T> {
    let raw = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_slice(&raw).with_context(|| format!("Failed to parse {}", path.display()))
}
