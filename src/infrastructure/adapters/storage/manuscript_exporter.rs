//! Manuscript Exporter - 导出 Markdown 书稿

use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;

use crate::domain::content::{Chapter, Project};

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Project {0} has no prose to export")]
    Empty(String),
}

const SCENE_BREAK: &str = "* * *";

pub struct ManuscriptExporter {
    output_dir: PathBuf,
}

impl ManuscriptExporter {
    pub fn new(output_dir: impl AsRef<Path>) -> Self {
        Self {
            output_dir: output_dir.as_ref().to_path_buf(),
        }
    }

    pub fn output_path(&self, project_id: &str) -> PathBuf {
        self.output_dir.join(format!("{}.md", project_id))
    }

    /// 写入 `{output_dir}/{project_id}.md`
    pub async fn export(&self, project: &Project) -> Result<PathBuf, ExportError> {
        if !has_prose(project) {
            return Err(ExportError::Empty(project.id().to_string()));
        }
        fs::create_dir_all(&self.output_dir).await?;
        let path = self.output_path(project.id());
        fs::write(&path, render(project)).await?;

        tracing::info!(
            project_id = %project.id(),
            path = %path.display(),
            words = project.series.total_word_count(),
            "Manuscript exported"
        );
        Ok(path)
    }
}

fn has_prose(project: &Project) -> bool {
    project
        .series
        .books
        .iter()
        .flat_map(|b| &b.chapters)
        .flat_map(|c| &c.scenes)
        .flat_map(|s| &s.beats)
        .any(|beat| beat.prose.is_some())
}

/// 渲染 Markdown 书稿
pub fn render(project: &Project) -> String {
    let series = &project.series;
    let mut out = format!("# {}\n\n*{}*\n", series.title, series.premise);

    for book in &series.books {
        out.push_str(&format!("\n# Book {}: {}\n", book.book_number, book.title));
        for chapter in &book.chapters {
            out.push_str(&format!(
                "\n## Chapter {}: {}\n",
                chapter.chapter_number, chapter.title
            ));
            render_chapter(chapter, &mut out);
        }
    }
    out
}

fn render_chapter(chapter: &Chapter, out: &mut String) {
    let scenes: Vec<Vec<&str>> = chapter
        .scenes
        .iter()
        .map(|scene| {
            scene
                .beats
                .iter()
                .filter_map(|beat| beat.prose.as_ref())
                .flat_map(|prose| {
                    if prose.paragraphs.is_empty() {
                        prose.content.split("\n\n").collect::<Vec<_>>()
                    } else {
                        prose.paragraphs.iter().map(|p| p.content.as_str()).collect()
                    }
                })
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .collect()
        })
        .filter(|paragraphs: &Vec<&str>| !paragraphs.is_empty())
        .collect();

    for (i, paragraphs) in scenes.iter().enumerate() {
        if i > 0 {
            out.push_str(&format!("\n{}\n", SCENE_BREAK));
        }
        for paragraph in paragraphs {
            out.push('\n');
            out.push_str(paragraph);
            out.push('\n');
        }
    }
}
