//! Pipeline Orchestrator
//!
//! 按顺序执行六个阶段，阶段内单元逐个生成、校验、提交：
//!
//! 1. Retry Controller 生成并校验单元
//! 2. 写回内容树
//! 3. 需要时运行质量门（未通过则重新生成整个单元）
//! 4. 提交：修订记录 + 迭代号递增 + 检查点
//!
//! 暂停 / 取消只在阶段与单元边界检查。

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::application::coerce::CoercionError;
use crate::application::contract::{Contract, RetryController};
use crate::application::error::PipelineError;
use crate::application::gate::{QualityGate, UnitRegenerator};
use crate::application::generator::{Generator, StageRequest};
use crate::application::model_config::StageModelMap;
use crate::application::ports::{CheckpointPort, Concept};
use crate::application::stages::{beat, book, chapter, prompts, prose, scene, series};
use crate::domain::assessment::GateScope;
use crate::domain::content::{BookStatus, ChapterStatus, Project, Series, Stage};

/// 质量门开关
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateSettings {
    pub after_series: bool,
    pub after_book: bool,
    pub final_gate: bool,
}

impl Default for GateSettings {
    fn default() -> Self {
        Self {
            after_series: true,
            after_book: true,
            final_gate: true,
        }
    }
}

/// 流水线参数
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineSettings {
    pub book_count: usize,
    pub chapters_per_book: usize,
    pub target_word_count: u32,
    pub scenes_per_chapter: usize,
    pub beats_min: usize,
    pub beats_max: usize,
    pub prose_words_min: usize,
    pub prose_words_max: usize,
    pub word_tolerance_pct: u32,
    pub use_lore: bool,
    pub gates: GateSettings,
    /// 完成该阶段后停止
    pub stop_after: Option<Stage>,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            book_count: 3,
            chapters_per_book: 15,
            target_word_count: 100_000,
            scenes_per_chapter: 3,
            beats_min: 5,
            beats_max: 10,
            prose_words_min: 200,
            prose_words_max: 500,
            word_tolerance_pct: 10,
            use_lore: true,
            gates: GateSettings::default(),
            stop_after: None,
        }
    }
}

/// 运行过程回调
///
/// worker 通过 `boundary` 注入暂停 / 取消检查，通过其余回调更新任务进度
#[async_trait]
pub trait PipelineHooks: Send + Sync {
    /// 阶段或单元边界；返回错误即中断运行
    async fn boundary(&self, _stage: Stage) -> Result<(), PipelineError> {
        Ok(())
    }

    async fn on_stage_started(&self, _stage: Stage) {}

    async fn on_unit_committed(&self, _stage: Stage, _unit: &str, _path: &Path) {}

    async fn on_stage_complete(&self, _stage: Stage, _path: &Path) {}
}

/// 无操作回调
pub struct NoopHooks;

impl PipelineHooks for NoopHooks {}

/// 流水线
pub struct Pipeline {
    generator: Arc<Generator>,
    models: StageModelMap,
    retry: RetryController,
    gate: QualityGate,
    checkpoints: Arc<dyn CheckpointPort>,
    settings: PipelineSettings,
}

impl Pipeline {
    pub fn new(
        generator: Arc<Generator>,
        models: StageModelMap,
        retry: RetryController,
        gate: QualityGate,
        checkpoints: Arc<dyn CheckpointPort>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            generator,
            models,
            retry,
            gate,
            checkpoints,
            settings,
        }
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// 准备项目
    ///
    /// - 新运行：由概念创建空项目，迭代号从已有版本之后继续
    /// - 恢复：读取 `{stage}_complete` 的最新版本化快照
    pub async fn prepare(
        &self,
        project_id: &str,
        concept: &Concept,
        resume_from: Option<Stage>,
    ) -> Result<Project, PipelineError> {
        let versions = self.checkpoints.list(project_id).await?;
        let last_iteration = versions.iter().map(|v| v.iteration).max().unwrap_or(0);

        let mut project = match resume_from {
            None => Project::new(
                project_id,
                Series::from_concept(&concept.title, &concept.premise, &concept.genre),
            ),
            Some(stage) => {
                let label = stage_label(stage);
                let Some(snapshot) = versions.iter().rev().find(|v| v.label == label) else {
                    return Err(PipelineError::InvalidState(format!(
                        "no '{}' checkpoint for project {}",
                        label, project_id
                    )));
                };
                tracing::info!(
                    project_id = %project_id,
                    iteration = snapshot.iteration,
                    path = %snapshot.path.display(),
                    "Resuming from checkpoint"
                );
                self.checkpoints
                    .load_version(project_id, snapshot.iteration)
                    .await?
            }
        };

        project.metadata.iteration = project.metadata.iteration.max(last_iteration);
        Ok(project)
    }

    /// 运行 `resume_from` 之后的全部阶段
    pub async fn run(
        &self,
        project: &mut Project,
        resume_from: Option<Stage>,
        hooks: &dyn PipelineHooks,
    ) -> Result<(), PipelineError> {
        for &stage in Stage::after(resume_from) {
            hooks.boundary(stage).await?;
            hooks.on_stage_started(stage).await;
            tracing::info!(project_id = %project.id(), stage = %stage, "Stage started");

            match stage {
                Stage::Series => self.run_series(project).await?,
                Stage::Book => self.run_books(project, hooks).await?,
                Stage::Chapter => self.run_chapters(project, hooks).await?,
                Stage::Scene => self.run_scenes(project, hooks).await?,
                Stage::Beat => self.run_beats(project, hooks).await?,
                Stage::Prose => self.run_prose(project, hooks).await?,
            }

            project.metadata.completed_stage = Some(stage);
            let label = stage_label(stage);
            let path = self
                .commit(project, stage, &label, &format!("{} stage complete", stage))
                .await?;
            tracing::info!(project_id = %project.id(), stage = %stage, path = %path.display(), "Stage complete");
            hooks.on_stage_complete(stage, &path).await;

            if self.settings.stop_after == Some(stage) {
                tracing::info!(stage = %stage, "Stopping after requested stage");
                break;
            }
        }
        Ok(())
    }

    /// 写入致命错误报告；写入失败只记录日志
    pub async fn write_error_report(&self, project: &Project, err: &PipelineError) -> Option<PathBuf> {
        let mut report = err.report();
        if let Value::Object(map) = &mut report {
            map.insert("project_id".to_string(), json!(project.id()));
            map.insert("processing_stage".to_string(), json!(project.metadata.processing_stage));
            map.insert("completed_stage".to_string(), json!(project.metadata.completed_stage));
            map.insert("iteration".to_string(), json!(project.metadata.iteration));
            map.insert("timestamp".to_string(), json!(chrono::Utc::now().to_rfc3339()));
        }
        tracing::error!(project_id = %project.id(), report = %report, "Pipeline halted");
        match self.checkpoints.write_error_report(project.id(), &report).await {
            Ok(path) => Some(path),
            Err(e) => {
                tracing::error!(project_id = %project.id(), error = %e, "Failed to write error report");
                None
            }
        }
    }

    // ------------------------------------------------------------------
    // 提交

    async fn commit(
        &self,
        project: &mut Project,
        stage: Stage,
        label: &str,
        summary: &str,
    ) -> Result<PathBuf, PipelineError> {
        project.touch(stage, "pipeline");
        project.record_revision(
            &format!("{}_stage", stage),
            label,
            summary,
            "Output accepted by stage contract",
        );
        project.next_iteration();
        Ok(self.checkpoints.save(project, label).await?)
    }

    async fn commit_unit(
        &self,
        project: &mut Project,
        stage: Stage,
        label: &str,
        hooks: &dyn PipelineHooks,
    ) -> Result<(), PipelineError> {
        let path = self
            .commit(project, stage, label, &format!("Committed {}", label))
            .await?;
        tracing::debug!(stage = %stage, unit = %label, path = %path.display(), "Unit committed");
        hooks.on_unit_committed(stage, label, &path).await;
        Ok(())
    }

    /// 生成并校验一个单元
    async fn generate<T, P>(
        &self,
        project: &Project,
        stage: Stage,
        unit: String,
        instructions: String,
        context: String,
        contract: &Contract<T>,
        parse: P,
    ) -> Result<T, PipelineError>
    where
        P: Fn(&Value) -> Result<T, Vec<CoercionError>>,
    {
        let request = StageRequest {
            stage,
            unit,
            project_id: project.id().to_string(),
            instructions,
            context,
            options: self.models.options(stage.into()),
            use_lore: self.settings.use_lore,
        };
        let accepted = self
            .retry
            .run(&self.generator, &request, contract, parse)
            .await?;
        tracing::info!(
            stage = %stage,
            unit = %request.unit,
            attempts = accepted.attempts,
            corrected = accepted.corrected,
            "Unit accepted"
        );
        Ok(accepted.value)
    }

    // ------------------------------------------------------------------
    // Series

    async fn run_series(&self, project: &mut Project) -> Result<(), PipelineError> {
        let baseline = project.series.clone();
        self.generate_series(project, None).await?;
        if self.settings.gates.after_series {
            let regenerator = SeriesRegenerator {
                pipeline: self,
                baseline,
            };
            self.gate
                .run(project, GateScope::Series, &regenerator)
                .await?;
        }
        Ok(())
    }

    async fn generate_series(
        &self,
        project: &mut Project,
        feedback: Option<&str>,
    ) -> Result<(), PipelineError> {
        let s = &self.settings;
        let draft = self
            .generate(
                project,
                Stage::Series,
                "series".to_string(),
                prompts::with_feedback(prompts::series(s.book_count), feedback),
                series::context(&project.series, s.book_count, s.target_word_count),
                &series::contract(s.book_count),
                series::parse,
            )
            .await?;
        series::apply(&mut project.series, draft, s.target_word_count);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Book

    async fn run_books(
        &self,
        project: &mut Project,
        hooks: &dyn PipelineHooks,
    ) -> Result<(), PipelineError> {
        for book_number in book_numbers(project) {
            hooks.boundary(Stage::Book).await?;
            self.generate_book(project, book_number, None).await?;
            if self.settings.gates.after_book {
                let regenerator = BookRegenerator {
                    pipeline: self,
                    book_number,
                };
                self.gate
                    .run(project, GateScope::Book(book_number), &regenerator)
                    .await?;
            }
            self.commit_unit(project, Stage::Book, &format!("book_{}", book_number), hooks)
                .await?;
        }
        Ok(())
    }

    async fn generate_book(
        &self,
        project: &mut Project,
        book_number: u32,
        feedback: Option<&str>,
    ) -> Result<(), PipelineError> {
        let n = self.settings.chapters_per_book;
        let context = {
            let b = find_book(&project.series, book_number)?;
            book::context(&project.series, b, n)
        };
        let outline = self
            .generate(
                project,
                Stage::Book,
                format!("book {}", book_number),
                prompts::with_feedback(prompts::book(n, book_number), feedback),
                context,
                &book::contract(n),
                book::parse,
            )
            .await?;
        let b = find_book_mut(&mut project.series, book_number)?;
        book::apply(b, outline, n as u32);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Chapter

    async fn run_chapters(
        &self,
        project: &mut Project,
        hooks: &dyn PipelineHooks,
    ) -> Result<(), PipelineError> {
        let s = &self.settings;
        for bi in 0..project.series.books.len() {
            for ci in 0..project.series.books[bi].chapters.len() {
                hooks.boundary(Stage::Chapter).await?;
                let (label, unit, planned, context) = {
                    let b = &project.series.books[bi];
                    let c = &b.chapters[ci];
                    (
                        format!("book_{}_chapter_{}", b.book_number, c.chapter_number),
                        format!("book {} chapter {}", b.book_number, c.chapter_number),
                        c.planned_word_count,
                        chapter::context(&project.series, b, c),
                    )
                };
                let (min, max) = chapter::scene_range(s.scenes_per_chapter);
                let plan = self
                    .generate(
                        project,
                        Stage::Chapter,
                        unit,
                        prompts::chapter(min, max, planned),
                        context,
                        &chapter::contract(s.scenes_per_chapter, planned, s.word_tolerance_pct),
                        |value: &Value| chapter::parse(value, planned),
                    )
                    .await?;
                chapter::apply(&mut project.series.books[bi].chapters[ci], plan);
                self.commit_unit(project, Stage::Chapter, &label, hooks).await?;
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Scene

    async fn run_scenes(
        &self,
        project: &mut Project,
        hooks: &dyn PipelineHooks,
    ) -> Result<(), PipelineError> {
        let s = &self.settings;
        for (bi, ci, si) in scene_positions(project) {
            hooks.boundary(Stage::Scene).await?;
            let (label, unit, context) = {
                let b = &project.series.books[bi];
                let c = &b.chapters[ci];
                let sc = &c.scenes[si];
                (
                    scene_label(b.book_number, c.chapter_number, sc.scene_number),
                    format!(
                        "book {} chapter {} scene {}",
                        b.book_number, c.chapter_number, sc.scene_number
                    ),
                    scene::context(c, sc),
                )
            };
            let sheet = self
                .generate(
                    project,
                    Stage::Scene,
                    unit,
                    prompts::scene(s.beats_min, s.beats_max),
                    context,
                    &scene::contract(s.beats_min, s.beats_max),
                    scene::parse,
                )
                .await?;
            scene::apply(&mut project.series.books[bi].chapters[ci].scenes[si], sheet);
            self.commit_unit(project, Stage::Scene, &label, hooks).await?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Beat

    async fn run_beats(
        &self,
        project: &mut Project,
        hooks: &dyn PipelineHooks,
    ) -> Result<(), PipelineError> {
        for (bi, ci, si) in scene_positions(project) {
            hooks.boundary(Stage::Beat).await?;
            let (label, unit, count, context) = {
                let b = &project.series.books[bi];
                let c = &b.chapters[ci];
                let sc = &c.scenes[si];
                (
                    format!(
                        "{}_beats",
                        scene_label(b.book_number, c.chapter_number, sc.scene_number)
                    ),
                    format!(
                        "book {} chapter {} scene {} beats",
                        b.book_number, c.chapter_number, sc.scene_number
                    ),
                    sc.beats.len(),
                    beat::context(sc),
                )
            };
            let refinement = self
                .generate(
                    project,
                    Stage::Beat,
                    unit,
                    prompts::beat(count),
                    context,
                    &beat::contract(count),
                    beat::parse,
                )
                .await?;
            beat::apply(&mut project.series.books[bi].chapters[ci].scenes[si], refinement);
            self.commit_unit(project, Stage::Beat, &label, hooks).await?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Prose

    async fn run_prose(
        &self,
        project: &mut Project,
        hooks: &dyn PipelineHooks,
    ) -> Result<(), PipelineError> {
        self.draft_prose(project, None, hooks, true).await?;
        if self.settings.gates.final_gate {
            let regenerator = FinalRegenerator { pipeline: self };
            self.gate
                .run(project, GateScope::Final, &regenerator)
                .await?;
        }
        Ok(())
    }

    /// 逐节拍生成正文；`commit_units` 为真时每个场景提交一次
    async fn draft_prose(
        &self,
        project: &mut Project,
        feedback: Option<&str>,
        hooks: &dyn PipelineHooks,
        commit_units: bool,
    ) -> Result<(), PipelineError> {
        let s = &self.settings;
        let mut previous: Option<String> = None;
        let mut current_book = None;

        for (bi, ci, si) in scene_positions(project) {
            if current_book != Some(bi) {
                previous = None;
                current_book = Some(bi);
            }
            hooks.boundary(Stage::Prose).await?;

            let beat_count = project.series.books[bi].chapters[ci].scenes[si].beats.len();
            for ti in 0..beat_count {
                let (unit, context) = {
                    let b = &project.series.books[bi];
                    let c = &b.chapters[ci];
                    let sc = &c.scenes[si];
                    let bt = &sc.beats[ti];
                    (
                        format!(
                            "book {} chapter {} scene {} beat {}",
                            b.book_number, c.chapter_number, sc.scene_number, bt.beat_number
                        ),
                        prose::context(c, sc, bt, previous.as_deref()),
                    )
                };
                let draft = self
                    .generate(
                        project,
                        Stage::Prose,
                        unit,
                        prompts::with_feedback(
                            prompts::prose(s.prose_words_min, s.prose_words_max),
                            feedback,
                        ),
                        context,
                        &prose::contract(s.prose_words_min, s.prose_words_max),
                        prose::parse,
                    )
                    .await?;
                let target = &mut project.series.books[bi].chapters[ci].scenes[si].beats[ti];
                prose::apply(target, draft);
                previous = target
                    .prose
                    .as_ref()
                    .map(|p| p.tail_words(prose::CONTINUITY_WORDS));
            }

            project.rollup_word_counts();
            let is_last_scene =
                si + 1 == project.series.books[bi].chapters[ci].scenes.len();
            if is_last_scene {
                project.series.books[bi].chapters[ci].status = ChapterStatus::Drafted;
                let book = &mut project.series.books[bi];
                if book.chapters.iter().all(|c| c.status == ChapterStatus::Drafted) {
                    book.status = BookStatus::Drafted;
                }
            }

            if commit_units {
                let label = {
                    let b = &project.series.books[bi];
                    let c = &b.chapters[ci];
                    format!(
                        "{}_prose",
                        scene_label(b.book_number, c.chapter_number, c.scenes[si].scene_number)
                    )
                };
                self.commit_unit(project, Stage::Prose, &label, hooks).await?;
            }
        }
        Ok(())
    }
}

/// 阶段完成快照标签
pub fn stage_label(stage: Stage) -> String {
    format!("{}_complete", stage)
}

fn scene_label(book: u32, chapter: u32, scene: u32) -> String {
    format!("book_{}_chapter_{}_scene_{}", book, chapter, scene)
}

fn book_numbers(project: &Project) -> Vec<u32> {
    project.series.books.iter().map(|b| b.book_number).collect()
}

/// 全部场景位置（书、章、场景下标）
fn scene_positions(project: &Project) -> Vec<(usize, usize, usize)> {
    let mut positions = Vec::new();
    for (bi, b) in project.series.books.iter().enumerate() {
        for (ci, c) in b.chapters.iter().enumerate() {
            for si in 0..c.scenes.len() {
                positions.push((bi, ci, si));
            }
        }
    }
    positions
}

fn find_book(series: &Series, book_number: u32) -> Result<&crate::domain::content::Book, PipelineError> {
    series
        .book(book_number)
        .ok_or_else(|| PipelineError::InvalidState(format!("book {} does not exist", book_number)))
}

fn find_book_mut(
    series: &mut Series,
    book_number: u32,
) -> Result<&mut crate::domain::content::Book, PipelineError> {
    series
        .book_mut(book_number)
        .ok_or_else(|| PipelineError::InvalidState(format!("book {} does not exist", book_number)))
}

// ----------------------------------------------------------------------
// 质量门重新生成

/// 恢复到阶段开始前的系列，再带反馈重新生成
struct SeriesRegenerator<'a> {
    pipeline: &'a Pipeline,
    baseline: Series,
}

#[async_trait]
impl<'a> UnitRegenerator for SeriesRegenerator<'a> {
    async fn regenerate(
        &self,
        project: &mut Project,
        _scope: GateScope,
        feedback: &str,
    ) -> Result<(), PipelineError> {
        project.series = self.baseline.clone();
        self.pipeline.generate_series(project, Some(feedback)).await
    }
}

struct BookRegenerator<'a> {
    pipeline: &'a Pipeline,
    book_number: u32,
}

#[async_trait]
impl<'a> UnitRegenerator for BookRegenerator<'a> {
    async fn regenerate(
        &self,
        project: &mut Project,
        _scope: GateScope,
        feedback: &str,
    ) -> Result<(), PipelineError> {
        book::reset(find_book_mut(&mut project.series, self.book_number)?);
        self.pipeline
            .generate_book(project, self.book_number, Some(feedback))
            .await
    }
}

/// 重新起草全部正文（草稿版本递增，不提交单元快照）
struct FinalRegenerator<'a> {
    pipeline: &'a Pipeline,
}

#[async_trait]
impl<'a> UnitRegenerator for FinalRegenerator<'a> {
    async fn regenerate(
        &self,
        project: &mut Project,
        _scope: GateScope,
        feedback: &str,
    ) -> Result<(), PipelineError> {
        self.pipeline
            .draft_prose(project, Some(feedback), &NoopHooks, false)
            .await
    }
}
