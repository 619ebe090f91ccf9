//! Job HTTP Handlers

use axum::{
    extract::{Query, State},
    Json,
};
use std::sync::Arc;

use crate::application::ports::JobStatus;
use crate::application::{
    CancelJob, DeleteJob, EnqueueJob, GetJobLogs, GetJobStatus, JobLogResponse, JobResponse,
    ListJobs, PauseJob, ResumeJob,
};
use crate::infrastructure::http::dto::{
    ApiResponse, ControlJobResult, Empty, EnqueueJobRequest, EnqueueJobResult, JobIdRequest,
    JobListResult, JobLogsRequest, ListJobsParams, ResumeJobResult,
};
use crate::infrastructure::http::error::ApiError;
use crate::infrastructure::http::state::AppState;

/// 提交生成任务
pub async fn enqueue_job(
    State(state): State<Arc<AppState>>,
    Json(req): Json<EnqueueJobRequest>,
) -> Result<Json<ApiResponse<EnqueueJobResult>>, ApiError> {
    let (project_id, config) = req.into_config(&state.job_defaults);
    let result = state
        .enqueue_job_handler
        .handle(EnqueueJob { project_id, config })
        .await?;

    tracing::info!(job_id = %result.job_id, project_id = %result.project_id, "Job enqueued");

    Ok(Json(ApiResponse::success(result.into())))
}

/// 查询任务状态
pub async fn job_status(
    State(state): State<Arc<AppState>>,
    Json(req): Json<JobIdRequest>,
) -> Result<Json<ApiResponse<JobResponse>>, ApiError> {
    let result = state
        .get_job_status_handler
        .handle(GetJobStatus { job_id: req.job_id })
        .await?;
    Ok(Json(ApiResponse::success(result)))
}

/// 暂停任务（运行中的任务在下一个边界暂停）
pub async fn pause_job(
    State(state): State<Arc<AppState>>,
    Json(req): Json<JobIdRequest>,
) -> Result<Json<ApiResponse<ControlJobResult>>, ApiError> {
    let result = state
        .pause_job_handler
        .handle(PauseJob { job_id: req.job_id })
        .await?;
    Ok(Json(ApiResponse::success(result.into())))
}

pub async fn cancel_job(
    State(state): State<Arc<AppState>>,
    Json(req): Json<JobIdRequest>,
) -> Result<Json<ApiResponse<ControlJobResult>>, ApiError> {
    let result = state
        .cancel_job_handler
        .handle(CancelJob { job_id: req.job_id })
        .await?;
    Ok(Json(ApiResponse::success(result.into())))
}

/// 恢复已暂停任务，返回新任务 ID
pub async fn resume_job(
    State(state): State<Arc<AppState>>,
    Json(req): Json<JobIdRequest>,
) -> Result<Json<ApiResponse<ResumeJobResult>>, ApiError> {
    let result = state
        .resume_job_handler
        .handle(ResumeJob { job_id: req.job_id })
        .await?;
    Ok(Json(ApiResponse::success(result.into())))
}

pub async fn job_logs(
    State(state): State<Arc<AppState>>,
    Json(req): Json<JobLogsRequest>,
) -> Result<Json<ApiResponse<JobListResult<JobLogResponse>>>, ApiError> {
    let limit = req.limit.or(Some(state.log_tail));
    let items = state
        .get_job_logs_handler
        .handle(GetJobLogs {
            job_id: req.job_id,
            limit,
        })
        .await?;
    Ok(Json(ApiResponse::success(JobListResult {
        total: items.len(),
        items,
    })))
}

/// 任务列表，支持 `?status=&project_id=&limit=` 过滤
pub async fn list_jobs(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListJobsParams>,
) -> Result<Json<ApiResponse<JobListResult<JobResponse>>>, ApiError> {
    let status = match params.status.as_deref() {
        None | Some("") => None,
        Some(s) => Some(
            JobStatus::from_str(s)
                .ok_or_else(|| ApiError::BadRequest(format!("Unknown job status: {}", s)))?,
        ),
    };
    let items = state
        .list_jobs_handler
        .handle(ListJobs {
            status,
            project_id: params.project_id.filter(|p| !p.is_empty()),
            limit: params.limit,
        })
        .await?;
    Ok(Json(ApiResponse::success(JobListResult {
        total: items.len(),
        items,
    })))
}

pub async fn delete_job(
    State(state): State<Arc<AppState>>,
    Json(req): Json<JobIdRequest>,
) -> Result<Json<ApiResponse<Empty>>, ApiError> {
    let job_id = req.job_id;
    state
        .delete_job_handler
        .handle(DeleteJob {
            job_id: job_id.clone(),
        })
        .await?;

    tracing::info!(job_id = %job_id, "Job deleted");
    Ok(Json(ApiResponse::ok()))
}
