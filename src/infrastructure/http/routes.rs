//! HTTP Routes
//!
//! API Endpoints:
//! - /api/ping          GET   健康检查
//! - /api/job/enqueue   POST  提交生成任务
//! - /api/job/status    POST  查询任务状态
//! - /api/job/pause     POST  暂停任务
//! - /api/job/cancel    POST  取消任务
//! - /api/job/resume    POST  恢复已暂停任务（创建新任务）
//! - /api/job/logs      POST  任务日志尾部
//! - /api/job/list      GET   任务列表
//! - /api/job/delete    POST  删除任务
//! - /ws/events         WS    任务事件推送（可选 ?job_id=）

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use super::handlers;
use super::state::AppState;

/// 创建所有路由
pub fn create_routes() -> Router<Arc<AppState>> {
    Router::new()
        .nest("/api", api_routes())
        .route("/ws/events", get(handlers::events_websocket_handler))
}

fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/ping", get(handlers::ping))
        .nest("/job", job_routes())
}

/// Job 路由
fn job_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/enqueue", post(handlers::enqueue_job))
        .route("/status", post(handlers::job_status))
        .route("/pause", post(handlers::pause_job))
        .route("/cancel", post(handlers::cancel_job))
        .route("/resume", post(handlers::resume_job))
        .route("/logs", post(handlers::job_logs))
        .route("/list", get(handlers::list_jobs))
        .route("/delete", post(handlers::delete_job))
}
