use crate::{
    detect::DetectionResponse, storage::HistoryRow, utils::error::DetectError, web::extractors::RequestId,
    web::AppState, Result,
};
use axum::{
    body::Bytes,
    extract::{Multipart, State},
    response::Json,
};

/// 上传文件的表单字段名
pub const IMAGE_FIELD: &str = "image_file";

/// Multipart文件上传处理器
///
/// 接收 `image_file` 字段，保存上传、运行检测、保存画框结果、
/// 追加历史记录，返回 `{count, boxes}`。
pub async fn detect_handler(
    State(state): State<AppState>,
    RequestId(request_id): RequestId,
    mut multipart: Multipart,
) -> Result<Json<DetectionResponse>> {
    tracing::info!("Processing detection request: request_id={}", request_id);

    let mut image_data: Option<Bytes> = None;

    // 解析multipart数据
    while let Some(field) = multipart.next_field().await.map_err(|e| {
        DetectError::InvalidInput(format!("Failed to read multipart field: {}", e))
    })? {
        let field_name = field.name().unwrap_or("unknown").to_string();

        if field_name == IMAGE_FIELD {
            let data = field.bytes().await.map_err(|e| {
                DetectError::InvalidInput(format!("Failed to read file data: {}", e))
            })?;
            tracing::debug!("Received file: {} bytes", data.len());
            image_data = Some(data);
        } else {
            tracing::debug!("Ignoring unknown field: {}", field_name);
        }
    }

    // 验证必需的图像数据
    let image_data = image_data.ok_or_else(|| {
        DetectError::InvalidInput(format!("No {} field provided", IMAGE_FIELD))
    })?;

    // 推理是同步的，放到阻塞线程池执行
    let pipeline = state.pipeline.clone();
    let outcome = tokio::task::spawn_blocking(move || pipeline.process(&image_data))
        .await
        .map_err(|e| DetectError::Internal(format!("Detection task failed: {}", e)))??;

    tracing::info!(
        "Detection request completed: request_id={}, id={}, objects={}",
        request_id,
        outcome.id,
        outcome.response.count
    );

    Ok(Json(outcome.response))
}

/// 历史记录处理器
pub async fn history_handler(State(state): State<AppState>) -> Result<Json<Vec<HistoryRow>>> {
    let pipeline = state.pipeline.clone();
    let rows = tokio::task::spawn_blocking(move || pipeline.history().read_all())
        .await
        .map_err(|e| DetectError::Internal(format!("History task failed: {}", e)))??;

    Ok(Json(rows))
}
