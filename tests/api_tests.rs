use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use image::{DynamicImage, GenericImageView, ImageFormat};
use object_detector::{
    detect::{DetectionPipeline, RawDetection},
    models::{ModelInfo, ObjectDetector},
    web::{create_app, AppState},
    Config, Result,
};
use serde_json::Value;
use std::io::Cursor;
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

const BOUNDARY: &str = "----object-detector-test-boundary";

/// 返回固定检测框的模型替身
struct StubDetector {
    detections: Vec<RawDetection>,
}

impl ObjectDetector for StubDetector {
    fn predict(&self, _image: &DynamicImage, _conf: f32, _iou: f32) -> Result<Vec<RawDetection>> {
        Ok(self.detections.clone())
    }

    fn label(&self, class_id: usize) -> String {
        match class_id {
            0 => "stitch".to_string(),
            other => format!("class_{}", other),
        }
    }

    fn info(&self) -> ModelInfo {
        ModelInfo {
            name: "stub".to_string(),
            input_size: 640,
            classes: vec!["stitch".to_string()],
        }
    }
}

fn app_with(dir: &TempDir, detections: Vec<RawDetection>) -> Router {
    let config = Config::new(
        "127.0.0.1:0".to_string(),
        dir.path(),
        "unused.onnx",
        None,
        false,
        false,
    )
    .unwrap();
    let detector: Arc<dyn ObjectDetector> = Arc::new(StubDetector { detections });
    let pipeline = DetectionPipeline::from_config(&config, detector).unwrap();
    create_app(AppState::new(config, pipeline))
}

fn two_boxes() -> Vec<RawDetection> {
    vec![
        RawDetection { x1: 10.3, y1: 12.7, x2: 40.0, y2: 30.2, class_id: 0, confidence: 0.8712 },
        RawDetection { x1: 50.0, y1: 5.0, x2: 99.0, y2: 60.0, class_id: 3, confidence: 0.026 },
    ]
}

fn png(width: u32, height: u32) -> Vec<u8> {
    let mut buffer = Cursor::new(Vec::new());
    DynamicImage::new_rgb8(width, height)
        .write_to(&mut buffer, ImageFormat::Png)
        .unwrap();
    buffer.into_inner()
}

fn multipart_request(field: &str, bytes: &[u8]) -> Request<Body> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"{}\"; filename=\"upload.png\"\r\n",
            field
        )
        .as_bytes(),
    );
    body.extend_from_slice(b"Content-Type: image/png\r\n\r\n");
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());

    Request::builder()
        .method("POST")
        .uri("/detect")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_index_page() {
    let dir = TempDir::new().unwrap();
    let app = app_with(&dir, Vec::new());

    let response = app.oneshot(get("/")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let html = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(html.contains("image_file"));
}

#[tokio::test]
async fn test_detect_returns_boxes() {
    let dir = TempDir::new().unwrap();
    let app = app_with(&dir, two_boxes());

    let (status, body) = send(&app, multipart_request("image_file", &png(120, 80))).await;
    assert_eq!(status, StatusCode::OK);

    let boxes = body["boxes"].as_array().unwrap();
    assert_eq!(body["count"].as_u64().unwrap() as usize, boxes.len());
    assert_eq!(boxes[0], serde_json::json!([10, 13, 40, 30, "stitch", 0.87, 30, 17]));
    assert_eq!(boxes[1][4], "class_3");

    for b in boxes {
        let b = b.as_array().unwrap();
        assert_eq!(b.len(), 8);
        let (x1, y1, x2, y2) = (b[0].as_i64().unwrap(), b[1].as_i64().unwrap(), b[2].as_i64().unwrap(), b[3].as_i64().unwrap());
        assert_eq!(b[6].as_i64().unwrap(), x2 - x1);
        assert_eq!(b[7].as_i64().unwrap(), y2 - y1);
        assert!(x2 - x1 >= 0 && y2 - y1 >= 0);
        let confidence = b[5].as_f64().unwrap();
        assert!((0.0..=1.0).contains(&confidence));
    }

    assert!(dir.path().join("Uploads").join("1.jpg").exists());
    assert!(dir.path().join("Results").join("1.jpg").exists());
}

#[tokio::test]
async fn test_sequential_uploads_and_history() {
    let dir = TempDir::new().unwrap();
    let app = app_with(&dir, two_boxes());

    for _ in 0..3 {
        let (status, _) = send(&app, multipart_request("image_file", &png(120, 80))).await;
        assert_eq!(status, StatusCode::OK);
    }

    for n in 1..=3 {
        assert!(dir.path().join("Results").join(format!("{}.jpg", n)).exists());
    }
    assert!(!dir.path().join("Results").join("4.jpg").exists());

    let csv = std::fs::read_to_string(dir.path().join("Dataset.csv")).unwrap();
    assert_eq!(csv.lines().count(), 3);

    let (status, history) = send(&app, get("/history")).await;
    assert_eq!(status, StatusCode::OK);
    let rows = history.as_array().unwrap();
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[2]["count"], 2);
    assert!(rows[2]["result_path"].as_str().unwrap().ends_with("3.jpg"));
}

#[tokio::test]
async fn test_no_detections() {
    let dir = TempDir::new().unwrap();
    let app = app_with(&dir, Vec::new());

    let (status, body) = send(&app, multipart_request("image_file", &png(77, 33))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, serde_json::json!({"count": 0, "boxes": []}));

    let result = image::open(dir.path().join("Results").join("1.jpg")).unwrap();
    assert_eq!(result.dimensions(), (77, 33));
}

#[tokio::test]
async fn test_missing_image_field() {
    let dir = TempDir::new().unwrap();
    let app = app_with(&dir, Vec::new());

    let (status, body) = send(&app, multipart_request("photo", &png(10, 10))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "INVALID_INPUT");
    assert!(std::fs::read_dir(dir.path().join("Uploads")).unwrap().next().is_none());
}

#[tokio::test]
async fn test_corrupt_image_is_server_error() {
    let dir = TempDir::new().unwrap();
    let app = app_with(&dir, Vec::new());

    let (status, body) = send(&app, multipart_request("image_file", b"garbage bytes")).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"]["code"], "IMAGE_DECODE_ERROR");
    // 上传已保存，不做清理
    assert!(dir.path().join("Uploads").join("1.jpg").exists());
}

#[tokio::test]
async fn test_concurrent_uploads_get_distinct_numbers() {
    let dir = TempDir::new().unwrap();
    let app = app_with(&dir, two_boxes());

    let handles: Vec<_> = (0..6)
        .map(|_| {
            let app = app.clone();
            tokio::spawn(async move { send(&app, multipart_request("image_file", &png(40, 40))).await })
        })
        .collect();
    for handle in handles {
        let (status, _) = handle.await.unwrap();
        assert_eq!(status, StatusCode::OK);
    }

    let mut results_dir: Vec<String> = std::fs::read_dir(dir.path().join("Results"))
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    results_dir.sort();
    assert_eq!(results_dir.len(), 6);

    let csv = std::fs::read_to_string(dir.path().join("Dataset.csv")).unwrap();
    assert_eq!(csv.lines().count(), 6);
}

#[tokio::test]
async fn test_health_and_info() {
    let dir = TempDir::new().unwrap();
    let app = app_with(&dir, Vec::new());

    let (status, health) = send(&app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["status"], "healthy");

    let (status, info) = send(&app, get("/api/info")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(info["model"]["name"], "stub");
    assert_eq!(info["dev_mode"], false);
    assert!((info["thresholds"]["confidence_threshold"].as_f64().unwrap() - 0.025).abs() < 1e-6);
    assert!((info["thresholds"]["iou_threshold"].as_f64().unwrap() - 0.2).abs() < 1e-6);
}

#[tokio::test]
async fn test_cross_origin_requests_allowed() {
    let dir = TempDir::new().unwrap();
    let app = app_with(&dir, Vec::new());

    let request = Request::builder()
        .uri("/health")
        .header(header::ORIGIN, "http://example.com")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
        "*"
    );
}
