//! Router fixtures for handler tests

use std::io::Cursor;
use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, Request, Response},
    Router,
};
use cropscan::model::InputShape;
use cropscan::registry::{CropLoadStatus, LoadReport};
use cropscan::{CropClassifier, CropModelEntry, ImageTensor, ModelRegistry};
use image::{DynamicImage, ImageFormat};
use tower::ServiceExt;

use crate::routes;
use crate::state::{AppState, ServerConfig};

const BOUNDARY: &str = "cropscan-test-boundary";

/// Fixed-output classifier
pub struct FixedClassifier {
    pub input: InputShape,
    pub output: Vec<f32>,
}

impl CropClassifier for FixedClassifier {
    fn input_shape(&self) -> InputShape {
        self.input
    }

    fn output_width(&self) -> usize {
        self.output.len()
    }

    fn predict(&self, _input: &ImageTensor) -> cropscan::Result<Vec<f32>> {
        Ok(self.output.clone())
    }
}

fn maize_labels() -> Vec<String> {
    [
        "fall armyworm",
        "grasshopper",
        "healthy",
        "leaf beetle",
        "leaf blight",
        "leaf spot",
        "streak virus",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// Router whose registry holds only maize; tomato is reported as failed
pub fn test_app() -> Router {
    test_app_with_config(ServerConfig::default())
}

/// [`test_app`] with a custom server configuration
pub fn test_app_with_config(config: ServerConfig) -> Router {
    let entry = CropModelEntry::new(
        Arc::new(FixedClassifier {
            input: InputShape::square(256),
            output: vec![0.05, 0.05, 0.05, 0.80, 0.05, 0.0, 0.0],
        }),
        maize_labels(),
    );
    let registry = ModelRegistry::from_entries([("maize".to_string(), entry)]);

    let report = LoadReport {
        crops: vec![
            CropLoadStatus {
                crop: "tomato".to_string(),
                loaded: false,
                weights: "model/tomato_mobilenet_best.mpk".into(),
                labels: vec!["Tomato_Healthy".to_string()],
                input_height: Some(224),
                input_width: Some(224),
                error: Some(
                    "Weight file not found: model/tomato_mobilenet_best.mpk".to_string(),
                ),
            },
            CropLoadStatus {
                crop: "maize".to_string(),
                loaded: true,
                weights: "model/maize_best_final.mpk".into(),
                labels: maize_labels(),
                input_height: Some(256),
                input_width: Some(256),
                error: None,
            },
        ],
    };

    let state = Arc::new(AppState::new(config, registry, report));
    routes::router(state).unwrap()
}

pub fn png_bytes() -> Vec<u8> {
    let mut buf = Vec::new();
    DynamicImage::new_rgb8(40, 30)
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .unwrap();
    buf
}

/// One multipart form part
pub struct Part<'a> {
    name: &'a str,
    filename: Option<&'a str>,
    data: &'a [u8],
}

impl<'a> Part<'a> {
    pub fn file(name: &'a str, filename: &'a str, data: &'a [u8]) -> Self {
        Self {
            name,
            filename: Some(filename),
            data,
        }
    }

    pub fn text(name: &'a str, value: &'a str) -> Self {
        Self {
            name,
            filename: None,
            data: value.as_bytes(),
        }
    }
}

pub fn multipart_body(parts: &[Part<'_>]) -> Vec<u8> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        match part.filename {
            Some(filename) => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
                        part.name, filename
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
            }
            None => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", part.name)
                        .as_bytes(),
                );
            }
        }
        body.extend_from_slice(part.data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    body
}

pub async fn post_raw(app: Router, uri: &str, content_type: &str, body: &[u8]) -> Response<Body> {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, content_type)
        .body(Body::from(body.to_vec()))
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn post_multipart(app: Router, uri: &str, body: Vec<u8>) -> Response<Body> {
    let content_type = format!("multipart/form-data; boundary={}", BOUNDARY);
    post_raw(app, uri, &content_type, &body).await
}

pub async fn get(app: Router, uri: &str) -> Response<Body> {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn json_body(response: Response<Body>) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
