use std::time::Duration;

use async_trait::async_trait;
use log::{debug, warn};
use reqwest::multipart::{Form, Part};

use super::types::Verdict;
use crate::data_capture::codec::{encode_jpeg, DEFAULT_JPEG_QUALITY};
use crate::data_capture::Frame;
use crate::error_handling::types::ClassifierError;

#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, frame: &Frame) -> Result<Verdict, ClassifierError>;
}

/// Posts frames as JPEG to `<base_url>/predict`.
///
/// The service answers `{"fall_detected": bool, "confidence": float, ...}`;
/// extra fields are ignored.
pub struct HttpClassifier {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpClassifier {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ClassifierError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: format!("{}/predict", base_url.trim_end_matches('/')),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl Classifier for HttpClassifier {
    async fn classify(&self, frame: &Frame) -> Result<Verdict, ClassifierError> {
        let jpeg = encode_jpeg(frame, DEFAULT_JPEG_QUALITY).map_err(ClassifierError::EncodeError)?;
        let form = Form::new().part(
            "file",
            Part::bytes(jpeg)
                .file_name("frame.jpg")
                .mime_str("image/jpeg")?,
        );

        let response = self.client.post(&self.endpoint).multipart(form).send().await?;
        let status = response.status();
        if !status.is_success() {
            warn!("Classifier at {} answered {}", self.endpoint, status);
            return Err(ClassifierError::BadResponse(format!("status {}", status)));
        }

        let verdict: Verdict = response.json().await?;
        debug!(
            "Classifier verdict: fall={} confidence={:.3}",
            verdict.fall_detected, verdict.confidence
        );
        Ok(verdict)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::net::SocketAddr;
    use warp::Filter;

    fn frame() -> Frame {
        Frame::from_rgb(8, 8, vec![90u8; 8 * 8 * 3], Utc::now()).unwrap()
    }

    fn serve_on_loopback<F>(server: (SocketAddr, F)) -> SocketAddr
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        tokio::spawn(server.1);
        server.0
    }

    #[tokio::test]
    async fn posts_jpeg_and_parses_verdict() {
        let route = warp::post()
            .and(warp::path("predict"))
            .and(warp::header::<String>("content-type"))
            .and(warp::body::bytes())
            .map(|content_type: String, body: bytes::Bytes| {
                let has_jpeg = body.windows(2).any(|w| w == [0xFF, 0xD8]);
                let is_form = content_type.starts_with("multipart/form-data");
                warp::reply::json(&serde_json::json!({
                    "fall_detected": has_jpeg && is_form,
                    "confidence": 0.91,
                    "prediction": "fall"
                }))
            });
        let addr = serve_on_loopback(warp::serve(route).bind_ephemeral(([127, 0, 0, 1], 0)));

        let classifier =
            HttpClassifier::new(&format!("http://{}/", addr), Duration::from_secs(5)).unwrap();
        assert_eq!(classifier.endpoint(), format!("http://{}/predict", addr));
        let verdict = classifier.classify(&frame()).await.unwrap();
        assert!(verdict.fall_detected);
        assert!((verdict.confidence - 0.91).abs() < 1e-6);
    }

    #[tokio::test]
    async fn slow_service_times_out() {
        let route = warp::post().and(warp::path("predict")).and_then(|| async {
            tokio::time::sleep(Duration::from_secs(3)).await;
            Ok::<_, warp::Rejection>(warp::reply::json(&serde_json::json!({})))
        });
        let addr = serve_on_loopback(warp::serve(route).bind_ephemeral(([127, 0, 0, 1], 0)));

        let classifier =
            HttpClassifier::new(&format!("http://{}", addr), Duration::from_millis(200)).unwrap();
        assert!(matches!(
            classifier.classify(&frame()).await,
            Err(ClassifierError::Timeout)
        ));
    }

    #[tokio::test]
    async fn malformed_or_failed_answers_are_bad_responses() {
        let route = warp::post().and(warp::path("predict")).map(|| "not json");
        let addr = serve_on_loopback(warp::serve(route).bind_ephemeral(([127, 0, 0, 1], 0)));
        let classifier =
            HttpClassifier::new(&format!("http://{}", addr), Duration::from_secs(5)).unwrap();
        assert!(matches!(
            classifier.classify(&frame()).await,
            Err(ClassifierError::BadResponse(_))
        ));

        let route = warp::post().and(warp::path("predict")).map(|| {
            warp::reply::with_status("boom", warp::http::StatusCode::INTERNAL_SERVER_ERROR)
        });
        let addr = serve_on_loopback(warp::serve(route).bind_ephemeral(([127, 0, 0, 1], 0)));
        let classifier =
            HttpClassifier::new(&format!("http://{}", addr), Duration::from_secs(5)).unwrap();
        assert!(matches!(
            classifier.classify(&frame()).await,
            Err(ClassifierError::BadResponse(_))
        ));
    }

    #[tokio::test]
    async fn unreachable_service_is_a_transport_error() {
        let classifier =
            HttpClassifier::new("http://127.0.0.1:9", Duration::from_secs(2)).unwrap();
        assert!(matches!(
            classifier.classify(&frame()).await,
            Err(ClassifierError::Transport(_))
        ));
    }
}
