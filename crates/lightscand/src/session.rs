//! HTTP client for the analysis backend.

use lightscan_core::{
    Ack, CaptureRecord, FacePolygons, NetworkError, Point, RetryPolicy, SessionClient, SessionId,
};
use reqwest::blocking::{multipart, Client, Response};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Serialize)]
struct CreateSessionRequest<'a> {
    user_id: &'a str,
}

#[derive(Deserialize)]
struct CreateSessionResponse {
    #[allow(dead_code)]
    user_id: String,
    user_session_id: SessionId,
}

/// Per-sample metadata sent alongside the JPEG.
#[derive(Serialize)]
struct SampleMetadata<'a> {
    heading: i32,
    nose_middle_point: Point,
    #[serde(flatten)]
    polygons: &'a FacePolygons,
}

#[derive(Deserialize)]
struct LightDirection {
    heading: i32,
}

pub struct HttpSessionClient {
    client: Client,
    base_url: String,
    user_id: String,
    upload_retry: RetryPolicy,
}

impl HttpSessionClient {
    pub fn new(
        base_url: &str,
        user_id: &str,
        timeout: Duration,
        upload_retry: RetryPolicy,
    ) -> Result<Self, NetworkError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(transport)?;
        Ok(Self::with_client(client, base_url, user_id, upload_retry))
    }

    pub fn with_client(
        client: Client,
        base_url: &str,
        user_id: &str,
        upload_retry: RetryPolicy,
    ) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            user_id: user_id.to_string(),
            upload_retry,
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/foundation/user_session/{}", self.base_url, path)
    }

    fn post_sample(&self, url: &str, record: &CaptureRecord) -> Result<Ack, NetworkError> {
        let metadata = serde_json::to_string(&SampleMetadata {
            heading: record.heading,
            nose_middle_point: record.nose_midpoint,
            polygons: &record.polygons,
        })
        .map_err(|e| NetworkError::Decode(e.to_string()))?;

        let image = multipart::Part::bytes(record.image.clone())
            .file_name(format!("{}.jpg", record.heading))
            .mime_str("image/jpeg")
            .map_err(transport)?;
        let form = multipart::Form::new()
            .text("metadata", metadata)
            .part("image", image);

        let resp = self
            .client
            .post(url)
            .multipart(form)
            .send()
            .map_err(transport)?;
        check_status(resp)?;
        Ok(Ack {
            heading: record.heading,
        })
    }
}

impl SessionClient for HttpSessionClient {
    fn create_session(&self) -> Result<SessionId, NetworkError> {
        let resp = self
            .client
            .post(self.endpoint(""))
            .json(&CreateSessionRequest {
                user_id: &self.user_id,
            })
            .send()
            .map_err(transport)?;
        let body: CreateSessionResponse = check_status(resp)?.json().map_err(decode)?;
        tracing::info!(session = %body.user_session_id, user = %self.user_id, "session created");
        Ok(body.user_session_id)
    }

    fn upload_sample(
        &self,
        session: &SessionId,
        record: &CaptureRecord,
    ) -> Result<Ack, NetworkError> {
        let url = self.endpoint(&format!("{session}/samples/"));
        self.upload_retry
            .run("upload sample", || self.post_sample(&url, record))
    }

    fn aggregate_result(&self, session: &SessionId) -> Result<i32, NetworkError> {
        let resp = self
            .client
            .get(self.endpoint(&format!("{session}/light_direction/")))
            .send()
            .map_err(transport)?;
        let body: LightDirection = check_status(resp)?.json().map_err(decode)?;
        Ok(body.heading)
    }
}

fn check_status(resp: Response) -> Result<Response, NetworkError> {
    let status = resp.status();
    if status.is_success() {
        Ok(resp)
    } else {
        Err(NetworkError::Status(status.as_u16()))
    }
}

fn transport(e: reqwest::Error) -> NetworkError {
    NetworkError::Transport(e.to_string())
}

fn decode(e: reqwest::Error) -> NetworkError {
    NetworkError::Decode(e.to_string())
}


#[cfg(test)]
mod tests {
    use super::testserver::{client, serve_once};
    use super::*;

    fn rect(x0: i32, y0: i32, x1: i32, y1: i32) -> Vec<Point> {
        vec![
            Point::new(x0, y0),
            Point::new(x1, y0),
            Point::new(x1, y1),
            Point::new(x0, y1),
        ]
    }

    fn polygons() -> FacePolygons {
        FacePolygons {
            face_till_nose_end: rect(0, 0, 10, 10),
            mouth_without_lips: rect(3, 6, 7, 7),
            mouth_with_lips: rect(2, 5, 8, 8),
            left_eye: rect(2, 2, 4, 3),
            right_eye: rect(6, 2, 8, 3),
            left_eyebrow: rect(2, 1, 4, 2),
            right_eyebrow: rect(6, 1, 8, 2),
        }
    }

    fn record(heading: i32) -> CaptureRecord {
        CaptureRecord {
            heading,
            image: vec![0xFF, 0xD8, 0xFF, 0xD9],
            nose_midpoint: Point::new(5, 4),
            polygons: polygons(),
        }
    }

    fn session_client(base: &str) -> HttpSessionClient {
        HttpSessionClient::with_client(client(), base, "user-1", RetryPolicy::once())
    }

    #[test]
    fn test_metadata_flattens_polygons() {
        let r = record(120);
        let json = serde_json::to_value(SampleMetadata {
            heading: r.heading,
            nose_middle_point: r.nose_midpoint,
            polygons: &r.polygons,
        })
        .unwrap();
        assert_eq!(json["heading"], 120);
        assert_eq!(json["nose_middle_point"], serde_json::json!([5, 4]));
        assert_eq!(json["mouth_with_lips"][0], serde_json::json!([2, 5]));
        assert!(json.get("polygons").is_none());
    }

    #[test]
    fn test_endpoint_trims_trailing_slash() {
        let c = session_client("http://backend.local/");
        assert_eq!(
            c.endpoint("abc/samples/"),
            "http://backend.local/foundation/user_session/abc/samples/"
        );
    }

    #[test]
    fn test_create_session() {
        let (base, server) = serve_once(
            "201 Created",
            r#"{"user_id":"user-1","user_session_id":"s-42"}"#,
        );
        let id = session_client(&base).create_session().unwrap();
        assert_eq!(id, SessionId("s-42".into()));

        let request = server.join().unwrap();
        assert!(request.starts_with("POST /foundation/user_session/ "));
        assert!(request.contains(r#"{"user_id":"user-1"}"#));
    }

    #[test]
    fn test_upload_sample_multipart() {
        let (base, server) = serve_once("200 OK", "{}");
        let ack = session_client(&base)
            .upload_sample(&SessionId("s-42".into()), &record(40))
            .unwrap();
        assert_eq!(ack, Ack { heading: 40 });

        let request = server.join().unwrap();
        assert!(request.starts_with("POST /foundation/user_session/s-42/samples/ "));
        assert!(request.contains("name=\"metadata\""));
        assert!(request.contains("\"heading\":40"));
        assert!(request.contains("name=\"image\""));
    }

    #[test]
    fn test_aggregate_result() {
        let (base, server) = serve_once("200 OK", r#"{"heading":215}"#);
        let heading = session_client(&base)
            .aggregate_result(&SessionId("s-42".into()))
            .unwrap();
        assert_eq!(heading, 215);
        let request = server.join().unwrap();
        assert!(request.starts_with("GET /foundation/user_session/s-42/light_direction/ "));
    }

    #[test]
    fn test_error_status() {
        let (base, _server) = serve_once("503 Service Unavailable", "{}");
        let err = session_client(&base)
            .aggregate_result(&SessionId("s-42".into()))
            .unwrap_err();
        assert_eq!(err, NetworkError::Status(503));
    }

    #[test]
    fn test_malformed_result() {
        let (base, _server) = serve_once("200 OK", r#"{"direction":"north"}"#);
        let err = session_client(&base)
            .aggregate_result(&SessionId("s-42".into()))
            .unwrap_err();
        assert!(matches!(err, NetworkError::Decode(_)));
    }

    #[test]
    fn test_unreachable_backend() {
        let c = session_client("http://127.0.0.1:1");
        assert!(matches!(
            c.create_session(),
            Err(NetworkError::Transport(_))
        ));
    }
}
