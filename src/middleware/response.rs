use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use serde_json::json;

/// Wrapper that normalizes every successful handler outcome into the
/// `{statusCode, data, message, success: true}` envelope. Failures take the
/// matching shape through `ApiError`.
#[derive(Debug)]
pub struct ApiResponse<T: Serialize> {
    pub data: T,
    pub message: String,
    pub status_code: StatusCode,
}

impl<T: Serialize> ApiResponse<T> {
    /// A 200 OK response.
    pub fn success(data: T, message: impl Into<String>) -> Self {
        Self {
            data,
            message: message.into(),
            status_code: StatusCode::OK,
        }
    }

    /// A 201 Created response.
    pub fn created(data: T, message: impl Into<String>) -> Self {
        Self {
            data,
            message: message.into(),
            status_code: StatusCode::CREATED,
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        let data = match serde_json::to_value(&self.data) {
            Ok(value) => value,
            Err(e) => {
                tracing::error!("failed to serialize response data: {}", e);
                return (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({
                        "statusCode": 500,
                        "message": "Failed to serialize response data",
                        "success": false,
                        "errors": [],
                    })),
                )
                    .into_response();
            }
        };

        let envelope = json!({
            "statusCode": self.status_code.as_u16(),
            "data": data,
            "message": self.message,
            "success": true,
        });

        (self.status_code, Json(envelope)).into_response()
    }
}

/// Result alias every handler returns: envelope on success, `ApiError`
/// (rendered as the failure envelope) otherwise.
pub type ApiResult<T> = Result<ApiResponse<T>, crate::error::ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    async fn body_json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn success_envelope_has_the_expected_shape() {
        let response =
            ApiResponse::success(json!({"id": 7}), "Video fetched successfully").into_response();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["statusCode"], 200);
        assert_eq!(body["data"]["id"], 7);
        assert_eq!(body["message"], "Video fetched successfully");
        assert_eq!(body["success"], true);
    }

    #[tokio::test]
    async fn created_envelope_carries_201() {
        let response = ApiResponse::created(json!({}), "Created").into_response();
        assert_eq!(response.status(), StatusCode::CREATED);

        let body = body_json(response).await;
        assert_eq!(body["statusCode"], 201);
        assert_eq!(body["success"], true);
        assert!(body["data"].is_object());
    }
}
