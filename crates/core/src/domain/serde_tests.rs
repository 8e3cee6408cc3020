#[cfg(test)]
mod tests {
    use crate::domain::error::{ApiError, ErrorCode, ProviderErrorKind, RequestField};
    use crate::domain::job::{Job, JobState, StateTransition, VideoResource};
    use crate::domain::model::GenerationKind;
    use crate::domain::request::{AspectRatio, DurationInput, GenerationRequest};

    #[test]
    fn test_job_state_serialization() {
        assert_eq!(serde_json::to_string(&JobState::Queued).unwrap(), "\"queued\"");
        assert_eq!(
            serde_json::to_string(&JobState::TimedOut).unwrap(),
            "\"timed_out\""
        );
        assert_eq!(
            serde_json::to_string(&JobState::Cancelled).unwrap(),
            "\"cancelled\""
        );
    }

    #[test]
    fn test_error_code_serialization() {
        assert_eq!(
            serde_json::to_string(&ErrorCode::Validation).unwrap(),
            "\"E_VALIDATION\""
        );
        assert_eq!(
            serde_json::to_string(&ErrorCode::Timeout).unwrap(),
            "\"E_TIMEOUT\""
        );
        assert_eq!(
            serde_json::to_string(&ProviderErrorKind::PaymentRequired).unwrap(),
            "\"payment-required\""
        );
    }

    #[test]
    fn test_api_error_serialization() {
        let err = ApiError::validation(RequestField::SourceImage, "テスト");
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["type"], "validation");
        assert_eq!(json["field"], "source_image");

        let err = ApiError::provider(429, "");
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["kind"], "rate-limited");
        assert_eq!(json["status"], 429);
    }

    #[test]
    fn test_inline_video_omits_bytes() {
        let video = VideoResource::inline("video/mp4", vec![1; 2048]);
        let json = serde_json::to_value(&video).unwrap();
        assert_eq!(json["source"], "inline");
        assert_eq!(json["size_bytes"], 2048);
        assert!(json.get("data").is_none());
    }

    #[test]
    fn test_job_serialization() {
        let job = Job::new("j1".to_string(), "m".to_string(), "now".to_string());
        let json = serde_json::to_value(&job).unwrap();
        assert_eq!(json["state"], "submitting");
        assert_eq!(json["progress_percent"], 0);
        assert!(json["queue_id"].is_null());
    }

    #[test]
    fn test_state_transition_serialization() {
        let t = StateTransition {
            job_id: "test-id".to_string(),
            prev_state: JobState::Queued,
            new_state: JobState::Processing,
        };
        let json = serde_json::to_string(&t).unwrap();
        assert!(json.contains("test-id"));
        assert!(json.contains("queued"));
        assert!(json.contains("processing"));
    }

    #[test]
    fn test_generation_request_deserialization() {
        let req: GenerationRequest = serde_json::from_str(
            r#"{"model":"ovi-image-to-video","source_image":"https://i/x.png","duration":"5s","aspect_ratio":"9:16"}"#,
        )
        .unwrap();
        assert_eq!(req.kind(), GenerationKind::ImageToVideo);
        assert_eq!(req.duration, Some(DurationInput::Text("5s".to_string())));
        assert_eq!(req.aspect_ratio, Some(AspectRatio::Portrait));

        let req: GenerationRequest =
            serde_json::from_str(r#"{"model":"m-text-to-video","prompt":"p","duration":8}"#).unwrap();
        assert_eq!(req.duration, Some(DurationInput::Seconds(8.0)));
    }
}
