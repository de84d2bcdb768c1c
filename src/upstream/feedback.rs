use reqwest::Method;

use crate::error::AppError;
use crate::models::feedback::{Feedback, FeedbackReply, FeedbackSubmission};
use crate::upstream::ApiClient;

const RESOURCE: &str = "feedback";

impl ApiClient {
    pub async fn submit_feedback(
        &self,
        submission: &FeedbackSubmission,
    ) -> Result<Feedback, AppError> {
        submission.validate()?;
        self.send(RESOURCE, Method::POST, &["feedback"], submission, Some("feedback"))
            .await
    }

    pub async fn list_feedback(&self) -> Result<Vec<Feedback>, AppError> {
        self.get(RESOURCE, &["feedback"], Some("feedback")).await
    }

    pub async fn respond_to_feedback(
        &self,
        id: &str,
        reply: &FeedbackReply,
    ) -> Result<Feedback, AppError> {
        reply.validate()?;
        self.send(
            RESOURCE,
            Method::POST,
            &["feedback", id, "respond"],
            reply,
            Some("feedback"),
        )
        .await
    }

    pub async fn mark_feedback_viewed(&self, id: &str) -> Result<Feedback, AppError> {
        self.send(
            RESOURCE,
            Method::PATCH,
            &["feedback", id, "viewed"],
            &serde_json::json!({}),
            Some("feedback"),
        )
        .await
    }
}
