use std::sync::Arc;

use chrono::Utc;
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, warn};

use shared_database::supabase::SupabaseClient;

/// Drops a message into the platform inbox after a booking is made.
/// Fire-and-forget: delivery failure is logged and never rolls back the
/// appointment.
pub fn send_booking_notification(
    supabase: Arc<SupabaseClient>,
    sender_user_id: String,
    recipient_user_id: String,
    content: String,
    auth_token: String,
) {
    tokio::spawn(async move {
        let body = json!({
            "sender_id": &sender_user_id,
            "recipient_id": &recipient_user_id,
            "content": &content,
            "created_at": Utc::now().to_rfc3339(),
        });

        let result: Result<Vec<Value>, _> = supabase
            .request(Method::POST, "/rest/v1/messages", Some(&auth_token), Some(body))
            .await;

        match result {
            Ok(_) => debug!("Booking notification sent to user {}", recipient_user_id),
            Err(e) => warn!("Failed to send booking notification: {}", e),
        }
    });
}
