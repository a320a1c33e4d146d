/// The JSON events exchanged with the front-end over the WebSocket.
/// Their definitions should be kept in sync with the front-end's event
/// handlers. That INCLUDES the `event` tag and the field names, which
/// become the JSON keys.
use serde::{Deserialize, Serialize};

/// Events the client sends us.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ClientEvent {
    /// A finished canvas stroke; `image` is a data URL or bare base64.
    DrawData { image: String },
}

/// Events we send the client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ServerEvent {
    /// The classification result: ten probabilities, index i = digit i.
    Prediction { probabilities: Vec<f32> },
    /// An explicit per-request failure, so the client never waits on a
    /// reply that will not come.
    Error { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn draw_data_deserialization() {
        let json = r#"{"event":"draw_data","image":"data:image/png;base64,AAAA"}"#;
        let event: ClientEvent = serde_json::from_str(json).unwrap();

        assert_eq!(
            event,
            ClientEvent::DrawData {
                image: "data:image/png;base64,AAAA".to_string()
            }
        );
    }

    #[test]
    fn prediction_serialization() {
        let event = ServerEvent::Prediction {
            probabilities: vec![0.1; 10],
        };
        let json = serde_json::to_string(&event).unwrap();

        assert!(json.starts_with(r#"{"event":"prediction""#));
        let deserialized: ServerEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(event, deserialized);
    }

    #[test]
    fn error_event_serialization() {
        let event = ServerEvent::Error {
            message: "Undecodable image data".to_string(),
        };
        let json = serde_json::to_string(&event).unwrap();

        assert_eq!(
            json,
            r#"{"event":"error","message":"Undecodable image data"}"#
        );
    }
}
